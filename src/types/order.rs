use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MalformedOrder;
use crate::types::geo::Coordinate;

/// Restaurant used when an order carries no pickup address.
pub const DEFAULT_ORIGIN: Coordinate = Coordinate::new(10.7765, 106.7004);
/// Drop-off used when an order carries no delivery address.
pub const DEFAULT_DESTINATION: Coordinate = Coordinate::new(10.7807, 106.7009);
pub const DEFAULT_ESTIMATED_MINUTES: u32 = 22;

const MAX_ESTIMATED_MINUTES: f64 = 7.0 * 24.0 * 60.0;
// Bare numbers below this are read as minutes, anything larger as epoch millis.
const MINUTES_VS_MILLIS_CUTOFF: f64 = 100_000.0;

/// Order record as handed over by the storefront. Field names follow the
/// storefront's camelCase JSON; snake_case spellings are accepted too.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    #[serde(default)]
    pub id: Option<OrderId>,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<LooseTimestamp>,
    #[serde(default, alias = "estimated_delivery", alias = "estimatedDeliveryAt")]
    pub estimated_delivery: Option<LooseTimestamp>,
    #[serde(default, alias = "estimated_delivery_minutes")]
    pub estimated_delivery_minutes: Option<f64>,
    #[serde(default, alias = "deliveryAddress")]
    pub address: Option<Location>,
    #[serde(default, alias = "restaurant_name")]
    pub restaurant_name: Option<String>,
    #[serde(default, alias = "restaurant_address")]
    pub restaurant_address: Option<Location>,
    #[serde(default, alias = "deliveryProgress", alias = "delivery_progress")]
    pub progress: Option<f64>,
    #[serde(default, alias = "distance_km")]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderId {
    Number(i64),
    Text(String),
}

impl OrderId {
    fn normalized(&self) -> Option<String> {
        match self {
            OrderId::Number(n) => Some(n.to_string()),
            OrderId::Text(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseTimestamp {
    Number(f64),
    Text(String),
}

impl LooseTimestamp {
    pub fn to_datetime(&self) -> Result<DateTime<Utc>, MalformedOrder> {
        match self {
            LooseTimestamp::Number(millis) => {
                if !millis.is_finite() {
                    return Err(MalformedOrder::InvalidTimestamp(millis.to_string()));
                }
                Utc.timestamp_millis_opt(*millis as i64)
                    .single()
                    .ok_or_else(|| MalformedOrder::InvalidTimestamp(millis.to_string()))
            }
            LooseTimestamp::Text(text) => parse_timestamp(text.trim())
                .ok_or_else(|| MalformedOrder::InvalidTimestamp(text.clone())),
        }
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Point(Coordinate),
    Text(String),
}

impl Location {
    fn to_waypoint(&self) -> Option<Waypoint> {
        match self {
            Location::Point(coords) if coords.is_valid() => Some(Waypoint::Coordinates(*coords)),
            Location::Point(_) => None,
            Location::Text(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| Waypoint::Address(trimmed.to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Waypoint {
    Coordinates(Coordinate),
    Address(String),
}

/// Order with every field the tracker needs filled in.
#[derive(Debug, Clone)]
pub struct NormalizedOrder {
    pub id: String,
    pub restaurant_name: Option<String>,
    pub origin: Option<Waypoint>,
    pub destination: Option<Waypoint>,
    pub created_at: DateTime<Utc>,
    pub estimated_delivery_at: DateTime<Utc>,
    pub estimated_minutes: f64,
    pub explicit_progress: Option<f64>,
    pub distance_hint_km: Option<f64>,
}

impl OrderRecord {
    /// The order's own id, if it carries a usable one.
    pub fn order_id(&self) -> Option<String> {
        self.id.as_ref().and_then(OrderId::normalized)
    }

    pub fn normalize(&self, now: DateTime<Utc>) -> (NormalizedOrder, Vec<MalformedOrder>) {
        let mut defects = Vec::new();

        let id = match self.order_id() {
            Some(id) => id,
            None => {
                let generated = Uuid::new_v4().to_string();
                defects.push(MalformedOrder::MissingId(generated.clone()));
                generated
            }
        };

        let origin = self.restaurant_address.as_ref().and_then(Location::to_waypoint);
        if origin.is_none() {
            defects.push(MalformedOrder::MissingOrigin);
        }
        let destination = self.address.as_ref().and_then(Location::to_waypoint);
        if destination.is_none() {
            defects.push(MalformedOrder::MissingDestination);
        }

        let created_at = match self.created_at.as_ref().map(LooseTimestamp::to_datetime) {
            Some(Ok(created_at)) => created_at,
            Some(Err(defect)) => {
                defects.push(defect);
                now
            }
            None => {
                defects.push(MalformedOrder::MissingCreatedAt);
                now
            }
        };

        // The delivery window has to fit after `created_at` without overflowing.
        let created_at = match created_at.checked_add_signed(minutes_to_duration(MAX_ESTIMATED_MINUTES)) {
            Some(_) => created_at,
            None => {
                defects.push(MalformedOrder::InvalidTimestamp(created_at.to_string()));
                now
            }
        };

        let (estimated_minutes, estimated_delivery_at) = self.resolve_estimate(created_at, &mut defects);

        let explicit_progress = self.progress.filter(|p| p.is_finite()).map(|p| {
            let fraction = if p > 1.0 && p <= 100.0 { p / 100.0 } else { p };
            fraction.clamp(0.0, 1.0)
        });
        let distance_hint_km = self.distance_km.filter(|d| d.is_finite() && *d > 0.0);

        let normalized = NormalizedOrder {
            id,
            restaurant_name: self
                .restaurant_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            origin,
            destination,
            created_at,
            estimated_delivery_at,
            estimated_minutes,
            explicit_progress,
            distance_hint_km,
        };

        (normalized, defects)
    }

    fn resolve_estimate(
        &self,
        created_at: DateTime<Utc>,
        defects: &mut Vec<MalformedOrder>,
    ) -> (f64, DateTime<Utc>) {
        let fallback_minutes = DEFAULT_ESTIMATED_MINUTES as f64;

        if let Some(minutes) = self.estimated_delivery_minutes.filter(|m| m.is_finite() && *m > 0.0) {
            return (minutes, window_end(created_at, minutes));
        }

        match &self.estimated_delivery {
            Some(LooseTimestamp::Number(minutes))
                if minutes.is_finite() && *minutes > 0.0 && *minutes < MINUTES_VS_MILLIS_CUTOFF =>
            {
                return (*minutes, window_end(created_at, *minutes));
            }
            Some(estimate) => match estimate.to_datetime() {
                Ok(eta) if eta > created_at => {
                    let minutes = (eta - created_at).num_milliseconds() as f64 / 60_000.0;
                    return (minutes, eta);
                }
                Ok(eta) => {
                    // Keep the inverted window so time progress falls back to its default.
                    defects.push(MalformedOrder::InvalidDeliveryWindow);
                    return (fallback_minutes, eta);
                }
                Err(defect) => defects.push(defect),
            },
            None => {}
        }

        defects.push(MalformedOrder::MissingEstimate(DEFAULT_ESTIMATED_MINUTES));
        (fallback_minutes, window_end(created_at, fallback_minutes))
    }
}

fn window_end(created_at: DateTime<Utc>, minutes: f64) -> DateTime<Utc> {
    created_at
        .checked_add_signed(minutes_to_duration(minutes))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn minutes_to_duration(minutes: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((minutes.clamp(0.0, MAX_ESTIMATED_MINUTES) * 60_000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).single().expect("valid time")
    }

    #[test]
    fn parses_storefront_camel_case_order() {
        let order: OrderRecord = serde_json::from_value(serde_json::json!({
            "id": 1042,
            "createdAt": "2026-01-01T11:50:00Z",
            "estimatedDeliveryMinutes": 22,
            "address": "123 Main St",
            "restaurantName": "Pho 24",
            "restaurantAddress": { "lat": 10.7765, "lon": 106.7004 },
            "deliveryProgress": 40
        }))
        .expect("order json");

        let (normalized, defects) = order.normalize(now());
        assert!(defects.is_empty(), "unexpected defects: {defects:?}");
        assert_eq!(normalized.id, "1042");
        assert_eq!(normalized.restaurant_name.as_deref(), Some("Pho 24"));
        assert_eq!(
            normalized.origin,
            Some(Waypoint::Coordinates(Coordinate::new(10.7765, 106.7004)))
        );
        assert_eq!(normalized.destination, Some(Waypoint::Address("123 Main St".to_string())));
        assert_eq!(normalized.estimated_minutes, 22.0);
        assert_eq!(
            normalized.estimated_delivery_at - normalized.created_at,
            chrono::Duration::minutes(22)
        );
        assert_eq!(normalized.explicit_progress, Some(0.4));
    }

    #[test]
    fn estimated_delivery_timestamp_sets_window() {
        let order: OrderRecord = serde_json::from_value(serde_json::json!({
            "id": "A-1",
            "created_at": "2026-01-01T11:00:00Z",
            "estimatedDelivery": "2026-01-01T11:30:00Z",
            "address": { "latitude": 10.78, "longitude": 106.70 },
            "restaurantAddress": "1 Nguyen Hue"
        }))
        .expect("order json");

        let (normalized, defects) = order.normalize(now());
        assert!(defects.is_empty());
        assert_eq!(normalized.estimated_minutes, 30.0);
    }

    #[test]
    fn empty_order_is_patched_with_defaults() {
        let (normalized, defects) = OrderRecord::default().normalize(now());
        assert!(!normalized.id.is_empty());
        assert_eq!(normalized.origin, None);
        assert_eq!(normalized.destination, None);
        assert_eq!(normalized.created_at, now());
        assert_eq!(normalized.estimated_minutes, DEFAULT_ESTIMATED_MINUTES as f64);
        assert!(defects.contains(&MalformedOrder::MissingOrigin));
        assert!(defects.contains(&MalformedOrder::MissingDestination));
        assert!(defects.contains(&MalformedOrder::MissingCreatedAt));
        assert!(defects.contains(&MalformedOrder::MissingEstimate(DEFAULT_ESTIMATED_MINUTES)));
        assert!(matches!(defects[0], MalformedOrder::MissingId(_)));
    }

    #[test]
    fn inverted_window_is_kept_and_reported() {
        let order = OrderRecord {
            id: Some(OrderId::Text("late".to_string())),
            created_at: Some(LooseTimestamp::Text("2026-01-01T11:00:00Z".to_string())),
            estimated_delivery: Some(LooseTimestamp::Text("2026-01-01T10:00:00Z".to_string())),
            ..OrderRecord::default()
        };
        let (normalized, defects) = order.normalize(now());
        assert!(defects.contains(&MalformedOrder::InvalidDeliveryWindow));
        assert!(normalized.estimated_delivery_at < normalized.created_at);
        assert_eq!(normalized.estimated_minutes, DEFAULT_ESTIMATED_MINUTES as f64);
    }

    #[test]
    fn garbage_timestamp_is_reported() {
        let order = OrderRecord {
            created_at: Some(LooseTimestamp::Text("yesterday-ish".to_string())),
            ..OrderRecord::default()
        };
        let (normalized, defects) = order.normalize(now());
        assert_eq!(normalized.created_at, now());
        assert!(defects.contains(&MalformedOrder::InvalidTimestamp("yesterday-ish".to_string())));
    }

    #[test]
    fn created_at_near_the_end_of_time_falls_back_to_now() {
        let edge = (DateTime::<Utc>::MAX_UTC.timestamp_millis() - 1000) as f64;
        let order = OrderRecord {
            created_at: Some(LooseTimestamp::Number(edge)),
            estimated_delivery_minutes: Some(30.0),
            ..OrderRecord::default()
        };
        let (normalized, defects) = order.normalize(now());
        assert_eq!(normalized.created_at, now());
        assert_eq!(normalized.estimated_minutes, 30.0);
        assert_eq!(
            normalized.estimated_delivery_at - normalized.created_at,
            chrono::Duration::minutes(30)
        );
        assert!(defects
            .iter()
            .any(|defect| matches!(defect, MalformedOrder::InvalidTimestamp(_))));

        let defaulted = OrderRecord {
            created_at: Some(LooseTimestamp::Number(edge)),
            ..OrderRecord::default()
        };
        let (normalized, _) = defaulted.normalize(now());
        assert_eq!(
            normalized.estimated_delivery_at - normalized.created_at,
            chrono::Duration::minutes(DEFAULT_ESTIMATED_MINUTES as i64)
        );
    }
}
