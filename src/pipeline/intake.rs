use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::geocode::Geocoder;
use crate::pipeline::session::{SessionInit, TrackingSession};
use crate::state::ProgressStore;
use crate::types::geo::Coordinate;
use crate::types::order::{OrderRecord, Waypoint, DEFAULT_DESTINATION, DEFAULT_ORIGIN};

/// Turns an order into a ready-to-run session: normalizes it, geocodes both
/// ends (concurrently) and picks up any persisted progress.
pub async fn build_session(
    order: OrderRecord,
    geocoder: &Geocoder,
    store: &ProgressStore,
    tick: Duration,
    now: DateTime<Utc>,
) -> TrackingSession {
    let (normalized, defects) = order.normalize(now);
    let mut warnings: Vec<String> = defects.iter().map(ToString::to_string).collect();
    for defect in &defects {
        tracing::warn!("Order {}: {}", normalized.id, defect);
    }

    let (origin, destination) = tokio::join!(
        resolve_waypoint(geocoder, normalized.origin.as_ref(), DEFAULT_ORIGIN),
        resolve_waypoint(geocoder, normalized.destination.as_ref(), DEFAULT_DESTINATION),
    );
    let (origin, origin_warning) = origin;
    let (destination, destination_warning) = destination;
    warnings.extend(origin_warning);
    warnings.extend(destination_warning);

    let resumed_progress = store.load(&normalized.id);
    if let Some(progress) = resumed_progress {
        tracing::info!("Resuming order {} at {:.1}%", normalized.id, progress * 100.0);
    }

    TrackingSession::new(
        SessionInit {
            order,
            normalized,
            origin,
            destination,
            warnings,
            resumed_progress,
        },
        tick,
        now,
    )
}

async fn resolve_waypoint(
    geocoder: &Geocoder,
    waypoint: Option<&Waypoint>,
    fallback: Coordinate,
) -> (Option<Coordinate>, Option<String>) {
    match waypoint {
        Some(Waypoint::Coordinates(coords)) => (Some(*coords), None),
        Some(Waypoint::Address(address)) => {
            let result = geocoder.resolve(address, Some(fallback)).await;
            let warning = (!result.is_success()).then(|| format!("{}: {}", address, result.error));
            (Some(result.coords.unwrap_or(fallback)), warning)
        }
        None => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::test_support::StubProvider;
    use crate::geocode::{GeocodeCache, GeocodeOptions};
    use crate::pipeline::progress::DEFAULT_ROUTE_KM;
    use std::sync::Arc;

    fn geocoder(provider: Arc<StubProvider>) -> Geocoder {
        Geocoder::new(provider, Arc::new(GeocodeCache::new(8)), GeocodeOptions::default())
    }

    fn order(json: serde_json::Value) -> OrderRecord {
        serde_json::from_value(json).expect("order json")
    }

    #[tokio::test]
    async fn geocodes_addresses_and_keeps_coordinates() {
        let geocoded = Coordinate::new(10.7790, 106.6990);
        let provider = Arc::new(StubProvider::answering(Ok(Some(geocoded))));
        let session = build_session(
            order(serde_json::json!({
                "id": "o-1",
                "createdAt": Utc::now().to_rfc3339(),
                "estimatedDeliveryMinutes": 15,
                "address": "12 Ly Tu Trong",
                "restaurantAddress": { "latitude": 10.7765, "longitude": 106.7004 }
            })),
            &geocoder(provider.clone()),
            &ProgressStore::new(),
            Duration::from_secs(1),
            Utc::now(),
        )
        .await;

        assert_eq!(session.order_id, "o-1");
        assert_eq!(session.origin, Coordinate::new(10.7765, 106.7004));
        assert_eq!(session.destination, geocoded);
        assert!(session.warnings.is_empty(), "{:?}", session.warnings);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_geocode_falls_back_with_warning() {
        let provider = Arc::new(StubProvider::answering(Ok(None)));
        let session = build_session(
            order(serde_json::json!({
                "id": 7,
                "createdAt": Utc::now().to_rfc3339(),
                "estimatedDeliveryMinutes": 15,
                "address": "nowhere at all",
                "restaurantAddress": "also nowhere"
            })),
            &geocoder(provider),
            &ProgressStore::new(),
            Duration::from_secs(1),
            Utc::now(),
        )
        .await;

        assert_eq!(session.origin, DEFAULT_ORIGIN);
        assert_eq!(session.destination, DEFAULT_DESTINATION);
        assert_eq!(session.warnings.len(), 2);
        assert!(session.warnings.iter().all(|w| w.contains("nearest known location")));
    }

    #[tokio::test]
    async fn malformed_order_still_builds_a_session() {
        let provider = Arc::new(StubProvider::answering(Ok(None)));
        let session = build_session(
            OrderRecord::default(),
            &geocoder(provider.clone()),
            &ProgressStore::new(),
            Duration::from_secs(1),
            Utc::now(),
        )
        .await;

        assert_eq!(provider.call_count(), 0);
        assert_eq!(session.route_km, DEFAULT_ROUTE_KM);
        assert!(session.progress > 0.0);
        assert!(!session.warnings.is_empty());
    }

    #[tokio::test]
    async fn persisted_progress_resumes_session() {
        let store = ProgressStore::new();
        store.save("o-9", 0.7);
        let session = build_session(
            order(serde_json::json!({ "id": "o-9", "estimatedDeliveryMinutes": 20 })),
            &geocoder(Arc::new(StubProvider::answering(Ok(None)))),
            &store,
            Duration::from_secs(1),
            Utc::now(),
        )
        .await;
        assert_eq!(session.clock.value(), 0.7);
    }
}
