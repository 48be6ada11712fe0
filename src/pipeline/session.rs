use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::pipeline::driver::ProgressClock;
use crate::pipeline::geo::{haversine_km, lerp};
use crate::pipeline::milestones::MilestoneTracker;
use crate::pipeline::progress::{self, ROUTE_EPSILON_KM};
use crate::pipeline::route::Trail;
use crate::types::geo::Coordinate;
use crate::types::order::{NormalizedOrder, OrderRecord, DEFAULT_DESTINATION, DEFAULT_ORIGIN};
use crate::types::tracking::{SessionStatus, TrackingEvent, TrackingSnapshot};

const MAX_RECENT_EVENTS: usize = 20;

/// What a new session is built from. Missing endpoints fall back to the
/// default restaurant and drop-off coordinates.
pub struct SessionInit {
    pub order: OrderRecord,
    pub normalized: NormalizedOrder,
    pub origin: Option<Coordinate>,
    pub destination: Option<Coordinate>,
    pub warnings: Vec<String>,
    pub resumed_progress: Option<f64>,
}

/// Working state of one delivery being watched.
#[derive(Debug, Clone)]
pub struct TrackingSession {
    pub order: OrderRecord,
    pub order_id: String,
    pub restaurant_name: Option<String>,
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub created_at: DateTime<Utc>,
    pub estimated_delivery_at: DateTime<Utc>,
    pub estimated_minutes: f64,
    /// Reported route length, used for the ETA and distance label.
    pub route_km: f64,
    pub clock: ProgressClock,
    pub progress: f64,
    pub position: Coordinate,
    pub trail: Trail,
    pub milestones: MilestoneTracker,
    pub events: Vec<TrackingEvent>,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

impl TrackingSession {
    pub fn new(init: SessionInit, tick: Duration, now: DateTime<Utc>) -> Self {
        let SessionInit {
            order,
            normalized,
            origin,
            destination,
            warnings,
            resumed_progress,
        } = init;

        let route_km = progress::route_distance_km(origin, destination, normalized.distance_hint_km);
        let origin = origin.unwrap_or(DEFAULT_ORIGIN);
        let destination = destination.unwrap_or(DEFAULT_DESTINATION);

        let mut clock = ProgressClock::new(normalized.estimated_minutes, tick);
        clock.seed(progress::time_progress(
            Some(normalized.created_at),
            Some(normalized.estimated_delivery_at),
            now,
        ));
        if let Some(explicit) = normalized.explicit_progress {
            clock.seed(explicit);
        }
        if let Some(resumed) = resumed_progress {
            clock.seed(resumed);
        }

        let mut session = Self {
            order,
            order_id: normalized.id,
            restaurant_name: normalized.restaurant_name,
            origin,
            destination,
            created_at: normalized.created_at,
            estimated_delivery_at: normalized.estimated_delivery_at,
            estimated_minutes: normalized.estimated_minutes,
            route_km,
            clock,
            progress: 0.0,
            position: origin,
            trail: Trail::starting_at(origin),
            milestones: MilestoneTracker::new(),
            events: Vec::new(),
            warnings,
            cancelled: false,
        };
        session.progress = progress::resolve_progress(&session);
        session.position = lerp(session.origin, session.destination, session.progress);
        session
    }

    /// Great-circle length of the drawn path. Distance progress is measured
    /// against this, so it stays consistent with the breadcrumbs.
    pub fn path_km(&self) -> f64 {
        haversine_km(Some(self.origin), Some(self.destination))
    }

    pub fn has_degenerate_path(&self) -> bool {
        self.path_km() <= ROUTE_EPSILON_KM
    }

    pub fn is_delivered(&self) -> bool {
        self.clock.is_finished() && self.progress >= 1.0
    }

    pub fn status(&self) -> SessionStatus {
        if self.is_delivered() {
            SessionStatus::Delivered
        } else if self.cancelled {
            SessionStatus::Cancelled
        } else {
            SessionStatus::EnRoute
        }
    }

    pub fn push_event(&mut self, event: TrackingEvent) {
        self.events.push(event);
        if self.events.len() > MAX_RECENT_EVENTS {
            let excess = self.events.len() - MAX_RECENT_EVENTS;
            self.events.drain(..excess);
        }
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        let delivered = self.is_delivered();
        let eta_minutes = progress::dynamic_eta_minutes(self);
        let remaining_km = progress::remaining_km(self);

        TrackingSnapshot {
            order_id: self.order_id.clone(),
            restaurant_name: self.restaurant_name.clone(),
            status: self.status(),
            position: self.position,
            origin: self.origin,
            destination: self.destination,
            progress_percent: (self.progress * 1000.0).round() / 10.0,
            eta_minutes,
            eta_label: progress::eta_label(eta_minutes, delivered),
            distance_label: progress::distance_label(remaining_km, delivered),
            route_km: self.route_km,
            traveled_km: self.trail.traveled_km(),
            milestones: self.milestones.fired(),
            events: self.events.clone(),
            warnings: self.warnings.clone(),
        }
    }
}
