use chrono::{DateTime, Utc};

use crate::pipeline::geo::{haversine_km, lerp};
use crate::pipeline::session::TrackingSession;
use crate::types::geo::Coordinate;
use crate::types::tracking::MilestoneKind;

pub const DEFAULT_TIME_PROGRESS: f64 = 0.3;
pub const MIN_TIME_PROGRESS: f64 = 0.05;
pub const MAX_TIME_PROGRESS: f64 = 0.98;
pub const MIN_DISPLAYED_PROGRESS: f64 = 0.01;
pub const DEFAULT_ROUTE_KM: f64 = 4.6;
pub const ROUTE_EPSILON_KM: f64 = 1e-6;

/// Inputs to the progress reducer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressSignal {
    /// One animation step.
    Tick,
    /// A progress value reported by the order itself. Never moves progress back.
    Explicit(f64),
    /// Jump straight to the destination.
    Arrive,
}

/// Share of the delivery window already elapsed, kept inside
/// `[MIN_TIME_PROGRESS, MAX_TIME_PROGRESS]`.
pub fn time_progress(
    created_at: Option<DateTime<Utc>>,
    estimated_delivery_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    let (Some(created_at), Some(estimated_delivery_at)) = (created_at, estimated_delivery_at) else {
        return DEFAULT_TIME_PROGRESS;
    };
    if estimated_delivery_at <= created_at {
        return DEFAULT_TIME_PROGRESS;
    }

    let window_ms = (estimated_delivery_at - created_at).num_milliseconds() as f64;
    let elapsed_ms = (now - created_at).num_milliseconds() as f64;
    let ratio = elapsed_ms / window_ms;
    if ratio.is_finite() {
        ratio.clamp(MIN_TIME_PROGRESS, MAX_TIME_PROGRESS)
    } else {
        DEFAULT_TIME_PROGRESS
    }
}

pub fn distance_progress(traveled_km: f64, route_km: f64) -> f64 {
    if !route_km.is_finite() || route_km <= ROUTE_EPSILON_KM || !traveled_km.is_finite() {
        return 0.0;
    }
    (traveled_km / route_km.max(ROUTE_EPSILON_KM)).clamp(0.0, 1.0)
}

/// Route length for ETA and labels: great-circle distance when both ends are
/// known, else the order's own hint, else [`DEFAULT_ROUTE_KM`].
pub fn route_distance_km(
    origin: Option<Coordinate>,
    destination: Option<Coordinate>,
    hint_km: Option<f64>,
) -> f64 {
    if origin.is_some() && destination.is_some() {
        return haversine_km(origin, destination);
    }
    hint_km
        .filter(|km| km.is_finite() && *km > 0.0)
        .unwrap_or(DEFAULT_ROUTE_KM)
}

/// Displayed progress: the larger of the distance and clock signals, so
/// neither a stalled clock nor a stalled marker makes the bar go backwards.
/// Below the terminal tick it never reaches the arrival threshold.
pub fn resolve_progress(session: &TrackingSession) -> f64 {
    let clock = session.clock.value();
    let candidate = if session.has_degenerate_path() {
        clock
    } else {
        distance_progress(session.trail.traveled_km(), session.path_km()).max(clock)
    };

    let candidate = if candidate.is_nan() {
        MIN_DISPLAYED_PROGRESS
    } else {
        candidate.clamp(MIN_DISPLAYED_PROGRESS, 1.0)
    };

    if session.clock.is_finished() {
        candidate
    } else {
        candidate.min(crate::pipeline::driver::DRIVER_CEILING)
    }
}

/// Progress the milestones are measured against: distance covered, or the
/// displayed progress when origin and destination coincide.
pub fn milestone_progress(session: &TrackingSession) -> f64 {
    if session.has_degenerate_path() {
        session.progress
    } else {
        distance_progress(session.trail.traveled_km(), session.path_km())
    }
}

/// Applies one signal to the session and returns the milestones it crossed.
pub fn reduce(session: &mut TrackingSession, signal: ProgressSignal) -> Vec<MilestoneKind> {
    if session.cancelled {
        return Vec::new();
    }

    match signal {
        ProgressSignal::Tick => {
            session.clock.tick();
        }
        ProgressSignal::Explicit(value) if value >= 1.0 => session.clock.finish(),
        ProgressSignal::Explicit(value) => session.clock.seed(value),
        ProgressSignal::Arrive => session.clock.finish(),
    }

    if session.clock.is_finished() {
        session.position = session.destination;
        session.trail.record_final(session.destination);
    } else {
        let target = session.progress.max(session.clock.value());
        session.position = lerp(session.origin, session.destination, target);
        session.trail.record(session.position);
    }

    session.progress = session.progress.max(resolve_progress(session));
    let ratio = milestone_progress(session);
    session.milestones.observe(ratio)
}

/// Minutes left at the average speed implied by the order's estimate.
pub fn dynamic_eta_minutes(session: &TrackingSession) -> f64 {
    let remaining_fraction = (1.0 - session.progress).clamp(0.0, 1.0);
    let estimated_minutes = session.estimated_minutes.max(0.0);

    if session.route_km > ROUTE_EPSILON_KM && estimated_minutes > 0.0 {
        let km_per_minute = session.route_km / estimated_minutes;
        let remaining_km = session.route_km * remaining_fraction;
        remaining_km / km_per_minute
    } else {
        estimated_minutes * remaining_fraction
    }
}

pub fn remaining_km(session: &TrackingSession) -> f64 {
    (session.route_km * (1.0 - session.progress)).max(0.0)
}

pub fn eta_label(eta_minutes: f64, delivered: bool) -> String {
    if delivered {
        return "Delivered".to_string();
    }
    if !eta_minutes.is_finite() || eta_minutes < 1.0 {
        return "Arriving now".to_string();
    }
    format!("Arriving in {} min", eta_minutes.ceil() as u64)
}

pub fn distance_label(remaining_km: f64, delivered: bool) -> String {
    if delivered || !remaining_km.is_finite() || remaining_km <= 0.0 {
        return "Arrived".to_string();
    }
    if remaining_km < 1.0 {
        format!("{} m away", (remaining_km * 1000.0).round() as u64)
    } else {
        format!("{:.1} km away", remaining_km)
    }
}
