use std::f64::consts::PI;

use crate::pipeline::geo::{haversine_km, project_to_viewport};
use crate::pipeline::session::TrackingSession;
use crate::types::geo::{Bounds, Coordinate, ViewportPosition};
use crate::types::tracking::RouteView;

pub const DEFAULT_ROUTE_SEGMENTS: usize = 48;
pub const MIN_BREADCRUMB_KM: f64 = 0.005;
pub const TRAIL_TRIM_THRESHOLD: usize = 400;
pub const TRAIL_KEEP: usize = 250;

const VIEW_PAD_RATIO: f64 = 0.15;

// Lateral wobble in viewport percent, and how many full waves fit the path.
const WOBBLE_AMPLITUDE: f64 = 1.6;
const WOBBLE_WAVES: f64 = 2.0;
// Height of the arc at mid-route relative to the straight-line length.
const CURVATURE_RATIO: f64 = 0.18;

/// Cosmetic flight path between two viewport positions: `segments + 1`
/// samples along the straight line, pushed sideways by an arc and a sine
/// wobble that both vanish at the endpoints.
pub fn synthetic_route(
    from: ViewportPosition,
    to: ViewportPosition,
    segments: usize,
) -> Vec<ViewportPosition> {
    let segments = segments.max(1);
    let dx = to.left - from.left;
    let dy = to.top - from.top;
    let length = (dx * dx + dy * dy).sqrt();

    if length <= f64::EPSILON {
        return vec![from; segments + 1];
    }

    let normal = (-dy / length, dx / length);

    (0..=segments)
        .map(|i| {
            let t = i as f64 / segments as f64;
            let envelope = (PI * t).sin();
            let wobble = (t * 2.0 * PI * WOBBLE_WAVES).sin() * WOBBLE_AMPLITUDE * envelope;
            let arc = 4.0 * t * (1.0 - t) * CURVATURE_RATIO * length;
            let offset = if i == 0 || i == segments { 0.0 } else { wobble + arc };
            ViewportPosition {
                left: from.left + dx * t + normal.0 * offset,
                top: from.top + dy * t + normal.1 * offset,
            }
        })
        .collect()
}

/// Position at fraction `t` of a sampled path, measured by arc length.
pub fn point_along(path: &[ViewportPosition], t: f64) -> Option<ViewportPosition> {
    let first = *path.first()?;
    let last = *path.last()?;
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

    let lengths: Vec<f64> = path
        .windows(2)
        .map(|pair| {
            let dx = pair[1].left - pair[0].left;
            let dy = pair[1].top - pair[0].top;
            (dx * dx + dy * dy).sqrt()
        })
        .collect();
    let total: f64 = lengths.iter().sum();
    if total <= f64::EPSILON {
        return Some(first);
    }

    let target = total * t;
    let mut walked = 0.0;
    for (idx, segment) in lengths.iter().enumerate() {
        if walked + segment >= target && *segment > f64::EPSILON {
            let local_t = ((target - walked) / segment).clamp(0.0, 1.0);
            let a = path[idx];
            let b = path[idx + 1];
            return Some(ViewportPosition {
                left: a.left + (b.left - a.left) * local_t,
                top: a.top + (b.top - a.top) * local_t,
            });
        }
        walked += segment;
    }

    Some(last)
}

/// Breadcrumbs left by the marker. `traveled_km` keeps counting after old
/// points are trimmed away.
#[derive(Debug, Clone)]
pub struct Trail {
    points: Vec<Coordinate>,
    traveled_km: f64,
}

impl Trail {
    pub fn starting_at(origin: Coordinate) -> Self {
        Self {
            points: vec![origin],
            traveled_km: 0.0,
        }
    }

    /// Appends `point` if it is at least [`MIN_BREADCRUMB_KM`] from the last
    /// breadcrumb. Returns whether it was kept.
    pub fn record(&mut self, point: Coordinate) -> bool {
        let step = haversine_km(self.points.last().copied(), Some(point));
        if !self.points.is_empty() && step < MIN_BREADCRUMB_KM {
            return false;
        }
        self.push(point, step);
        true
    }

    /// Appends the final position regardless of the spacing rule, so the
    /// last few metres still count towards the distance covered.
    pub fn record_final(&mut self, point: Coordinate) -> bool {
        let step = haversine_km(self.points.last().copied(), Some(point));
        if !self.points.is_empty() && step <= 0.0 {
            return false;
        }
        self.push(point, step);
        true
    }

    fn push(&mut self, point: Coordinate, step: f64) {
        self.traveled_km += step;
        self.points.push(point);
        if self.points.len() > TRAIL_TRIM_THRESHOLD {
            let excess = self.points.len() - TRAIL_KEEP;
            self.points.drain(..excess);
        }
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn last(&self) -> Option<Coordinate> {
        self.points.last().copied()
    }

    pub fn traveled_km(&self) -> f64 {
        self.traveled_km
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Fits the endpoints, breadcrumbs and drone of `session` into one viewport
/// and lays the synthetic flight path between the endpoints.
pub fn route_view(session: &TrackingSession, segments: usize) -> RouteView {
    let mut points: Vec<Coordinate> = vec![session.origin, session.destination, session.position];
    points.extend_from_slice(session.trail.points());

    let bounds = Bounds::around(&points, VIEW_PAD_RATIO).unwrap_or(Bounds {
        min_lat: session.origin.latitude,
        max_lat: session.origin.latitude,
        min_lon: session.origin.longitude,
        max_lon: session.origin.longitude,
    });

    let origin = project_to_viewport(session.origin, &bounds);
    let destination = project_to_viewport(session.destination, &bounds);

    RouteView {
        order_id: session.order_id.clone(),
        flight_path: synthetic_route(origin, destination, segments),
        trail: session
            .trail
            .points()
            .iter()
            .map(|point| project_to_viewport(*point, &bounds))
            .collect(),
        origin,
        destination,
        marker: project_to_viewport(session.position, &bounds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_route_hits_both_endpoints() {
        let from = ViewportPosition::new(20.0, 80.0);
        let to = ViewportPosition::new(75.0, 25.0);
        let route = synthetic_route(from, to, DEFAULT_ROUTE_SEGMENTS);

        assert_eq!(route.len(), DEFAULT_ROUTE_SEGMENTS + 1);
        assert_eq!(route[0], from);
        let last = route[route.len() - 1];
        assert!((last.left - to.left).abs() < 1e-9);
        assert!((last.top - to.top).abs() < 1e-9);
    }

    #[test]
    fn synthetic_route_bends_away_from_straight_line() {
        let from = ViewportPosition::new(10.0, 50.0);
        let to = ViewportPosition::new(90.0, 50.0);
        let route = synthetic_route(from, to, 48);
        let mid = route[24];
        // Horizontal chord, so the arc shows up as vertical displacement.
        assert!((mid.top - 50.0).abs() > 5.0, "mid point {mid:?} stayed on the chord");
    }

    #[test]
    fn synthetic_route_for_identical_points_is_flat() {
        let p = ViewportPosition::new(50.0, 50.0);
        let route = synthetic_route(p, p, 0);
        assert_eq!(route, vec![p, p]);
    }

    #[test]
    fn point_along_walks_by_length() {
        let path = vec![
            ViewportPosition::new(0.0, 0.0),
            ViewportPosition::new(10.0, 0.0),
            ViewportPosition::new(10.0, 30.0),
        ];
        assert_eq!(point_along(&path, 0.0), Some(ViewportPosition::new(0.0, 0.0)));
        assert_eq!(point_along(&path, 0.25), Some(ViewportPosition::new(10.0, 0.0)));
        assert_eq!(point_along(&path, 1.0), Some(ViewportPosition::new(10.0, 30.0)));
        assert_eq!(point_along(&[], 0.5), None);
    }

    #[test]
    fn trail_skips_points_closer_than_threshold() {
        let origin = Coordinate::new(10.7765, 106.7004);
        let mut trail = Trail::starting_at(origin);

        // ~1 m north
        assert!(!trail.record(Coordinate::new(10.77651, 106.7004)));
        // ~11 m north
        assert!(trail.record(Coordinate::new(10.7766, 106.7004)));
        assert_eq!(trail.len(), 2);
        assert_eq!(trail.points()[0], origin);
        assert!((trail.traveled_km() - 0.0111).abs() < 0.001);
    }

    #[test]
    fn final_point_is_kept_even_when_close() {
        let origin = Coordinate::new(10.7765, 106.7004);
        let mut trail = Trail::starting_at(origin);
        let nearby = Coordinate::new(10.77651, 106.7004);
        assert!(trail.record_final(nearby));
        assert!(!trail.record_final(nearby));
        assert_eq!(trail.last(), Some(nearby));
    }

    #[test]
    fn trail_stays_bounded_and_keeps_latest_point() {
        let mut trail = Trail::starting_at(Coordinate::new(10.0, 106.0));
        let mut last = Coordinate::new(10.0, 106.0);
        for i in 1..=500 {
            last = Coordinate::new(10.0 + i as f64 * 0.001, 106.0);
            assert!(trail.record(last));
            assert!(trail.len() <= TRAIL_TRIM_THRESHOLD);
        }
        assert_eq!(trail.last(), Some(last));
        // 500 steps of ~111 m each, unaffected by trimming.
        assert!((trail.traveled_km() - 55.6).abs() < 0.5);
    }

    #[test]
    fn route_view_keeps_everything_inside_the_frame() {
        use crate::pipeline::session::test_support::session_at;
        use chrono::{Duration, Utc};

        let now = Utc::now();
        let session = session_at(now - Duration::minutes(5), now + Duration::minutes(10), now);
        let view = route_view(&session, DEFAULT_ROUTE_SEGMENTS);

        assert_eq!(view.order_id, "order-1");
        assert_eq!(view.flight_path.len(), DEFAULT_ROUTE_SEGMENTS + 1);
        assert_eq!(view.flight_path[0], view.origin);
        assert_eq!(view.trail.len(), session.trail.len());
        for p in view.trail.iter().chain([&view.origin, &view.destination, &view.marker]) {
            assert!((0.0..=100.0).contains(&p.left), "{p:?}");
            assert!((0.0..=100.0).contains(&p.top), "{p:?}");
        }
        // Destination lies north of the origin.
        assert!(view.destination.top < view.origin.top);
    }
}
