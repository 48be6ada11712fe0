use crate::types::geo::{Bounds, Coordinate, ViewportPosition};

const EARTH_RADIUS_KM: f64 = 6371.0;
const MIN_BOUNDS_SPAN_DEG: f64 = 0.002;

pub fn haversine_km(a: Option<Coordinate>, b: Option<Coordinate>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };

    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    let distance = EARTH_RADIUS_KM * c;
    if distance.is_finite() {
        distance
    } else {
        0.0
    }
}

/// Planar interpolation between two coordinates. Good enough for the few
/// kilometres a delivery covers; use [`haversine_km`] for distances.
pub fn lerp(a: Coordinate, b: Coordinate, t: f64) -> Coordinate {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    Coordinate {
        latitude: a.latitude + (b.latitude - a.latitude) * t,
        longitude: a.longitude + (b.longitude - a.longitude) * t,
    }
}

impl Bounds {
    /// Smallest box holding every point, grown by `pad_ratio` of its span on
    /// each side. Spans below a couple hundred metres are widened so a
    /// stationary delivery still renders.
    pub fn around(points: &[Coordinate], pad_ratio: f64) -> Option<Self> {
        if points.is_empty() {
            return None;
        }

        let min_lat = points.iter().map(|p| p.latitude).fold(f64::INFINITY, f64::min);
        let max_lat = points.iter().map(|p| p.latitude).fold(f64::NEG_INFINITY, f64::max);
        let min_lon = points.iter().map(|p| p.longitude).fold(f64::INFINITY, f64::min);
        let max_lon = points.iter().map(|p| p.longitude).fold(f64::NEG_INFINITY, f64::max);

        let lat_span = (max_lat - min_lat).max(MIN_BOUNDS_SPAN_DEG);
        let lon_span = (max_lon - min_lon).max(MIN_BOUNDS_SPAN_DEG);
        let mid_lat = (min_lat + max_lat) / 2.0;
        let mid_lon = (min_lon + max_lon) / 2.0;
        let pad = pad_ratio.max(0.0);

        Some(Self {
            min_lat: mid_lat - lat_span * (0.5 + pad),
            max_lat: mid_lat + lat_span * (0.5 + pad),
            min_lon: mid_lon - lon_span * (0.5 + pad),
            max_lon: mid_lon + lon_span * (0.5 + pad),
        })
    }
}

/// Maps a coordinate into percent offsets of a viewport covering `bounds`.
/// North is up, so `top` grows as latitude falls.
pub fn project_to_viewport(point: Coordinate, bounds: &Bounds) -> ViewportPosition {
    let lon_range = bounds.max_lon - bounds.min_lon;
    let lat_range = bounds.max_lat - bounds.min_lat;

    let left = if lon_range.abs() <= f64::EPSILON {
        50.0
    } else {
        (point.longitude - bounds.min_lon) / lon_range * 100.0
    };
    let top = if lat_range.abs() <= f64::EPSILON {
        50.0
    } else {
        (bounds.max_lat - point.latitude) / lat_range * 100.0
    };

    ViewportPosition { left, top }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: Coordinate = Coordinate::new(10.7765, 106.7004);
    const DESTINATION: Coordinate = Coordinate::new(10.7807, 106.7009);

    #[test]
    fn haversine_matches_known_short_hop() {
        let distance = haversine_km(Some(ORIGIN), Some(DESTINATION));
        assert!((distance - 0.47).abs() < 0.01, "got {distance}");
    }

    #[test]
    fn haversine_is_zero_for_missing_input() {
        assert_eq!(haversine_km(None, Some(DESTINATION)), 0.0);
        assert_eq!(haversine_km(Some(ORIGIN), None), 0.0);
        assert_eq!(haversine_km(Some(ORIGIN), Some(ORIGIN)), 0.0);
    }

    #[test]
    fn lerp_midpoint_and_clamps() {
        let mid = lerp(ORIGIN, DESTINATION, 0.5);
        assert!((mid.latitude - 10.7786).abs() < 1e-9);
        assert!((mid.longitude - 106.70065).abs() < 1e-9);
        assert_eq!(lerp(ORIGIN, DESTINATION, -1.0), ORIGIN);
        assert_eq!(lerp(ORIGIN, DESTINATION, 3.0), DESTINATION);
        assert_eq!(lerp(ORIGIN, DESTINATION, f64::NAN), ORIGIN);
    }

    #[test]
    fn projection_puts_north_at_top() {
        let bounds = Bounds {
            min_lat: 10.0,
            max_lat: 11.0,
            min_lon: 106.0,
            max_lon: 107.0,
        };
        let north_west = project_to_viewport(Coordinate::new(11.0, 106.0), &bounds);
        assert_eq!(north_west, ViewportPosition::new(0.0, 0.0));
        let south_east = project_to_viewport(Coordinate::new(10.0, 107.0), &bounds);
        assert_eq!(south_east, ViewportPosition::new(100.0, 100.0));
    }

    #[test]
    fn bounds_pad_and_contain_points() {
        let bounds = Bounds::around(&[ORIGIN, DESTINATION], 0.2).expect("bounds");
        for point in [ORIGIN, DESTINATION] {
            let pos = project_to_viewport(point, &bounds);
            assert!(pos.left > 0.0 && pos.left < 100.0);
            assert!(pos.top > 0.0 && pos.top < 100.0);
        }
        assert!(Bounds::around(&[], 0.2).is_none());
    }
}
