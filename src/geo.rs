//! Great-circle helpers
//!
//! Distances in metres, angles in degrees at the boundary.

/// Mean earth radius used by the haversine model
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub const METERS_PER_NM: f64 = 1852.0;
pub const METERS_PER_FOOT: f64 = 0.3048;

pub fn nm_to_m(nm: f64) -> f64 {
    nm * METERS_PER_NM
}

pub fn m_to_nm(m: f64) -> f64 {
    m / METERS_PER_NM
}

pub fn ft_to_m(ft: f64) -> f64 {
    ft * METERS_PER_FOOT
}

pub fn m_to_ft(m: f64) -> f64 {
    m / METERS_PER_FOOT
}

/// Normalize a heading into [0, 360)
pub fn normalize_heading(deg: f64) -> f64 {
    let h = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if h >= 360.0 { 0.0 } else { h }
}

/// Wrap an angular difference into (-180, 180]
pub fn wrap_bearing_difference(deg: f64) -> f64 {
    let d = normalize_heading(deg);
    if d > 180.0 { d - 360.0 } else { d }
}

/// Distance (m) and initial bearing (degrees true) from point 1 to point 2.
/// Uses the Haversine formula
pub fn distance_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> (f64, f64) {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // clamp: rounding pushes `a` past 1.0 for antipodal points
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();
    let distance = EARTH_RADIUS_M * c;

    let y = delta_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * delta_lon.cos();
    let bearing = normalize_heading(y.atan2(x).to_degrees());

    (distance, bearing)
}

/// Point reached travelling `distance_m` from (lat, lon) on initial bearing `bearing_deg`
pub fn destination(lat: f64, lon: f64, bearing_deg: f64, distance_m: f64) -> (f64, f64) {
    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let brg = bearing_deg.to_radians();
    let delta = distance_m / EARTH_RADIUS_M;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * brg.cos()).asin();
    let lon2 = lon1
        + (brg.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    let mut lon2 = lon2.to_degrees();
    if lon2 > 180.0 {
        lon2 -= 360.0;
    } else if lon2 < -180.0 {
        lon2 += 360.0;
    }
    (lat2.to_degrees(), lon2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_heading() {
        assert_eq!(normalize_heading(0.0), 0.0);
        assert_eq!(normalize_heading(360.0), 0.0);
        assert_eq!(normalize_heading(-90.0), 270.0);
        assert_eq!(normalize_heading(725.0), 5.0);
    }

    #[test]
    fn test_wrap_difference_across_north() {
        // 359 -> 1 is a 2 degree turn right, not 358 left
        assert!((wrap_bearing_difference(1.0 - 359.0) - 2.0).abs() < 1e-9);
        assert!((wrap_bearing_difference(359.0 - 1.0) + 2.0).abs() < 1e-9);
        assert_eq!(wrap_bearing_difference(180.0), 180.0);
        assert_eq!(wrap_bearing_difference(-180.0), 180.0);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        let (dist, brg) = distance_bearing(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_194.9).abs() < 1.0);
        assert!(brg.abs() < 1e-9);

        let (_, brg) = distance_bearing(0.0, 0.0, 0.0, 1.0);
        assert!((brg - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_antipodal_is_finite() {
        let (dist, brg) = distance_bearing(10.0, 20.0, -10.0, -160.0);
        assert!(dist.is_finite());
        assert!(brg.is_finite());
        assert!((dist - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn test_destination_matches_distance_bearing() {
        let (lat, lon) = destination(49.0128, 2.55, 160.0, 9_260.0);
        let (dist, brg) = distance_bearing(49.0128, 2.55, lat, lon);
        assert!((dist - 9_260.0).abs() < 0.01);
        assert!((brg - 160.0).abs() < 1e-6);
    }
}
