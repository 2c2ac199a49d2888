//! Runway reference model
//!
//!  A runway threshold plus approach course and glidepath, and the
//!  projection of geodetic positions into the runway-local frame.

use crate::config::{ConfigError, RunwayConfig};
use crate::geo;

/// Ground distance below which an aircraft counts as sitting on the threshold
pub const DEGENERATE_DISTANCE_M: f64 = 0.5;

pub const DEFAULT_GLIDEPATH_DEG: f64 = 3.0;
pub const DEFAULT_MAX_RANGE_NM: f64 = 10.0;
/// Upper bound on the display range; range rings are drawn once per mile
pub const LIMIT_MAX_RANGE_NM: f64 = 50.0;

/// Immutable geometry of the selected runway
#[derive(Debug, Clone, PartialEq)]
pub struct RunwayGeometry {
    /// Runway designator as configured (e.g. "09L")
    pub name: String,
    /// Threshold latitude in degrees
    pub lat: f64,
    /// Threshold longitude in degrees
    pub lon: f64,
    /// Threshold elevation in feet
    pub elevation_ft: f64,
    /// Bearing from the threshold out along the extended centerline, [0, 360)
    pub heading_deg: f64,
    /// Nominal glidepath angle in degrees
    pub glidepath_deg: f64,
    /// Azimuth course offset relative to the heading
    pub course_offset_deg: f64,
    /// Maximum display range in metres
    pub max_range_m: f64,
}

/// Position of an aircraft in the runway-local frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    /// Along-track distance, negative past the threshold
    pub range_m: f64,
    /// Lateral offset, positive clockwise of the approach course
    pub cross_track_m: f64,
    /// Height above threshold elevation
    pub height_m: f64,
    /// Great-circle ground distance to the threshold
    pub distance_m: f64,
}

impl LocalFrame {
    pub fn is_behind(&self) -> bool {
        self.range_m < 0.0
    }

    pub fn is_degenerate(&self) -> bool {
        self.distance_m < DEGENERATE_DISTANCE_M
    }
}

impl RunwayGeometry {
    pub fn new(
        name: impl Into<String>,
        lat: f64,
        lon: f64,
        elevation_ft: f64,
        heading_deg: f64,
        glidepath_deg: f64,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let invalid = |reason: &str| ConfigError::InvalidRunway {
            runway: name.clone(),
            reason: reason.to_string(),
        };

        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(invalid("threshold latitude must be within [-90, 90]"));
        }
        if !lon.is_finite() {
            return Err(invalid("threshold longitude is not a number"));
        }
        if !elevation_ft.is_finite() {
            return Err(invalid("threshold elevation is not a number"));
        }
        if !heading_deg.is_finite() {
            return Err(invalid("heading is not a number"));
        }
        if !glidepath_deg.is_finite() || glidepath_deg <= 0.0 || glidepath_deg >= 90.0 {
            return Err(invalid("glidepath angle must be within (0, 90)"));
        }

        Ok(Self {
            name,
            lat,
            lon,
            elevation_ft,
            heading_deg: geo::normalize_heading(heading_deg),
            glidepath_deg,
            course_offset_deg: 0.0,
            max_range_m: geo::nm_to_m(DEFAULT_MAX_RANGE_NM),
        })
    }

    /// Build the geometry for a configured runway entry
    pub fn from_config(name: &str, rwy: &RunwayConfig) -> Result<Self, ConfigError> {
        let geometry = Self::new(
            name,
            rwy.lat,
            rwy.lon,
            rwy.elev_ft,
            rwy.heading_deg,
            rwy.glideslope_deg,
        )?;
        geometry
            .with_max_range_nm(rwy.max_range_nm)?
            .with_course_offset(rwy.course_offset_deg)
    }

    pub fn with_max_range_nm(mut self, max_range_nm: f64) -> Result<Self, ConfigError> {
        if !max_range_nm.is_finite() || max_range_nm <= 0.0 {
            return Err(ConfigError::InvalidRunway {
                runway: self.name,
                reason: "max range must be positive".to_string(),
            });
        }
        if max_range_nm > LIMIT_MAX_RANGE_NM {
            return Err(ConfigError::InvalidRunway {
                runway: self.name,
                reason: format!("max range above {} NM", LIMIT_MAX_RANGE_NM),
            });
        }
        self.max_range_m = geo::nm_to_m(max_range_nm);
        Ok(self)
    }

    pub fn with_course_offset(mut self, offset_deg: f64) -> Result<Self, ConfigError> {
        if !offset_deg.is_finite() {
            return Err(ConfigError::InvalidRunway {
                runway: self.name,
                reason: "course offset is not a number".to_string(),
            });
        }
        self.course_offset_deg = geo::wrap_bearing_difference(offset_deg);
        Ok(self)
    }

    /// Effective approach course, heading plus course offset
    pub fn course_deg(&self) -> f64 {
        geo::normalize_heading(self.heading_deg + self.course_offset_deg)
    }

    pub fn max_range_nm(&self) -> f64 {
        geo::m_to_nm(self.max_range_m)
    }

    /// Height of the nominal glidepath above the threshold at `range_m`
    pub fn glidepath_height_m(&self, range_m: f64) -> f64 {
        range_m * self.glidepath_deg.to_radians().tan()
    }

    /// Project a geodetic position into the runway-local frame.
    ///
    /// Returns `None` only when an input is not a finite number. A position
    /// on the threshold itself yields zero range and zero cross-track.
    pub fn to_local_frame(&self, lat: f64, lon: f64, altitude_ft: f64) -> Option<LocalFrame> {
        if !lat.is_finite() || !lon.is_finite() || !altitude_ft.is_finite() {
            return None;
        }

        let height_m = geo::ft_to_m(altitude_ft - self.elevation_ft);
        let (distance_m, bearing_deg) = geo::distance_bearing(self.lat, self.lon, lat, lon);

        if distance_m < DEGENERATE_DISTANCE_M {
            return Some(LocalFrame {
                range_m: 0.0,
                cross_track_m: 0.0,
                height_m,
                distance_m,
            });
        }

        let delta = geo::wrap_bearing_difference(bearing_deg - self.course_deg()).to_radians();
        Some(LocalFrame {
            range_m: distance_m * delta.cos(),
            cross_track_m: distance_m * delta.sin(),
            height_m,
            distance_m,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runway(heading: f64) -> RunwayGeometry {
        RunwayGeometry::new("TEST", 49.0128, 2.55, 400.0, heading, 3.0).unwrap()
    }

    #[test]
    fn test_heading_normalized() {
        assert_eq!(runway(-20.0).heading_deg, 340.0);
        assert_eq!(runway(360.0).heading_deg, 0.0);
    }

    #[test]
    fn test_rejects_bad_glidepath() {
        assert!(RunwayGeometry::new("X", 0.0, 0.0, 0.0, 90.0, 0.0).is_err());
        assert!(RunwayGeometry::new("X", 0.0, 0.0, 0.0, 90.0, -3.0).is_err());
        assert!(RunwayGeometry::new("X", 0.0, 0.0, 0.0, 90.0, f64::NAN).is_err());
        assert!(RunwayGeometry::new("X", 95.0, 0.0, 0.0, 90.0, 3.0).is_err());
    }

    #[test]
    fn test_rejects_bad_max_range() {
        assert!(runway(0.0).with_max_range_nm(0.0).is_err());
        assert!(runway(0.0).with_max_range_nm(-1.0).is_err());
        assert!(runway(0.0).with_max_range_nm(1e9).is_err());
        assert!(runway(0.0).with_max_range_nm(f64::INFINITY).is_err());
        let edge = runway(0.0).with_max_range_nm(LIMIT_MAX_RANGE_NM).unwrap();
        assert!((edge.max_range_nm() - LIMIT_MAX_RANGE_NM).abs() < 1e-9);
    }

    #[test]
    fn test_centerline_has_zero_cross_track() {
        for heading in [0.0, 90.0, 160.0, 359.5] {
            let rwy = runway(heading);
            for nm in [0.5, 2.0, 5.0, 9.5] {
                let (lat, lon) = geo::destination(rwy.lat, rwy.lon, heading, geo::nm_to_m(nm));
                let frame = rwy.to_local_frame(lat, lon, 400.0).unwrap();
                assert!(frame.cross_track_m.abs() < 0.01, "heading {heading} range {nm}");
                assert!((frame.range_m - geo::nm_to_m(nm)).abs() < 0.01);
                assert!(frame.height_m.abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_cross_track_grows_with_offset() {
        let rwy = runway(0.0);
        let (clat, clon) = geo::destination(rwy.lat, rwy.lon, 0.0, 5_000.0);

        let mut last = 0.0;
        for offset in [50.0, 100.0, 200.0, 400.0] {
            // east of a northbound course is clockwise
            let (lat, lon) = geo::destination(clat, clon, 90.0, offset);
            let frame = rwy.to_local_frame(lat, lon, 400.0).unwrap();
            assert!(frame.cross_track_m > last);
            last = frame.cross_track_m;

            let (lat, lon) = geo::destination(clat, clon, 270.0, offset);
            let frame = rwy.to_local_frame(lat, lon, 400.0).unwrap();
            assert!(frame.cross_track_m < 0.0);
        }
    }

    #[test]
    fn test_no_sign_flip_near_north() {
        let rwy = runway(359.0);
        let (lat, lon) = geo::destination(rwy.lat, rwy.lon, 1.0, 5_000.0);
        let frame = rwy.to_local_frame(lat, lon, 400.0).unwrap();
        assert!(frame.range_m > 4_990.0);
        assert!(frame.cross_track_m > 0.0);
    }

    #[test]
    fn test_behind_threshold() {
        let rwy = runway(160.0);
        let (lat, lon) = geo::destination(rwy.lat, rwy.lon, 340.0, 1_000.0);
        let frame = rwy.to_local_frame(lat, lon, 400.0).unwrap();
        assert!(frame.is_behind());
        assert!((frame.range_m + 1_000.0).abs() < 0.01);
    }

    #[test]
    fn test_threshold_itself_is_not_singular() {
        let rwy = runway(160.0);
        let frame = rwy.to_local_frame(rwy.lat, rwy.lon, 450.0).unwrap();
        assert_eq!(frame.range_m, 0.0);
        assert_eq!(frame.cross_track_m, 0.0);
        assert!(frame.is_degenerate());
        assert!((frame.height_m - geo::ft_to_m(50.0)).abs() < 1e-9);
    }

    #[test]
    fn test_course_offset_rotates_frame() {
        let rwy = runway(90.0).with_course_offset(10.0).unwrap();
        assert_eq!(rwy.course_deg(), 100.0);
        let (lat, lon) = geo::destination(rwy.lat, rwy.lon, 100.0, 3_000.0);
        let frame = rwy.to_local_frame(lat, lon, 400.0).unwrap();
        assert!(frame.cross_track_m.abs() < 0.01);
    }

    #[test]
    fn test_implausible_inputs() {
        let rwy = runway(0.0);
        assert!(rwy.to_local_frame(f64::NAN, 0.0, 0.0).is_none());
        assert!(rwy.to_local_frame(0.0, 0.0, f64::INFINITY).is_none());
        let frame = rwy.to_local_frame(-49.0128, -177.45, 400.0).unwrap();
        assert!(frame.range_m.is_finite() && frame.cross_track_m.is_finite());
    }
}
