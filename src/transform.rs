//! Position transform
//!
//!  Turns an aircraft snapshot into azimuth/elevation deviations against
//!  the active runway. Azimuth is the linear cross-track offset in metres,
//!  positive clockwise of the approach course. Elevation is metres above
//!  (positive) or below the nominal glidepath.

use crate::geo;
use crate::runway::RunwayGeometry;
use crate::telemetry::AircraftSnapshot;

/// Why a sample can or cannot be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    /// Inbound side of the threshold, within display range
    Approach,
    /// Past the threshold, within display range
    Behind,
    /// Farther from the threshold than the display range
    BeyondRange,
    /// On top of the threshold, bearing undefined
    Degenerate,
    /// Position missing or not a number
    NoSolution,
}

impl SampleStatus {
    pub fn is_valid(self) -> bool {
        matches!(self, SampleStatus::Approach | SampleStatus::Behind)
    }
}

/// Rendering-ready deviations for one aircraft
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationSample {
    pub callsign: String,
    pub status: SampleStatus,
    /// Along-track distance to threshold, negative past it
    pub range_m: f64,
    /// Cross-track offset, positive clockwise of the approach course
    pub azimuth_m: f64,
    /// Offset from the nominal glidepath, positive above
    pub elevation_m: f64,
    /// Height above threshold elevation
    pub height_m: f64,
    /// Ground speed in knots, when reported
    pub ground_speed: Option<f64>,
    /// Vertical speed in ft/min, when reported
    pub vertical_speed: Option<f64>,
}

impl DeviationSample {
    pub fn is_valid(&self) -> bool {
        self.status.is_valid()
    }

    pub fn range_nm(&self) -> f64 {
        geo::m_to_nm(self.range_m)
    }

    pub fn height_ft(&self) -> f64 {
        geo::m_to_ft(self.height_m)
    }

    pub fn elevation_ft(&self) -> f64 {
        geo::m_to_ft(self.elevation_m)
    }

    fn invalid(snapshot: &AircraftSnapshot, status: SampleStatus) -> Self {
        Self {
            callsign: snapshot.display_callsign(),
            status,
            range_m: f64::NAN,
            azimuth_m: f64::NAN,
            elevation_m: f64::NAN,
            height_m: f64::NAN,
            ground_speed: snapshot.ground_speed,
            vertical_speed: snapshot.vertical_speed,
        }
    }
}

/// Compute the deviation sample for `snapshot` against `runway`.
///
/// Each call is independent; nothing carries over between ticks.
pub fn compute_deviation(runway: &RunwayGeometry, snapshot: &AircraftSnapshot) -> DeviationSample {
    let frame = match runway.to_local_frame(snapshot.lat, snapshot.lon, snapshot.altitude_ft) {
        Some(f) => f,
        None => return DeviationSample::invalid(snapshot, SampleStatus::NoSolution),
    };

    let status = if frame.is_degenerate() {
        SampleStatus::Degenerate
    } else if frame.range_m.abs() > runway.max_range_m {
        SampleStatus::BeyondRange
    } else if frame.is_behind() {
        SampleStatus::Behind
    } else {
        SampleStatus::Approach
    };

    DeviationSample {
        callsign: snapshot.display_callsign(),
        status,
        range_m: frame.range_m,
        azimuth_m: frame.cross_track_m,
        elevation_m: frame.height_m - runway.glidepath_height_m(frame.range_m),
        height_m: frame.height_m,
        ground_speed: snapshot.ground_speed,
        vertical_speed: snapshot.vertical_speed,
    }
}
