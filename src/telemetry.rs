//! Telemetry sources
//!
//!  Snapshots of simulated aircraft, either read from a TCP feed that
//!  sends one JSON array per line or generated locally for demo runs.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::geo;
use crate::runway::RunwayGeometry;

/// Minimum spacing between automatic reconnect attempts
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("telemetry unavailable: {0}")]
    Unavailable(String),

    #[error("telemetry IO error {0}")]
    Io(#[from] std::io::Error),

    #[error("telemetry decode error {0}")]
    Decode(#[from] serde_json::Error),

    #[error("telemetry poll timed out after {0:?}")]
    Timeout(Duration),
}

/// One aircraft as reported by the simulator
#[derive(Debug, Clone, PartialEq)]
pub struct AircraftSnapshot {
    /// Simulator object id
    pub id: u32,
    /// ATC callsign, may be empty
    pub callsign: String,
    pub lat: f64,
    pub lon: f64,
    /// Altitude in feet, same datum as the runway elevation
    pub altitude_ft: f64,
    /// Ground speed in knots
    pub ground_speed: Option<f64>,
    /// Vertical speed in ft/min
    pub vertical_speed: Option<f64>,
    /// When this observation was taken
    pub seen: Instant,
}

impl AircraftSnapshot {
    /// Callsign used for matching: trimmed and upper-cased
    pub fn normalized_callsign(&self) -> String {
        normalize_callsign(&self.callsign)
    }

    /// Callsign for display, falling back to the object id
    pub fn display_callsign(&self) -> String {
        let cs = self.callsign.trim();
        if cs.is_empty() {
            format!("#{}", self.id)
        } else {
            cs.to_string()
        }
    }

    pub fn has_position(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite() && self.altitude_ft.is_finite()
    }
}

pub fn normalize_callsign(callsign: &str) -> String {
    callsign.trim().to_ascii_uppercase()
}

/// Anything that can hand out the current set of aircraft
pub trait TelemetrySource {
    /// Latest aircraft set, possibly empty
    fn poll_aircraft(
        &mut self,
    ) -> impl Future<Output = Result<Vec<AircraftSnapshot>, TelemetryError>> + Send;

    fn is_connected(&self) -> bool;

    /// Ask for a fresh connection on the next poll
    fn request_reconnect(&mut self) {}

    /// Notification that the active runway changed
    fn runway_changed(&mut self, _runway: &RunwayGeometry) {}
}

/// Wire format of one aircraft in a feed line
#[derive(Debug, Deserialize)]
struct FeedAircraft {
    #[serde(default)]
    id: u32,
    #[serde(default)]
    callsign: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
    #[serde(default)]
    gs: Option<f64>,
    #[serde(default)]
    vs: Option<f64>,
}

impl FeedAircraft {
    fn into_snapshot(self, seen: Instant) -> AircraftSnapshot {
        AircraftSnapshot {
            id: self.id,
            callsign: self.callsign.unwrap_or_default(),
            lat: self.lat.unwrap_or(f64::NAN),
            lon: self.lon.unwrap_or(f64::NAN),
            altitude_ft: self.alt.unwrap_or(f64::NAN),
            ground_speed: self.gs,
            vertical_speed: self.vs,
            seen,
        }
    }
}

/// Decode one feed line into snapshots observed at `seen`
pub fn parse_feed_line(line: &str, seen: Instant) -> Result<Vec<AircraftSnapshot>, TelemetryError> {
    let aircraft: Vec<FeedAircraft> = serde_json::from_str(line)?;
    Ok(aircraft.into_iter().map(|a| a.into_snapshot(seen)).collect())
}

/// TCP feed client. A reader task keeps only the newest frame.
pub struct FeedSource {
    addr: String,
    latest: Arc<Mutex<Option<Vec<AircraftSnapshot>>>>,
    connected: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    last_attempt: Option<Instant>,
    force_reconnect: bool,
}

impl FeedSource {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            latest: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            reader: None,
            last_attempt: None,
            force_reconnect: false,
        }
    }

    async fn connect(&mut self) -> Result<(), TelemetryError> {
        let now = Instant::now();
        if let Some(last) = self.last_attempt {
            if !self.force_reconnect && now.duration_since(last) < RECONNECT_INTERVAL {
                return Err(TelemetryError::Unavailable(format!(
                    "not connected to {}",
                    self.addr
                )));
            }
        }
        self.last_attempt = Some(now);
        self.force_reconnect = false;

        if let Some(h) = self.reader.take() {
            h.abort();
        }
        *self.latest.lock() = None;

        let socket = TcpStream::connect(&self.addr).await?;
        info!("Telemetry feed connected: {}", self.addr);
        self.connected.store(true, Ordering::Release);

        let latest = Arc::clone(&self.latest);
        let connected = Arc::clone(&self.connected);
        let addr = self.addr.clone();
        self.reader = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(socket).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match parse_feed_line(line, Instant::now()) {
                            Ok(frame) => *latest.lock() = Some(frame),
                            Err(e) => debug!("Skipping feed line: {}", e),
                        }
                    }
                    Ok(None) => {
                        warn!("Telemetry feed closed: {}", addr);
                        break;
                    }
                    Err(e) => {
                        warn!("Telemetry feed lost ({}): {}", addr, e);
                        break;
                    }
                }
            }
            connected.store(false, Ordering::Release);
        }));

        Ok(())
    }
}

impl TelemetrySource for FeedSource {
    async fn poll_aircraft(&mut self) -> Result<Vec<AircraftSnapshot>, TelemetryError> {
        if !self.connected.load(Ordering::Acquire) {
            self.connect().await?;
        }
        Ok(self.latest.lock().clone().unwrap_or_default())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn request_reconnect(&mut self) {
        self.force_reconnect = true;
        self.connected.store(false, Ordering::Release);
    }
}

impl Drop for FeedSource {
    fn drop(&mut self) {
        if let Some(h) = self.reader.take() {
            h.abort();
        }
    }
}

/// Synthetic inbound traffic for runs without a simulator
pub struct DemoSource {
    runway: RunwayGeometry,
    start: Instant,
}

struct DemoTrack {
    id: u32,
    callsign: &'static str,
    start_nm: f64,
    speed_kt: f64,
    lateral_m: f64,
    high_ft: f64,
}

const DEMO_TRACKS: [DemoTrack; 2] = [
    DemoTrack { id: 1, callsign: "DEMO1", start_nm: 9.0, speed_kt: 140.0, lateral_m: 0.0, high_ft: 0.0 },
    DemoTrack { id: 2, callsign: "DEMO2", start_nm: 6.0, speed_kt: 120.0, lateral_m: 150.0, high_ft: 150.0 },
];

impl DemoSource {
    pub fn new(runway: RunwayGeometry) -> Self {
        Self { runway, start: Instant::now() }
    }

    /// Demo traffic positions `elapsed` after start
    pub fn snapshots_at(&self, elapsed: Duration, seen: Instant) -> Vec<AircraftSnapshot> {
        let rwy = &self.runway;
        let secs = elapsed.as_secs_f64();
        let course = rwy.course_deg();

        DEMO_TRACKS
            .iter()
            .map(|t| {
                // fly from start_nm to half a mile past the threshold, then repeat
                let leg_nm = t.start_nm + 0.5;
                let flown_nm = (t.speed_kt * secs / 3600.0) % leg_nm;
                let range_m = geo::nm_to_m(t.start_nm - flown_nm);
                let weave_m = t.lateral_m + 40.0 * (secs / 15.0 + t.id as f64).sin();

                let (clat, clon) = geo::destination(rwy.lat, rwy.lon, course, range_m);
                let (lat, lon) = geo::destination(clat, clon, course + 90.0, weave_m);
                let height_ft = geo::m_to_ft(rwy.glidepath_height_m(range_m.max(0.0)));

                AircraftSnapshot {
                    id: t.id,
                    callsign: t.callsign.to_string(),
                    lat,
                    lon,
                    altitude_ft: rwy.elevation_ft + height_ft + t.high_ft,
                    ground_speed: Some(t.speed_kt),
                    vertical_speed: Some(-t.speed_kt * 101.27 * rwy.glidepath_deg.to_radians().tan()),
                    seen,
                }
            })
            .collect()
    }
}

impl TelemetrySource for DemoSource {
    async fn poll_aircraft(&mut self) -> Result<Vec<AircraftSnapshot>, TelemetryError> {
        let now = Instant::now();
        Ok(self.snapshots_at(now.duration_since(self.start), now))
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn runway_changed(&mut self, runway: &RunwayGeometry) {
        self.runway = runway.clone();
        self.start = Instant::now();
    }
}
