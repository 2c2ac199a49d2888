//! Update loop and scope state
//!
//!  Polls telemetry at the configured rate, runs the tracker and position
//!  transform against the active runway, and publishes one `ScopeFrame`
//!  per tick into a single-slot handoff read by the renderer.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use parking_lot::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{AirportDatabase, Config, ConfigError};
use crate::runway::RunwayGeometry;
use crate::telemetry::{TelemetryError, TelemetrySource, normalize_callsign};
use crate::tracker::{LockMode, Selection, TrackerState};
use crate::transform::{DeviationSample, compute_deviation};

/// Event log capacity
pub const LOG_HISTORY: usize = 200;

/// Operator actions, applied at the start of the next tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SelectAirport(String),
    SelectRunway(String),
    Lock(String),
    Unlock,
    Reconnect,
    Quit,
}

impl Command {
    /// Parse a typed command line, e.g. `runway 09L` or `lock UAL123`
    pub fn parse(line: &str) -> Option<Command> {
        let mut words = line.split_whitespace();
        let verb = words.next()?.to_ascii_lowercase();
        let arg = words.next().map(str::to_string);

        match (verb.as_str(), arg) {
            ("airport", Some(key)) => Some(Command::SelectAirport(key)),
            ("runway", Some(key)) => Some(Command::SelectRunway(key)),
            ("lock", Some(cs)) => Some(Command::Lock(cs)),
            ("unlock", None) => Some(Command::Unlock),
            ("reconnect", None) => Some(Command::Reconnect),
            ("quit" | "exit", None) => Some(Command::Quit),
            _ => None,
        }
    }
}

/// What the scope shows this tick
#[derive(Debug, Clone, PartialEq)]
pub enum Display {
    /// A target sample. `holding` means the target was not in the latest poll.
    Target { sample: DeviationSample, holding: bool },
    /// Locked callsign absent beyond the staleness threshold
    TargetLost(String),
    NoTarget,
    /// Telemetry unavailable beyond the staleness threshold
    NoData,
}

/// Everything the renderer needs for one picture
#[derive(Debug, Clone)]
pub struct ScopeFrame {
    pub tick: u64,
    pub display: Display,
    pub airport: String,
    pub runway: RunwayGeometry,
    pub lock: LockMode,
    pub connected: bool,
}

/// Single-slot handoff: readers always get the newest complete frame
#[derive(Default)]
pub struct LatestFrame {
    slot: RwLock<Option<Arc<ScopeFrame>>>,
}

impl LatestFrame {
    pub fn publish(&self, frame: Arc<ScopeFrame>) {
        *self.slot.write() = Some(frame);
    }

    pub fn latest(&self) -> Option<Arc<ScopeFrame>> {
        self.slot.read().clone()
    }
}

/// Operator-facing event lines, newest first
#[derive(Default)]
pub struct EventLog {
    lines: Mutex<VecDeque<String>>,
}

impl EventLog {
    pub fn push(&self, message: impl AsRef<str>) {
        let line = format!("[{}] {}", clock_local(), message.as_ref());
        let mut lines = self.lines.lock();
        lines.push_front(line);
        lines.truncate(LOG_HISTORY);
    }

    pub fn recent(&self, n: usize) -> Vec<String> {
        self.lines.lock().iter().take(n).cloned().collect()
    }
}

/// HH:MM:SS of the local wall clock
fn clock_local() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Coarse display state, used to log transitions once
#[derive(Debug, Clone, PartialEq, Eq)]
enum Status {
    Tracking(String),
    Holding(String),
    Lost(String),
    NoTarget,
    NoData,
}

pub struct ScopeSession<S> {
    source: S,
    airports: AirportDatabase,
    airport: String,
    runway: RunwayGeometry,
    tracker: TrackerState,
    period: Duration,
    poll_timeout: Duration,
    stale_after: Duration,
    last_display: Option<Display>,
    last_good_poll: Option<Instant>,
    telemetry_ok: Option<bool>,
    status: Option<Status>,
    tick: u64,
    frames: Arc<LatestFrame>,
    log: Arc<EventLog>,
    commands: Receiver<Command>,
}

impl<S: TelemetrySource> ScopeSession<S> {
    pub fn new(
        config: &Config,
        mut source: S,
        frames: Arc<LatestFrame>,
        log: Arc<EventLog>,
        commands: Receiver<Command>,
    ) -> Result<Self, ConfigError> {
        let runway = config.active_geometry()?;
        source.runway_changed(&runway);

        let period = config.poll_period();
        let tracker = TrackerState::new(config.target_callsign.as_deref(), config.stale_after);
        if let LockMode::Locked(cs) = tracker.lock_mode() {
            log.push(format!("Tracker: locked to {}", cs));
        }

        Ok(Self {
            source,
            airports: config.airports.clone(),
            airport: config.active_airport.clone(),
            runway,
            tracker,
            period,
            poll_timeout: config.telemetry_timeout.min(period),
            stale_after: config.stale_after,
            last_display: None,
            last_good_poll: None,
            telemetry_ok: None,
            status: None,
            tick: 0,
            frames,
            log,
            commands,
        })
    }

    #[allow(dead_code)]
    pub fn runway(&self) -> &RunwayGeometry {
        &self.runway
    }

    #[allow(dead_code)]
    pub fn airport(&self) -> &str {
        &self.airport
    }

    #[allow(dead_code)]
    pub fn tracker(&self) -> &TrackerState {
        &self.tracker
    }

    /// Switch airport, activating its first runway
    pub fn select_airport(&mut self, key: &str) -> Result<(), ConfigError> {
        let runway = self.airports.first_runway(key)?.to_string();
        let geometry = self.airports.geometry(key, &runway)?;
        match &self.airports.airport(key)?.name {
            Some(name) => self.log.push(format!("Airport: {} ({})", key, name)),
            None => self.log.push(format!("Airport: {}", key)),
        }
        self.airport = key.to_string();
        self.apply_runway(geometry);
        Ok(())
    }

    /// Switch runway at the current airport
    pub fn select_runway(&mut self, key: &str) -> Result<(), ConfigError> {
        let geometry = self.airports.geometry(&self.airport, key)?;
        self.apply_runway(geometry);
        Ok(())
    }

    fn apply_runway(&mut self, geometry: RunwayGeometry) {
        info!(
            "Runway {} {} applied (heading {:.0}, glidepath {:.1})",
            self.airport, geometry.name, geometry.heading_deg, geometry.glidepath_deg
        );
        self.log.push(format!("Runway: {} applied", geometry.name));
        self.source.runway_changed(&geometry);
        self.runway = geometry;
        // a target valid for one runway says nothing about the next
        self.tracker.reset();
        self.last_display = None;
        self.status = None;
    }

    /// Apply one operator command. Returns false when the loop should stop.
    pub fn apply_command(&mut self, command: Command) -> bool {
        debug!("Command: {:?}", command);
        let result = match command {
            Command::SelectAirport(key) => self.select_airport(&key),
            Command::SelectRunway(key) => self.select_runway(&key),
            Command::Lock(cs) => {
                self.tracker.lock(&cs);
                self.last_display = None;
                self.log.push(format!("Tracker: locked to {}", normalize_callsign(&cs)));
                Ok(())
            }
            Command::Unlock => {
                self.tracker.unlock();
                self.last_display = None;
                self.log.push("Tracker: lock cleared");
                Ok(())
            }
            Command::Reconnect => {
                self.source.request_reconnect();
                self.log.push("Telemetry: reconnecting");
                Ok(())
            }
            Command::Quit => return false,
        };

        if let Err(e) = result {
            warn!("Selection rejected: {}", e);
            self.log.push(format!("Rejected: {}", e));
        }
        true
    }

    /// Apply queued commands. Returns false when asked to quit.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => {
                    if !self.apply_command(cmd) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return true,
            }
        }
    }

    /// Run one polling cycle at `now` and publish its frame
    pub async fn tick(&mut self, now: Instant) -> Arc<ScopeFrame> {
        self.tick += 1;

        let polled = match tokio::time::timeout(self.poll_timeout, self.source.poll_aircraft()).await
        {
            Ok(result) => result,
            Err(_) => Err(TelemetryError::Timeout(self.poll_timeout)),
        };

        let display = match polled {
            Ok(snapshots) => {
                self.note_telemetry(None);
                self.last_good_poll = Some(now);
                let selection = self.tracker.select(&snapshots, &self.runway, now);
                let display = self.display_for(selection);
                self.last_display = Some(display.clone());
                display
            }
            Err(e) => {
                self.note_telemetry(Some(&e));
                match (self.last_good_poll, &self.last_display) {
                    (Some(good), Some(last)) if now.duration_since(good) <= self.stale_after => {
                        last.clone()
                    }
                    _ => Display::NoData,
                }
            }
        };
        self.note_status(&display);

        let frame = Arc::new(ScopeFrame {
            tick: self.tick,
            display,
            airport: self.airport.clone(),
            runway: self.runway.clone(),
            lock: self.tracker.lock_mode().clone(),
            connected: self.telemetry_ok == Some(true) && self.source.is_connected(),
        });
        self.frames.publish(Arc::clone(&frame));
        frame
    }

    fn display_for(&self, selection: Selection) -> Display {
        match selection {
            Selection::Tracking(s) => Display::Target {
                sample: compute_deviation(&self.runway, &s),
                holding: false,
            },
            Selection::Holding(s) => Display::Target {
                sample: compute_deviation(&self.runway, &s),
                holding: true,
            },
            Selection::Lost(cs) => Display::TargetLost(cs),
            Selection::NoTarget => Display::NoTarget,
        }
    }

    fn note_telemetry(&mut self, error: Option<&TelemetryError>) {
        let ok = error.is_none();
        if self.telemetry_ok == Some(ok) {
            return;
        }
        self.telemetry_ok = Some(ok);
        match error {
            None => {
                info!("Telemetry available");
                self.log.push("Telemetry: connected");
            }
            Some(e) => {
                warn!("Telemetry failed: {}", e);
                self.log.push(format!("Telemetry: {}", e));
            }
        }
    }

    fn note_status(&mut self, display: &Display) {
        let status = match display {
            Display::Target { sample, holding: false } => Status::Tracking(sample.callsign.clone()),
            Display::Target { sample, holding: true } => Status::Holding(sample.callsign.clone()),
            Display::TargetLost(cs) => Status::Lost(cs.clone()),
            Display::NoTarget => Status::NoTarget,
            Display::NoData => Status::NoData,
        };
        if self.status.as_ref() == Some(&status) {
            return;
        }

        let message = match &status {
            Status::Tracking(cs) => format!("Target: tracking {}", cs),
            Status::Holding(cs) => format!("Target: {} not reported, holding", cs),
            Status::Lost(cs) => format!("Target: {} lost", cs),
            Status::NoTarget => "Target: no aircraft in range".to_string(),
            Status::NoData => "Telemetry: no data".to_string(),
        };
        info!("{}", message);
        self.log.push(message);
        self.status = Some(status);
    }

    /// Tick at the configured rate until `shutdown` resolves or a quit command arrives
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Update loop running at {:.1} Hz", 1.0 / self.period.as_secs_f64());
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    if !self.drain_commands() {
                        break;
                    }
                    self.tick(Instant::now()).await;
                }
            }
        }
        info!("Update loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, Options};
    use crate::geo;
    use crate::telemetry::AircraftSnapshot;
    use crate::transform::SampleStatus;

    const AIRPORTS: &str = r#"{
        "target_callsign": "UAL123",
        "stale_after_secs": 5,
        "active_airport": "LFPG",
        "active_runway": "27R",
        "airports": {
            "LFPG": {"runways": {
                "27R": {"lat": 49.0128, "lon": 2.55, "elev_ft": 400, "heading_deg": 160},
                "09L": {"lat": 49.0250, "lon": 2.52, "elev_ft": 390, "heading_deg": 265}
            }},
            "EGLL": {"runways": {
                "27L": {"lat": 51.4647, "lon": -0.434, "elev_ft": 78, "heading_deg": 90}
            }}
        }
    }"#;

    /// Plays back a fixed list of poll results, then fails
    struct Scripted {
        polls: VecDeque<Result<Vec<AircraftSnapshot>, TelemetryError>>,
    }

    impl TelemetrySource for Scripted {
        async fn poll_aircraft(&mut self) -> Result<Vec<AircraftSnapshot>, TelemetryError> {
            self.polls
                .pop_front()
                .unwrap_or_else(|| Err(TelemetryError::Unavailable("script ended".into())))
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn config() -> Config {
        let file = FileConfig::from_json("test", AIRPORTS).unwrap();
        Config::resolve(file, &Options::default()).unwrap()
    }

    fn on_approach(callsign: &str, rwy: &RunwayGeometry, range_m: f64, seen: Instant) -> AircraftSnapshot {
        let (lat, lon) = geo::destination(rwy.lat, rwy.lon, rwy.heading_deg, range_m);
        AircraftSnapshot {
            id: callsign.len() as u32,
            callsign: callsign.to_string(),
            lat,
            lon,
            altitude_ft: rwy.elevation_ft + geo::m_to_ft(rwy.glidepath_height_m(range_m)),
            ground_speed: None,
            vertical_speed: None,
            seen,
        }
    }

    /// Answers the first poll, then never resolves again
    struct Stalled {
        first: Option<Vec<AircraftSnapshot>>,
    }

    impl TelemetrySource for Stalled {
        async fn poll_aircraft(&mut self) -> Result<Vec<AircraftSnapshot>, TelemetryError> {
            match self.first.take() {
                Some(set) => Ok(set),
                None => std::future::pending().await,
            }
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn session(
        polls: Vec<Result<Vec<AircraftSnapshot>, TelemetryError>>,
    ) -> (ScopeSession<Scripted>, Arc<LatestFrame>, crossbeam_channel::Sender<Command>) {
        session_with(Scripted { polls: polls.into() })
    }

    fn session_with<S: TelemetrySource>(
        source: S,
    ) -> (ScopeSession<S>, Arc<LatestFrame>, crossbeam_channel::Sender<Command>) {
        let frames = Arc::new(LatestFrame::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        let session = ScopeSession::new(
            &config(),
            source,
            Arc::clone(&frames),
            Arc::new(EventLog::default()),
            rx,
        )
        .unwrap();
        (session, frames, tx)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("runway 09L"), Some(Command::SelectRunway("09L".into())));
        assert_eq!(Command::parse("  AIRPORT EGLL "), Some(Command::SelectAirport("EGLL".into())));
        assert_eq!(Command::parse("lock ual123"), Some(Command::Lock("ual123".into())));
        assert_eq!(Command::parse("unlock"), Some(Command::Unlock));
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
        assert_eq!(Command::parse("runway"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_event_log_newest_first() {
        let log = EventLog::default();
        for i in 0..(LOG_HISTORY + 10) {
            log.push(format!("event {}", i));
        }
        let recent = log.recent(2);
        assert!(recent[0].ends_with(&format!("event {}", LOG_HISTORY + 9)));
        assert!(recent[1].ends_with(&format!("event {}", LOG_HISTORY + 8)));
        assert_eq!(log.recent(usize::MAX).len(), LOG_HISTORY);
    }

    #[test]
    fn test_event_log_stamps_wall_clock() {
        let log = EventLog::default();
        log.push("Runway 27R");
        let line = log.recent(1).remove(0);
        let (stamp, rest) = line.split_at(11);
        assert_eq!(rest, "Runway 27R");
        assert!(chrono::NaiveTime::parse_from_str(&stamp[1..9], "%H:%M:%S").is_ok());
        assert!(stamp.starts_with('[') && stamp.ends_with("] "));
    }

    #[tokio::test]
    async fn test_tick_publishes_locked_target() {
        let now = Instant::now();
        let rwy = config().active_geometry().unwrap();
        let set = vec![
            on_approach("DAL456", &rwy, 2_000.0, now),
            on_approach("UAL123", &rwy, 7_000.0, now),
        ];
        let (mut session, frames, _tx) = session(vec![Ok(set)]);

        let frame = session.tick(now).await;
        match &frame.display {
            Display::Target { sample, holding } => {
                assert_eq!(sample.callsign, "UAL123");
                assert!(!holding);
                assert_eq!(sample.status, SampleStatus::Approach);
                assert!(sample.elevation_m.abs() < 0.01);
                assert!((sample.range_m - 7_000.0).abs() < 0.5);
            }
            other => panic!("unexpected display {:?}", other),
        }
        assert_eq!(frames.latest().map(|f| f.tick), Some(1));
        assert!(frame.connected);
    }

    #[tokio::test]
    async fn test_freeze_frame_then_no_data() {
        let t0 = Instant::now();
        let rwy = config().active_geometry().unwrap();
        let (mut session, _frames, _tx) =
            session(vec![Ok(vec![on_approach("UAL123", &rwy, 5_000.0, t0)])]);

        let first = session.tick(t0).await;
        assert!(matches!(first.display, Display::Target { .. }));

        // script exhausted: polls now fail
        let frozen = session.tick(t0 + Duration::from_secs(2)).await;
        assert_eq!(frozen.display, first.display);
        assert!(!frozen.connected);

        let gone = session.tick(t0 + Duration::from_secs(6)).await;
        assert_eq!(gone.display, Display::NoData);
    }

    #[tokio::test]
    async fn test_no_data_before_first_poll() {
        let (mut session, _frames, _tx) = session(vec![]);
        let frame = session.tick(Instant::now()).await;
        assert_eq!(frame.display, Display::NoData);
    }

    #[tokio::test]
    async fn test_locked_target_lost_and_reacquired() {
        let t0 = Instant::now();
        let rwy = config().active_geometry().unwrap();
        let t1 = t0 + Duration::from_secs(6);
        let t2 = t0 + Duration::from_secs(7);
        let (mut session, _frames, _tx) = session(vec![
            Ok(vec![on_approach("UAL123", &rwy, 5_000.0, t0)]),
            Ok(vec![on_approach("DAL456", &rwy, 1_000.0, t1)]),
            Ok(vec![on_approach("UAL123", &rwy, 4_000.0, t2)]),
        ]);

        session.tick(t0).await;
        let lost = session.tick(t1).await;
        assert_eq!(lost.display, Display::TargetLost("UAL123".to_string()));
        let back = session.tick(t2).await;
        assert!(matches!(&back.display, Display::Target { sample, .. } if sample.callsign == "UAL123"));
    }

    #[tokio::test]
    async fn test_runway_switch_resets_target_keeps_lock() {
        let t0 = Instant::now();
        let rwy = config().active_geometry().unwrap();
        let snap = on_approach("UAL123", &rwy, 5_000.0, t0);
        let t1 = t0 + Duration::from_secs(1);
        let mut later = snap.clone();
        later.seen = t1;
        let (mut session, _frames, tx) = session(vec![Ok(vec![snap]), Ok(vec![later])]);

        let before = session.tick(t0).await;
        assert_eq!(session.tracker().displayed().as_deref(), Some("UAL123"));

        tx.send(Command::SelectRunway("09L".into())).unwrap();
        assert!(session.drain_commands());
        assert_eq!(session.runway().name, "09L");
        assert_eq!(session.tracker().displayed(), None);
        assert_eq!(session.tracker().lock_mode(), &LockMode::Locked("UAL123".into()));

        let after = session.tick(t1).await;
        match (&before.display, &after.display) {
            (Display::Target { sample: a, .. }, Display::Target { sample: b, .. }) => {
                assert_eq!(a.callsign, b.callsign);
                assert!((a.range_m - b.range_m).abs() > 100.0);
                assert!((a.azimuth_m - b.azimuth_m).abs() > 100.0);
            }
            other => panic!("unexpected displays {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_selection_keeps_runway() {
        let (mut session, _frames, tx) = session(vec![]);
        tx.send(Command::SelectRunway("36".into())).unwrap();
        tx.send(Command::SelectAirport("KJFK".into())).unwrap();
        assert!(session.drain_commands());
        assert_eq!(session.airport(), "LFPG");
        assert_eq!(session.runway().name, "27R");

        tx.send(Command::SelectAirport("EGLL".into())).unwrap();
        tx.send(Command::Quit).unwrap();
        assert!(!session.drain_commands());
        assert_eq!(session.airport(), "EGLL");
        assert_eq!(session.runway().name, "27L");
    }

    #[tokio::test]
    async fn test_stalled_poll_times_out_into_freeze_then_no_data() {
        let t0 = Instant::now();
        let rwy = config().active_geometry().unwrap();
        let first = vec![on_approach("UAL123", &rwy, 5_000.0, t0)];
        let (mut session, _frames, _tx) = session_with(Stalled { first: Some(first) });

        let live = session.tick(t0).await;
        assert!(matches!(live.display, Display::Target { .. }));

        let started = Instant::now();
        let frozen = session.tick(t0 + Duration::from_secs(1)).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(frozen.display, live.display);
        assert!(!frozen.connected);

        let started = Instant::now();
        let gone = session.tick(t0 + Duration::from_secs(6)).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(gone.display, Display::NoData);
    }

    #[tokio::test]
    async fn test_unlocked_lone_positionless_aircraft_is_shown() {
        let now = Instant::now();
        let rwy = config().active_geometry().unwrap();
        let mut blind = on_approach("AFR1", &rwy, 4_000.0, now);
        blind.lat = f64::NAN;
        let (mut session, _frames, tx) = session(vec![Ok(vec![blind])]);
        tx.send(Command::Unlock).unwrap();
        assert!(session.drain_commands());

        let frame = session.tick(now).await;
        match &frame.display {
            Display::Target { sample, holding } => {
                assert_eq!(sample.callsign, "AFR1");
                assert_eq!(sample.status, SampleStatus::NoSolution);
                assert!(!holding);
            }
            other => panic!("unexpected display {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_quit() {
        let (session, _frames, tx) = session(vec![]);
        tx.send(Command::Quit).unwrap();
        tokio::time::timeout(Duration::from_secs(2), session.run(std::future::pending()))
            .await
            .unwrap();
    }
}
