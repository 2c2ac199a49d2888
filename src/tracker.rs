//! Target selection
//!
//!  Picks the one aircraft the scope shows each tick. Unlocked, the
//!  aircraft closest to the threshold (great-circle ground distance) wins,
//!  ties broken by callsign and then by simulator id, so the result never
//!  depends on the order the telemetry listed the aircraft in. Locked, only
//!  the locked callsign is ever shown.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use crate::geo;
use crate::runway::RunwayGeometry;
use crate::telemetry::{AircraftSnapshot, normalize_callsign};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockMode {
    Unlocked,
    /// Normalized callsign
    Locked(String),
}

/// Outcome of one selection pass
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Target present in this tick's set
    Tracking(AircraftSnapshot),
    /// Target missing from this tick's set but not yet stale
    Holding(AircraftSnapshot),
    /// Locked callsign missing for longer than the staleness threshold
    Lost(String),
    NoTarget,
}

impl Selection {
    #[allow(dead_code)]
    pub fn snapshot(&self) -> Option<&AircraftSnapshot> {
        match self {
            Selection::Tracking(s) | Selection::Holding(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerState {
    lock: LockMode,
    last_known: Option<AircraftSnapshot>,
    last_seen: Option<Instant>,
    stale_after: Duration,
}

impl TrackerState {
    pub fn new(target_callsign: Option<&str>, stale_after: Duration) -> Self {
        let lock = match target_callsign.map(normalize_callsign) {
            Some(cs) if !cs.is_empty() => LockMode::Locked(cs),
            _ => LockMode::Unlocked,
        };
        Self {
            lock,
            last_known: None,
            last_seen: None,
            stale_after,
        }
    }

    pub fn lock_mode(&self) -> &LockMode {
        &self.lock
    }

    /// Callsign currently on the scope, if any
    #[allow(dead_code)]
    pub fn displayed(&self) -> Option<String> {
        self.last_known.as_ref().map(AircraftSnapshot::display_callsign)
    }

    #[allow(dead_code)]
    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }

    /// Lock onto `callsign`. An empty callsign clears the lock.
    pub fn lock(&mut self, callsign: &str) {
        let cs = normalize_callsign(callsign);
        self.lock = if cs.is_empty() {
            LockMode::Unlocked
        } else {
            LockMode::Locked(cs)
        };
        self.reset();
    }

    pub fn unlock(&mut self) {
        self.lock = LockMode::Unlocked;
        self.reset();
    }

    /// Forget the last known target, keeping the lock
    pub fn reset(&mut self) {
        self.last_known = None;
        self.last_seen = None;
    }

    /// Choose the target for this tick
    pub fn select(
        &mut self,
        snapshots: &[AircraftSnapshot],
        runway: &RunwayGeometry,
        now: Instant,
    ) -> Selection {
        let fresh = snapshots
            .iter()
            .filter(|s| now.duration_since(s.seen) <= self.stale_after);

        let chosen = match &self.lock {
            LockMode::Locked(target) => fresh
                .filter(|s| s.normalized_callsign() == *target)
                .min_by_key(|s| s.id),
            // positionless aircraft rank behind every located one
            LockMode::Unlocked => fresh
                .map(|s| (threshold_distance(runway, s), s))
                .min_by(|a, b| compare_candidates(a, b))
                .map(|(_, s)| s),
        };

        if let Some(snapshot) = chosen {
            self.last_known = Some(snapshot.clone());
            self.last_seen = Some(snapshot.seen);
            return Selection::Tracking(snapshot.clone());
        }

        if let (Some(snapshot), Some(seen)) = (&self.last_known, self.last_seen) {
            if now.duration_since(seen) <= self.stale_after {
                return Selection::Holding(snapshot.clone());
            }
        }

        self.reset();
        match &self.lock {
            LockMode::Locked(cs) => Selection::Lost(cs.clone()),
            LockMode::Unlocked => Selection::NoTarget,
        }
    }
}

fn threshold_distance(runway: &RunwayGeometry, snapshot: &AircraftSnapshot) -> f64 {
    if snapshot.has_position() {
        geo::distance_bearing(runway.lat, runway.lon, snapshot.lat, snapshot.lon).0
    } else {
        f64::INFINITY
    }
}

fn compare_candidates(a: &(f64, &AircraftSnapshot), b: &(f64, &AircraftSnapshot)) -> Ordering {
    a.0.total_cmp(&b.0)
        .then_with(|| a.1.normalized_callsign().cmp(&b.1.normalized_callsign()))
        .then_with(|| a.1.id.cmp(&b.1.id))
}
