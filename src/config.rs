//! Configuration: command-line options and the JSON airport database

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::runway::{DEFAULT_GLIDEPATH_DEG, DEFAULT_MAX_RANGE_NM, RunwayGeometry};

pub const DEFAULT_CONFIG_PATH: &str = "par_config.json";
pub const DEFAULT_FEED_ADDR: &str = "127.0.0.1:30047";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no airports configured")]
    NoAirports,

    #[error("unknown airport {0}")]
    UnknownAirport(String),

    #[error("airport {0} has no runways")]
    NoRunways(String),

    #[error("unknown runway {runway} at {airport}")]
    UnknownRunway { airport: String, runway: String },

    #[error("invalid runway {runway}: {reason}")]
    InvalidRunway { runway: String, reason: String },

    #[error("invalid poll rate {0}, must be a positive number")]
    InvalidPollRate(f64),

    #[error("invalid value for {option}: {value}")]
    InvalidOption { option: String, value: String },

    #[error("unknown option {0}")]
    UnknownOption(String),
}

/// One runway entry of the airport database
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunwayConfig {
    pub lat: f64,
    pub lon: f64,
    pub elev_ft: f64,
    pub heading_deg: f64,
    #[serde(default = "default_glideslope")]
    pub glideslope_deg: f64,
    #[serde(default = "default_max_range")]
    pub max_range_nm: f64,
    #[serde(default)]
    pub course_offset_deg: f64,
}

fn default_glideslope() -> f64 {
    DEFAULT_GLIDEPATH_DEG
}

fn default_max_range() -> f64 {
    DEFAULT_MAX_RANGE_NM
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AirportConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub runways: BTreeMap<String, RunwayConfig>,
}

/// Airports keyed by identifier, runways keyed by designator. Ordered maps,
/// so "first" always means lexicographically first.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct AirportDatabase(BTreeMap<String, AirportConfig>);

impl AirportDatabase {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn airport(&self, key: &str) -> Result<&AirportConfig, ConfigError> {
        self.0
            .get(key)
            .ok_or_else(|| ConfigError::UnknownAirport(key.to_string()))
    }

    pub fn first_airport(&self) -> Option<&str> {
        self.0.keys().next().map(String::as_str)
    }

    pub fn first_runway(&self, airport: &str) -> Result<&str, ConfigError> {
        self.airport(airport)?
            .runways
            .keys()
            .next()
            .map(String::as_str)
            .ok_or_else(|| ConfigError::NoRunways(airport.to_string()))
    }

    /// Validated geometry for `runway` at `airport`
    pub fn geometry(&self, airport: &str, runway: &str) -> Result<RunwayGeometry, ConfigError> {
        let entry = self
            .airport(airport)?
            .runways
            .get(runway)
            .ok_or_else(|| ConfigError::UnknownRunway {
                airport: airport.to_string(),
                runway: runway.to_string(),
            })?;
        RunwayGeometry::from_config(runway, entry)
    }
}

/// Built-in database used when no config file exists
fn default_airports() -> AirportDatabase {
    let mut runways = BTreeMap::new();
    runways.insert(
        "27R".to_string(),
        RunwayConfig {
            lat: 49.0128,
            lon: 2.5500,
            elev_ft: 400.0,
            heading_deg: 160.0,
            glideslope_deg: DEFAULT_GLIDEPATH_DEG,
            max_range_nm: DEFAULT_MAX_RANGE_NM,
            course_offset_deg: 0.0,
        },
    );
    let mut airports = BTreeMap::new();
    airports.insert(
        "LFPG".to_string(),
        AirportConfig {
            name: Some("Paris Charles de Gaulle".to_string()),
            runways,
        },
    );
    AirportDatabase(airports)
}

/// Contents of the JSON config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub airports: AirportDatabase,
    pub active_airport: Option<String>,
    pub active_runway: Option<String>,
    pub target_callsign: Option<String>,
    pub poll_hz: f64,
    pub window_size: [u32; 2],
    pub stale_after_secs: f64,
    pub telemetry_timeout_ms: u64,
    pub feed: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            airports: default_airports(),
            active_airport: None,
            active_runway: None,
            target_callsign: None,
            poll_hz: 2.0,
            window_size: [900, 800],
            stale_after_secs: 5.0,
            telemetry_timeout_ms: 250,
            feed: None,
        }
    }
}

impl FileConfig {
    pub fn from_json(path: &str, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }
}

/// Command-line options. Values given here override the config file.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub config_path: Option<String>,
    pub feed: Option<String>,
    pub demo: bool,
    pub target_callsign: Option<String>,
    pub poll_hz: Option<f64>,
    pub airport: Option<String>,
    pub runway: Option<String>,
    pub stale_after_secs: Option<f64>,
    pub headless: bool,
}

impl Options {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args: Vec<String> = env::args().skip(1).collect();
        if args.iter().any(|a| a == "--help") {
            print_help();
            std::process::exit(0);
        }
        Self::parse(&args)
    }

    pub fn parse(args: &[String]) -> Result<Self, ConfigError> {
        let mut options = Options::default();

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            let mut value = || -> Result<String, ConfigError> {
                i += 1;
                args.get(i).cloned().ok_or_else(|| ConfigError::InvalidOption {
                    option: flag.to_string(),
                    value: "<missing>".to_string(),
                })
            };

            match flag {
                "--config" => options.config_path = Some(value()?),
                "--feed" => options.feed = Some(value()?),
                "--demo" => options.demo = true,
                "--target" => options.target_callsign = Some(value()?),
                "--poll-hz" => options.poll_hz = Some(parse_number(flag, &value()?)?),
                "--airport" => options.airport = Some(value()?),
                "--runway" => options.runway = Some(value()?),
                "--stale" => options.stale_after_secs = Some(parse_number(flag, &value()?)?),
                "--headless" => options.headless = true,
                _ => return Err(ConfigError::UnknownOption(flag.to_string())),
            }
            i += 1;
        }

        Ok(options)
    }
}

fn parse_number(option: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidOption {
        option: option.to_string(),
        value: value.to_string(),
    })
}

/// Where snapshots come from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    Feed(String),
    Demo,
}

/// Pixel size forwarded to the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

/// Validated startup configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub airports: AirportDatabase,
    pub active_airport: String,
    pub active_runway: String,
    pub target_callsign: Option<String>,
    pub poll_hz: f64,
    pub stale_after: Duration,
    pub telemetry_timeout: Duration,
    pub display_size: DisplaySize,
    pub source: SourceKind,
    pub headless: bool,
    /// Startup messages for the operator log
    pub notes: Vec<String>,
}

impl Config {
    /// Read the config file named by `options` (or the default path) and merge
    pub fn load(options: &Options) -> Result<Self, ConfigError> {
        let path = options.config_path.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);

        if !Path::new(path).exists() {
            let mut config = Self::resolve(FileConfig::default(), options)?;
            config
                .notes
                .insert(0, format!("Config: {} not found, using defaults", path));
            return Ok(config);
        }

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let file = FileConfig::from_json(path, &text)?;
        Self::resolve(file, options)
    }

    /// Merge file values with command-line overrides and validate the result
    pub fn resolve(file: FileConfig, options: &Options) -> Result<Self, ConfigError> {
        let mut notes = Vec::new();
        let airports = file.airports;
        if airports.is_empty() {
            return Err(ConfigError::NoAirports);
        }
        notes.push(format!("Config: loaded {} airports", airports.len()));

        let active_airport = match options.airport.clone().or(file.active_airport) {
            Some(key) => {
                airports.airport(&key)?;
                key
            }
            None => airports
                .first_airport()
                .map(str::to_string)
                .ok_or(ConfigError::NoAirports)?,
        };
        notes.push(format!("Config: active airport {}", active_airport));

        let active_runway = match options.runway.clone().or(file.active_runway) {
            Some(key) => key,
            None => airports.first_runway(&active_airport)?.to_string(),
        };
        // an invalid active runway must stop us before the loop starts
        airports.geometry(&active_airport, &active_runway)?;
        notes.push(format!("Config: active runway {}", active_runway));

        let poll_hz = options.poll_hz.unwrap_or(file.poll_hz);
        if !poll_hz.is_finite() || poll_hz <= 0.0 {
            return Err(ConfigError::InvalidPollRate(poll_hz));
        }

        let stale_secs = options.stale_after_secs.unwrap_or(file.stale_after_secs);
        if !stale_secs.is_finite() || stale_secs <= 0.0 {
            return Err(ConfigError::InvalidOption {
                option: "stale_after_secs".to_string(),
                value: stale_secs.to_string(),
            });
        }

        if file.telemetry_timeout_ms == 0 {
            return Err(ConfigError::InvalidOption {
                option: "telemetry_timeout_ms".to_string(),
                value: file.telemetry_timeout_ms.to_string(),
            });
        }

        let target_callsign = options
            .target_callsign
            .clone()
            .or(file.target_callsign)
            .filter(|cs| !cs.trim().is_empty());

        let source = if options.demo {
            SourceKind::Demo
        } else {
            SourceKind::Feed(
                options
                    .feed
                    .clone()
                    .or(file.feed)
                    .unwrap_or_else(|| DEFAULT_FEED_ADDR.to_string()),
            )
        };

        Ok(Self {
            airports,
            active_airport,
            active_runway,
            target_callsign,
            poll_hz,
            stale_after: Duration::from_secs_f64(stale_secs),
            telemetry_timeout: Duration::from_millis(file.telemetry_timeout_ms),
            display_size: DisplaySize {
                width: file.window_size[0],
                height: file.window_size[1],
            },
            source,
            headless: options.headless,
            notes,
        })
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.poll_hz)
    }

    pub fn active_geometry(&self) -> Result<RunwayGeometry, ConfigError> {
        self.airports.geometry(&self.active_airport, &self.active_runway)
    }
}

fn print_help() {
    println!(
        r#"par-scope - Precision Approach Radar scope for simulator traffic

Usage: par-scope [OPTIONS]

Options:
  --config <path>        JSON config file (default: par_config.json)
  --feed <host:port>     Telemetry feed address (default: 127.0.0.1:30047)
  --demo                 Use synthetic approach traffic instead of a feed
  --target <callsign>    Lock the scope to one callsign
  --poll-hz <hz>         Telemetry poll rate (default: 2)
  --airport <key>        Active airport
  --runway <key>         Active runway
  --stale <secs>         Seconds before a missing target is reported lost (default: 5)
  --headless             Log frames instead of drawing the scope
  --help                 Show this help

Commands (type while running):
  airport <key> | runway <key> | lock <callsign> | unlock | reconnect | quit
"#
    );
}
