//! Scope rendering
//!
//!  Draws the two PAR panels as character grids. The elevation panel puts
//!  range on x and height above threshold on y, with the glidepath drawn as
//!  a line. The azimuth panel puts range on x and cross-track offset on y,
//!  centerline in the middle and safety lines fanning out from the
//!  threshold. Both panels place the threshold at the left edge.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::DisplaySize;
use crate::geo;
use crate::runway::RunwayGeometry;
use crate::session::{Display, EventLog, LatestFrame, ScopeFrame};
use crate::tracker::LockMode;
use crate::transform::{DeviationSample, SampleStatus};

// ANSI color codes
const RESET: &str = "\x1B[0m";
const BOLD: &str = "\x1B[1m";
const BLUE: &str = "\x1B[34m";
const CYAN: &str = "\x1B[96m";
const YELLOW: &str = "\x1B[93m";
const GREEN: &str = "\x1B[92m";
const ORANGE: &str = "\x1B[33m";
const WHITE: &str = "\x1B[97m";

/// Lateral half-scale of the azimuth panel
pub const AZIMUTH_HALF_SCALE_M: f64 = 600.0;

/// Event log lines shown under the panels
pub const LOG_VISIBLE_LINES: usize = 8;

/// Pixel size of one character cell when mapping the configured window size
const CELL_WIDTH_PX: u32 = 10;
const CELL_HEIGHT_PX: u32 = 20;

/// How often the render task looks for a new frame
const RENDER_INTERVAL: Duration = Duration::from_millis(100);

pub trait Renderer {
    fn render(&mut self, frame: &ScopeFrame, log: &EventLog);
}

/// Grid of coloured characters
struct Canvas {
    width: usize,
    height: usize,
    cells: Vec<(char, &'static str)>,
}

impl Canvas {
    fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![(' ', ""); width * height],
        }
    }

    fn put(&mut self, x: usize, y: usize, ch: char, color: &'static str) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = (ch, color);
        }
    }

    /// Put only where nothing is drawn yet
    fn underlay(&mut self, x: usize, y: usize, ch: char, color: &'static str) {
        if x < self.width && y < self.height && self.cells[y * self.width + x].0 == ' ' {
            self.put(x, y, ch, color);
        }
    }

    fn text(&mut self, x: usize, y: usize, text: &str, color: &'static str) {
        for (i, ch) in text.chars().enumerate() {
            self.put(x + i, y, ch, color);
        }
    }

    fn centered(&mut self, y: usize, text: &str, color: &'static str) {
        let x = self.width.saturating_sub(text.chars().count()) / 2;
        self.text(x, y, text, color);
    }

    /// Rows of text, with a frame around the grid
    fn rows(&self, color: bool) -> Vec<String> {
        let edge = "─".repeat(self.width);
        let paint = |s: &str, c: &str| {
            if color && !c.is_empty() {
                format!("{}{}{}", c, s, RESET)
            } else {
                s.to_string()
            }
        };

        let mut rows = Vec::with_capacity(self.height + 2);
        rows.push(paint(&format!("┌{}┐", edge), BLUE));
        for y in 0..self.height {
            let mut row = paint("│", BLUE);
            for x in 0..self.width {
                let (ch, c) = self.cells[y * self.width + x];
                row.push_str(&paint(&ch.to_string(), c));
            }
            row.push_str(&paint("│", BLUE));
            rows.push(row);
        }
        rows.push(paint(&format!("└{}┘", edge), BLUE));
        rows
    }
}

/// Panel geometry derived from the configured window size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelSize {
    pub width: usize,
    pub height: usize,
}

impl PanelSize {
    pub fn from_display(size: DisplaySize) -> Self {
        // header and margins take 180 px, the rest is split between two panels
        let panel_px = size.height.saturating_sub(180) / 2;
        Self {
            width: ((size.width / CELL_WIDTH_PX) as usize).saturating_sub(2).max(30),
            height: ((panel_px / CELL_HEIGHT_PX) as usize).max(7),
        }
    }
}

fn column_for_range(range_nm: f64, max_nm: f64, width: usize) -> usize {
    let x = (range_nm.max(0.0) / max_nm * (width - 1) as f64).round();
    (x as usize).min(width - 1)
}

/// Row for `value` on a scale where `top` maps to row 0 and `bottom` to the last row
fn row_for(value: f64, bottom: f64, top: f64, height: usize) -> (usize, bool) {
    let t = (value - bottom) / (top - bottom);
    let clipped = !(0.0..=1.0).contains(&t);
    let r = (t.clamp(0.0, 1.0) * (height - 1) as f64).round() as usize;
    (height - 1 - r, clipped)
}

fn range_marks(canvas: &mut Canvas, max_nm: f64) {
    let marks = max_nm.floor() as usize;
    for i in 1..=marks {
        let x = column_for_range(i as f64, max_nm, canvas.width);
        let color = if i % 2 == 0 { GREEN } else { ORANGE };
        for y in 0..canvas.height {
            canvas.underlay(x, y, '┊', color);
        }
    }
}

fn status_message(display: &Display) -> Option<String> {
    match display {
        Display::Target { sample, .. } => match sample.status {
            SampleStatus::Approach | SampleStatus::Behind => None,
            SampleStatus::BeyondRange => Some(format!("{} OUT OF RANGE", sample.callsign)),
            SampleStatus::Degenerate => Some(format!("{} OVER THRESHOLD", sample.callsign)),
            SampleStatus::NoSolution => Some(format!("{} NO POSITION", sample.callsign)),
        },
        Display::TargetLost(cs) => Some(format!("TARGET LOST {}", cs)),
        Display::NoTarget => Some("NO TARGET".to_string()),
        Display::NoData => Some("NO DATA".to_string()),
    }
}

fn drawable(display: &Display) -> Option<(&DeviationSample, bool)> {
    match display {
        Display::Target { sample, holding } if sample.is_valid() => Some((sample, *holding)),
        _ => None,
    }
}

fn target_char(sample: &DeviationSample, holding: bool, clipped: bool) -> (char, &'static str) {
    if sample.status == SampleStatus::Behind {
        ('◂', ORANGE)
    } else if clipped {
        ('◆', ORANGE)
    } else if holding {
        ('○', WHITE)
    } else {
        ('●', WHITE)
    }
}

fn elevation_panel(frame: &ScopeFrame, size: PanelSize) -> Canvas {
    let rwy = &frame.runway;
    let mut canvas = Canvas::new(size.width, size.height);
    let max_nm = rwy.max_range_nm();
    let glide_ft = |nm: f64| geo::m_to_ft(rwy.glidepath_height_m(geo::nm_to_m(nm)));
    let max_alt_ft = glide_ft(max_nm) * 1.2;

    for x in 0..size.width {
        let nm = x as f64 / (size.width - 1) as f64 * max_nm;
        let (y, _) = row_for(glide_ft(nm), 0.0, max_alt_ft, size.height);
        canvas.put(x, y, '·', CYAN);
    }
    range_marks(&mut canvas, max_nm);

    if let Some((sample, holding)) = drawable(&frame.display) {
        let range_nm = sample.range_nm();
        let x = column_for_range(range_nm, max_nm, size.width);
        let (gy, _) = row_for(glide_ft(range_nm.max(0.0)), 0.0, max_alt_ft, size.height);
        canvas.put(x, gy, '◯', WHITE);

        let (y, clipped) = row_for(sample.height_ft(), 0.0, max_alt_ft, size.height);
        let (ch, color) = target_char(sample, holding, clipped);
        canvas.put(x, y, ch, color);
        canvas.text(x + 2, y.saturating_sub(1), &sample.callsign, WHITE);
    } else if let Some(msg) = status_message(&frame.display) {
        canvas.centered(size.height / 2, &msg, ORANGE);
    }
    canvas
}

fn azimuth_panel(frame: &ScopeFrame, size: PanelSize) -> Canvas {
    let rwy = &frame.runway;
    let mut canvas = Canvas::new(size.width, size.height);
    let max_nm = rwy.max_range_nm();
    let center = (size.height - 1) / 2;

    for x in 0..size.width {
        let spread = (x as f64 / (size.width - 1) as f64 * center as f64).round() as usize;
        canvas.put(x, center, '─', YELLOW);
        canvas.put(x, center - spread, '·', CYAN);
        canvas.put(x, center + spread, '·', CYAN);
    }
    range_marks(&mut canvas, max_nm);

    if let Some((sample, holding)) = drawable(&frame.display) {
        let x = column_for_range(sample.range_nm(), max_nm, size.width);
        // positive azimuth is drawn above the centerline
        let (y, clipped) = row_for(
            sample.azimuth_m,
            -AZIMUTH_HALF_SCALE_M,
            AZIMUTH_HALF_SCALE_M,
            center * 2 + 1,
        );
        let (ch, color) = target_char(sample, holding, clipped);
        canvas.put(x, y, ch, color);
        canvas.text(x + 2, y.saturating_sub(1), &sample.callsign, WHITE);
    } else if let Some(msg) = status_message(&frame.display) {
        canvas.centered(size.height / 2, &msg, ORANGE);
    }
    canvas
}

fn header(frame: &ScopeFrame) -> Vec<(String, &'static str)> {
    let rwy: &RunwayGeometry = &frame.runway;
    let mut lines = vec![
        (
            format!(
                "RWY {:03.0}  {} {}  GP {:.1}°  RANGE {:.0} NM",
                rwy.heading_deg,
                frame.airport,
                rwy.name,
                rwy.glidepath_deg,
                rwy.max_range_nm()
            ),
            WHITE,
        ),
        if frame.connected {
            ("SIM: CONNECTED".to_string(), GREEN)
        } else {
            ("SIM: DISCONNECTED".to_string(), ORANGE)
        },
        match &frame.lock {
            LockMode::Locked(cs) => (format!("LOCK: {}", cs), YELLOW),
            LockMode::Unlocked => ("LOCK: nearest".to_string(), WHITE),
        },
    ];

    let readout = match &frame.display {
        Display::Target { sample, holding } if sample.is_valid() => {
            let mut readout = format!(
                "{}  RNG {:.1} NM  AZ {:+.0} M  EL {:+.0} FT",
                sample.callsign,
                sample.range_nm(),
                sample.azimuth_m,
                sample.elevation_ft(),
            );
            if let Some(gs) = sample.ground_speed {
                readout.push_str(&format!("  GS {:.0}", gs));
            }
            if let Some(vs) = sample.vertical_speed {
                readout.push_str(&format!("  VS {:+.0}", vs));
            }
            if sample.status == SampleStatus::Behind {
                readout.push_str("  BEHIND");
            }
            if *holding {
                readout.push_str("  HOLD");
            }
            readout
        }
        other => status_message(other).unwrap_or_default(),
    };
    lines.push((readout, WHITE));
    lines
}

/// Full scope picture as text rows, optionally with ANSI colours
pub fn compose(frame: &ScopeFrame, size: PanelSize, log: &[String], color: bool) -> Vec<String> {
    let paint = |s: &str, c: &str| {
        if color {
            format!("{}{}{}", c, s, RESET)
        } else {
            s.to_string()
        }
    };

    let mut rows: Vec<String> = header(frame)
        .iter()
        .map(|(s, c)| paint(s.as_str(), c))
        .collect();
    rows.push(paint("ELEVATION", BOLD));
    rows.extend(elevation_panel(frame, size).rows(color));
    rows.push(paint("AZIMUTH", BOLD));
    rows.extend(azimuth_panel(frame, size).rows(color));
    rows.push(paint("LOG", BOLD));
    rows.extend(log.iter().map(|l| paint(l, WHITE)));
    rows
}

/// Full-screen scope on the terminal
pub struct TerminalScope {
    size: PanelSize,
}

impl TerminalScope {
    pub fn new(display: DisplaySize) -> Self {
        Self {
            size: PanelSize::from_display(display),
        }
    }
}

impl Renderer for TerminalScope {
    fn render(&mut self, frame: &ScopeFrame, log: &EventLog) {
        let rows = compose(frame, self.size, &log.recent(LOG_VISIBLE_LINES), true);

        let mut out = io::stdout().lock();
        // Clear screen and move cursor to top
        let _ = write!(out, "\x1B[2J\x1B[H");
        for row in rows {
            let _ = writeln!(out, "{}", row);
        }
        let _ = out.flush();
    }
}

/// One log line per frame, for running without a terminal scope
#[derive(Default)]
pub struct HeadlessRenderer;

impl Renderer for HeadlessRenderer {
    fn render(&mut self, frame: &ScopeFrame, _log: &EventLog) {
        let rwy = &frame.runway;
        match &frame.display {
            Display::Target { sample, holding } => info!(
                "{} {} | {} {:?} range={:.2}nm az={:+.1}m el={:+.1}ft{}",
                frame.airport,
                rwy.name,
                sample.callsign,
                sample.status,
                sample.range_nm(),
                sample.azimuth_m,
                sample.elevation_ft(),
                if *holding { " (hold)" } else { "" }
            ),
            other => info!(
                "{} {} | {}",
                frame.airport,
                rwy.name,
                status_message(other).unwrap_or_default()
            ),
        }
    }
}

/// Draw each new frame as it appears in the handoff slot
pub async fn run_renderer<R: Renderer>(mut renderer: R, frames: Arc<LatestFrame>, log: Arc<EventLog>) {
    let mut interval = tokio::time::interval(RENDER_INTERVAL);
    let mut last_tick = 0;

    loop {
        interval.tick().await;
        if let Some(frame) = frames.latest() {
            if frame.tick != last_tick {
                last_tick = frame.tick;
                renderer.render(&frame, &log);
            }
        }
    }
}
