//!   par-scope:   Precision Approach Radar scope for simulator traffic
//!
//!  Shows the azimuth and elevation deviation of one approaching aircraft
//!  against a configured runway, updated from live telemetry.

mod config;
mod display;
mod geo;
mod runway;
mod session;
mod telemetry;
mod tracker;
mod transform;

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use crate::config::{Config, Options, SourceKind};
use crate::display::{HeadlessRenderer, TerminalScope, run_renderer};
use crate::session::{Command, EventLog, LatestFrame, ScopeSession};
use crate::telemetry::{DemoSource, FeedSource, TelemetrySource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::from_args()?;
    let config = Config::load(&options)?;

    // Initialize logging only if the terminal scope is not drawing
    if config.headless {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
        info!("par-scope starting...");
        info!(
            "Configuration: airport {} runway {} target {:?} poll {} Hz source {:?}",
            config.active_airport,
            config.active_runway,
            config.target_callsign,
            config.poll_hz,
            config.source
        );
    }

    let log = Arc::new(EventLog::default());
    log.push("App: starting");
    for note in &config.notes {
        info!("{}", note);
        log.push(note);
    }

    let frames = Arc::new(LatestFrame::default());
    let (cmd_tx, cmd_rx): (Sender<Command>, Receiver<Command>) = unbounded();
    spawn_command_reader(cmd_tx, Arc::clone(&log));

    let runway = config.active_geometry()?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let render_handle = {
            let frames = Arc::clone(&frames);
            let log = Arc::clone(&log);
            if config.headless {
                tokio::spawn(run_renderer(HeadlessRenderer, frames, log))
            } else {
                tokio::spawn(run_renderer(TerminalScope::new(config.display_size), frames, log))
            }
        };

        let result = match &config.source {
            SourceKind::Demo => {
                log.push("Telemetry: demo traffic");
                let source = DemoSource::new(runway);
                run_session(&config, source, &frames, &log, cmd_rx).await
            }
            SourceKind::Feed(addr) => {
                log.push(format!("Telemetry: feed {}", addr));
                let source = FeedSource::new(addr.clone());
                run_session(&config, source, &frames, &log, cmd_rx).await
            }
        };

        render_handle.abort();
        result
    })?;

    info!("par-scope stopped");
    Ok(())
}

async fn run_session<S: TelemetrySource>(
    config: &Config,
    source: S,
    frames: &Arc<LatestFrame>,
    log: &Arc<EventLog>,
    commands: Receiver<Command>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = ScopeSession::new(
        config,
        source,
        Arc::clone(frames),
        Arc::clone(log),
        commands,
    )?;

    session
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}

/// Read operator commands from stdin on a plain thread
fn spawn_command_reader(tx: Sender<Command>, log: Arc<EventLog>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match Command::parse(&line) {
                Some(cmd) => {
                    if tx.send(cmd).is_err() {
                        break;
                    }
                }
                None => log.push(format!("Unknown command: {}", line.trim())),
            }
        }
    });
}
