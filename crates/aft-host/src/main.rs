//! aft-host: affect tracking host.
//!
//! Supervises the analytics worker process, connects the telemetry channel,
//! and exposes the session lifecycle (start / stop / calibrate / export) on
//! an interactive line-oriented surface.

mod config;
mod supervisor;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use aft_client::export::{self, DEFAULT_EXPORT_FILE};
use aft_client::{ChannelEvent, ConnectionState, LiveUpdate, SessionController};
use aft_core::AftError;
use config::HostConfig;
use supervisor::{ProcessSupervisor, WorkerState};

/// aft-host — Affect tracking host
#[derive(Parser, Debug)]
#[command(name = "aft-host", version, about = "Affect tracking host")]
struct Cli {
    /// Worker telemetry endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.aft/config.toml")]
    config: String,

    /// Worker directory override (development)
    #[arg(long)]
    worker_dir: Option<String>,

    /// Export directory override
    #[arg(long)]
    export_dir: Option<String>,

    /// Attach to an already-running worker instead of spawning one
    #[arg(long)]
    no_worker: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

enum LoopAction {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting aft-host"
    );

    let config_path = PathBuf::from(&cli.config);
    let config = match HostConfig::load(
        Some(&config_path),
        cli.endpoint.as_deref(),
        cli.worker_dir.as_deref(),
        cli.export_dir.as_deref(),
        cli.no_worker,
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let supervisor = ProcessSupervisor::new(config.worker_dir.clone());
    if config.autostart {
        supervisor.start();
        // Give the worker a moment to open its endpoint before the first
        // connection attempt.
        tokio::time::sleep(Duration::from_millis(1500)).await;
    }

    let mut controller = SessionController::new();
    let mut events: Option<mpsc::Receiver<ChannelEvent>> = None;

    match controller.connect(&config.endpoint).await {
        Ok(rx) => {
            events = Some(rx);
            println!("Connected to worker at {}", config.endpoint);
        }
        Err(e) => {
            warn!(error = %e, "initial connect failed");
            println!("Not connected ({e}). Type 'connect' to retry.");
        }
    }

    println!("Commands: start, stop, calibrate, export [path], status, connect, worker start|stop, quit");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let action = handle_line(
                            line.trim(),
                            &mut controller,
                            &mut events,
                            &supervisor,
                            &config,
                        )
                        .await;
                        if matches!(action, LoopAction::Quit) {
                            break;
                        }
                    }
                    Ok(None) => break, // stdin closed
                    Err(e) => {
                        error!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }

            event = next_event(&mut events) => {
                match event {
                    Some(event) => {
                        for update in controller.handle_event(event) {
                            render_update(&update);
                        }
                    }
                    None => {
                        // Reader task ended; drop the exhausted queue.
                        events = None;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    controller.disconnect().await;
    supervisor.stop();
    info!("aft-host stopped");
}

/// Receive from the event queue, or park forever when no channel is open
/// (keeps the select! arm inert instead of busy-polling).
async fn next_event(events: &mut Option<mpsc::Receiver<ChannelEvent>>) -> Option<ChannelEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn render_update(update: &LiveUpdate) {
    match update {
        LiveUpdate::Gaze(sample) => {
            tracing::debug!(x = sample.x, y = sample.y, "gaze");
        }
        LiveUpdate::Emotion(sample) => {
            println!("[live] {} ({:.0}%)", sample.label, sample.confidence);
        }
        LiveUpdate::ConnectionLost { error } => match error {
            Some(e) => println!("Channel failed: {e}. Type 'connect' to retry."),
            None => println!("Worker disconnected. Type 'connect' to retry."),
        },
    }
}

async fn handle_line(
    line: &str,
    controller: &mut SessionController,
    events: &mut Option<mpsc::Receiver<ChannelEvent>>,
    supervisor: &ProcessSupervisor,
    config: &HostConfig,
) -> LoopAction {
    match line {
        "" => {}

        "start" => match controller.start().await {
            Ok(()) => println!("Tracking started."),
            Err(AftError::ChannelNotOpen) => {
                println!("Not connected to the worker. Type 'connect' first.")
            }
            Err(e) => println!("Cannot start: {e}"),
        },

        "stop" => match controller.stop().await {
            Ok(summary) => {
                println!("Tracking stopped.");
                println!("{}", summary.render_text());
            }
            Err(e) => println!("Cannot stop: {e}"),
        },

        "calibrate" => match controller.calibrate().await {
            Ok(()) => println!("Calibration requested."),
            Err(e) => println!("Cannot calibrate: {e}"),
        },

        "status" => {
            println!("Connection: {}", controller.connection_state());
            println!("Phase: {:?}", controller.phase());
            match supervisor.state() {
                WorkerState::NotStarted => println!("Worker: not started"),
                WorkerState::Running { pid } => println!("Worker: running (pid {pid})"),
                WorkerState::Exited { code } => println!("Worker: exited (code {code:?})"),
            }
            let session = controller.session();
            println!(
                "Session: {} gaze, {} emotion samples",
                session.gaze_samples.len(),
                session.emotion_samples.len()
            );
        }

        "connect" => {
            if controller.connection_state() == ConnectionState::Connected {
                println!("Already connected.");
            } else {
                *events = None;
                match controller.connect(&config.endpoint).await {
                    Ok(rx) => {
                        *events = Some(rx);
                        println!("Connected to worker at {}", config.endpoint);
                    }
                    Err(e) => println!("Connect failed: {e}"),
                }
            }
        }

        "worker start" => supervisor.start(),
        "worker stop" => supervisor.stop(),

        "quit" | "exit" => return LoopAction::Quit,

        other => {
            if other == "export" || other.starts_with("export ") {
                let path = match other["export".len()..].trim() {
                    "" => config.export_dir.join(DEFAULT_EXPORT_FILE),
                    arg => PathBuf::from(arg),
                };
                match export::export_to_path(controller.session(), &path).await {
                    Ok(written) => println!("Exported to {}", written.display()),
                    Err(AftError::NoData) => println!("No session data to export."),
                    Err(e) => println!("Export failed: {e}"),
                }
            } else {
                println!("Unknown command: {other}");
            }
        }
    }

    LoopAction::Continue
}
