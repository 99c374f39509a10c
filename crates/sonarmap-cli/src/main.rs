//! `sonarmap` – Sonar Map Command Line Interface
//!
//! Runs the map engine against recorded robot traffic:
//!
//! 1. Loads `~/.sonarmap/config.toml` (or `--config`), then applies
//!    `SONARMAP_*` environment overrides and command-line flags.
//! 2. Spawns the map actor and, with `--feed`, the WebSocket snapshot feed.
//! 3. Replays an NDJSON message log (`--replay <path>`, or `-` for stdin)
//!    through the topic codec into the map.
//! 4. Intercepts **Ctrl-C** to stop ingestion early; the final map summary
//!    and `--snapshot-out` file are still written.

mod config;

use clap::Parser;
use colored::Colorize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use sonarmap_middleware::{EventBus, ReplaySource};
use sonarmap_runtime::{
    EngineStats, IngestReport, Ingestor, MapActor, MapEngine, SnapshotFeed, init_tracing,
};
use sonarmap_types::{MapError, MapSnapshot};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// NDJSON message log to replay, or `-` for standard input
    #[arg(short, long)]
    replay: Option<String>,

    /// Config file (defaults to ~/.sonarmap/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve live snapshots over WebSocket until Ctrl-C
    #[arg(long)]
    feed: bool,

    /// WebSocket port for --feed
    #[arg(long)]
    feed_port: Option<u16>,

    /// Pause between replayed messages, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Write the final snapshot as JSON to this file
    #[arg(long)]
    snapshot_out: Option<PathBuf>,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    init_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Must run before the Tokio runtime exists; see telemetry docs.
    let _guard = init_tracing("sonarmap");

    print_banner();

    let mut cfg = match config::resolve(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    if let Some(port) = args.feed_port {
        cfg.feed_port = port;
    }
    if let Some(ms) = args.delay_ms {
        cfg.replay_delay_ms = ms;
    }

    if args.init_config {
        let path = args.config.clone().unwrap_or_else(config::config_path);
        return match config::save_to(&cfg, &path) {
            Ok(()) => {
                println!(
                    "  {} Config saved to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}: {}", "Error saving config".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    if args.replay.is_none() && !args.feed {
        println!(
            "  Nothing to do.  Pass {} or {} (see {}).",
            "--replay <log>".bold(),
            "--feed".bold(),
            "--help".bold().cyan()
        );
        return ExitCode::from(2);
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let (stop_tx, stop_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping …".yellow().bold());
        let _ = stop_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&args, &cfg, stop_rx)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args, cfg: &config::Config, stop: watch::Receiver<bool>) -> Result<(), MapError> {
    let bus = EventBus::new(cfg.actor_capacity);
    let engine = MapEngine::with_config(cfg.engine());
    let (handle, _actor) = MapActor::spawn(engine, cfg.actor_capacity, Some(bus.clone()));
    info!(
        orientation_source = %cfg.orientation_source,
        pose_topic = %cfg.pose_topic,
        raw_topic = %cfg.raw_topic,
        sensor_topic = %cfg.sensor_topic,
        "map engine started"
    );

    if args.feed {
        let addr = SocketAddr::from(([0, 0, 0, 0], cfg.feed_port));
        let feed = SnapshotFeed::new(handle.clone(), bus.clone());
        tokio::spawn(async move {
            if let Err(e) = feed.run(addr).await {
                error!(error = %e, "snapshot feed stopped");
            }
        });
        println!("  Snapshot feed on {}", format!("ws://{addr}").bold());
    }

    let mut report = None;
    let mut interrupted = false;
    if let Some(replay) = &args.replay {
        let source = if replay == "-" {
            ReplaySource::from_stdin()
        } else {
            ReplaySource::from_path(replay)
        }
        .with_delay(Duration::from_millis(cfg.replay_delay_ms));
        let ingestor = Ingestor::new(cfg.topics(), handle.clone()).with_bus(bus.clone());

        println!("  Replaying {} …", replay.bold());
        tokio::select! {
            result = ingestor.run(&source) => report = Some(result?),
            _ = stopped(stop.clone()) => interrupted = true,
        }
    }

    if args.feed && !interrupted {
        println!("  Serving the map; press {} to stop.", "Ctrl-C".bold());
        stopped(stop).await;
    }

    let snapshot = handle.snapshot().await?;
    let stats = handle.stats().await?;
    print_summary(report.as_ref(), &snapshot, &stats, interrupted);

    if let Some(path) = &args.snapshot_out {
        write_snapshot(path, &snapshot)?;
        println!("  {} Snapshot written to {}", "✓".green().bold(), path.display().to_string().bold());
    }
    Ok(())
}

/// Resolves once Ctrl-C has been pressed.
async fn stopped(mut stop: watch::Receiver<bool>) {
    // An error means the handler is gone; nothing can stop us then.
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn write_snapshot(path: &Path, snapshot: &MapSnapshot) -> Result<(), MapError> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| MapError::MalformedEvent(format!("snapshot encoding: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| MapError::Io(format!("write {}: {e}", path.display())))
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_summary(
    report: Option<&IngestReport>,
    snapshot: &MapSnapshot,
    stats: &EngineStats,
    interrupted: bool,
) {
    println!();
    if interrupted {
        println!("  {}", "Replay interrupted.".yellow());
    }
    if let Some(r) = report {
        println!(
            "  Messages: {}  applied: {}  malformed: {}  rejected: {}",
            r.messages.to_string().bold(),
            r.applied.to_string().green(),
            r.malformed.to_string().yellow(),
            r.rejected.to_string().yellow(),
        );
    }
    println!(
        "  Events:   {} poses, {} readings, {} headings, {} rejected",
        stats.poses, stats.readings, stats.orientations, stats.rejected
    );
    let pose = snapshot.robot_pose;
    println!(
        "  Robot at ({:.2}, {:.2}) heading {:.1}°",
        pose.x, pose.y, pose.orientation
    );
    println!(
        "  Map:      {} obstacles, {} path points",
        snapshot.obstacles.len().to_string().bold(),
        snapshot.path.len().to_string().bold()
    );
    println!();
}

fn print_banner() {
    println!();
    println!("  {} {}",
        "SonarMap".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Four-way range mapping for small robots");
    println!();
}
