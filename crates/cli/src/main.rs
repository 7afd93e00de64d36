//! trac-janus command-line driver
//!
//! Runs the session coordinators against the in-memory loopback gateway:
//! 1. `videocall` registers two users and walks them through a call
//! 2. `videoroom` joins a room with scripted remote publishers
//! 3. `check-config` loads and validates a configuration file

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use trac_janus_client_core::gateway::loopback::LoopbackGateway;
use trac_janus_client_core::{
    CallStatus, ClientConfig, ClientEvent, DirectCallCoordinator, EventPriority, LogNotifier, RoomCoordinator,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Janus session coordinator driver", long_about = None)]
struct Cli {
    /// Configuration file (YAML, or JSON with a .json extension)
    #[arg(short, long, env = "TRAC_JANUS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call between two local users
    Videocall {
        #[arg(long, default_value = "alice")]
        caller: String,

        #[arg(long, default_value = "bob")]
        callee: String,

        /// Comment attached to the call
        #[arg(long)]
        comment: Option<String>,

        /// Hang up before the callee answers
        #[arg(long)]
        missed: bool,

        /// Seconds to keep the call up
        #[arg(long, default_value = "3")]
        duration: u64,
    },
    /// Join a room with scripted remote publishers
    Videoroom {
        #[arg(long, default_value = "1234")]
        room: u64,

        #[arg(long, default_value = "alice")]
        display: String,

        /// Number of remote publishers already in the room
        #[arg(long, default_value = "2")]
        publishers: u64,

        /// Simulate a missing microphone
        #[arg(long)]
        no_microphone: bool,

        /// Seconds to stay in the room
        #[arg(long, default_value = "3")]
        duration: u64,
    },
    /// Validate a configuration file and print the result
    CheckConfig,
}

fn init_logging(verbose: bool, config: &ClientConfig) {
    let level = if verbose || config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("trac_janus_client_core={level},trac_janus={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(path: Option<&PathBuf>) -> Result<ClientConfig> {
    let config = match path {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Print every event of one coordinator until its emitter goes away
fn log_events(label: &'static str, mut rx: broadcast::Receiver<ClientEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match event.priority() {
                    EventPriority::Critical => error!("[{}] {:?}", label, event),
                    EventPriority::Low => tracing::debug!("[{}] {:?}", label, event),
                    _ => info!("[{}] {:?}", label, event),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("[{}] skipped {} events", label, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Let queued events and timers run
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn run_videocall(
    config: ClientConfig,
    caller_name: &str,
    callee_name: &str,
    comment: Option<&str>,
    missed: bool,
    duration: Duration,
) -> Result<()> {
    let gateway = Arc::new(LoopbackGateway::new());
    let mut caller = DirectCallCoordinator::new(config.clone(), gateway.clone())?;
    let mut callee = DirectCallCoordinator::new(config, gateway.clone())?.with_notifier(Arc::new(LogNotifier));
    let loggers = [log_events("caller", caller.subscribe()), log_events("callee", callee.subscribe())];

    caller.start().await?;
    callee.start().await?;
    caller.register(caller_name).await?;
    callee.register(callee_name).await?;
    caller.process_pending().await;
    callee.process_pending().await;

    caller.call_with_comment(callee_name, comment).await?;
    caller.process_pending().await;
    callee.process_pending().await;
    if callee.status() != CallStatus::Incoming {
        anyhow::bail!("{} is not ringing ({})", callee_name, callee.status());
    }

    if missed {
        caller.hangup().await?;
        callee.process_pending().await;
        caller.process_pending().await;
    } else {
        callee.accept_incoming().await?;
        caller.process_pending().await;
        callee.process_pending().await;

        caller.send_data(&format!("Hi {}!", callee_name)).await?;
        callee.process_pending().await;

        tokio::time::sleep(duration).await;
        callee.hangup().await?;
        caller.process_pending().await;
        callee.process_pending().await;
    }

    info!("Final status: {} {}, {} {}", caller_name, caller.status(), callee_name, callee.status());
    caller.teardown().await;
    callee.teardown().await;
    settle().await;
    for logger in loggers {
        logger.abort();
    }
    Ok(())
}

async fn run_videoroom(
    config: ClientConfig,
    room_id: u64,
    display: &str,
    publishers: u64,
    no_microphone: bool,
    duration: Duration,
) -> Result<()> {
    let mut gateway = LoopbackGateway::new().with_room(room_id).with_first_feed_id(1000);
    if no_microphone {
        gateway = gateway.with_failing_audio_capture();
    }
    let gateway = Arc::new(gateway);
    for n in 1..=publishers {
        gateway.add_remote_publisher(room_id, n, format!("remote{}", n));
    }

    let mut room = RoomCoordinator::new(config, gateway.clone())?;
    let logger = log_events("room", room.subscribe());

    room.start(room_id).await?;
    room.join(display).await?;
    room.process_pending().await;

    for (slot, feed, name) in room.feeds() {
        info!("Slot {}: feed {} ({})", slot, feed, name.as_deref().unwrap_or("unknown"));
    }

    tokio::time::sleep(duration).await;
    if publishers > 0 {
        gateway.remove_remote_publisher(room_id, 1);
        room.process_pending().await;
    }
    room.toggle_mute()?;
    room.unpublish().await?;
    room.process_pending().await;

    room.teardown().await;
    settle().await;
    logger.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_logging(cli.verbose, &config);

    match cli.command {
        Command::Videocall { caller, callee, comment, missed, duration } => {
            run_videocall(config, &caller, &callee, comment.as_deref(), missed, Duration::from_secs(duration)).await
        }
        Command::Videoroom { room, display, publishers, no_microphone, duration } => {
            run_videoroom(config, room, &display, publishers, no_microphone, Duration::from_secs(duration)).await
        }
        Command::CheckConfig => {
            info!("Configuration OK: {:?}", config);
            Ok(())
        }
    }
}
