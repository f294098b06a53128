//! CLI entry point for the detector table control system.
//!
//! Wires a resolved configuration into the protocol driver and (optionally)
//! the telemetry forwarder, runs one procedure, and exits. The GUI front
//! end, when present, drives the same crates from its own worker; this
//! binary is the headless surface for scripts and bench checkout.
//!
//! # Usage
//!
//! Run a datum search on axis 1:
//! ```bash
//! tablectl --config table.toml datum --axis 1
//! ```
//!
//! Poll every configured axis once:
//! ```bash
//! tablectl --config table.toml poll
//! ```
//!
//! Send a raw command and re-poll:
//! ```bash
//! tablectl --config table.toml send --axis 2 "2qa"
//! ```

// Global allocator for consistent multi-threaded allocation behavior.
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};

use table_core::{open_link, wrap_shared, Pacing, PositionEvent, TableConfig};
use table_driver_mclennan::{AxisStateStore, TableDriver};
use table_telemetry::{spawn_forwarder, InfluxSink, TelemetrySink};

#[derive(Parser)]
#[command(name = "tablectl")]
#[command(about = "Serial control for the detector positioning table", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full datum search (configure, home, confirm position).
    Datum {
        /// Axis digit to home.
        #[arg(long)]
        axis: u8,
    },

    /// Query the encoder position of every configured axis once.
    Poll,

    /// Send a raw operator command, then re-poll all axes on a decoded
    /// reply.
    Send {
        /// Target axis for attribution in logs.
        #[arg(long)]
        axis: u8,

        /// The command string; sent verbatim plus the CR terminator.
        /// Omit for a bare terminator.
        #[arg(default_value = "")]
        command: String,
    },

    /// Validate the configuration and check that the link opens.
    Check,
}

/// Event channel depth between the sequencer and the telemetry forwarder.
/// Overflow drops samples rather than stalling motion control.
const EVENT_CHANNEL_DEPTH: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = TableConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    if let Commands::Check = cli.command {
        let link = open_link(&config.link).await?;
        drop(link);
        info!(port = %config.link.port, "configuration valid, link opens");
        return Ok(());
    }

    let port = wrap_shared(Box::new(open_link(&config.link).await?));
    let store = Arc::new(AxisStateStore::new(&config.axes));
    let mut driver = TableDriver::new(
        port,
        store.clone(),
        config.motion,
        Pacing::from_link(&config.link),
    );

    let forwarder = match &config.telemetry {
        Some(telemetry) => {
            let sink: Arc<dyn TelemetrySink> = Arc::new(InfluxSink::from_config(telemetry)?);
            let (tx, rx) = mpsc::channel::<PositionEvent>(EVENT_CHANNEL_DEPTH);
            driver = driver.with_events(tx);
            Some(spawn_forwarder(rx, sink))
        }
        None => None,
    };

    match cli.command {
        Commands::Datum { axis } => {
            driver.datum_search(axis).await?;
            info!(axis, "datum search complete");
        }
        Commands::Poll => {
            driver.poll_positions().await?;
        }
        Commands::Send { axis, command } => match driver.manual(axis, &command).await? {
            Some(response) => info!(payload = %response.payload, "reply decoded"),
            None => warn!("no decodable reply"),
        },
        // Handled before the link was opened.
        Commands::Check => {}
    }

    for state in store.snapshot() {
        match state.position {
            Some(position) => info!(axis = state.axis, name = %state.name, position),
            None => info!(axis = state.axis, name = %state.name, position = "unknown"),
        }
    }

    // Let queued telemetry drain: dropping the driver closes the channel,
    // and the forwarder exits once it is empty.
    drop(driver);
    if let Some(handle) = forwarder {
        let _ = handle.await;
    }

    Ok(())
}
