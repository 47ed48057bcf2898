//! skinfleet - main entry point
//!
//! Wires the resilient queue client and the fleet orchestrator together,
//! fails fast when the broker is unreachable at boot, and translates
//! SIGINT/SIGTERM into the process-wide shutdown signal.

use clap::{Parser, Subcommand};
use skinfleet::config::FleetConfig;
use skinfleet::fleet::{DnsResolver, FleetOrchestrator, FleetRegistry};
use skinfleet::observability::init_default_logging;
use skinfleet::queue::SkinQueue;
use skinfleet::session::RelayDriver;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Fleet of observer clients forwarding player skins to a message broker
#[derive(Parser)]
#[command(name = "skinfleet")]
#[command(about = "Fleet of observer clients forwarding player skins to a message broker")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fleet: sweep servers and relay skin observations
    Run,
    /// Attach to the work queue and log every received skin
    Consume,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();
    info!("Starting skinfleet v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_fleet(config).await,
        Commands::Consume => consume_queue(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<FleetConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(FleetConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["skinfleet.toml", "config/skinfleet.toml"];
            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(FleetConfig::load_from_file(&path)?);
                }
            }
            error!("No configuration file found. Provide one with -c/--config or create skinfleet.toml");
            process::exit(1);
        }
    }
}

async fn run_fleet(config: FleetConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Only the very first connection attempt may abort the process; every
    // later broker outage is handled by the reconnect loop.
    let queue = Arc::new(
        SkinQueue::connect(
            &config.queue.uri,
            config.queue.enable_fanout,
            config.queue_tuning(),
        )
        .await?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = Arc::new(RelayDriver::new(queue.clone(), config.relay_config()));
    let orchestrator = FleetOrchestrator::new(
        config.sweep_config(),
        config.identity_pool(),
        FleetRegistry::new(),
        Arc::new(DnsResolver::default()),
        driver,
        shutdown_rx,
    );
    let orchestrator_handle = tokio::spawn(orchestrator.run());

    wait_for_shutdown_signal().await?;

    shutdown_tx.send_replace(true);
    let _ = orchestrator_handle.await;
    queue.close().await;
    Ok(())
}

async fn consume_queue(config: FleetConfig) -> Result<(), Box<dyn std::error::Error>> {
    let queue = Arc::new(
        SkinQueue::connect(&config.queue.uri, false, config.queue_tuning()).await?,
    );
    let mut skins = queue.receive_skins();

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    loop {
        tokio::select! {
            received = skins.recv() => match received {
                Some(skin) => info!(
                    username = %skin.username,
                    xuid = %skin.xuid,
                    server = %skin.server_address,
                    time = skin.time,
                    "received skin"
                ),
                None => break,
            },
            _ = sigint.recv() => break,
            _ = sigterm.recv() => break,
        }
    }

    queue.close().await;
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<(), std::io::Error> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }
    Ok(())
}

fn handle_config_command(
    config: &FleetConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }
    info!("Configuration validation complete");
    Ok(())
}
