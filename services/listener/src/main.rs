//! Workstation device-link entry point

use adapter_service::robot::PoseReader;
use adapter_service::vision::{VisionClient, VisionCommand};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use listener_service::{load_catalog, Station};
use network::ChannelObserver;
use station_config::{load_config, StationConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ACTIVITY_QUEUE: usize = 256;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the listener and payload processor until Ctrl-C
    Listen {
        /// Print activity events as they are recorded
        #[arg(long)]
        activity: bool,
    },
    /// Read the robot TCP pose once
    ReadPose,
    /// Send one command to the vision controller
    Vision {
        /// autofocus, get_focus, trigger, get_code, af_width, af_height,
        /// af_depth, af_origin_x, af_origin_y or af_origin_z
        command: String,
    },
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "station=info,listener_service=info,network=info,adapter_service=info,warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Listen { activity } => listen(config, activity).await,
        Command::ReadPose => read_pose(&config).await,
        Command::Vision { command } => vision(&config, &command).await,
        Command::ShowConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn listen(config: StationConfig, activity: bool) -> Result<()> {
    info!("Starting station listener, version {}", env!("CARGO_PKG_VERSION"));

    let catalog = load_catalog(&config)?;
    let station = Station::new(&config, catalog);

    let printer = if activity {
        let (observer, mut events) = ChannelObserver::new(ACTIVITY_QUEUE);
        let printer = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                println!("{}", event.render());
            }
        });
        station.start(Some(Arc::new(observer)))?;
        Some(printer)
    } else {
        station.start(None)?;
        None
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
    }

    station.stop().await;
    if let Some(printer) = printer {
        printer.abort();
    }
    info!("Station stopped");
    Ok(())
}

async fn read_pose(config: &StationConfig) -> Result<()> {
    let reader = PoseReader::from_settings(&config.rtde)?;
    let reading = reader
        .read_pose_with_fallback()
        .await
        .context("Failed to read robot pose")?;
    println!("{} (via {})", reading.display_pose(), reading.origin);
    Ok(())
}

async fn vision(config: &StationConfig, name: &str) -> Result<()> {
    let command = VisionCommand::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = VisionCommand::ALL.iter().map(|c| c.name()).collect();
        anyhow!("Unknown vision command '{name}' (expected one of {known:?})")
    })?;

    let client = VisionClient::from_settings(&config.vision);
    let reply = client
        .execute(command)
        .await
        .with_context(|| format!("Vision command {name} failed"))?;
    if reply.is_empty() {
        warn!(command = name, "Vision controller sent an empty reply");
    }
    println!("{reply}");
    Ok(())
}
