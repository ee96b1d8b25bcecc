//! dht-station entry point
//!
//! Loads the configuration, wires the host network adapter, the MQTT session
//! and the IIO sensor into a supervisor, and runs until SIGINT or SIGTERM.

use clap::{Parser, Subcommand};
use dht_station::config::StationConfig;
use dht_station::observability::{init_logging, LogSettings};
use dht_station::sensor::IioDht22;
use dht_station::supervisor::{Collaborators, Supervisor};
use dht_station::transport::mqtt::parse_broker_url;
use dht_station::transport::{network_channel, session_channel, HostNetwork, MqttSession};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Temperature/humidity telemetry station
#[derive(Parser)]
#[command(name = "dht-station")]
#[command(about = "Publishes DHT22 readings over MQTT while the link and session are healthy")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "DHT_STATION_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the station
    Run,
    /// Validate configuration
    Config {
        /// Print the parsed configuration
        #[arg(long)]
        show: bool,
    },
}

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "station.toml",
    "config/station.toml",
    "/etc/dht-station/station.toml",
];

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(LogSettings::from_env().with_verbosity(cli.verbose));

    info!("Starting dht-station v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_station(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: Option<&Path>,
) -> Result<StationConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(StationConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(StationConfig::load_from_file(path)?);
        }
    }

    Err("no configuration file found; pass -c/--config or create station.toml".into())
}

async fn run_station(config: StationConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(station = %config.station.id, "Station starting");

    let broker = parse_broker_url(&config.mqtt.broker_url)?;
    let probe_addr = config
        .network
        .probe_addr
        .clone()
        .unwrap_or_else(|| broker.socket_addr());

    let (network_tx, network_rx) = network_channel();
    let (session_tx, session_rx) = session_channel();

    let network = HostNetwork::new(
        config.network.ssid.clone(),
        config.get_network_password()?,
        probe_addr,
        config.network.retry_interval(),
        config.network.probe_interval(),
        network_tx,
    );
    let transport = MqttSession::new(&config.station.id, config.mqtt.clone(), session_tx)?;
    let sensor = IioDht22::new(
        config.sensor.iio_device.clone(),
        config.sensor.gpio_pin,
        config.sensor.min_read_spacing(),
    );

    let mut supervisor = Supervisor::new(
        &config,
        Collaborators {
            network: Arc::new(network),
            transport: Arc::new(transport),
            sensor: Arc::new(sensor),
        },
    )?;
    supervisor.start(network_rx, session_rx)?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }

    info!(
        snapshot = ?supervisor.snapshot(),
        metrics = %supervisor.metrics().snapshot().to_json(),
        "Station stopping"
    );
    Ok(())
}

fn handle_config_command(
    config: &StationConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    parse_broker_url(&config.mqtt.broker_url)?;

    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
