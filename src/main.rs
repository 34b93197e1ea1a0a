//! Qubino Shutter GW
//!
//! Gateway exposing Qubino Z-Wave shutters as window coverings with position and tilt.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qubino_shutter_gw::api::{self, ApiState};
use qubino_shutter_gw::config::AppConfig;
use qubino_shutter_gw::error::ShutterError;
use qubino_shutter_gw::manager::{DeviceRegistry, ManagerSettings, ShutterManager};
use qubino_shutter_gw::zwave::{self, SimulatedTransport, Transport, TransportCommand, TransportHandle, ZWaveEvent};

/// Qubino Shutter GW - Z-Wave shutters as window coverings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Discover devices, print them and exit
    #[arg(long)]
    list_devices: bool,

    /// Do not start the accessory API
    #[arg(long)]
    no_api: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting Qubino Shutter GW...");
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load(&args.config).await?;

    let transport: Arc<dyn Transport> = Arc::new(SimulatedTransport::new(config.simulator.clone()));
    let (handle, cmd_rx) = TransportHandle::channel();
    let mut manager = ShutterManager::new(ManagerSettings::from(&config), handle);

    info!("Connecting to {} via {} transport", config.zwave.path, transport.name());
    let mut events = transport
        .connect(&config.zwave.path)
        .await
        .map_err(|e| ShutterError::ConnectionFailure(e.to_string()))?;

    let devices = manager.discover(&mut events).await?;
    info!("Discovered {} shutter(s): {:?}", devices.len(), devices);

    if args.list_devices {
        print_devices(&manager.registry());
        transport.shutdown().await?;
        return Ok(());
    }

    if config.api.enabled && !args.no_api {
        let state = Arc::new(ApiState {
            registry: manager.registry(),
            update_tx: manager.updates_sender(),
        });
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = api::start_server(state, port).await {
                warn!("Accessory API stopped: {:#}", e);
            }
        });
    }

    run_app(manager, transport, events, cmd_rx, shutdown_signal()).await?;

    info!("Qubino Shutter GW shutdown complete");
    Ok(())
}

async fn run_app(
    mut manager: ShutterManager,
    transport: Arc<dyn Transport>,
    mut events: mpsc::Receiver<ZWaveEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<TransportCommand>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    info!("Ready to process Z-Wave events!");

    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            // Telemetry from the controller
            event = events.recv() => {
                let Some(event) = event else {
                    break Err(anyhow::anyhow!("Z-Wave event stream closed"));
                };
                match manager.handle_event(event) {
                    Ok(()) => {}
                    Err(e @ ShutterError::ConnectionFailure(_)) => break Err(e.into()),
                    Err(e) => warn!("Dropped event: {}", e),
                }
            }

            // Commands from the shutters to the controller
            Some(cmd) = cmd_rx.recv() => {
                debug!("Dispatching {:?}", cmd);
                if let Err(e) = zwave::dispatch(transport.as_ref(), cmd).await {
                    warn!("Failed to send {:?}: {:#}", cmd, e);
                }
            }

            _ = &mut shutdown => {
                debug!("Stopping event loop");
                break Ok(());
            }
        }
    };

    // Cleanup
    info!("Shutting down...");
    manager.shutdown();
    transport
        .shutdown()
        .await
        .context("Failed to close Z-Wave transport")?;

    result
}

fn print_devices(registry: &DeviceRegistry) {
    use colored::*;

    println!("\n{}", "=== Discovered Shutters ===".bold().cyan());
    if registry.is_empty() {
        println!("  {}", "none".yellow());
        return;
    }

    for snapshot in registry.snapshots() {
        println!("\n  {}:", snapshot.name.bright_white());
        for axis in &snapshot.axes {
            let node = axis
                .node_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "    {:<9} node {:>3}  current {:>2}  target {:>2}  {:?}",
                axis.axis.to_string().yellow(),
                node,
                axis.current.to_string().green(),
                axis.target.to_string().green(),
                axis.motion
            );
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
