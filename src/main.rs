use clap::Parser;
use dhcpswarm::{network, Args, RawTransport, Simulation, SimulationConfig};
use std::{error::Error as StdError, sync::Arc};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn StdError>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let server = match args.server {
        Some(server) => server,
        None => {
            let gateway = network::default_gateway(&args.interface).await?;
            tracing::info!("No server given, using default gateway {}", gateway);
            gateway
        }
    };

    let config = SimulationConfig::from_args(args, server)?;
    let interface = config.interface.clone();
    let simulation = Arc::new(Simulation::new(config));

    let shutdown = Arc::clone(&simulation);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, halting all clients");
            shutdown.halt();
        }
    });

    let summary = simulation
        .run(|_| Ok(RawTransport::open(&interface)?))
        .await?;

    if summary.global_stop > 0 {
        tracing::warn!("Server stopped answering; simulation halted");
    }
    Ok(())
}
