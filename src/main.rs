use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use safestep_edge::{ClientConfig, EdgeClient};

/// SafeStep edge capture client
#[derive(Debug, Parser)]
#[command(name = "safestep-edge", version)]
struct Cli {
    /// Server port (default 5000)
    port: Option<u16>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = ClientConfig::discover().context("loading configuration")?;
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }

    let client = Arc::new(EdgeClient::from_config(&config).context("building client")?);

    let signal_client = client.clone();
    ctrlc::set_handler(move || {
        log::info!("Shutdown requested");
        signal_client.shutdown();
    })
    .context("installing signal handler")?;

    log::info!(
        "SafeStep edge client {} starting, server {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.host,
        config.server.port
    );
    client.start();

    while client.is_running() {
        thread::sleep(Duration::from_secs(1));
    }

    client.shutdown();
    log::info!("Bye");
    Ok(())
}
