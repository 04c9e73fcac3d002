//! Fleetwear service daemon (fleetweard)

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser};
use fleetwear_service::{Overrides, ServiceConfig, ServiceDaemon, init_logging};
use tracing::info;

#[derive(Parser)]
#[command(name = "fleetweard")]
#[command(about = "Vehicle telemetry ingestion and hard-event detection service")]
#[command(version)]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listener port
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Listener address
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        let log_level = match self.verbose {
            0 => None,
            1 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        };
        Overrides {
            port: self.port,
            bind_addr: self.bind,
            json_logs: self.json_logs,
            log_level,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServiceConfig::load_from_path(path).await?,
        None => ServiceConfig::default(),
    };
    config.apply_overrides(&args.overrides());

    init_logging(&config.logging)?;
    info!("Starting fleetweard v{}", env!("CARGO_PKG_VERSION"));

    let daemon = ServiceDaemon::new(config)?;
    daemon.run().await?;

    info!("Service stopped");
    Ok(())
}
