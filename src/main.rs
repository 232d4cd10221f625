//! Topology monitor daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌────────────────────────────────────────────────────────────────┐
//!   │                        TOPOLOGY MONITOR                         │
//!   │                                                                 │
//!   │   ┌───────────────┐  snapshot   ┌──────────────────────────┐   │
//!   │   │ ProbeScheduler│────────────▶│     SharedStateStore      │   │
//!   │   │  chunked      │             │  RwLock<document>         │   │
//!   │   │  worker pool  │────────────▶│  apply → write → publish  │──┼──▶ subscribers
//!   │   └──────┬────────┘   update    └──────┬──────────┬─────────┘   │
//!   │          │                             │          │             │
//!   │          ▼                             ▼          ▼             │
//!   │   ┌───────────────┐           ┌─────────────┐ ┌────────────┐   │
//!   │   │  IcmpProber   │           │ flush loop  │ │ external   │   │
//!   │   │  echo / RTT   │           │ expiry loop │ │ edit poll  │◀──┼── other processes
//!   │   └───────────────┘           └──────┬──────┘ └────────────┘   │
//!   │                                      ▼                          │
//!   │                              topology.json                      │
//!   └────────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use topology_monitor::config::load_or_default;
use topology_monitor::lifecycle::signals::wait_for_signal;
use topology_monitor::observability::{logging, metrics};
use topology_monitor::probe::IcmpProber;
use topology_monitor::Supervisor;

#[derive(Parser)]
#[command(name = "topology-monitor")]
#[command(about = "Keeps a live, durable view of network topology liveness", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the topology document path.
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Seconds to wait for background tasks on shutdown.
    #[arg(long, default_value_t = 10)]
    grace_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_or_default(args.config.as_deref())?;
    if let Some(data) = args.data {
        config.store.data_path = data;
    }

    logging::init(&config.observability);
    tracing::info!("topology-monitor v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        data_path = %config.store.data_path.display(),
        chunk_size = config.probe.chunk_size,
        workers = config.probe.worker_count(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let prober = IcmpProber::new(&config.probe);
    let supervisor = Supervisor::start(config, prober).await;

    wait_for_signal().await;
    supervisor.shutdown(Duration::from_secs(args.grace_secs)).await;
    Ok(())
}
