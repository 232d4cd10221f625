use chrono::Utc;
use clap::{Parser, Subcommand};
use std::net::Ipv4Addr;
use std::path::PathBuf;

use topology_monitor::config::ProbeConfig;
use topology_monitor::probe::{IcmpProber, Prober};
use topology_monitor::store::DocumentFile;
use topology_monitor::topology::{Status, TopologyDocument};

#[derive(Parser)]
#[command(name = "topology-cli")]
#[command(about = "Operator CLI for the topology monitor", long_about = None)]
struct Cli {
    /// Topology document shared with the running monitor.
    #[arg(short, long, default_value = "topology.json")]
    data: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize hosts, liveness and priority markers
    Summary,
    /// Mark hosts for expedited probing
    Prioritize {
        #[arg(required = true)]
        ips: Vec<Ipv4Addr>,
    },
    /// Probe a single address once
    Probe {
        ip: Ipv4Addr,

        /// Use the priority probe policy
        #[arg(long)]
        priority: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let file = DocumentFile::new(cli.data);

    match cli.command {
        Commands::Summary => {
            let document = load(&file).await?;
            let online = document
                .hosts
                .iter()
                .filter(|h| h.status == Status::Online)
                .count();
            println!("Hosts:             {}", document.hosts.len());
            println!("Online:            {}", online);
            println!("Priority markers:  {}", document.priority_ips.len());
            println!("Trusted hostnames: {}", document.trusted_hostnames.len());
            match document.last_update {
                Some(at) => println!("Last sweep:        {}", at.to_rfc3339()),
                None => println!("Last sweep:        never"),
            }
            for host in &document.hosts {
                let latency = host
                    .latency_ms
                    .map(|ms| format!("{ms} ms"))
                    .unwrap_or_else(|| "-".into());
                let marker = if document.is_priority(host.ip) { " *" } else { "" };
                println!("  {:<15} {:<8} {:>8}  {}{}", host.ip, host.status, latency, host.name, marker);
            }
        }
        Commands::Prioritize { ips } => {
            let mut document = load(&file).await?;
            let report = document.mark_priority(&ips, Utc::now());
            if !report.accepted.is_empty() {
                file.write_atomic(&document.to_json_pretty()?).await?;
            }
            for ip in &report.accepted {
                println!("prioritized {ip}");
            }
            for ip in &report.rejected {
                eprintln!("unknown host {ip}, skipped");
            }
        }
        Commands::Probe { ip, priority } => {
            let prober = IcmpProber::new(&ProbeConfig::default());
            let outcome = prober.check(ip, priority).await;
            match outcome.latency_ms() {
                Some(ms) => println!("{ip} {} {ms} ms", outcome.status()),
                None => println!("{ip} {}", outcome.status()),
            }
        }
    }

    Ok(())
}

async fn load(file: &DocumentFile) -> Result<TopologyDocument, Box<dyn std::error::Error>> {
    let Some(bytes) = file.read().await? else {
        return Err(format!("{} does not exist", file.path().display()).into());
    };
    let (document, report) = TopologyDocument::from_json(&bytes)?;
    if !report.is_clean() {
        eprintln!("warning: document contained invalid entries: {report:?}");
    }
    Ok(document)
}
