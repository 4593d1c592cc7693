//! ntnx-ccm - Nutanix cloud controller manager tooling

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use ntnx_cloud_provider::IgnoredAddressSet;
use ntnx_common::config::{ccm_namespace, Config, TopologyDiscovery};
use ntnx_common::telemetry::{init_tracing, TelemetryConfig};

/// Nutanix cloud controller manager
#[derive(Parser, Debug)]
#[command(name = "ntnx-ccm", version, about, long_about = None)]
struct Cli {
    /// Emit JSON structured logs
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate a cloud config, then print the effective settings
    ///
    /// Checks the topology discovery settings, every ignoredNodeIPs entry and
    /// that POD_NAMESPACE is set. Exits non-zero on the first problem.
    Validate {
        /// Path to the cloud config JSON document
        #[arg(long, env = "CLOUD_CONFIG")]
        cloud_config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(TelemetryConfig { json: cli.log_json })?;

    match cli.command {
        Commands::Validate { cloud_config } => validate(&cloud_config),
    }
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let file = File::open(path)
        .with_context(|| format!("failed to open cloud config {}", path.display()))?;
    let config = Config::from_reader(file)
        .with_context(|| format!("invalid cloud config {}", path.display()))?;

    let ignored = IgnoredAddressSet::parse(&config.ignored_node_ips)?;
    if ignored.is_empty() {
        info!("no node addresses are ignored");
    }

    let namespace = ccm_namespace()?;
    let prism_central = config.prism_central.clone().with_default_namespace(&namespace);
    if prism_central.address.is_empty() {
        warn!("prismCentral.address is empty");
    }

    match &config.topology_discovery {
        TopologyDiscovery::Prism => info!(strategy = "Prism", "topology discovery"),
        TopologyDiscovery::Categories(keys) => info!(
            strategy = "Categories",
            region_category = %keys.region_category,
            zone_category = %keys.zone_category,
            "topology discovery"
        ),
    }

    info!(
        namespace = %namespace,
        prism_central = %prism_central.address,
        port = prism_central.port,
        custom_labeling = config.enable_custom_labeling,
        ignored_entries = config.ignored_node_ips.len(),
        "cloud config is valid"
    );
    println!("{}", serde_json::to_string_pretty(&Config { prism_central, ..config })?);
    Ok(())
}
