// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nodeward_cli::{init_logging, DaemonConfig};
use nodeward_core::cluster::{find_node_by_addresses, node_name};
use nodeward_core::{local_ipv4_addrs, ClusterStore, FileClusterStore, NodeAgent, PowershellRunner};
use nodeward_model::{version_from_document_name, ConfigurationDocument};
use nodeward_scm::ScManager;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser)]
#[command(name = "nodeward", version)]
#[command(about = "Keeps a node's native services in line with the cluster's desired state")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "NODEWARD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Namespace holding the services documents
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Root of the file-backed cluster store
    #[arg(long, global = true)]
    cluster_dir: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bootstrap services of one document version
    Bootstrap {
        #[arg(long)]
        desired_version: String,
    },
    /// Run a single reconcile pass for this node
    Reconcile {
        #[arg(long)]
        node: Option<String>,
    },
    /// Reconcile continuously until interrupted
    Run {
        #[arg(long)]
        node: Option<String>,
    },
    /// Remove every managed service and setting from this host
    Deconfigure,
    /// Parse and validate a document file, printing its service order
    Validate {
        file: PathBuf,
        /// Version to validate as. Taken from a `services-<version>` file name when omitted.
        #[arg(long = "doc-version")]
        version: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = DaemonConfig::load(cli.config.as_deref())?;
    if let Some(ns) = cli.namespace {
        config.namespace = ns;
    }
    if let Some(dir) = cli.cluster_dir {
        config.cluster_dir = dir;
    }
    config.log_json |= cli.log_json;

    if let Commands::Validate { file, version } = &cli.command {
        return cmd_validate(file, version.as_deref());
    }

    init_logging(config.log_json);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, shutting down");
            interrupt.cancel();
        }
    });

    let store: Arc<dyn ClusterStore> = Arc::new(FileClusterStore::new(&config.cluster_dir));
    let mut options = config.agent_options();
    options.cancel = cancel;
    let agent = NodeAgent::new(store.clone(), Arc::new(ScManager::new(&config.sc_path)), options)
        .with_runner(Arc::new(PowershellRunner::new(&config.powershell_path)));

    match cli.command {
        Commands::Bootstrap { desired_version } => agent.bootstrap(&desired_version).await,
        Commands::Reconcile { node } => {
            let node = identify_node(store.as_ref(), node.or(config.node_name.clone()))?;
            agent.reconcile_node(&node).await
        }
        Commands::Run { node } => {
            let node = identify_node(store.as_ref(), node.or(config.node_name.clone()))?;
            agent.run(&node).await
        }
        Commands::Deconfigure => agent.deconfigure(&config.namespace).await,
        Commands::Validate { .. } => Ok(()),
    }
}

fn identify_node(store: &dyn ClusterStore, explicit: Option<String>) -> Result<String> {
    if let Some(name) = explicit {
        return Ok(name);
    }
    let addrs = local_ipv4_addrs();
    let node = find_node_by_addresses(store, &addrs)?;
    match node.as_ref().and_then(node_name) {
        Some(name) => Ok(name.to_string()),
        None => bail!("no node record matches local addresses {:?}; pass --node", addrs),
    }
}

fn cmd_validate(file: &Path, version: Option<&str>) -> Result<()> {
    let version = match version {
        Some(v) => v.to_string(),
        None => file
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(version_from_document_name)
            .map(str::to_string)
            .context("cannot tell the version from the file name; pass --doc-version")?,
    };
    let raw = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let data: BTreeMap<String, String> =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON string map", file.display()))?;
    let doc = ConfigurationDocument::from_data(&version, &data)?;

    println!("{} is valid ({} services)", doc.name(), doc.services.len());
    for svc in &doc.services {
        let kind = if svc.bootstrap { "bootstrap" } else { "node" };
        println!("{:>6}  {:<10} {}", svc.priority, kind, svc.name);
    }
    Ok(())
}
