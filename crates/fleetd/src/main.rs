//! fleetd: the FleetGrid daemon.
//!
//! Single binary around the FleetGrid core:
//! - In-memory cluster database
//! - Policy engine
//! - Config loop that re-applies a policy file on an interval
//!
//! # Usage
//!
//! ```text
//! fleetd init prod --provider Amazon > fleet.toml
//! fleetd plan fleet.toml
//! fleetd run fleet.toml --interval-secs 5
//! fleetd stop prod --out fleet.toml
//! ```

mod config_loop;
mod network;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use fleet_core::PolicyFile;
use fleetgrid_db::{
    Cluster, Connection, Container, Machine, Placement, Store, TableKind, sort_machines, sort_rows,
};
use fleetgrid_engine::Reconciler;

use crate::config_loop::{ConfigLoop, watch_machines};
use crate::network::OutboundIp;

#[derive(Parser)]
#[command(name = "fleetd", about = "FleetGrid daemon")]
struct Cli {
    /// Log filter, e.g. "debug" or "info,fleetgrid_db=trace". Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile a policy file continuously.
    Run {
        /// Path to the policy file.
        policy: PathBuf,

        /// Seconds between re-reads of the policy file.
        #[arg(long, default_value = "5")]
        interval_secs: u64,
    },

    /// Show what a policy file produces when applied to an empty cluster.
    Plan {
        /// Path to the policy file.
        policy: PathBuf,
    },

    /// Print a policy that tears every machine down. Point `run` at it to
    /// stop a cluster.
    Stop {
        /// Namespace to stop.
        namespace: Option<String>,

        /// Write the stop policy here instead of stdout (e.g. over the file
        /// `run` watches).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print a starter policy with one master and one worker.
    Init {
        namespace: String,

        #[arg(long, default_value = "Amazon")]
        provider: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => tracing_subscriber::EnvFilter::try_new(level)?,
        None => tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,fleetd=debug,fleetgrid=debug")
        }),
    };
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Command::Run {
            policy,
            interval_secs,
        } => run(policy, Duration::from_secs(interval_secs)).await,
        Command::Plan { policy } => plan(&policy),
        Command::Stop { namespace, out } => stop(namespace.as_deref(), out.as_deref()),
        Command::Init {
            namespace,
            provider,
        } => {
            let policy = PolicyFile::scaffold(&namespace, &provider);
            print!("{}", policy.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(policy: PathBuf, interval: Duration) -> anyhow::Result<()> {
    info!("FleetGrid daemon starting");

    let store = Store::new();
    let reconciler = Reconciler::new(store.clone(), Arc::new(OutboundIp::default()));
    let config_loop = ConfigLoop::new(reconciler, policy, interval);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher_shutdown = shutdown_rx.clone();

    // ── Background tasks ───────────────────────────────────────

    // Subscribe before the config loop's first pass can commit.
    let machine_trigger = store.trigger(&[TableKind::Machine]);
    let watcher_handle = tokio::spawn(watch_machines(
        store.clone(),
        machine_trigger,
        watcher_shutdown,
    ));
    let loop_handle = tokio::spawn(async move {
        config_loop.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = loop_handle.await;
    let _ = watcher_handle.await;

    info!("FleetGrid daemon stopped");
    Ok(())
}

fn plan(path: &Path) -> anyhow::Result<()> {
    let policy = PolicyFile::from_file(path)?;
    let store = Store::new();
    Reconciler::new(store.clone(), Arc::new(OutboundIp::default())).update_policy(&policy)?;
    println!("{}", serde_json::to_string_pretty(&Snapshot::of(&store))?);
    Ok(())
}

fn stop(namespace: Option<&str>, out: Option<&Path>) -> anyhow::Result<()> {
    let text = PolicyFile::stop(namespace).to_toml_string()?;
    match out {
        Some(out) => {
            std::fs::write(out, text)?;
            info!(path = %out.display(), "stop policy written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

/// Every table, in display order.
#[derive(Serialize)]
struct Snapshot {
    clusters: Vec<Cluster>,
    machines: Vec<Machine>,
    containers: Vec<Container>,
    connections: Vec<Connection>,
    placements: Vec<Placement>,
}

impl Snapshot {
    fn of(store: &Store) -> Self {
        Self {
            clusters: sort_rows(store.select_all()),
            machines: sort_machines(store.select_all()),
            containers: sort_rows(store.select_all()),
            connections: sort_rows(store.select_all()),
            placements: sort_rows(store.select_all()),
        }
    }
}
