//! Reconciler: applies a desired state to the database.
//!
//! One call to [`Reconciler::update_policy`] is one convergence step: it
//! runs a single store transaction that brings the cluster, machine and
//! workload tables in line with the desired state. The reconciler holds no
//! state of its own between calls.

use std::str::FromStr;
use std::sync::Arc;

use fleet_core::{DesiredState, PolicyFile, ProviderCatalog, StaticCatalog};
use fleetgrid_db::{Cluster, Store, View, sort_rows};
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::machines::{self, DEFAULT_DISK_SIZE};
use crate::network::NetworkInfo;
use crate::workloads;

/// ACL entry that stands for "wherever this host connects from".
const LOCAL_ACL: &str = "local";

/// Defaults applied when a policy leaves something unspecified.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerConfig {
    /// Namespace used when the policy names none.
    pub default_namespace: String,
    /// Disk size (GiB) used when a machine's is zero.
    pub default_disk_size: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            default_namespace: "default-namespace".to_string(),
            default_disk_size: DEFAULT_DISK_SIZE,
        }
    }
}

/// Row counts for one table after a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diff {
    /// Existing rows matched to a desired entry (possibly updated in place).
    pub kept: usize,
    pub added: usize,
    pub removed: usize,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub namespace: String,
    pub machines: Diff,
    /// The machine step was skipped because the desired machines had masters
    /// without workers or workers without masters.
    pub topology_rejected: bool,
    pub containers: Diff,
    pub connections: Diff,
    pub placements: Diff,
}

/// Reconciles desired states into a [`Store`].
pub struct Reconciler {
    store: Store,
    network: Arc<dyn NetworkInfo>,
    catalog: Arc<dyn ProviderCatalog>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler over `store` using the built-in provider catalog.
    pub fn new(store: Store, network: Arc<dyn NetworkInfo>) -> Self {
        Self {
            store,
            network,
            catalog: Arc::new(StaticCatalog),
            config: ReconcilerConfig::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ProviderCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Parse `text` as a policy file and apply it.
    ///
    /// A policy that fails to parse is returned as an error before any
    /// transaction runs, so the database is untouched.
    pub fn apply_source(&self, text: &str) -> EngineResult<ReconcileReport> {
        let policy = PolicyFile::from_str(text)?;
        self.update_policy(&policy)
    }

    /// Apply `desired` to the database in a single transaction.
    ///
    /// Problems with individual entries are logged and skipped rather than
    /// failing the pass.
    pub fn update_policy<D: DesiredState + ?Sized>(
        &self,
        desired: &D,
    ) -> EngineResult<ReconcileReport> {
        // Resolve everything that needs I/O or catalog lookups before taking
        // the write lock.
        let namespace = match desired.namespace() {
            Some(ns) => ns.to_string(),
            None => {
                warn!(
                    namespace = %self.config.default_namespace,
                    "policy has no namespace, using the default"
                );
                self.config.default_namespace.clone()
            }
        };
        let admin_acl = self.resolve_acl(desired.admin_acl());
        let candidates =
            machines::candidates(desired, self.catalog.as_ref(), self.config.default_disk_size);
        let containers = desired.containers();
        let connections = desired.connections();
        let placements = desired.placements();

        let report = self.store.transact(|view| {
            update_cluster(view, &namespace, desired.source(), admin_acl);

            let mut report = ReconcileReport {
                namespace: namespace.clone(),
                ..ReconcileReport::default()
            };
            match candidates {
                Some(candidates) => report.machines = machines::reconcile(view, candidates),
                None => report.topology_rejected = true,
            }
            report.containers = workloads::reconcile_containers(view, containers);
            report.connections = workloads::reconcile_connections(view, connections);
            report.placements = workloads::reconcile_placements(view, placements);
            EngineResult::Ok(report)
        })?;

        info!(
            namespace = %report.namespace,
            machines_added = report.machines.added,
            machines_removed = report.machines.removed,
            machines_kept = report.machines.kept,
            topology_rejected = report.topology_rejected,
            "policy applied"
        );
        Ok(report)
    }

    /// Replace each `"local"` entry with this host's address as a /32.
    /// Entries whose lookup fails are dropped.
    fn resolve_acl(&self, acl: Vec<String>) -> Vec<String> {
        acl.into_iter()
            .filter_map(|entry| {
                if entry != LOCAL_ACL {
                    return Some(entry);
                }
                match self.network.my_ip() {
                    Ok(ip) => Some(format!("{ip}/32")),
                    Err(e) => {
                        warn!(error = %e, "could not resolve local address, dropping ACL entry");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Locate or create the singleton cluster row and write the policy's view of
/// it. Stray extra rows are removed, keeping the oldest.
fn update_cluster(view: &mut View<'_>, namespace: &str, source: &str, admin_acl: Vec<String>) {
    let mut clusters = sort_rows(view.select_all::<Cluster>()).into_iter();
    let mut cluster = match clusters.next() {
        Some(cluster) => cluster,
        None => {
            debug!("creating cluster row");
            view.insert::<Cluster>()
        }
    };
    for extra in clusters {
        warn!(cluster = %extra, "removing duplicate cluster row");
        view.remove(&extra);
    }

    cluster.namespace = namespace.to_string();
    cluster.spec = source.to_string();
    cluster.admin_acl = admin_acl;
    view.commit(cluster);
}
