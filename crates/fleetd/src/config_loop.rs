//! Config loop: re-reads the policy file on an interval and reconciles it.
//!
//! A second task watches the machine table and logs every change, which is
//! where a provisioning driver would hook in.

use std::path::PathBuf;
use std::time::Duration;

use fleet_core::{PolicyFile, Role};
use fleetgrid_db::{Machine, Store, Trigger};
use fleetgrid_engine::{EngineResult, ReconcileReport, Reconciler};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Periodically applies the policy file at `path`.
pub struct ConfigLoop {
    reconciler: Reconciler,
    path: PathBuf,
    interval: Duration,
}

impl ConfigLoop {
    pub fn new(reconciler: Reconciler, path: PathBuf, interval: Duration) -> Self {
        Self {
            reconciler,
            path,
            interval,
        }
    }

    /// Read the policy file and apply it once.
    pub fn tick(&self) -> EngineResult<ReconcileReport> {
        let policy = PolicyFile::from_file(&self.path)?;
        self.reconciler.update_policy(&policy)
    }

    /// Run until `shutdown` flips. The first pass runs immediately. A policy
    /// that can't be read or parsed is logged and retried on the next tick;
    /// the database keeps whatever the last good policy produced.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            path = %self.path.display(),
            interval_secs = self.interval.as_secs(),
            "config loop started"
        );

        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        warn!(path = %self.path.display(), error = %e, "policy not applied");
                    }
                }
                _ = shutdown.changed() => {
                    info!("config loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Machine counts by role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Census {
    pub masters: usize,
    pub workers: usize,
    pub unassigned: usize,
    /// Machines with both addresses known.
    pub provisioned: usize,
}

impl Census {
    pub fn of(machines: &[Machine]) -> Self {
        let mut census = Census::default();
        for m in machines {
            match m.role {
                Role::Master => census.masters += 1,
                Role::Worker => census.workers += 1,
                Role::None => census.unassigned += 1,
            }
            if m.is_provisioned() {
                census.provisioned += 1;
            }
        }
        census
    }
}

/// Log the machine table every time `trigger` fires, until `shutdown` flips.
///
/// The caller subscribes so that no change between spawning this task and
/// its first poll goes unlogged.
pub async fn watch_machines(
    store: Store,
    mut trigger: Trigger,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            alive = trigger.changed() => {
                if !alive {
                    break;
                }
                let machines = store.select_all::<Machine>();
                let census = Census::of(&machines);
                info!(
                    masters = census.masters,
                    workers = census.workers,
                    unassigned = census.unassigned,
                    provisioned = census.provisioned,
                    "machine table changed"
                );
                for m in &machines {
                    debug!(machine = %m);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    trigger.stop();
    debug!("machine watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fleetgrid_db::TableKind;
    use fleetgrid_engine::EngineError;

    fn fixed_ip() -> EngineResult<String> {
        Ok("192.0.2.10".to_string())
    }

    fn test_loop(path: PathBuf, store: &Store) -> ConfigLoop {
        let reconciler = Reconciler::new(store.clone(), Arc::new(fixed_ip));
        ConfigLoop::new(reconciler, path, Duration::from_secs(5))
    }

    const POLICY: &str = r#"
namespace = "loop"

[[machine]]
role = "Master"
provider = "Amazon"
size = "m4.large"

[[machine]]
role = "Worker"
provider = "Amazon"
size = "m4.large"
count = 2
"#;

    #[test]
    fn tick_applies_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, POLICY).unwrap();

        let store = Store::new();
        let report = test_loop(path, &store).tick().unwrap();
        assert_eq!(report.machines.added, 3);

        let census = Census::of(&store.select_all::<Machine>());
        assert_eq!((census.masters, census.workers), (1, 2));
    }

    #[test]
    fn tick_with_missing_file_leaves_store_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new();

        let err = test_loop(dir.path().join("absent.toml"), &store)
            .tick()
            .unwrap_err();
        assert!(matches!(err, EngineError::Policy(_)));
        assert!(store.select_all::<Machine>().is_empty());
    }

    #[test]
    fn census_counts_roles_and_provisioning() {
        let machines = vec![
            Machine {
                role: Role::Master,
                public_ip: "1.1.1.1".to_string(),
                private_ip: "10.0.0.1".to_string(),
                ..Machine::default()
            },
            Machine {
                role: Role::Worker,
                private_ip: "10.0.0.2".to_string(),
                ..Machine::default()
            },
            Machine::default(),
        ];
        assert_eq!(
            Census::of(&machines),
            Census {
                masters: 1,
                workers: 1,
                unassigned: 1,
                provisioned: 1,
            }
        );
    }

    #[tokio::test]
    async fn run_reconciles_then_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, POLICY).unwrap();

        let store = Store::new();
        let mut trigger = store.trigger(&[TableKind::Machine]);
        let config_loop = test_loop(path, &store);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { config_loop.run(shutdown_rx).await });

        assert!(trigger.changed().await);
        assert_eq!(store.select_all::<Machine>().len(), 3);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn watcher_exits_on_shutdown() {
        let store = Store::new();
        let trigger = store.trigger(&[TableKind::Machine]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(watch_machines(store.clone(), trigger, shutdown_rx));

        store
            .transact(|view| Ok::<_, ()>(view.insert::<Machine>()))
            .unwrap();
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn trigger_subscribed_before_spawn_sees_first_commit() {
        let store = Store::new();
        let mut trigger = store.trigger(&[TableKind::Machine]);

        // Commit lands before any watcher task runs.
        store
            .transact(|view| Ok::<_, ()>(view.insert::<Machine>()))
            .unwrap();
        assert!(trigger.try_changed());
    }
}
