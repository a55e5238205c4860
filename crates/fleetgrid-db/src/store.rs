//! Store: the transactional in-memory database.
//!
//! `Store` is `Clone` + `Send` + `Sync` (backed by `Arc<RwLock<Tables>>`) and
//! is shared by every subsystem. Transactions take the write lock, so at most
//! one transaction body runs at a time. Standalone selects take the read lock
//! and may run alongside each other; they never see a transaction half done.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::table::{Row, TableKind, Tables};
use crate::trigger::Trigger;
use crate::types::Cluster;

/// Thread-safe handle to the database.
#[derive(Clone, Default)]
pub struct Store {
    tables: Arc<RwLock<Tables>>,
}

impl Store {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to every table.
    ///
    /// Whatever `f` returns is returned unchanged. Mutations are not rolled
    /// back when `f` fails: anything it inserted, committed or removed before
    /// returning the error stays, and triggers fire for it as usual.
    ///
    /// # Panics
    ///
    /// Re-raises any panic from `f`, such as an identity violation. The
    /// tables are restored to their state before `f` ran before the lock is
    /// released, so no reader ever sees the abandoned writes.
    pub fn transact<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut View<'_>) -> Result<T, E>,
    {
        let mut tables = self.write();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            f(&mut View {
                tables: &mut *tables,
            })
        }));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                tables.rollback();
                drop(tables);
                panic::resume_unwind(payload);
            }
        };

        let changed = tables.settle();
        if !changed.is_empty() {
            debug!(?changed, "transaction changed tables");
        }
        result
    }

    /// Copy out every row of kind `R` satisfying `check`.
    pub fn select<R, F>(&self, check: F) -> Vec<R>
    where
        R: Row,
        F: Fn(&R) -> bool,
    {
        R::table(&self.read()).select(check)
    }

    /// Copy out every row of kind `R`.
    pub fn select_all<R: Row>(&self) -> Vec<R> {
        self.select(|_: &R| true)
    }

    /// Subscribe to changes in any of `kinds`.
    ///
    /// A transaction that changes several watched tables still produces a
    /// single notification.
    pub fn trigger(&self, kinds: &[TableKind]) -> Trigger {
        let (tx, rx) = mpsc::channel(1);
        self.subscribe(kinds, &tx);
        Trigger::new(rx)
    }

    /// Like [`Store::trigger`], but also fires every `period` so that
    /// subscribers periodically resync even when nothing changed.
    ///
    /// `kinds` must not be empty: the store's subscriptions are what keep
    /// the mailbox open. Must be called from within a tokio runtime.
    pub fn trigger_tick(&self, period: Duration, kinds: &[TableKind]) -> Trigger {
        let (tx, rx) = mpsc::channel(1);
        self.subscribe(kinds, &tx);
        Trigger::new(rx).with_ticker(tx.downgrade(), period)
    }

    fn subscribe(&self, kinds: &[TableKind], tx: &mpsc::Sender<()>) {
        let mut tables = self.write();
        for kind in kinds {
            tables.subscribe(*kind, tx.clone());
        }
    }

    // Transactions roll back before unwinding past the guard, so a poisoned
    // lock never guards partial writes.
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mutable access to every table for the duration of one transaction.
///
/// Reads through the view see the transaction's own earlier writes.
pub struct View<'a> {
    tables: &'a mut Tables,
}

impl View<'_> {
    /// Add an empty row of kind `R` with a fresh id and return a copy of it
    /// for the caller to fill in and [`commit`](View::commit).
    pub fn insert<R: Row>(&mut self) -> R {
        let row = R::new(self.tables.next_id());
        R::table_mut(self.tables).insert(row.clone());
        row
    }

    /// Replace the stored row that has `row`'s id.
    ///
    /// # Panics
    ///
    /// If no row with that id exists in `R`'s table.
    pub fn commit<R: Row>(&mut self, row: R) {
        R::table_mut(self.tables).commit(row);
    }

    /// Delete the stored row that has `row`'s id.
    ///
    /// # Panics
    ///
    /// If no row with that id exists in `R`'s table.
    pub fn remove<R: Row>(&mut self, row: &R) {
        R::table_mut(self.tables).remove(row.id());
    }

    pub fn select<R, F>(&self, check: F) -> Vec<R>
    where
        R: Row,
        F: Fn(&R) -> bool,
    {
        R::table(self.tables).select(check)
    }

    pub fn select_all<R: Row>(&self) -> Vec<R> {
        self.select(|_: &R| true)
    }

    /// Number of rows currently in `R`'s table.
    pub fn count<R: Row>(&self) -> usize {
        R::table(self.tables).len()
    }

    /// The cluster row, if there is exactly one.
    pub fn cluster(&self) -> DbResult<Cluster> {
        let mut clusters = self.select_all::<Cluster>();
        match clusters.len() {
            1 => Ok(clusters.remove(0)),
            n => Err(DbError::ClusterCount(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Connection, Machine};
    use fleet_core::Role;

    fn insert_machine(store: &Store, role: Role) -> Machine {
        store
            .transact(|view| {
                let mut m = view.insert::<Machine>();
                m.role = role;
                view.commit(m.clone());
                Ok::<_, ()>(m)
            })
            .unwrap()
    }

    // ── Transactions ───────────────────────────────────────────────

    #[test]
    fn insert_commit_and_select() {
        let store = Store::new();
        let m = insert_machine(&store, Role::Master);

        let all = store.select_all::<Machine>();
        assert_eq!(all, vec![m]);
        assert!(store.select_all::<Connection>().is_empty());
    }

    #[test]
    fn select_filters_by_predicate() {
        let store = Store::new();
        insert_machine(&store, Role::Master);
        insert_machine(&store, Role::Worker);
        insert_machine(&store, Role::Worker);

        let workers = store.select(|m: &Machine| m.role == Role::Worker);
        assert_eq!(workers.len(), 2);
    }

    #[test]
    fn view_sees_its_own_writes() {
        let store = Store::new();
        store
            .transact(|view| {
                let m = view.insert::<Machine>();
                assert_eq!(view.count::<Machine>(), 1);
                view.remove(&m);
                assert!(view.select_all::<Machine>().is_empty());
                Ok::<_, ()>(())
            })
            .unwrap();
    }

    #[test]
    fn selected_rows_are_copies() {
        let store = Store::new();
        insert_machine(&store, Role::Master);

        let mut copy = store.select_all::<Machine>();
        copy[0].public_ip = "1.2.3.4".to_string();

        assert!(store.select_all::<Machine>()[0].public_ip.is_empty());
    }

    #[test]
    fn callback_error_is_returned_and_not_rolled_back() {
        let store = Store::new();
        let result: Result<(), &str> = store.transact(|view| {
            view.insert::<Machine>();
            Err("boom")
        });

        assert_eq!(result, Err("boom"));
        assert_eq!(store.select_all::<Machine>().len(), 1);
    }

    #[test]
    fn ids_increase_even_after_removal() {
        let store = Store::new();
        let first = insert_machine(&store, Role::Worker);
        store
            .transact(|view| {
                view.remove(&first);
                Ok::<_, ()>(())
            })
            .unwrap();

        let second = insert_machine(&store, Role::Worker);
        let conn = store
            .transact(|view| Ok::<_, ()>(view.insert::<Connection>()))
            .unwrap();
        assert!(second.id > first.id);
        assert!(conn.id > second.id);
    }

    #[test]
    fn identity_violation_discards_the_whole_transaction() {
        let store = Store::new();
        let kept = insert_machine(&store, Role::Master);
        let mut trigger = store.trigger(&[TableKind::Machine]);

        let clone = store.clone();
        let victim = kept.clone();
        let result = std::thread::spawn(move || {
            clone.transact(|view| {
                view.insert::<Machine>();
                view.insert::<Machine>();
                view.remove(&victim);
                view.commit(Machine::new(999));
                Ok::<_, ()>(())
            })
        })
        .join();
        assert!(result.is_err());

        assert_eq!(store.select_all::<Machine>(), vec![kept.clone()]);
        assert!(!trigger.try_changed());

        // Still usable, and ids handed out by the abandoned body stay spent.
        let next = insert_machine(&store, Role::Worker);
        assert!(next.id > kept.id + 2);
        assert_eq!(store.select_all::<Machine>().len(), 2);
    }

    #[test]
    fn cluster_requires_exactly_one_row() {
        let store = Store::new();
        store
            .transact(|view| {
                assert!(matches!(view.cluster(), Err(DbError::ClusterCount(0))));
                let mut c = view.insert::<Cluster>();
                c.namespace = "prod".to_string();
                view.commit(c);
                assert_eq!(view.cluster().unwrap().namespace, "prod");
                view.insert::<Cluster>();
                assert!(matches!(view.cluster(), Err(DbError::ClusterCount(2))));
                Ok::<_, ()>(())
            })
            .unwrap();
    }

    #[test]
    fn concurrent_transactions_are_serialized() {
        let store = Store::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        store
                            .transact(|view| {
                                // Read-modify-write that would lose updates
                                // if two bodies interleaved.
                                let n = view.count::<Machine>();
                                view.insert::<Machine>();
                                assert_eq!(view.count::<Machine>(), n + 1);
                                Ok::<_, ()>(())
                            })
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(store.select_all::<Machine>().len(), 400);
    }

    #[test]
    fn readers_never_see_half_a_transaction() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let store = Store::new();
        let done = AtomicBool::new(false);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        store
                            .transact(|view| {
                                view.insert::<Machine>();
                                view.insert::<Machine>();
                                Ok::<_, ()>(())
                            })
                            .unwrap();
                    }
                });
            }
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        let mut reads = 0;
                        while !done.load(Ordering::Relaxed) || reads == 0 {
                            let n = store.select_all::<Machine>().len();
                            assert_eq!(n % 2, 0, "saw {n} machines");
                            reads += 1;
                        }
                    })
                })
                .collect();

            // Writers are joined by the scope; wait for the table to fill
            // before releasing the readers.
            while store.select_all::<Machine>().len() < 800 {
                std::thread::yield_now();
            }
            done.store(true, Ordering::Relaxed);
            for reader in readers {
                reader.join().unwrap();
            }
        });
        assert_eq!(store.select_all::<Machine>().len(), 800);
    }

    // ── Triggers ───────────────────────────────────────────────────

    #[test]
    fn trigger_fires_on_change() {
        let store = Store::new();
        let mut trigger = store.trigger(&[TableKind::Machine]);

        insert_machine(&store, Role::Master);
        assert!(trigger.try_changed());
        assert!(!trigger.try_changed());
    }

    #[test]
    fn trigger_ignores_other_tables() {
        let store = Store::new();
        let mut trigger = store.trigger(&[TableKind::Connection]);

        insert_machine(&store, Role::Master);
        assert!(!trigger.try_changed());
    }

    #[test]
    fn trigger_does_not_fire_for_value_identical_commit() {
        let store = Store::new();
        let m = insert_machine(&store, Role::Master);
        let mut trigger = store.trigger(&[TableKind::Machine]);

        store
            .transact(|view| {
                view.commit(m.clone());
                Ok::<_, ()>(())
            })
            .unwrap();
        assert!(!trigger.try_changed());
    }

    #[test]
    fn trigger_coalesces_multiple_changes() {
        let store = Store::new();
        let mut trigger = store.trigger(&[TableKind::Machine, TableKind::Connection]);

        insert_machine(&store, Role::Master);
        insert_machine(&store, Role::Worker);
        store
            .transact(|view| Ok::<_, ()>(view.insert::<Connection>()))
            .unwrap();

        assert!(trigger.try_changed());
        assert!(!trigger.try_changed());
    }

    #[test]
    fn trigger_fires_for_partial_work_of_failed_transaction() {
        let store = Store::new();
        let mut trigger = store.trigger(&[TableKind::Machine]);

        let _ = store.transact(|view| {
            view.insert::<Machine>();
            Err::<(), _>("late failure")
        });
        assert!(trigger.try_changed());
    }

    #[test]
    fn dropped_trigger_does_not_block_writers() {
        let store = Store::new();
        let trigger = store.trigger(&[TableKind::Machine]);
        trigger.stop();

        insert_machine(&store, Role::Master);
        insert_machine(&store, Role::Master);
        assert_eq!(store.select_all::<Machine>().len(), 2);
    }

    #[tokio::test]
    async fn changed_wakes_async_subscriber() {
        let store = Store::new();
        let mut trigger = store.trigger(&[TableKind::Machine]);

        let writer = store.clone();
        tokio::spawn(async move {
            insert_machine(&writer, Role::Worker);
        });

        assert!(trigger.changed().await);
        assert_eq!(store.select_all::<Machine>().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_tick_fires_periodically() {
        let store = Store::new();
        let mut trigger = store.trigger_tick(Duration::from_secs(30), &[TableKind::Machine]);

        // First tick is immediate.
        assert!(trigger.changed().await);
        // The next one arrives after the period with no table changes.
        let waited = tokio::time::Instant::now();
        assert!(trigger.changed().await);
        assert!(waited.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn tick_trigger_closes_when_store_is_dropped() {
        let store = Store::new();
        let mut trigger = store.trigger_tick(Duration::from_secs(30), &[TableKind::Machine]);
        assert!(trigger.changed().await);

        drop(store);
        assert!(!trigger.changed().await);
    }
}
