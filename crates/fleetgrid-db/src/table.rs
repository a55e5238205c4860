//! Table definitions for the FleetGrid database.
//!
//! Every row kind has its own `Table<R>`, keyed by row id. Ids come from one
//! store-wide counter, so they only grow and are never reused, and iterating a
//! table by id is iterating it in insertion order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::types::{Cluster, Connection, Container, Machine, Placement};

/// Database row identifier.
pub type RowId = u64;

/// The kinds of rows the database stores, one table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Cluster,
    Machine,
    Container,
    Connection,
    Placement,
}

impl TableKind {
    pub const ALL: [TableKind; 5] = [
        TableKind::Cluster,
        TableKind::Machine,
        TableKind::Container,
        TableKind::Connection,
        TableKind::Placement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Cluster => "Cluster",
            TableKind::Machine => "Machine",
            TableKind::Container => "Container",
            TableKind::Connection => "Connection",
            TableKind::Placement => "Placement",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value stored in exactly one table.
///
/// The `table`/`table_mut` accessors tie each row type to its table at
/// compile time, so a `Table<Machine>` can only ever hold machines.
pub trait Row: Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    const KIND: TableKind;

    /// An empty row carrying only its id.
    fn new(id: RowId) -> Self;

    fn id(&self) -> RowId;

    /// Default enumeration order for this kind. Falls back to id order.
    fn order(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }

    #[doc(hidden)]
    fn table(tables: &Tables) -> &Table<Self>;

    #[doc(hidden)]
    fn table_mut(tables: &mut Tables) -> &mut Table<Self>;
}

/// Sort rows into their kind's default order.
pub fn sort_rows<R: Row>(mut rows: Vec<R>) -> Vec<R> {
    rows.sort_by(R::order);
    rows
}

/// All rows of one kind plus the subscribers watching them.
#[derive(Debug)]
pub struct Table<R> {
    rows: BTreeMap<RowId, R>,
    /// Contents at the first mutation of the running transaction.
    before: Option<BTreeMap<RowId, R>>,
    subscribers: Vec<mpsc::Sender<()>>,
}

impl<R: Row> Table<R> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            before: None,
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, row: R) {
        self.touch();
        self.rows.insert(row.id(), row);
    }

    pub(crate) fn commit(&mut self, row: R) {
        if !self.rows.contains_key(&row.id()) {
            panic!("commit of unknown {} row {}", R::KIND, row.id());
        }
        self.touch();
        self.rows.insert(row.id(), row);
    }

    pub(crate) fn remove(&mut self, id: RowId) {
        if !self.rows.contains_key(&id) {
            panic!("remove of unknown {} row {id}", R::KIND);
        }
        self.touch();
        self.rows.remove(&id);
    }

    pub(crate) fn select<F>(&self, check: F) -> Vec<R>
    where
        F: Fn(&R) -> bool,
    {
        self.rows.values().filter(|r| check(r)).cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    fn touch(&mut self) {
        if self.before.is_none() {
            self.before = Some(self.rows.clone());
        }
    }

    /// Close out a transaction. Returns whether the contents differ from
    /// what they were when it began, alerting subscribers if so.
    fn settle(&mut self) -> bool {
        let changed = self
            .before
            .take()
            .is_some_and(|before| before != self.rows);
        if changed {
            self.alert();
        }
        changed
    }

    /// Abandon a transaction, restoring the contents it started from.
    fn rollback(&mut self) {
        if let Some(before) = self.before.take() {
            self.rows = before;
        }
    }

    fn alert(&mut self) {
        self.subscribers.retain(|tx| match tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Closed(())) => false,
        });
    }
}

/// Every table in the database, plus the id counter they share.
#[derive(Debug)]
pub struct Tables {
    next_id: RowId,
    pub(crate) clusters: Table<Cluster>,
    pub(crate) machines: Table<Machine>,
    pub(crate) containers: Table<Container>,
    pub(crate) connections: Table<Connection>,
    pub(crate) placements: Table<Placement>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            next_id: 0,
            clusters: Table::new(),
            machines: Table::new(),
            containers: Table::new(),
            connections: Table::new(),
            placements: Table::new(),
        }
    }
}

impl Tables {
    pub(crate) fn next_id(&mut self) -> RowId {
        self.next_id += 1;
        self.next_id
    }

    /// Close out a transaction on every table; returns the kinds that changed.
    pub(crate) fn settle(&mut self) -> Vec<TableKind> {
        let changed = [
            (TableKind::Cluster, self.clusters.settle()),
            (TableKind::Machine, self.machines.settle()),
            (TableKind::Container, self.containers.settle()),
            (TableKind::Connection, self.connections.settle()),
            (TableKind::Placement, self.placements.settle()),
        ];
        changed
            .into_iter()
            .filter_map(|(kind, changed)| changed.then_some(kind))
            .collect()
    }

    /// Restore every table to its state when the transaction began. Ids
    /// handed out meanwhile stay consumed.
    pub(crate) fn rollback(&mut self) {
        self.clusters.rollback();
        self.machines.rollback();
        self.containers.rollback();
        self.connections.rollback();
        self.placements.rollback();
    }

    pub(crate) fn subscribe(&mut self, kind: TableKind, tx: mpsc::Sender<()>) {
        let subscribers = match kind {
            TableKind::Cluster => &mut self.clusters.subscribers,
            TableKind::Machine => &mut self.machines.subscribers,
            TableKind::Container => &mut self.containers.subscribers,
            TableKind::Connection => &mut self.connections.subscribers,
            TableKind::Placement => &mut self.placements.subscribers,
        };
        subscribers.push(tx);
    }
}
