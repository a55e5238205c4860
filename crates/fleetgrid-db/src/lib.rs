//! fleetgrid-db: the in-memory database shared by every FleetGrid subsystem.
//!
//! One [`Store`] holds a table per row kind (clusters, machines, containers,
//! connections, placements). All mutation goes through [`Store::transact`],
//! which serializes writers and hands the callback a [`View`] over every
//! table. Readers always get copies.
//!
//! # Triggers
//!
//! Subsystems that react to the database (cloud drivers, foremen, the
//! daemon's watcher) subscribe with [`Store::trigger`]. After a transaction
//! ends, each table is compared by value against its state when the
//! transaction began; only tables whose contents actually changed alert
//! their subscribers. Re-applying an unchanged policy therefore wakes nobody.
//!
//! Each subscriber has a single-slot mailbox. Alerts never block the writer;
//! if the slot is already full the alert is dropped, so several changes
//! before the subscriber drains collapse into one notification.

pub mod error;
pub mod store;
pub mod table;
pub mod trigger;
pub mod types;

pub use error::{DbError, DbResult};
pub use store::{Store, View};
pub use table::{Row, RowId, TableKind, sort_rows};
pub use trigger::Trigger;
pub use types::*;
