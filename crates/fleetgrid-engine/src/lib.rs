//! fleetgrid-engine: policy reconciliation.
//!
//! Applies a compiled desired state (from `fleet-core`) to the database
//! (from `fleetgrid-db`) as a single transaction. Each pass:
//!
//! - updates the singleton cluster row (namespace, policy text, admin ACL)
//! - diffs desired machines against machine rows and applies the minimal
//!   set of inserts, removals and policy-field updates
//! - does the same for containers, connections and placements
//!
//! # Architecture
//!
//! ```text
//! Reconciler
//!   ├── Store (one transaction per pass)
//!   ├── NetworkInfo (resolves the "local" ACL sentinel)
//!   ├── ProviderCatalog (default regions, size selection)
//!   └── fleetgrid-join (score join for machines/containers,
//!                       equi-join for connections/placements)
//! ```
//!
//! The reconciler keeps no state between passes. Applying the same desired
//! state twice leaves every table value-identical, so the second pass fires
//! no triggers.

pub mod engine;
pub mod error;
pub mod machines;
pub mod network;
pub mod workloads;

pub use engine::{Diff, ReconcileReport, Reconciler, ReconcilerConfig};
pub use error::{EngineError, EngineResult};
pub use machines::{DEFAULT_DISK_SIZE, machine_score};
pub use network::NetworkInfo;
pub use workloads::container_score;
