//! FleetGrid matcher: diff a desired collection against an actual one.
//!
//! Both joins split their inputs three ways: pairs to keep (and update),
//! desired elements with no partner (to create), and actual elements with no
//! partner (to destroy). They are pure functions and never block.
//!
//! # Components
//!
//! - **`join`**: greedy best-first matching under a caller-supplied score
//! - **`equi`**: exact-key matching through hash buckets

pub mod equi;
pub mod join;

pub use equi::hash_join;
pub use join::{Joined, Pair, join};
