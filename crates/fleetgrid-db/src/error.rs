//! Error types for the FleetGrid database.

use thiserror::Error;

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Recoverable database errors.
///
/// Losing track of row identity (committing or removing an id that is not
/// in its table) is not represented here: it is a caller bug and panics.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("expected exactly one cluster row, found {0}")]
    ClusterCount(usize),
}
