//! Engine error types.

use thiserror::Error;

/// Errors surfaced by a reconciliation pass.
///
/// Problems with individual policy entries are not errors: they are logged
/// and the offending entry is skipped.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("policy error: {0}")]
    Policy(#[from] fleet_core::CoreError),

    #[error("network lookup failed: {0}")]
    Network(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
