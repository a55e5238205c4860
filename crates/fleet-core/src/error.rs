//! Error types shared by FleetGrid crates.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while reading a policy or interpreting its values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed policy: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render policy: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("unknown role: {0:?}")]
    UnknownRole(String),

    #[error("unknown provider: {0:?}")]
    UnknownProvider(String),
}
