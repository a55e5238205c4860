//! Network-info collaborator.

use crate::error::EngineResult;

/// Tells the engine which address this host reaches the outside world from.
/// The `"local"` admin ACL sentinel resolves to `<my_ip>/32`.
pub trait NetworkInfo: Send + Sync {
    fn my_ip(&self) -> EngineResult<String>;
}

impl<F> NetworkInfo for F
where
    F: Fn() -> EngineResult<String> + Send + Sync,
{
    fn my_ip(&self) -> EngineResult<String> {
        self()
    }
}
