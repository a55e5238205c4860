pub mod catalog;
pub mod config;
pub mod error;
pub mod policy;
pub mod types;

pub use catalog::{ProviderCatalog, SizeInfo, StaticCatalog};
pub use config::PolicyFile;
pub use error::{CoreError, CoreResult};
pub use policy::{ConnectionSpec, ContainerSpec, DesiredState, MachineSpec, PlacementSpec, Range};
pub use types::*;
