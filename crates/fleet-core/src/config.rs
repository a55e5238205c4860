//! fleet.toml policy file parser.
//!
//! A `PolicyFile` is the plain-data form of a desired state. It implements
//! [`DesiredState`] directly, so a parsed file can be handed to the engine.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::policy::{ConnectionSpec, ContainerSpec, DesiredState, MachineSpec, PlacementSpec, Range};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    pub namespace: Option<String>,
    #[serde(default)]
    pub admin_acl: Vec<String>,
    #[serde(default)]
    pub max_price: f64,
    #[serde(default, rename = "machine")]
    pub machines: Vec<MachineEntry>,
    #[serde(default, rename = "container")]
    pub containers: Vec<ContainerSpec>,
    #[serde(default, rename = "connection")]
    pub connections: Vec<ConnectionSpec>,
    #[serde(default, rename = "placement")]
    pub placements: Vec<PlacementSpec>,
    /// Raw text the file was parsed from.
    #[serde(skip)]
    source: String,
}

/// A `[[machine]]` table. `count` expands into that many identical descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineEntry {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub provider: String,
    pub size: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub cpu: Range,
    #[serde(default)]
    pub ram: Range,
    #[serde(default)]
    pub disk_size: u32,
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

impl MachineEntry {
    fn to_spec(&self) -> MachineSpec {
        MachineSpec {
            role: self.role.clone(),
            provider: self.provider.clone(),
            size: self.size.clone().filter(|s| !s.is_empty()),
            region: self.region.clone().filter(|r| !r.is_empty()),
            cpu: self.cpu,
            ram: self.ram,
            disk_size: self.disk_size,
            ssh_keys: self.ssh_keys.clone(),
        }
    }
}

impl PolicyFile {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// A policy that declares nothing but a namespace and an empty ACL.
    /// Applying it tears every machine down.
    pub fn stop(namespace: Option<&str>) -> Self {
        let mut policy = PolicyFile {
            namespace: namespace.map(str::to_string),
            ..PolicyFile::default()
        };
        policy.source = policy.to_toml_string().unwrap_or_default();
        policy
    }

    /// Scaffold a minimal policy with one master and one worker.
    pub fn scaffold(namespace: &str, provider: &str) -> Self {
        let machine = |role: &str| MachineEntry {
            role: role.to_string(),
            provider: provider.to_string(),
            size: None,
            region: None,
            cpu: Range::new(2.0, 0.0),
            ram: Range::new(4.0, 0.0),
            disk_size: 0,
            ssh_keys: Vec::new(),
            count: 1,
        };
        let mut policy = PolicyFile {
            namespace: Some(namespace.to_string()),
            admin_acl: vec!["local".to_string()],
            max_price: 0.0,
            machines: vec![machine("Master"), machine("Worker")],
            ..PolicyFile::default()
        };
        policy.source = policy.to_toml_string().unwrap_or_default();
        policy
    }
}

impl FromStr for PolicyFile {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut policy: PolicyFile = toml::from_str(s)?;
        policy.source = s.to_string();
        Ok(policy)
    }
}

impl DesiredState for PolicyFile {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    fn admin_acl(&self) -> Vec<String> {
        self.admin_acl.clone()
    }

    fn machines(&self) -> Vec<MachineSpec> {
        self.machines
            .iter()
            .flat_map(|entry| (0..entry.count).map(move |_| entry.to_spec()))
            .collect()
    }

    fn max_price(&self) -> f64 {
        self.max_price
    }

    fn containers(&self) -> Vec<ContainerSpec> {
        self.containers.clone()
    }

    fn connections(&self) -> Vec<ConnectionSpec> {
        self.connections.clone()
    }

    fn placements(&self) -> Vec<PlacementSpec> {
        self.placements.clone()
    }

    fn source(&self) -> &str {
        &self.source
    }
}
