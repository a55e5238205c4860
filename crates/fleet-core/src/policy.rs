//! The desired-state contract between a compiled policy and the reconciler.
//!
//! Whatever produces a policy (the TOML [`PolicyFile`](crate::PolicyFile), a
//! test fixture, an RPC payload) hands the engine a [`DesiredState`]. The
//! engine only ever queries it; it never sees policy syntax.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A compiled desired state, queried by the reconciler.
pub trait DesiredState {
    /// Namespace the deployment lives in, if the policy declares one.
    fn namespace(&self) -> Option<&str>;

    /// Admin ACL entries in declaration order. May contain the `"local"` sentinel.
    fn admin_acl(&self) -> Vec<String>;

    /// Machine descriptors, one per desired machine.
    fn machines(&self) -> Vec<MachineSpec>;

    /// Hourly price ceiling used when a machine leaves its size unspecified.
    /// Zero means no ceiling.
    fn max_price(&self) -> f64;

    fn containers(&self) -> Vec<ContainerSpec> {
        Vec::new()
    }

    fn connections(&self) -> Vec<ConnectionSpec> {
        Vec::new()
    }

    fn placements(&self) -> Vec<PlacementSpec> {
        Vec::new()
    }

    /// The policy text this state was compiled from, stored verbatim for audit.
    fn source(&self) -> &str;
}

/// Inclusive bound on a machine attribute. A `max` of zero means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn accepts(&self, x: f64) -> bool {
        self.min <= x && (self.max == 0.0 || x <= self.max)
    }
}

/// One desired machine, as declared by the policy. Role and provider are
/// still raw strings; the engine validates them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineSpec {
    pub role: String,
    pub provider: String,
    pub size: Option<String>,
    pub region: Option<String>,
    pub cpu: Range,
    pub ram: Range,
    pub disk_size: u32,
    pub ssh_keys: Vec<String>,
}

/// A desired container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Permission for containers labelled `from` to reach those labelled `to`
/// on ports `min_port..=max_port`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub from: String,
    pub to: String,
    pub min_port: u16,
    pub max_port: u16,
}

/// A scheduling constraint on where containers with `target_label` may run,
/// relative to another label or to machine attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlacementSpec {
    pub target_label: String,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub other_label: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub region: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_with_zero_max_is_unbounded() {
        let r = Range::new(2.0, 0.0);
        assert!(!r.accepts(1.0));
        assert!(r.accepts(2.0));
        assert!(r.accepts(512.0));
    }

    #[test]
    fn range_max_is_inclusive() {
        let r = Range::new(1.0, 4.0);
        assert!(r.accepts(4.0));
        assert!(!r.accepts(4.5));
    }

    #[test]
    fn default_range_accepts_anything_non_negative() {
        assert!(Range::default().accepts(0.0));
        assert!(Range::default().accepts(64.0));
    }
}
