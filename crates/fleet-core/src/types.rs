//! Shared types used across FleetGrid crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The part a machine plays in the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Not yet assigned by the policy engine.
    #[default]
    #[serde(rename = "")]
    None,
    Worker,
    Master,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::None => "",
            Role::Worker => "Worker",
            Role::Master => "Master",
        }
    }

    /// Rank used by the default machine order: masters first, unassigned last.
    pub fn rank(&self) -> u8 {
        match self {
            Role::Master => 0,
            Role::Worker => 1,
            Role::None => 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Role::None),
            "Worker" => Ok(Role::Worker),
            "Master" => Ok(Role::Master),
            other => Err(CoreError::UnknownRole(other.to_string())),
        }
    }
}

/// Cloud providers FleetGrid knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    Amazon,
    DigitalOcean,
    Google,
    Vagrant,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Amazon,
        Provider::DigitalOcean,
        Provider::Google,
        Provider::Vagrant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Amazon => "Amazon",
            Provider::DigitalOcean => "DigitalOcean",
            Provider::Google => "Google",
            Provider::Vagrant => "Vagrant",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CoreError::UnknownProvider(s.to_string()))
    }
}
