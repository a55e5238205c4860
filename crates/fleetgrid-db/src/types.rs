//! Row types stored in the FleetGrid database.
//!
//! Fields are grouped by who owns them. The policy engine writes the
//! policy-controlled fields; cloud drivers and the foreman fill in the rest
//! once the real resource exists. The engine never touches fields it does
//! not own.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use fleet_core::{Provider, Role};

use crate::table::{Row, RowId, Table, TableKind, Tables};

macro_rules! table_accessors {
    ($field:ident) => {
        fn id(&self) -> RowId {
            self.id
        }

        fn table(tables: &Tables) -> &Table<Self> {
            &tables.$field
        }

        fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
            &mut tables.$field
        }
    };
}

/// Writes `Kind-id{a, b, c}`, skipping empty fields.
fn write_row(
    f: &mut fmt::Formatter<'_>,
    kind: TableKind,
    id: RowId,
    fields: &[String],
) -> fmt::Result {
    let fields: Vec<&str> = fields
        .iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .collect();
    write!(f, "{kind}-{id}{{{}}}", fields.join(", "))
}

fn labelled(label: &str, value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("{label}={value}")
    }
}

// ── Cluster ───────────────────────────────────────────────────────

/// Cluster-wide settings. There is at most one cluster row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cluster {
    pub id: RowId,
    pub namespace: String,
    /// Policy text the cluster was last reconciled from.
    pub spec: String,
    /// CIDRs allowed to reach the cluster's admin interfaces.
    pub admin_acl: Vec<String>,
}

impl Row for Cluster {
    const KIND: TableKind = TableKind::Cluster;

    fn new(id: RowId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    table_accessors!(clusters);
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_row(
            f,
            Self::KIND,
            self.id,
            &[
                labelled("namespace", &self.namespace),
                labelled("acl", &self.admin_acl.join(" ")),
            ],
        )
    }
}

// ── Machine ───────────────────────────────────────────────────────

/// A virtual machine run by a cloud provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Machine {
    pub id: RowId,

    // Policy-controlled.
    pub role: Role,
    pub provider: Option<Provider>,
    pub region: String,
    pub size: String,
    pub disk_size: u32,
    pub ssh_keys: Vec<String>,

    // Infrastructure-controlled.
    pub cloud_id: String,
    pub public_ip: String,
    pub private_ip: String,
    /// Whether the minion on this machine has connected back.
    pub connected: bool,
}

impl Machine {
    /// Both addresses are known.
    pub fn is_provisioned(&self) -> bool {
        !self.public_ip.is_empty() && !self.private_ip.is_empty()
    }

    /// Neither address is known.
    pub fn is_unprovisioned(&self) -> bool {
        self.public_ip.is_empty() && self.private_ip.is_empty()
    }
}

impl Row for Machine {
    const KIND: TableKind = TableKind::Machine;

    fn new(id: RowId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Masters first and unassigned roles last; within a role, fully
    /// provisioned machines first and bare ones last; then cloud id, then id.
    fn order(&self, other: &Self) -> Ordering {
        self.role
            .rank()
            .cmp(&other.role.rank())
            .then_with(|| other.is_provisioned().cmp(&self.is_provisioned()))
            .then_with(|| self.is_unprovisioned().cmp(&other.is_unprovisioned()))
            .then_with(|| self.cloud_id.cmp(&other.cloud_id))
            .then_with(|| self.id.cmp(&other.id))
    }

    table_accessors!(machines);
}

/// Sort machines into the database's default machine order.
pub fn sort_machines(machines: Vec<Machine>) -> Vec<Machine> {
    crate::table::sort_rows(machines)
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let provider = self.provider.map(|p| p.to_string()).unwrap_or_default();
        let disk = if self.disk_size > 0 {
            format!("disk={}", self.disk_size)
        } else {
            String::new()
        };
        write_row(
            f,
            Self::KIND,
            self.id,
            &[
                self.role.to_string(),
                [provider, self.region.clone(), self.size.clone()]
                    .iter()
                    .filter(|s| !s.is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(" "),
                disk,
                labelled("cloud", &self.cloud_id),
                labelled("public", &self.public_ip),
                labelled("private", &self.private_ip),
                if self.connected { "connected".to_string() } else { String::new() },
            ],
        )
    }
}

// ── Container ─────────────────────────────────────────────────────

/// A container the policy wants running somewhere in the cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Container {
    pub id: RowId,

    // Policy-controlled.
    pub image: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub labels: Vec<String>,

    // Infrastructure-controlled.
    /// Private IP of the machine the scheduler put this container on.
    pub minion: String,
    pub docker_id: String,
    pub ip: String,
}

impl Row for Container {
    const KIND: TableKind = TableKind::Container;

    fn new(id: RowId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    table_accessors!(containers);
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_row(
            f,
            Self::KIND,
            self.id,
            &[
                [vec![self.image.clone()], self.command.clone()].concat().join(" "),
                labelled("labels", &self.labels.join(",")),
                labelled("minion", &self.minion),
                labelled("ip", &self.ip),
            ],
        )
    }
}

// ── Connection ────────────────────────────────────────────────────

/// Permission for `from`-labelled containers to reach `to`-labelled ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Connection {
    pub id: RowId,
    pub from: String,
    pub to: String,
    pub min_port: u16,
    pub max_port: u16,
}

impl Row for Connection {
    const KIND: TableKind = TableKind::Connection;

    fn new(id: RowId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    table_accessors!(connections);
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ports = if self.min_port == self.max_port {
            self.min_port.to_string()
        } else {
            format!("{}-{}", self.min_port, self.max_port)
        };
        write_row(
            f,
            Self::KIND,
            self.id,
            &[format!("{} -> {}:{ports}", self.from, self.to)],
        )
    }
}

// ── Placement ─────────────────────────────────────────────────────

/// Constraint on where containers labelled `target_label` may be scheduled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Placement {
    pub id: RowId,
    pub target_label: String,
    pub exclusive: bool,

    // Label constraint.
    pub other_label: String,

    // Machine constraints.
    pub provider: String,
    pub size: String,
    pub region: String,
}

impl Row for Placement {
    const KIND: TableKind = TableKind::Placement;

    fn new(id: RowId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    table_accessors!(placements);
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_row(
            f,
            Self::KIND,
            self.id,
            &[
                self.target_label.clone(),
                if self.exclusive { "exclusive".to_string() } else { "on".to_string() },
                labelled("label", &self.other_label),
                labelled("provider", &self.provider),
                labelled("size", &self.size),
                labelled("region", &self.region),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(id: RowId, role: Role, cloud_id: &str, public: &str, private: &str) -> Machine {
        Machine {
            id,
            role,
            cloud_id: cloud_id.to_string(),
            public_ip: public.to_string(),
            private_ip: private.to_string(),
            ..Machine::default()
        }
    }

    fn ids(machines: &[Machine]) -> Vec<RowId> {
        machines.iter().map(|m| m.id).collect()
    }

    #[test]
    fn machine_order_by_role_first() {
        let sorted = sort_machines(vec![
            machine(1, Role::None, "", "1.1.1.1", "10.0.0.1"),
            machine(2, Role::Worker, "", "", ""),
            machine(3, Role::Master, "", "", ""),
        ]);
        assert_eq!(ids(&sorted), vec![3, 2, 1]);
    }

    #[test]
    fn machine_order_by_provisioning_within_role() {
        let sorted = sort_machines(vec![
            machine(1, Role::Worker, "", "", ""),
            machine(2, Role::Worker, "", "", "10.0.0.2"),
            machine(3, Role::Worker, "", "1.1.1.3", "10.0.0.3"),
            machine(4, Role::Worker, "", "1.1.1.4", ""),
        ]);
        // Full first, the two partial ones by id, bare last.
        assert_eq!(ids(&sorted), vec![3, 2, 4, 1]);
    }

    #[test]
    fn machine_order_breaks_ties_by_cloud_id_then_id() {
        let sorted = sort_machines(vec![
            machine(5, Role::Master, "b", "1", "2"),
            machine(4, Role::Master, "a", "1", "2"),
            machine(2, Role::Master, "b", "1", "2"),
        ]);
        assert_eq!(ids(&sorted), vec![4, 2, 5]);
    }

    #[test]
    fn machine_order_full_scenario() {
        let sorted = sort_machines(vec![
            machine(1, Role::None, "", "", ""),
            machine(2, Role::Worker, "", "", ""),
            machine(3, Role::Worker, "w", "1", "2"),
            machine(4, Role::Master, "", "", "2"),
            machine(5, Role::Master, "m", "1", "2"),
            machine(6, Role::Master, "", "", ""),
        ]);
        assert_eq!(ids(&sorted), vec![5, 4, 6, 3, 2, 1]);
    }

    #[test]
    fn display_omits_empty_fields_and_ssh_keys() {
        let mut m = machine(3, Role::Master, "i-123", "", "");
        m.provider = Some(Provider::Amazon);
        m.region = "us-west-1".to_string();
        m.ssh_keys = vec!["ssh-rsa SECRET".to_string()];
        assert_eq!(m.to_string(), "Machine-3{Master, Amazon us-west-1, cloud=i-123}");
    }

    #[test]
    fn connection_display_collapses_single_port() {
        let c = Connection {
            id: 9,
            from: "web".to_string(),
            to: "db".to_string(),
            min_port: 5432,
            max_port: 5432,
        };
        assert_eq!(c.to_string(), "Connection-9{web -> db:5432}");
    }
}
