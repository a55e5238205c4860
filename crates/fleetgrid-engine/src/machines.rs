//! Machine reconciliation.
//!
//! Turns machine descriptors into candidate rows, checks the master/worker
//! topology, and diffs the candidates against the machine table with the
//! score join.

use fleet_core::{DesiredState, MachineSpec, ProviderCatalog, Provider, Role};
use fleetgrid_db::{Machine, View, sort_machines};
use fleetgrid_join::join;
use tracing::{debug, warn};

use crate::engine::Diff;

/// Disk size (GiB) given to machines whose policy leaves it at zero.
pub const DEFAULT_DISK_SIZE: u32 = 32;

/// Score an existing machine row against a candidate.
///
/// Negative when the two can never be the same machine. Otherwise the score
/// is lower the more provisioned the existing row is, so the matcher keeps
/// machines that already have addresses.
pub fn machine_score(candidate: &Machine, existing: &Machine) -> i32 {
    let incompatible = existing.provider != candidate.provider
        || existing.region != candidate.region
        || (!existing.size.is_empty() && existing.size != candidate.size)
        || (existing.role != Role::None && existing.role != candidate.role)
        || existing.disk_size != candidate.disk_size;

    if incompatible {
        -1
    } else if existing.private_ip.is_empty() {
        2
    } else if existing.public_ip.is_empty() {
        1
    } else {
        0
    }
}

/// Translate one descriptor into a candidate row (id 0, policy fields only).
///
/// Returns `None`, after logging why, when the descriptor can't be honoured.
pub(crate) fn to_candidate(
    spec: &MachineSpec,
    max_price: f64,
    catalog: &dyn ProviderCatalog,
    default_disk_size: u32,
) -> Option<Machine> {
    let role: Role = match spec.role.parse() {
        Ok(role) => role,
        Err(e) => {
            warn!(role = %spec.role, error = %e, "skipping machine with unknown role");
            return None;
        }
    };
    let provider: Provider = match spec.provider.parse() {
        Ok(provider) => provider,
        Err(e) => {
            warn!(provider = %spec.provider, error = %e, "skipping machine with unknown provider");
            return None;
        }
    };

    let size = match &spec.size {
        Some(size) => size.clone(),
        None => match catalog.choose_size(provider, spec.ram, spec.cpu, max_price) {
            Some(size) => size,
            None => {
                warn!(
                    %provider,
                    ram = ?spec.ram,
                    cpu = ?spec.cpu,
                    max_price,
                    "skipping machine: no size satisfies its constraints"
                );
                return None;
            }
        },
    };

    let region = spec
        .region
        .clone()
        .unwrap_or_else(|| catalog.default_region(provider));

    let disk_size = if spec.disk_size == 0 {
        default_disk_size
    } else {
        spec.disk_size
    };

    Some(Machine {
        role,
        provider: Some(provider),
        region,
        size,
        disk_size,
        ssh_keys: spec.ssh_keys.clone(),
        ..Machine::default()
    })
}

/// Build the candidate set, or `None` if it breaks the topology rule that a
/// cluster has masters exactly when it has workers.
pub(crate) fn candidates<D: DesiredState + ?Sized>(
    desired: &D,
    catalog: &dyn ProviderCatalog,
    default_disk_size: u32,
) -> Option<Vec<Machine>> {
    let max_price = desired.max_price();
    let candidates: Vec<Machine> = desired
        .machines()
        .iter()
        .filter_map(|spec| to_candidate(spec, max_price, catalog, default_disk_size))
        .collect();

    let masters = candidates.iter().filter(|m| m.role == Role::Master).count();
    let workers = candidates.iter().filter(|m| m.role == Role::Worker).count();
    if (masters > 0) != (workers > 0) {
        warn!(
            masters,
            workers,
            "a cluster needs both masters and workers or neither; leaving machines unchanged"
        );
        return None;
    }

    Some(candidates)
}

/// Make the machine table match `candidates`.
pub(crate) fn reconcile(view: &mut View<'_>, candidates: Vec<Machine>) -> Diff {
    // Existing rows go in in machine order so ties keep the most
    // provisioned row.
    let existing = sort_machines(view.select_all::<Machine>());
    let joined = join(candidates, existing, machine_score);

    let mut diff = Diff {
        kept: joined.pairs.len(),
        ..Diff::default()
    };

    for stale in &joined.lonely_right {
        debug!(machine = %stale, "removing machine");
        view.remove(stale);
        diff.removed += 1;
    }

    let mut rows: Vec<(Machine, Machine)> = joined
        .pairs
        .into_iter()
        .map(|pair| (pair.left, pair.right))
        .collect();
    for candidate in joined.lonely_left {
        rows.push((candidate, view.insert::<Machine>()));
        diff.added += 1;
    }

    for (candidate, mut row) in rows {
        row.role = candidate.role;
        row.provider = candidate.provider;
        row.region = candidate.region;
        row.size = candidate.size;
        row.disk_size = candidate.disk_size;
        row.ssh_keys = candidate.ssh_keys;
        debug!(machine = %row, "committing machine");
        view.commit(row);
    }

    diff
}
