//! Container, connection and placement reconciliation.

use std::collections::HashSet;
use std::hash::Hash;

use fleet_core::{ConnectionSpec, ContainerSpec, PlacementSpec};
use fleetgrid_db::{Connection, Container, Placement, Row, View, sort_rows};
use fleetgrid_join::{hash_join, join};
use tracing::debug;

use crate::engine::Diff;

/// Score an existing container against a desired one.
///
/// Image, command and environment identify a container; labels can be
/// changed in place, so a label mismatch only costs a point.
pub fn container_score(desired: &ContainerSpec, existing: &Container) -> i32 {
    if desired.image != existing.image
        || desired.command != existing.command
        || desired.env != existing.env
    {
        return -1;
    }

    let want: HashSet<&String> = desired.labels.iter().collect();
    let have: HashSet<&String> = existing.labels.iter().collect();
    if want == have { 0 } else { 1 }
}

pub(crate) fn reconcile_containers(view: &mut View<'_>, desired: Vec<ContainerSpec>) -> Diff {
    let existing = sort_rows(view.select_all::<Container>());
    let joined = join(desired, existing, container_score);

    let mut diff = Diff {
        kept: joined.pairs.len(),
        ..Diff::default()
    };
    for stale in &joined.lonely_right {
        debug!(container = %stale, "removing container");
        view.remove(stale);
        diff.removed += 1;
    }

    for pair in joined.pairs {
        let mut row = pair.right;
        row.labels = pair.left.labels;
        view.commit(row);
    }

    for spec in joined.lonely_left {
        let mut row = view.insert::<Container>();
        row.image = spec.image;
        row.command = spec.command;
        row.env = spec.env;
        row.labels = spec.labels;
        debug!(container = %row, "adding container");
        view.commit(row);
        diff.added += 1;
    }

    diff
}

pub(crate) fn reconcile_connections(view: &mut View<'_>, desired: Vec<ConnectionSpec>) -> Diff {
    let existing = sort_rows(view.select_all::<Connection>());
    let joined = hash_join(
        dedup(desired),
        existing,
        |c| (c.from.clone(), c.to.clone(), c.min_port, c.max_port),
        |c| (c.from.clone(), c.to.clone(), c.min_port, c.max_port),
    );

    apply_exact(
        view,
        joined.pairs.len(),
        joined.lonely_right,
        joined.lonely_left,
        |row: &mut Connection, spec| {
            row.from = spec.from;
            row.to = spec.to;
            row.min_port = spec.min_port;
            row.max_port = spec.max_port;
        },
    )
}

pub(crate) fn reconcile_placements(view: &mut View<'_>, desired: Vec<PlacementSpec>) -> Diff {
    let existing = sort_rows(view.select_all::<Placement>());
    let joined = hash_join(
        dedup(desired),
        existing,
        |p| {
            (
                p.target_label.clone(),
                p.exclusive,
                p.other_label.clone(),
                p.provider.clone(),
                p.size.clone(),
                p.region.clone(),
            )
        },
        |p| {
            (
                p.target_label.clone(),
                p.exclusive,
                p.other_label.clone(),
                p.provider.clone(),
                p.size.clone(),
                p.region.clone(),
            )
        },
    );

    apply_exact(
        view,
        joined.pairs.len(),
        joined.lonely_right,
        joined.lonely_left,
        |row: &mut Placement, spec| {
            row.target_label = spec.target_label;
            row.exclusive = spec.exclusive;
            row.other_label = spec.other_label;
            row.provider = spec.provider;
            row.size = spec.size;
            row.region = spec.region;
        },
    )
}

/// Rows matched by key are already correct; only the unmatched ones change.
fn apply_exact<R, S, F>(
    view: &mut View<'_>,
    kept: usize,
    stale: Vec<R>,
    missing: Vec<S>,
    fill: F,
) -> Diff
where
    R: Row,
    F: Fn(&mut R, S),
{
    let mut diff = Diff {
        kept,
        ..Diff::default()
    };
    for row in &stale {
        debug!(row = %row, "removing");
        view.remove(row);
        diff.removed += 1;
    }
    for spec in missing {
        let mut row = view.insert::<R>();
        fill(&mut row, spec);
        debug!(row = %row, "adding");
        view.commit(row);
        diff.added += 1;
    }
    diff
}

/// Drop repeated entries, keeping first occurrences in order. A policy that
/// names the same connection twice still wants one row.
fn dedup<T: Clone + Eq + Hash>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}
