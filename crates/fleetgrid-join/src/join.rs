//! Score join: greedy best-first matching.
//!
//! The caller scores every `(left, right)` pair:
//! - **negative**: the two can never be paired (a hard constraint fails)
//! - **zero or more**: they can, and lower is better
//!
//! The join repeatedly takes the best remaining pair until no admissible pair
//! is left. It does not search for a globally optimal assignment; fleets are
//! small and greedy matching keeps the cheapest-to-keep rows.
//!
//! Ties are broken by position: among equal scores the pair whose right
//! element comes first in `right` wins, then the one whose left element comes
//! first in `left`. Callers that care which actual row survives a tie should
//! pass `right` in their preferred order.

use tracing::trace;

/// A left element matched with a right element.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair<L, R> {
    pub left: L,
    pub right: R,
    /// Score the pair was matched at (always non-negative).
    pub score: i32,
}

/// Outcome of a join.
#[derive(Debug, Clone, PartialEq)]
pub struct Joined<L, R> {
    pub pairs: Vec<Pair<L, R>>,
    /// Left elements with no partner, in their original order.
    pub lonely_left: Vec<L>,
    /// Right elements with no partner, in their original order.
    pub lonely_right: Vec<R>,
}

/// Match `left` against `right` under `score`.
pub fn join<L, R, F>(left: Vec<L>, right: Vec<R>, mut score: F) -> Joined<L, R>
where
    F: FnMut(&L, &R) -> i32,
{
    // (score, right index, left index) sorts into exactly the order the
    // tie-break rule asks for.
    let mut candidates: Vec<(i32, usize, usize)> = Vec::new();
    for (ri, r) in right.iter().enumerate() {
        for (li, l) in left.iter().enumerate() {
            let s = score(l, r);
            if s >= 0 {
                candidates.push((s, ri, li));
            }
        }
    }
    candidates.sort_unstable();

    let mut left: Vec<Option<L>> = left.into_iter().map(Some).collect();
    let mut right: Vec<Option<R>> = right.into_iter().map(Some).collect();
    let mut pairs = Vec::new();

    for (s, ri, li) in candidates {
        if left[li].is_none() || right[ri].is_none() {
            continue;
        }
        if let (Some(l), Some(r)) = (left[li].take(), right[ri].take()) {
            trace!(left = li, right = ri, score = s, "paired");
            pairs.push(Pair {
                left: l,
                right: r,
                score: s,
            });
        }
    }

    Joined {
        pairs,
        lonely_left: left.into_iter().flatten().collect(),
        lonely_right: right.into_iter().flatten().collect(),
    }
}
