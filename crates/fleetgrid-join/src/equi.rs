//! Equi-join: match elements whose keys are equal.
//!
//! Used where compatibility is plain equality (a connection either exists or
//! it doesn't), so there is nothing to rank. Right elements are bucketed by
//! key; each left element takes the earliest unclaimed right element in its
//! bucket. Duplicate keys therefore pair off one-to-one, and any surplus on
//! either side ends up lonely.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use crate::join::{Joined, Pair};

/// Match `left` against `right` by the keys the two extractors produce.
pub fn hash_join<L, R, K, FL, FR>(
    left: Vec<L>,
    right: Vec<R>,
    left_key: FL,
    right_key: FR,
) -> Joined<L, R>
where
    K: Hash + Eq,
    FL: Fn(&L) -> K,
    FR: Fn(&R) -> K,
{
    let mut buckets: HashMap<K, VecDeque<usize>> = HashMap::new();
    for (i, r) in right.iter().enumerate() {
        buckets.entry(right_key(r)).or_default().push_back(i);
    }

    let mut right: Vec<Option<R>> = right.into_iter().map(Some).collect();
    let mut pairs = Vec::new();
    let mut lonely_left = Vec::new();

    for l in left {
        let partner = buckets
            .get_mut(&left_key(&l))
            .and_then(VecDeque::pop_front)
            .and_then(|ri| right[ri].take());
        match partner {
            Some(r) => pairs.push(Pair {
                left: l,
                right: r,
                score: 0,
            }),
            None => lonely_left.push(l),
        }
    }

    Joined {
        pairs,
        lonely_left,
        lonely_right: right.into_iter().flatten().collect(),
    }
}
