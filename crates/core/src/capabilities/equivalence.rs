//! Capability equivalence
//!
//! Two capability sets are equivalent when their canonical constraint sets
//! form the same multiset: order of the alternatives does not matter, but
//! duplicates do.

use tracing::debug;

use super::canonical::{canonicalize_set, CanonicalConstraintSet};
use super::constraints::ConstraintSet;

/// Order-independent comparison of two constraint-set sequences
pub fn equivalent(a: &[ConstraintSet], b: &[ConstraintSet]) -> bool {
    if a.len() != b.len() {
        debug!("capability sets differ in length: {} vs {}", a.len(), b.len());
        return false;
    }

    let left: Vec<CanonicalConstraintSet> = a.iter().map(canonicalize_set).collect();
    let right: Vec<CanonicalConstraintSet> = b.iter().map(canonicalize_set).collect();

    // Canonical values only implement PartialEq, so match greedily
    let mut used = vec![false; right.len()];
    for (index, set) in left.iter().enumerate() {
        let matched = right
            .iter()
            .enumerate()
            .find(|(j, candidate)| !used[*j] && *candidate == set)
            .map(|(j, _)| j);
        match matched {
            Some(j) => used[j] = true,
            None => {
                debug!("constraint set {} has no equivalent counterpart", index);
                return false;
            }
        }
    }
    true
}
