//! Membership diff between a declared and an observed identifier set

use crate::types::{Identifier, StrictMode};
use serde::Serialize;
use std::collections::BTreeSet;

/// Additions and removals needed to converge a collection
///
/// Both sides are ordered sets, so applying them in iteration order is
/// lexicographic and reproducible across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetDiff {
    /// Declared but not observed
    pub to_add: BTreeSet<Identifier>,
    /// Observed but not declared (strict mode only)
    pub to_remove: BTreeSet<Identifier>,
}

impl SetDiff {
    /// Whether the collection already converges
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Number of member operations this diff implies
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// Compute the membership diff.
///
/// `desired = None` means the collection is unmanaged and yields an empty diff,
/// whereas `Some(&empty)` under [`StrictMode::Strict`] removes every observed member.
pub fn diff(
    desired: Option<&BTreeSet<Identifier>>,
    observed: &BTreeSet<Identifier>,
    mode: StrictMode,
) -> SetDiff {
    let Some(desired) = desired else {
        return SetDiff::default();
    };

    let to_add = desired.difference(observed).cloned().collect();
    let to_remove = if mode.is_strict() {
        observed.difference(desired).cloned().collect()
    } else {
        BTreeSet::new()
    };

    SetDiff { to_add, to_remove }
}
