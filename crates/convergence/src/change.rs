//! Change ledger produced by one convergence pass

use crate::error::Failure;
use crate::types::{Attributes, Identifier};
use serde::Serialize;
use std::fmt;

/// A single remote side effect
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create the missing resource
    CreateResource,
    /// Patch resource-level attributes
    PatchAttributes { patch: Attributes },
    /// Remove an undeclared member
    RemoveMember { collection: String, id: Identifier },
    /// Patch attributes of an existing member
    PatchMember {
        collection: String,
        id: Identifier,
        patch: Attributes,
    },
    /// Add a declared member
    AddMember { collection: String, id: Identifier },
    /// Delete the resource
    DeleteResource,
}

impl Operation {
    /// Single-character marker used in plan output
    pub fn symbol(&self) -> char {
        match self {
            Self::CreateResource | Self::AddMember { .. } => '+',
            Self::RemoveMember { .. } | Self::DeleteResource => '-',
            Self::PatchAttributes { .. } | Self::PatchMember { .. } => '~',
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateResource => write!(f, "create"),
            Self::PatchAttributes { patch } => write!(f, "patch {}", render_patch(patch)),
            Self::RemoveMember { collection, id } => write!(f, "remove {id} from {collection}"),
            Self::PatchMember {
                collection,
                id,
                patch,
            } => write!(f, "patch {id} in {collection}: {}", render_patch(patch)),
            Self::AddMember { collection, id } => write!(f, "add {id} to {collection}"),
            Self::DeleteResource => write!(f, "delete"),
        }
    }
}

fn render_patch(patch: &Attributes) -> String {
    patch
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// What happened to an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The remote acknowledged the call
    Applied,
    /// The call was not issued
    Skipped { reason: String },
    /// The remote call failed; nothing after it was attempted
    Failed { error: String },
}

impl Outcome {
    /// Outcome recorded for every operation of a dry run
    pub fn dry_run() -> Self {
        Self::Skipped {
            reason: "dry run".into(),
        }
    }

    /// Whether the remote acknowledged the call
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Whether the call failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// An operation paired with its outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    #[serde(flatten)]
    pub operation: Operation,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Ordered, truthful record of one convergence pass
///
/// Entries appear in the order they were attempted. A failed entry, if any,
/// is always the last one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    /// An empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation and its outcome
    pub fn record(&mut self, operation: Operation, outcome: Outcome) {
        self.changes.push(Change { operation, outcome });
    }

    /// Number of recorded entries
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Iterate entries in attempt order
    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    /// Entries the remote acknowledged
    pub fn applied(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(|c| c.outcome.is_applied())
    }

    /// The operations alone, in attempt order
    pub fn operations(&self) -> Vec<&Operation> {
        self.changes.iter().map(|c| &c.operation).collect()
    }

    /// Counts per operation class
    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        for change in &self.changes {
            summary.add(change);
        }
        summary
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Counts of recorded changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub created: usize,
    pub patched: usize,
    pub added: usize,
    pub removed: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ChangeSummary {
    /// Total number of changes the remote acknowledged
    pub fn total_applied(&self) -> usize {
        self.created + self.patched + self.added + self.removed + self.deleted
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ChangeSummary) {
        self.created += other.created;
        self.patched += other.patched;
        self.added += other.added;
        self.removed += other.removed;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    fn add(&mut self, change: &Change) {
        match &change.outcome {
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::Applied => match change.operation {
                Operation::CreateResource => self.created += 1,
                Operation::PatchAttributes { .. } | Operation::PatchMember { .. } => {
                    self.patched += 1;
                }
                Operation::AddMember { .. } => self.added += 1,
                Operation::RemoveMember { .. } => self.removed += 1,
                Operation::DeleteResource => self.deleted += 1,
            },
        }
    }
}

/// Terminal result of one `present`/`absent` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceResult {
    /// Resource kind, e.g. `team`
    pub kind: String,
    /// Resource name as declared
    pub resource_name: String,
    /// What was attempted, in order
    pub changes: ChangeSet,
    /// Why the pass stopped early, if it did
    pub failure: Option<Failure>,
}

impl ConvergenceResult {
    /// Whether every step completed
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Whether the pass recorded nothing to do
    pub fn is_converged(&self) -> bool {
        self.succeeded() && self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_counts_by_outcome() {
        let mut changes = ChangeSet::new();
        changes.record(Operation::CreateResource, Outcome::Applied);
        changes.record(
            Operation::AddMember {
                collection: "members".into(),
                id: "a".into(),
            },
            Outcome::Applied,
        );
        changes.record(
            Operation::RemoveMember {
                collection: "members".into(),
                id: "c".into(),
            },
            Outcome::Failed {
                error: "boom".into(),
            },
        );

        let summary = changes.summary();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_applied(), 2);
        assert_eq!(changes.applied().count(), 2);
    }

    #[test]
    fn test_dry_run_outcome_is_skipped() {
        let outcome = Outcome::dry_run();
        assert!(!outcome.is_applied());
        assert!(!outcome.is_failed());
    }

    #[test]
    fn test_operation_display() {
        let mut patch = Attributes::new();
        patch.insert("permission".into(), json!("push"));
        assert_eq!(
            Operation::PatchAttributes { patch }.to_string(),
            "patch permission=\"push\""
        );
        assert_eq!(
            Operation::AddMember {
                collection: "repos".into(),
                id: "acme/api".into()
            }
            .to_string(),
            "add acme/api to repos"
        );
        assert_eq!(Operation::DeleteResource.symbol(), '-');
    }

    #[test]
    fn test_change_serializes_flat() {
        let mut changes = ChangeSet::new();
        changes.record(
            Operation::AddMember {
                collection: "members".into(),
                id: "a".into(),
            },
            Outcome::dry_run(),
        );
        let value = serde_json::to_value(&changes).unwrap();
        assert_eq!(
            value,
            json!([{
                "op": "add_member",
                "collection": "members",
                "id": "a",
                "outcome": "skipped",
                "reason": "dry run"
            }])
        );
    }

    #[test]
    fn test_converged_result() {
        let result = ConvergenceResult {
            kind: "group".into(),
            resource_name: "eng".into(),
            changes: ChangeSet::new(),
            failure: None,
        };
        assert!(result.succeeded());
        assert!(result.is_converged());
    }
}
