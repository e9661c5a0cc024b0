//! Core types for desired-state reconciliation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Opaque name of a member within a collection (username, email, `owner/repo`, hook name).
///
/// Compared by exact string equality. No case folding or trimming is applied.
pub type Identifier = String;

/// Attribute bag compared key-by-key by the field reconciler.
pub type Attributes = BTreeMap<String, Value>;

/// Declared members of one collection, each with optional per-member attributes.
pub type Members = BTreeMap<Identifier, Attributes>;

/// Policy for members that are present remotely but not declared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrictMode {
    /// Undeclared members are removed
    Strict,
    /// Undeclared members are left alone
    #[default]
    Lenient,
}

impl StrictMode {
    /// Build from the boolean `strict` flag used in state files
    pub fn from_flag(strict: bool) -> Self {
        if strict { Self::Strict } else { Self::Lenient }
    }

    /// Whether undeclared members get pruned
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// Options for a single `present`/`absent` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Compute and report the changes, but issue no mutating call
    pub dry_run: bool,
}

impl Options {
    /// Options for a dry run
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

/// What the caller wants a resource to look like
///
/// Collections absent from [`DesiredState::collections`] are not managed at all,
/// which differs from a collection declared with no members: under
/// [`StrictMode::Strict`] the latter removes everyone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredState {
    /// Resource name or key (group name, team name, `owner/repo`, app name)
    pub name: String,
    /// Managed collections keyed by collection name
    #[serde(default)]
    pub collections: BTreeMap<String, Members>,
    /// Resource-level attributes to enforce
    #[serde(default)]
    pub attributes: Attributes,
    /// Pruning policy
    #[serde(default)]
    pub mode: StrictMode,
}

impl DesiredState {
    /// Create a desired state that manages nothing yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the pruning policy
    pub fn mode(mut self, mode: StrictMode) -> Self {
        self.mode = mode;
        self
    }

    /// Manage a collection of plain members
    pub fn members<I, S>(mut self, collection: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Identifier>,
    {
        let members = ids
            .into_iter()
            .map(|id| (id.into(), Attributes::new()))
            .collect();
        self.collections.insert(collection.into(), members);
        self
    }

    /// Manage a collection whose members carry their own attributes
    pub fn members_with(mut self, collection: impl Into<String>, members: Members) -> Self {
        self.collections.insert(collection.into(), members);
        self
    }

    /// Enforce a resource-level attribute
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Identifiers declared for a collection, or `None` if it is unmanaged
    pub fn declared(&self, collection: &str) -> Option<BTreeSet<Identifier>> {
        self.collections
            .get(collection)
            .map(|members| members.keys().cloned().collect())
    }
}

/// A member as observed in a remote collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Identifier the member is matched on
    pub id: Identifier,
    /// Backend handle needed to address the member (hook id, access key id)
    pub remote_id: Option<String>,
    /// Observed per-member attributes
    pub attributes: Attributes,
}

impl Member {
    /// A member with no handle or attributes
    pub fn new(id: impl Into<Identifier>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Attach the backend handle
    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    /// Attach observed attributes
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strict_mode_from_flag() {
        assert_eq!(StrictMode::from_flag(true), StrictMode::Strict);
        assert_eq!(StrictMode::from_flag(false), StrictMode::Lenient);
        assert!(StrictMode::Strict.is_strict());
        assert!(!StrictMode::default().is_strict());
    }

    #[test]
    fn test_declared_distinguishes_unmanaged_from_empty() {
        let desired = DesiredState::new("eng").members("members", Vec::<String>::new());
        assert_eq!(desired.declared("members"), Some(BTreeSet::new()));
        assert_eq!(desired.declared("repos"), None);
    }

    #[test]
    fn test_builder_collects_members_and_attributes() {
        let desired = DesiredState::new("eng")
            .members("members", ["b", "a"])
            .attribute("permission", "push")
            .mode(StrictMode::Strict);

        let ids: Vec<_> = desired.declared("members").unwrap().into_iter().collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(desired.attributes["permission"], json!("push"));
        assert!(desired.mode.is_strict());
    }

    #[test]
    fn test_fresh_collections_per_state() {
        let mut first = DesiredState::new("one");
        let second = DesiredState::new("two");
        first.collections.entry("members".into()).or_default();
        assert!(second.collections.is_empty());
    }
}
