//! ResourceClient trait binding one resource kind to a remote service
//!
//! A client is pure I/O. It reads and writes the remote and never decides what
//! to change; that is the runner's job. One implementation exists per backend
//! (IAM groups, GitHub teams, repo hooks, Heroku collaborators, ...), and the
//! runner is generic over all of them.

use crate::error::{RequestError, ValidationError};
use crate::types::{Attributes, DesiredState, Identifier, Member};

/// Capability set for one resource kind
///
/// # Example
///
/// ```ignore
/// use convergence::{ConvergenceRunner, DesiredState, Options, StrictMode};
///
/// let client = GroupClient::new(aws);
/// let desired = DesiredState::new("Engineers")
///     .members("members", ["alice", "bob"])
///     .mode(StrictMode::Strict);
///
/// let result = ConvergenceRunner::new(&client).present(&desired, Options::default());
/// assert!(result.succeeded());
/// ```
pub trait ResourceClient: Send + Sync {
    /// Observed handle for one resource, as returned by `get` or `create`
    type Resource;

    /// Resource kind name used in logs and results, e.g. `team`
    fn kind(&self) -> &'static str;

    /// Collections a desired state may manage
    fn collections(&self) -> &'static [&'static str] {
        &[]
    }

    /// Resource-level attribute keys a desired state may declare
    fn attribute_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Per-member attribute keys a desired state may declare
    fn member_attribute_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Attribute keys whose array values are compared as sets
    fn unordered_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Collections that must be emptied before the resource can be deleted
    fn dependents(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether `absent` deletes the resource itself
    ///
    /// Kinds that manage a collection inside something they do not own
    /// (hooks on a repository, collaborators on an app) only empty it.
    fn deletes_container(&self) -> bool {
        true
    }

    /// Whether `create` is implemented for this kind
    ///
    /// A dry run of a missing resource fails up front when this is false,
    /// matching what the real run would do.
    fn creates(&self) -> bool {
        true
    }

    /// Fetch a resource by name, `Ok(None)` when it does not exist
    fn get(&self, name: &str) -> Result<Option<Self::Resource>, RequestError>;

    /// Create the resource described by `desired`
    fn create(&self, desired: &DesiredState) -> Result<Self::Resource, RequestError> {
        let _ = desired;
        Err(RequestError::unsupported(self.kind(), "create"))
    }

    /// Observed resource-level attributes
    fn attributes(&self, resource: &Self::Resource) -> Attributes {
        let _ = resource;
        Attributes::new()
    }

    /// Apply a resource-level attribute patch
    fn edit(&self, resource: &Self::Resource, patch: &Attributes) -> Result<(), RequestError> {
        let _ = (resource, patch);
        Err(RequestError::unsupported(self.kind(), "edit"))
    }

    /// Delete the resource
    fn delete(&self, resource: &Self::Resource) -> Result<(), RequestError> {
        let _ = resource;
        Err(RequestError::unsupported(self.kind(), "delete"))
    }

    /// Every member of a collection, with all pages followed
    fn list(&self, resource: &Self::Resource, collection: &str)
    -> Result<Vec<Member>, RequestError>;

    /// Add a member, using `spec` for any per-member attributes
    fn add(
        &self,
        resource: &Self::Resource,
        collection: &str,
        id: &Identifier,
        spec: &Attributes,
    ) -> Result<(), RequestError>;

    /// Remove an observed member
    fn remove(
        &self,
        resource: &Self::Resource,
        collection: &str,
        member: &Member,
    ) -> Result<(), RequestError>;

    /// Patch attributes of an observed member
    fn edit_member(
        &self,
        resource: &Self::Resource,
        collection: &str,
        member: &Member,
        patch: &Attributes,
    ) -> Result<(), RequestError> {
        let _ = (resource, collection, member, patch);
        Err(RequestError::unsupported(self.kind(), "edit members"))
    }

    /// Check a desired state against what this kind can manage
    ///
    /// Runs before any remote call. Kinds that constrain attribute values
    /// override this and call [`check_declaration`] first.
    fn validate(&self, desired: &DesiredState) -> Result<(), ValidationError> {
        check_declaration(self, desired)
    }
}

/// Shape checks shared by every kind: name, strict mode, known collections
/// and attribute keys, non-empty identifiers.
pub fn check_declaration<C: ResourceClient + ?Sized>(
    client: &C,
    desired: &DesiredState,
) -> Result<(), ValidationError> {
    let kind = client.kind().to_string();

    if desired.name.trim().is_empty() {
        return Err(ValidationError::EmptyName { kind });
    }

    if desired.mode.is_strict() && desired.collections.is_empty() {
        return Err(ValidationError::StrictWithoutMembers {
            kind,
            name: desired.name.clone(),
        });
    }

    if let Some(key) = desired
        .attributes
        .keys()
        .find(|key| !client.attribute_keys().contains(&key.as_str()))
    {
        return Err(ValidationError::UnknownAttribute {
            kind,
            key: key.clone(),
        });
    }

    for (collection, members) in &desired.collections {
        if !client.collections().contains(&collection.as_str()) {
            return Err(ValidationError::UnknownCollection {
                kind,
                collection: collection.clone(),
            });
        }

        for (id, attributes) in members {
            if id.trim().is_empty() {
                return Err(ValidationError::EmptyIdentifier {
                    kind,
                    name: desired.name.clone(),
                    collection: collection.clone(),
                });
            }
            if let Some(key) = attributes
                .keys()
                .find(|key| !client.member_attribute_keys().contains(&key.as_str()))
            {
                return Err(ValidationError::UnknownAttribute {
                    kind,
                    key: format!("{collection}.{key}"),
                });
            }
        }
    }

    Ok(())
}
