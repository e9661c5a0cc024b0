//! In-memory [`ResourceClient`] for testing without a remote service
//!
//! ```
//! use convergence::mock::MockClient;
//! use convergence::{ConvergenceRunner, DesiredState, Options, StrictMode};
//!
//! let client = MockClient::new("group").with_collections(&["members"]);
//! client.insert_resource("eng", Default::default());
//! client.insert_members("eng", "members", ["bob", "carol"]);
//!
//! let desired = DesiredState::new("eng")
//!     .members("members", ["alice", "bob"])
//!     .mode(StrictMode::Strict);
//! let result = ConvergenceRunner::new(&client).present(&desired, Options::default());
//!
//! assert!(result.succeeded());
//! assert_eq!(client.member_ids("eng", "members"), vec!["alice", "bob"]);
//! ```

use crate::client::ResourceClient;
use crate::error::RequestError;
use crate::field;
use crate::types::{Attributes, DesiredState, Identifier, Member};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

/// A call the runner issued against the mock
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get { name: String },
    Create { name: String },
    Edit { name: String, patch: Attributes },
    Delete { name: String },
    List { name: String, collection: String },
    Add { name: String, collection: String, id: Identifier },
    Remove { name: String, collection: String, id: Identifier },
    EditMember { name: String, collection: String, id: Identifier, patch: Attributes },
}

impl Call {
    /// Whether the call would change remote state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Get { .. } | Self::List { .. })
    }
}

#[derive(Debug, Clone, Default)]
struct MockResource {
    attributes: Attributes,
    collections: BTreeMap<String, Vec<Member>>,
}

#[derive(Debug, Clone, Default)]
struct Failures {
    get: bool,
    create: bool,
    edit: bool,
    delete: bool,
    add: BTreeSet<Identifier>,
    remove: BTreeSet<Identifier>,
}

#[derive(Debug, Default)]
struct MockState {
    resources: BTreeMap<String, MockResource>,
    calls: Vec<Call>,
    failures: Failures,
    seed: BTreeMap<String, Vec<Identifier>>,
}

/// Mock client storing resources in memory
///
/// Descriptor methods are configured with the `with_*` builders so one mock can
/// stand in for any resource kind. Every call is logged and any step can be
/// made to fail.
#[derive(Debug, Clone)]
pub struct MockClient {
    kind: &'static str,
    collections: &'static [&'static str],
    attribute_keys: &'static [&'static str],
    member_attribute_keys: &'static [&'static str],
    unordered_keys: &'static [&'static str],
    dependents: &'static [&'static str],
    deletes_container: bool,
    can_create: bool,
    creates_bare: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockClient {
    /// Create an empty mock for `kind`
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            collections: &[],
            attribute_keys: &[],
            member_attribute_keys: &[],
            unordered_keys: &[],
            dependents: &[],
            deletes_container: true,
            can_create: true,
            creates_bare: false,
            state: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_collections(mut self, collections: &'static [&'static str]) -> Self {
        self.collections = collections;
        self
    }

    #[must_use]
    pub fn with_attribute_keys(mut self, keys: &'static [&'static str]) -> Self {
        self.attribute_keys = keys;
        self
    }

    #[must_use]
    pub fn with_member_attribute_keys(mut self, keys: &'static [&'static str]) -> Self {
        self.member_attribute_keys = keys;
        self
    }

    #[must_use]
    pub fn with_unordered_keys(mut self, keys: &'static [&'static str]) -> Self {
        self.unordered_keys = keys;
        self
    }

    #[must_use]
    pub fn with_dependents(mut self, dependents: &'static [&'static str]) -> Self {
        self.dependents = dependents;
        self
    }

    /// `absent` empties dependents but never deletes the resource
    #[must_use]
    pub fn keeps_container(mut self) -> Self {
        self.deletes_container = false;
        self
    }

    /// `create` reports an unsupported operation
    #[must_use]
    pub fn cannot_create(mut self) -> Self {
        self.can_create = false;
        self
    }

    /// `create` ignores declared attributes, like an API that needs a follow-up patch
    #[must_use]
    pub fn creates_bare(mut self) -> Self {
        self.creates_bare = true;
        self
    }

    /// Store a resource with the given attributes
    pub fn insert_resource(&self, name: &str, attributes: Attributes) {
        let mut state = self.state.lock().unwrap();
        state.resources.insert(
            name.to_string(),
            MockResource {
                attributes,
                collections: BTreeMap::new(),
            },
        );
    }

    /// Append plain members to a stored resource's collection
    pub fn insert_members<I, S>(&self, name: &str, collection: &str, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Identifier>,
    {
        for id in ids {
            self.insert_member(name, collection, Member::new(id));
        }
    }

    /// Append one member, duplicates included
    pub fn insert_member(&self, name: &str, collection: &str, member: Member) {
        let mut state = self.state.lock().unwrap();
        state
            .resources
            .entry(name.to_string())
            .or_default()
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(member);
    }

    /// Members every newly created resource starts with
    pub fn seed_on_create<I, S>(&self, collection: &str, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Identifier>,
    {
        let mut state = self.state.lock().unwrap();
        state
            .seed
            .insert(collection.to_string(), ids.into_iter().map(Into::into).collect());
    }

    pub fn fail_on_get(&self) {
        self.state.lock().unwrap().failures.get = true;
    }

    pub fn fail_on_create(&self) {
        self.state.lock().unwrap().failures.create = true;
    }

    pub fn fail_on_edit(&self) {
        self.state.lock().unwrap().failures.edit = true;
    }

    pub fn fail_on_delete(&self) {
        self.state.lock().unwrap().failures.delete = true;
    }

    pub fn fail_on_add(&self, id: &str) {
        self.state.lock().unwrap().failures.add.insert(id.to_string());
    }

    pub fn fail_on_remove(&self, id: &str) {
        self.state.lock().unwrap().failures.remove.insert(id.to_string());
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures = Failures::default();
    }

    /// Whether a resource is stored
    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().unwrap().resources.contains_key(name)
    }

    /// Stored attributes of a resource
    pub fn resource_attributes(&self, name: &str) -> Option<Attributes> {
        let state = self.state.lock().unwrap();
        state.resources.get(name).map(|r| r.attributes.clone())
    }

    /// Member identifiers of a collection, sorted
    pub fn member_ids(&self, name: &str, collection: &str) -> Vec<Identifier> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<Identifier> = state
            .resources
            .get(name)
            .and_then(|r| r.collections.get(collection))
            .map(|members| members.iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Stored member, first match
    pub fn member(&self, name: &str, collection: &str, id: &str) -> Option<Member> {
        let state = self.state.lock().unwrap();
        state
            .resources
            .get(name)
            .and_then(|r| r.collections.get(collection))
            .and_then(|members| members.iter().find(|m| m.id == id).cloned())
    }

    /// Every call issued so far
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that would change remote state
    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    fn log(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn injected(&self, context: &str) -> RequestError {
        RequestError::status(format!("mock {} {context}", self.kind), 500, "injected failure")
    }

    fn missing(&self, name: &str) -> RequestError {
        RequestError::status(format!("mock {} {name}", self.kind), 404, "Not Found")
    }
}

impl ResourceClient for MockClient {
    type Resource = String;

    fn kind(&self) -> &'static str {
        self.kind
    }

    fn collections(&self) -> &'static [&'static str] {
        self.collections
    }

    fn attribute_keys(&self) -> &'static [&'static str] {
        self.attribute_keys
    }

    fn member_attribute_keys(&self) -> &'static [&'static str] {
        self.member_attribute_keys
    }

    fn unordered_keys(&self) -> &'static [&'static str] {
        self.unordered_keys
    }

    fn dependents(&self) -> &'static [&'static str] {
        self.dependents
    }

    fn deletes_container(&self) -> bool {
        self.deletes_container
    }

    fn creates(&self) -> bool {
        self.can_create
    }

    fn get(&self, name: &str) -> Result<Option<String>, RequestError> {
        self.log(Call::Get {
            name: name.to_string(),
        });
        let state = self.state.lock().unwrap();
        if state.failures.get {
            return Err(self.injected("get"));
        }
        Ok(state.resources.contains_key(name).then(|| name.to_string()))
    }

    fn create(&self, desired: &DesiredState) -> Result<String, RequestError> {
        if !self.can_create {
            return Err(RequestError::unsupported(self.kind, "create"));
        }
        self.log(Call::Create {
            name: desired.name.clone(),
        });
        let mut state = self.state.lock().unwrap();
        if state.failures.create {
            return Err(self.injected("create"));
        }

        let mut resource = MockResource::default();
        if !self.creates_bare {
            resource.attributes = desired.attributes.clone();
        }
        for (collection, ids) in &state.seed {
            resource.collections.insert(
                collection.clone(),
                ids.iter().map(|id| Member::new(id.clone())).collect(),
            );
        }
        state.resources.insert(desired.name.clone(), resource);
        Ok(desired.name.clone())
    }

    fn attributes(&self, resource: &String) -> Attributes {
        self.resource_attributes(resource).unwrap_or_default()
    }

    fn edit(&self, resource: &String, patch: &Attributes) -> Result<(), RequestError> {
        self.log(Call::Edit {
            name: resource.clone(),
            patch: patch.clone(),
        });
        let mut state = self.state.lock().unwrap();
        if state.failures.edit {
            return Err(self.injected("edit"));
        }
        let stored = state
            .resources
            .get_mut(resource)
            .ok_or_else(|| self.missing(resource))?;
        field::apply(&mut stored.attributes, patch);
        Ok(())
    }

    fn delete(&self, resource: &String) -> Result<(), RequestError> {
        self.log(Call::Delete {
            name: resource.clone(),
        });
        let mut state = self.state.lock().unwrap();
        if state.failures.delete {
            return Err(self.injected("delete"));
        }
        state
            .resources
            .remove(resource)
            .map(|_| ())
            .ok_or_else(|| self.missing(resource))
    }

    fn list(&self, resource: &String, collection: &str) -> Result<Vec<Member>, RequestError> {
        self.log(Call::List {
            name: resource.clone(),
            collection: collection.to_string(),
        });
        let state = self.state.lock().unwrap();
        let stored = state
            .resources
            .get(resource)
            .ok_or_else(|| self.missing(resource))?;
        Ok(stored.collections.get(collection).cloned().unwrap_or_default())
    }

    fn add(
        &self,
        resource: &String,
        collection: &str,
        id: &Identifier,
        spec: &Attributes,
    ) -> Result<(), RequestError> {
        self.log(Call::Add {
            name: resource.clone(),
            collection: collection.to_string(),
            id: id.clone(),
        });
        let mut state = self.state.lock().unwrap();
        if state.failures.add.contains(id) {
            return Err(self.injected(&format!("add {id}")));
        }
        state
            .resources
            .get_mut(resource)
            .ok_or_else(|| self.missing(resource))?
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(Member::new(id.clone()).with_attributes(spec.clone()));
        Ok(())
    }

    fn remove(&self, resource: &String, collection: &str, member: &Member) -> Result<(), RequestError> {
        self.log(Call::Remove {
            name: resource.clone(),
            collection: collection.to_string(),
            id: member.id.clone(),
        });
        let mut state = self.state.lock().unwrap();
        if state.failures.remove.contains(&member.id) {
            return Err(self.injected(&format!("remove {}", member.id)));
        }
        let stored = state
            .resources
            .get_mut(resource)
            .ok_or_else(|| self.missing(resource))?;
        if let Some(members) = stored.collections.get_mut(collection) {
            members.retain(|m| m.id != member.id);
        }
        Ok(())
    }

    fn edit_member(
        &self,
        resource: &String,
        collection: &str,
        member: &Member,
        patch: &Attributes,
    ) -> Result<(), RequestError> {
        self.log(Call::EditMember {
            name: resource.clone(),
            collection: collection.to_string(),
            id: member.id.clone(),
            patch: patch.clone(),
        });
        let mut state = self.state.lock().unwrap();
        let stored = state
            .resources
            .get_mut(resource)
            .and_then(|r| r.collections.get_mut(collection))
            .and_then(|members| members.iter_mut().find(|m| m.id == member.id))
            .ok_or_else(|| self.missing(&member.id))?;
        field::apply(&mut stored.attributes, patch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ConvergenceRunner;
    use crate::types::{Options, StrictMode};

    #[test]
    fn test_get_reports_absence_as_none() {
        let client = MockClient::new("group");
        assert_eq!(client.get("eng").unwrap(), None);

        client.insert_resource("eng", Attributes::new());
        assert_eq!(client.get("eng").unwrap(), Some("eng".to_string()));
        assert_eq!(client.calls().len(), 2);
        assert!(client.mutations().is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let client = MockClient::new("group");
        let other = client.clone();
        other.insert_resource("eng", Attributes::new());
        assert!(client.contains("eng"));
    }

    #[test]
    fn test_duplicate_observed_members_use_first() {
        let client = MockClient::new("group").with_collections(&["members"]);
        client.insert_resource("eng", Attributes::new());
        client.insert_members("eng", "members", ["alice", "alice", "bob"]);

        let desired = DesiredState::new("eng")
            .members("members", ["alice"])
            .mode(StrictMode::Strict);
        let result = ConvergenceRunner::new(&client).present(&desired, Options::default());

        assert!(result.succeeded());
        assert_eq!(result.changes.len(), 1);
        assert_eq!(client.member_ids("eng", "members"), vec!["alice", "alice"]);
    }

    #[test]
    fn test_remove_failure_stops_before_additions() {
        let client = MockClient::new("group").with_collections(&["members"]);
        client.insert_resource("eng", Attributes::new());
        client.insert_members("eng", "members", ["carol"]);
        client.fail_on_remove("carol");

        let desired = DesiredState::new("eng")
            .members("members", ["alice"])
            .mode(StrictMode::Strict);
        let result = ConvergenceRunner::new(&client).present(&desired, Options::default());

        assert!(!result.succeeded());
        assert_eq!(client.mutations().len(), 1);
        assert_eq!(client.member_ids("eng", "members"), vec!["carol"]);
    }

    #[test]
    fn test_added_member_keeps_spec() {
        let client = MockClient::new("hooks")
            .with_collections(&["hooks"])
            .with_member_attribute_keys(&["active"]);
        client.insert_resource("acme/web", Attributes::new());

        let mut spec = Attributes::new();
        spec.insert("active".into(), false.into());
        let mut hooks = crate::types::Members::new();
        hooks.insert("ci".into(), spec.clone());
        let desired = DesiredState::new("acme/web").members_with("hooks", hooks);

        ConvergenceRunner::new(&client).present(&desired, Options::default());

        assert_eq!(client.member("acme/web", "hooks", "ci").unwrap().attributes, spec);
    }
}
