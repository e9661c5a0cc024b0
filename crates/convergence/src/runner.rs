//! Convergence runner - drives one resource from observed to desired state
//!
//! `present` walks `Missing → Created → AttributesReconciled →
//! MembershipReconciled → Done`, and `absent` walks `Present →
//! MembersCleared → Deleted`. Any failed remote call ends the pass right
//! there: nothing is retried or rolled back, and the returned [`ChangeSet`]
//! holds exactly what was attempted. Re-running re-reads the remote and only
//! issues what is still outstanding.

use crate::change::{ChangeSet, ConvergenceResult, Operation, Outcome};
use crate::client::ResourceClient;
use crate::error::{Failure, MemberAction, RequestError, ValidationError};
use crate::field;
use crate::set::{self, SetDiff};
use crate::types::{DesiredState, Identifier, Member, Members, Options, StrictMode};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Generic convergence runner over one [`ResourceClient`]
pub struct ConvergenceRunner<'a, C: ResourceClient> {
    client: &'a C,
}

impl<'a, C: ResourceClient> ConvergenceRunner<'a, C> {
    /// Create a runner that talks to the remote through `client`
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Make the resource exist and match `desired`
    pub fn present(&self, desired: &DesiredState, options: Options) -> ConvergenceResult {
        let mut ledger = Ledger::new(self.client.kind(), &desired.name, options);
        let outcome = self.converge(desired, &mut ledger);
        ledger.finish(outcome.err())
    }

    /// Make the resource not exist
    ///
    /// Dependent collections are emptied first, then the resource is deleted
    /// when the kind owns it. A resource that is already gone is a no-op success.
    pub fn absent(&self, name: &str, options: Options) -> ConvergenceResult {
        let mut ledger = Ledger::new(self.client.kind(), name, options);
        let outcome = self.remove_all(name, &mut ledger);
        ledger.finish(outcome.err())
    }

    fn converge(&self, desired: &DesiredState, ledger: &mut Ledger) -> Result<(), Failure> {
        self.client.validate(desired)?;

        let existing = self
            .client
            .get(&desired.name)
            .map_err(|error| ledger.fetch_failure(None, error))?;

        let resource = match existing {
            Some(resource) => resource,
            None if ledger.dry_run && !self.client.creates() => {
                let error = RequestError::unsupported(self.client.kind(), "create");
                ledger.record(Operation::CreateResource, failed(&error));
                return Err(Failure::Create(error));
            }
            None if ledger.dry_run => {
                // Nothing further can be simulated against a resource that does not exist yet
                ledger.record(Operation::CreateResource, Outcome::dry_run());
                return Ok(());
            }
            None => match self.client.create(desired) {
                Ok(resource) => {
                    ledger.record(Operation::CreateResource, Outcome::Applied);
                    resource
                }
                Err(error) => {
                    ledger.record(Operation::CreateResource, failed(&error));
                    return Err(Failure::Create(error));
                }
            },
        };

        if !desired.attributes.is_empty() {
            let observed = self.client.attributes(&resource);
            let patch = field::diff(&desired.attributes, &observed, self.client.unordered_keys());
            if !patch.is_empty() {
                ledger
                    .apply(Operation::PatchAttributes { patch: patch.clone() }, || {
                        self.client.edit(&resource, &patch)
                    })
                    .map_err(Failure::Patch)?;
            }
        }

        let mut plans = Vec::with_capacity(desired.collections.len());
        for (collection, declared) in &desired.collections {
            let plan = self.plan_collection(&resource, collection, declared, desired.mode, ledger)?;
            plans.push(plan);
        }

        // Every removal across all collections lands before any addition
        for plan in &plans {
            self.remove_members(&resource, plan, ledger)?;
        }
        for plan in &plans {
            self.patch_members(&resource, plan, ledger)?;
        }
        for plan in &plans {
            self.add_members(&resource, plan, ledger)?;
        }

        Ok(())
    }

    fn plan_collection<'d>(
        &self,
        resource: &C::Resource,
        collection: &'d str,
        declared: &'d Members,
        mode: StrictMode,
        ledger: &Ledger,
    ) -> Result<CollectionPlan<'d>, Failure> {
        let observed = self.observe(resource, collection, ledger)?;

        let wanted: BTreeSet<Identifier> = declared.keys().cloned().collect();
        let present: BTreeSet<Identifier> = observed.keys().cloned().collect();
        let diff = set::diff(Some(&wanted), &present, mode);
        debug!(
            "{} '{}' {collection}: {} to add, {} to remove",
            ledger.kind,
            ledger.name,
            diff.to_add.len(),
            diff.to_remove.len()
        );

        Ok(CollectionPlan {
            collection,
            declared,
            observed,
            diff,
        })
    }

    fn remove_members(
        &self,
        resource: &C::Resource,
        plan: &CollectionPlan<'_>,
        ledger: &mut Ledger,
    ) -> Result<(), Failure> {
        let collection = plan.collection;
        for member in plan.diff.to_remove.iter().filter_map(|id| plan.observed.get(id)) {
            let operation = Operation::RemoveMember {
                collection: collection.to_string(),
                id: member.id.clone(),
            };
            ledger
                .apply(operation, || self.client.remove(resource, collection, member))
                .map_err(|error| member_failure(collection, &member.id, MemberAction::Remove, error))?;
        }
        Ok(())
    }

    fn patch_members(
        &self,
        resource: &C::Resource,
        plan: &CollectionPlan<'_>,
        ledger: &mut Ledger,
    ) -> Result<(), Failure> {
        let collection = plan.collection;
        for (id, spec) in plan.declared.iter().filter(|(_, spec)| !spec.is_empty()) {
            let Some(member) = plan.observed.get(id) else {
                continue;
            };
            let patch = field::diff(spec, &member.attributes, self.client.unordered_keys());
            if patch.is_empty() {
                continue;
            }
            let operation = Operation::PatchMember {
                collection: collection.to_string(),
                id: id.clone(),
                patch: patch.clone(),
            };
            ledger
                .apply(operation, || {
                    self.client.edit_member(resource, collection, member, &patch)
                })
                .map_err(|error| member_failure(collection, id, MemberAction::Patch, error))?;
        }
        Ok(())
    }

    fn add_members(
        &self,
        resource: &C::Resource,
        plan: &CollectionPlan<'_>,
        ledger: &mut Ledger,
    ) -> Result<(), Failure> {
        let collection = plan.collection;
        for id in &plan.diff.to_add {
            let spec = plan.declared.get(id).cloned().unwrap_or_default();
            let operation = Operation::AddMember {
                collection: collection.to_string(),
                id: id.clone(),
            };
            ledger
                .apply(operation, || self.client.add(resource, collection, id, &spec))
                .map_err(|error| member_failure(collection, id, MemberAction::Add, error))?;
        }
        Ok(())
    }

    fn remove_all(&self, name: &str, ledger: &mut Ledger) -> Result<(), Failure> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName {
                kind: self.client.kind().to_string(),
            }
            .into());
        }

        let Some(resource) = self
            .client
            .get(name)
            .map_err(|error| ledger.fetch_failure(None, error))?
        else {
            debug!("{} '{name}' already absent", self.client.kind());
            return Ok(());
        };

        for collection in self.client.dependents() {
            let observed = self.observe(&resource, collection, ledger)?;
            for member in observed.values() {
                let operation = Operation::RemoveMember {
                    collection: (*collection).to_string(),
                    id: member.id.clone(),
                };
                ledger
                    .apply(operation, || self.client.remove(&resource, collection, member))
                    .map_err(|error| {
                        member_failure(collection, &member.id, MemberAction::Remove, error)
                    })?;
            }
        }

        if self.client.deletes_container() {
            ledger
                .apply(Operation::DeleteResource, || self.client.delete(&resource))
                .map_err(Failure::Delete)?;
        }

        Ok(())
    }

    /// List a collection keyed by identifier
    fn observe(
        &self,
        resource: &C::Resource,
        collection: &str,
        ledger: &Ledger,
    ) -> Result<BTreeMap<Identifier, Member>, Failure> {
        let members = self
            .client
            .list(resource, collection)
            .map_err(|error| ledger.fetch_failure(Some(collection), error))?;

        let mut observed = BTreeMap::new();
        for member in members {
            if observed.contains_key(&member.id) {
                warn!(
                    "{} '{}' lists '{}' twice in {collection}; using the first",
                    ledger.kind, ledger.name, member.id
                );
                continue;
            }
            observed.insert(member.id.clone(), member);
        }
        Ok(observed)
    }
}

/// Observed members of one declared collection and what to change in it
struct CollectionPlan<'d> {
    collection: &'d str,
    declared: &'d Members,
    observed: BTreeMap<Identifier, Member>,
    diff: SetDiff,
}

/// Accumulates the change set of one pass and enforces the truthful-prefix rule
struct Ledger {
    kind: String,
    name: String,
    dry_run: bool,
    changes: ChangeSet,
}

impl Ledger {
    fn new(kind: &str, name: &str, options: Options) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            dry_run: options.dry_run,
            changes: ChangeSet::new(),
        }
    }

    fn record(&mut self, operation: Operation, outcome: Outcome) {
        match &outcome {
            Outcome::Applied => info!("{} '{}': {operation}", self.kind, self.name),
            Outcome::Skipped { reason } => {
                info!("{} '{}': would {operation} ({reason})", self.kind, self.name);
            }
            Outcome::Failed { error } => {
                warn!("{} '{}': {operation} failed: {error}", self.kind, self.name);
            }
        }
        self.changes.record(operation, outcome);
    }

    /// Issue one mutating call, or only record it under dry run
    fn apply(
        &mut self,
        operation: Operation,
        call: impl FnOnce() -> Result<(), RequestError>,
    ) -> Result<(), RequestError> {
        if self.dry_run {
            self.record(operation, Outcome::dry_run());
            return Ok(());
        }

        match call() {
            Ok(()) => {
                self.record(operation, Outcome::Applied);
                Ok(())
            }
            Err(error) => {
                self.record(operation, failed(&error));
                Err(error)
            }
        }
    }

    fn fetch_failure(&self, collection: Option<&str>, error: RequestError) -> Failure {
        let what = match collection {
            Some(collection) => format!("{collection} of {} '{}'", self.kind, self.name),
            None => format!("{} '{}'", self.kind, self.name),
        };
        Failure::Fetch { what, error }
    }

    fn finish(self, failure: Option<Failure>) -> ConvergenceResult {
        if let Some(failure) = &failure {
            warn!("{} '{}' did not converge: {failure}", self.kind, self.name);
        }
        ConvergenceResult {
            kind: self.kind,
            resource_name: self.name,
            changes: self.changes,
            failure,
        }
    }
}

fn failed(error: &RequestError) -> Outcome {
    Outcome::Failed {
        error: error.to_string(),
    }
}

fn member_failure(
    collection: &str,
    id: &Identifier,
    action: MemberAction,
    error: RequestError,
) -> Failure {
    Failure::Member {
        collection: collection.to_string(),
        id: id.clone(),
        action,
        error,
    }
}
