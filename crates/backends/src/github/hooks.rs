//! Repository webhooks, matched by hook name.

use super::{GitHub, split_repo};
use crate::http::Method;
use convergence::{
    Attributes, DesiredState, Identifier, Member, RequestError, ResourceClient, ValidationError,
    check_declaration,
};
use serde::Deserialize;
use serde_json::{Value, json};

const HOOKS: &str = "hooks";
const CONFIG: &str = "config";
const EVENTS: &str = "events";
const ACTIVE: &str = "active";

/// A repository as observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct RepoRecord {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct HookRecord {
    id: u64,
    name: String,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    events: Vec<String>,
    #[serde(default)]
    config: Value,
}

impl From<HookRecord> for Member {
    fn from(hook: HookRecord) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(CONFIG.to_string(), hook.config);
        attributes.insert(EVENTS.to_string(), hook.events.into());
        attributes.insert(ACTIVE.to_string(), hook.active.into());
        Self::new(hook.name)
            .with_remote_id(hook.id.to_string())
            .with_attributes(attributes)
    }
}

/// Converges the hooks of repositories. The repository itself is never
/// created or deleted.
#[derive(Debug, Clone)]
pub struct HookClient {
    github: GitHub,
}

impl HookClient {
    pub fn new(github: GitHub) -> Self {
        Self { github }
    }

    fn hooks_url(&self, repo: &Repo, hook_id: Option<&str>) -> url::Url {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str(), HOOKS];
        segments.extend(hook_id);
        self.github.url(&segments)
    }

    fn hook_id<'a>(&self, member: &'a Member) -> Result<&'a str, RequestError> {
        member.remote_id.as_deref().ok_or_else(|| {
            RequestError::malformed(format!("hook '{}'", member.id), "observed hook has no id")
        })
    }
}

/// Body for a new hook, filling in GitHub's usual defaults.
fn creation_body(name: &str, spec: &Attributes) -> Value {
    json!({
        "name": name,
        "config": spec.get(CONFIG).cloned().unwrap_or_else(|| json!({})),
        "events": spec.get(EVENTS).cloned().unwrap_or_else(|| json!(["push"])),
        "active": spec.get(ACTIVE).cloned().unwrap_or(Value::Bool(true)),
    })
}

fn check_hook_attribute(key: &str, value: &Value) -> Option<&'static str> {
    let valid = match key {
        CONFIG => value.is_object(),
        EVENTS => value
            .as_array()
            .is_some_and(|events| events.iter().all(Value::is_string)),
        ACTIVE => value.is_boolean(),
        _ => true,
    };
    if valid {
        return None;
    }
    Some(match key {
        CONFIG => "an object",
        EVENTS => "a list of event names",
        _ => "true or false",
    })
}

impl ResourceClient for HookClient {
    type Resource = Repo;

    fn kind(&self) -> &'static str {
        "hooks"
    }

    fn collections(&self) -> &'static [&'static str] {
        &[HOOKS]
    }

    fn member_attribute_keys(&self) -> &'static [&'static str] {
        &[CONFIG, EVENTS, ACTIVE]
    }

    fn unordered_keys(&self) -> &'static [&'static str] {
        &[EVENTS]
    }

    fn dependents(&self) -> &'static [&'static str] {
        &[HOOKS]
    }

    fn deletes_container(&self) -> bool {
        false
    }

    fn creates(&self) -> bool {
        false
    }

    fn validate(&self, desired: &DesiredState) -> Result<(), ValidationError> {
        check_declaration(self, desired)?;
        let kind = self.kind().to_string();

        if split_repo(&desired.name).is_none() {
            return Err(ValidationError::InvalidAttribute {
                kind,
                key: "name".to_string(),
                expected: "an owner/repo name".to_string(),
            });
        }

        for (hook, attributes) in desired.collections.values().flatten() {
            for (key, value) in attributes {
                if let Some(expected) = check_hook_attribute(key, value) {
                    return Err(ValidationError::InvalidAttribute {
                        kind,
                        key: format!("{hook}.{key}"),
                        expected: expected.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Repo>, RequestError> {
        let (owner, repo) = split_repo(name)
            .ok_or_else(|| RequestError::malformed(name, "expected an owner/repo name"))?;
        let record: Option<RepoRecord> =
            self.github.http().get_optional(&self.github.url(&["repos", owner, repo]))?;

        Ok(record.and_then(|record| {
            split_repo(&record.full_name).map(|(owner, name)| Repo {
                owner: owner.to_string(),
                name: name.to_string(),
            })
        }))
    }

    fn list(&self, repo: &Repo, collection: &str) -> Result<Vec<Member>, RequestError> {
        if collection != HOOKS {
            return Err(RequestError::unsupported(
                self.kind(),
                &format!("manage '{collection}'"),
            ));
        }
        let hooks: Vec<HookRecord> =
            self.github.list(&["repos", repo.owner.as_str(), repo.name.as_str(), HOOKS])?;
        Ok(hooks.into_iter().map(Member::from).collect())
    }

    fn add(
        &self,
        repo: &Repo,
        _collection: &str,
        id: &Identifier,
        spec: &Attributes,
    ) -> Result<(), RequestError> {
        let url = self.hooks_url(repo, None);
        let body = creation_body(id, spec);
        self.github.http().send_checked(Method::Post, &url, Some(&body))?;
        Ok(())
    }

    fn remove(&self, repo: &Repo, _collection: &str, member: &Member) -> Result<(), RequestError> {
        let hook_id = self.hook_id(member)?;
        let url = self.hooks_url(repo, Some(hook_id));
        self.github.http().send_checked(Method::Delete, &url, None)?;
        Ok(())
    }

    fn edit_member(
        &self,
        repo: &Repo,
        _collection: &str,
        member: &Member,
        patch: &Attributes,
    ) -> Result<(), RequestError> {
        let hook_id = self.hook_id(member)?;
        let url = self.hooks_url(repo, Some(hook_id));
        let body = Value::Object(patch.clone().into_iter().collect());
        self.github.http().send_checked(Method::Patch, &url, Some(&body))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convergence::Members;

    fn client() -> HookClient {
        HookClient::new(GitHub::new("ghp_test").unwrap())
    }

    fn attrs(value: Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_hook_record_to_member() {
        let record: HookRecord = serde_json::from_value(json!({
            "id": 42,
            "name": "web",
            "active": true,
            "events": ["push", "pull_request"],
            "config": {"url": "https://ci.example.com/hook", "content_type": "json"},
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        let member = Member::from(record);
        assert_eq!(member.id, "web");
        assert_eq!(member.remote_id.as_deref(), Some("42"));
        assert_eq!(member.attributes[EVENTS], json!(["push", "pull_request"]));
        assert_eq!(member.attributes[ACTIVE], json!(true));
    }

    #[test]
    fn test_creation_defaults() {
        let body = creation_body("web", &Attributes::new());
        assert_eq!(
            body,
            json!({"name": "web", "config": {}, "events": ["push"], "active": true})
        );
    }

    #[test]
    fn test_creation_uses_declared_values() {
        let spec = attrs(json!({"events": ["release"], "active": false}));
        let body = creation_body("web", &spec);
        assert_eq!(body["events"], json!(["release"]));
        assert_eq!(body["active"], json!(false));
    }

    #[test]
    fn test_validate_requires_owner_repo() {
        let desired = DesiredState::new("web").members(HOOKS, ["web"]);
        assert!(matches!(
            client().validate(&desired),
            Err(ValidationError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_validate_attribute_shapes() {
        let mut hooks = Members::new();
        hooks.insert("web".into(), attrs(json!({"events": "push"})));
        let desired = DesiredState::new("acme/web").members_with(HOOKS, hooks);

        match client().validate(&desired) {
            Err(ValidationError::InvalidAttribute { key, .. }) => assert_eq!(key, "web.events"),
            other => panic!("expected invalid events, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_accepts_full_hook() {
        let mut hooks = Members::new();
        hooks.insert(
            "web".into(),
            attrs(json!({"config": {"url": "https://ci"}, "events": ["push"], "active": true})),
        );
        let desired = DesiredState::new("acme/web").members_with(HOOKS, hooks);
        assert_eq!(client().validate(&desired), Ok(()));
    }

    #[test]
    fn test_repository_is_kept_on_absent() {
        let client = client();
        assert!(!client.deletes_container());
        assert!(!client.creates());
        assert_eq!(client.dependents(), &[HOOKS]);
        assert_eq!(client.unordered_keys(), &[EVENTS]);
    }

    #[test]
    fn test_observed_hook_without_id_is_malformed() {
        let err = client().hook_id(&Member::new("web")).unwrap_err();
        assert_eq!(err.kind, convergence::RequestErrorKind::Malformed);
    }
}
