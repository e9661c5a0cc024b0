//! State file schema
//!
//! A state file declares resources in arrays of tables, one array per kind:
//!
//! ```toml
//! [aws]
//! profile = "ops"
//!
//! [[group]]
//! name = "developers"
//! members = ["alice", "bob"]
//! strict = true
//!
//! [[team]]
//! org = "acme"
//! name = "Platform"
//! permission = "push"
//! members = ["alice"]
//! repos = ["acme/web"]
//!
//! [[hooks]]
//! repo = "acme/web"
//! [hooks.hooks.ci]
//! events = ["push", "pull_request"]
//! config = { url = "https://ci.example.com/hook", content_type = "json" }
//! ```
//!
//! Every entry accepts `ensure = "present" | "absent"` and `strict`.

use anyhow::{Result, bail};
use convergence::{Attributes, DesiredState, Members, StrictMode};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

static REPO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("valid repository regex")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex")
});

// ============================================================================
// File Layout
// ============================================================================

/// Contents of `converge.toml` / `converge.json`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateFile {
    #[serde(default)]
    pub github: ServiceSettings,

    #[serde(default)]
    pub heroku: ServiceSettings,

    #[serde(default)]
    pub aws: AwsSettings,

    #[serde(default, rename = "group")]
    pub groups: Vec<GroupDecl>,

    #[serde(default, rename = "user")]
    pub users: Vec<UserDecl>,

    #[serde(default, rename = "team")]
    pub teams: Vec<TeamDecl>,

    #[serde(default)]
    pub hooks: Vec<HooksDecl>,

    #[serde(default)]
    pub collaborators: Vec<CollaboratorsDecl>,
}

/// Settings for an HTTP service
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSettings {
    /// Override the public API endpoint (e.g. GitHub Enterprise)
    pub api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsSettings {
    /// Path or name of the aws executable
    pub binary: Option<String>,
    /// Named profile passed as `--profile`
    pub profile: Option<String>,
}

/// Whether a declared resource should exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDecl {
    pub name: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub strict: bool,
    pub members: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserDecl {
    pub name: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub strict: bool,
    pub access_key: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamDecl {
    pub org: String,
    pub name: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub strict: bool,
    pub permission: Option<String>,
    pub members: Option<Vec<String>>,
    pub repos: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HooksDecl {
    pub repo: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub strict: bool,
    pub hooks: Option<BTreeMap<String, HookDecl>>,
}

/// One webhook, keyed by its name
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookDecl {
    pub config: Option<Map<String, Value>>,
    pub events: Option<Vec<String>>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollaboratorsDecl {
    pub app: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub strict: bool,
    pub collaborators: Option<Vec<String>>,
}

// ============================================================================
// Declarations
// ============================================================================

/// Resource kinds a state file can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    Group,
    User,
    Team,
    Hooks,
    Collaborators,
}

impl Kind {
    pub const ALL: [Self; 5] = [
        Self::Group,
        Self::User,
        Self::Team,
        Self::Hooks,
        Self::Collaborators,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::User => "user",
            Self::Team => "team",
            Self::Hooks => "hooks",
            Self::Collaborators => "collaborators",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resource to converge, lowered from a state file entry
#[derive(Debug, Clone)]
pub struct Declaration {
    pub kind: Kind,
    /// GitHub organization, for teams
    pub org: Option<String>,
    pub ensure: Ensure,
    pub desired: DesiredState,
}

impl Declaration {
    fn new(kind: Kind, ensure: Ensure, desired: DesiredState) -> Self {
        Self {
            kind,
            org: None,
            ensure,
            desired,
        }
    }

    pub fn name(&self) -> &str {
        &self.desired.name
    }

    /// Display label, e.g. `team acme/Platform`
    pub fn label(&self) -> String {
        match &self.org {
            Some(org) => format!("{} {org}/{}", self.kind, self.name()),
            None => format!("{} {}", self.kind, self.name()),
        }
    }

    /// Identity of the remote resource; unique within a state file
    pub fn key(&self) -> (Kind, Option<&str>, &str) {
        (self.kind, self.org.as_deref(), self.name())
    }

    /// Whether this declaration is selected by a parsed target
    pub fn matches(&self, kind: Option<Kind>, name: Option<&str>) -> bool {
        kind.is_none_or(|k| k == self.kind) && name.is_none_or(|n| n == self.name())
    }
}

fn members(ids: &[String]) -> Members {
    ids.iter().map(|id| (id.clone(), Attributes::new())).collect()
}

fn hook_members(hooks: &BTreeMap<String, HookDecl>) -> Members {
    hooks
        .iter()
        .map(|(name, hook)| {
            let mut attributes = Attributes::new();
            if let Some(config) = &hook.config {
                attributes.insert("config".to_string(), Value::Object(config.clone()));
            }
            if let Some(events) = &hook.events {
                attributes.insert("events".to_string(), events.clone().into());
            }
            if let Some(active) = hook.active {
                attributes.insert("active".to_string(), Value::Bool(active));
            }
            (name.clone(), attributes)
        })
        .collect()
}

fn with_collection(
    desired: DesiredState,
    collection: &str,
    ids: Option<&Vec<String>>,
) -> DesiredState {
    match ids {
        Some(ids) => desired.members_with(collection, members(ids)),
        None => desired,
    }
}

impl StateFile {
    /// Lower every entry into a declaration, in file order grouped by kind
    pub fn declarations(&self) -> Vec<Declaration> {
        let mut out = Vec::new();

        for group in &self.groups {
            let desired = DesiredState::new(&group.name).mode(StrictMode::from_flag(group.strict));
            let desired = with_collection(desired, "members", group.members.as_ref());
            out.push(Declaration::new(Kind::Group, group.ensure, desired));
        }

        for user in &self.users {
            let mut desired =
                DesiredState::new(&user.name).mode(StrictMode::from_flag(user.strict));
            match user.access_key {
                Some(true) => desired = desired.attribute("access_key", true),
                // Each key is removed as its own member operation
                Some(false) => {
                    desired = desired
                        .members("access_keys", Vec::<String>::new())
                        .mode(StrictMode::Strict);
                }
                None => {}
            }
            out.push(Declaration::new(Kind::User, user.ensure, desired));
        }

        for team in &self.teams {
            let mut desired =
                DesiredState::new(&team.name).mode(StrictMode::from_flag(team.strict));
            if let Some(permission) = &team.permission {
                desired = desired.attribute("permission", permission.as_str());
            }
            let desired = with_collection(desired, "members", team.members.as_ref());
            let desired = with_collection(desired, "repos", team.repos.as_ref());
            out.push(Declaration {
                org: Some(team.org.clone()),
                ..Declaration::new(Kind::Team, team.ensure, desired)
            });
        }

        for repo in &self.hooks {
            let mut desired =
                DesiredState::new(&repo.repo).mode(StrictMode::from_flag(repo.strict));
            if let Some(hooks) = &repo.hooks {
                desired = desired.members_with("hooks", hook_members(hooks));
            }
            out.push(Declaration::new(Kind::Hooks, repo.ensure, desired));
        }

        for app in &self.collaborators {
            let desired = DesiredState::new(&app.app).mode(StrictMode::from_flag(app.strict));
            let desired = with_collection(desired, "collaborators", app.collaborators.as_ref());
            out.push(Declaration::new(Kind::Collaborators, app.ensure, desired));
        }

        out
    }

    /// Checks that need nothing but the file itself
    ///
    /// Per-kind rules (known collections, attribute values) are checked by
    /// the backends before any request is sent.
    pub fn check(&self) -> Result<()> {
        for team in &self.teams {
            if team.org.trim().is_empty() {
                bail!("team '{}' has an empty org", team.name);
            }
            for repo in team.repos.iter().flatten() {
                if !REPO_RE.is_match(repo) {
                    bail!("team '{}': '{repo}' is not an owner/repo name", team.name);
                }
            }
            check_unique(&format!("team '{}' members", team.name), team.members.as_deref())?;
            check_unique(&format!("team '{}' repos", team.name), team.repos.as_deref())?;
        }

        for group in &self.groups {
            check_unique(&format!("group '{}' members", group.name), group.members.as_deref())?;
        }

        for repo in &self.hooks {
            if !REPO_RE.is_match(&repo.repo) {
                bail!("hooks: '{}' is not an owner/repo name", repo.repo);
            }
        }

        for app in &self.collaborators {
            for email in app.collaborators.iter().flatten() {
                if !EMAIL_RE.is_match(email) {
                    bail!("collaborators of '{}': '{email}' is not an email address", app.app);
                }
            }
            check_unique(
                &format!("collaborators of '{}'", app.app),
                app.collaborators.as_deref(),
            )?;
        }

        let declarations = self.declarations();
        let mut seen = BTreeSet::new();
        for declaration in &declarations {
            if !seen.insert(declaration.key()) {
                bail!("{} is declared more than once", declaration.label());
            }
        }

        Ok(())
    }
}

fn check_unique(what: &str, ids: Option<&[String]>) -> Result<()> {
    let mut seen = BTreeSet::new();
    for id in ids.into_iter().flatten() {
        if !seen.insert(id.as_str()) {
            bail!("{what}: '{id}' is listed more than once");
        }
    }
    Ok(())
}

/// Parse a target filter: `kind` or `kind.name`
pub fn parse_target(target: Option<&str>) -> Result<(Option<Kind>, Option<String>)> {
    let Some(target) = target else {
        return Ok((None, None));
    };

    let (kind, name) = match target.split_once('.') {
        Some((kind, name)) => (kind, Some(name.to_string())),
        None => (target, None),
    };

    match Kind::parse(kind) {
        Some(kind) => Ok((Some(kind), name)),
        None => {
            let known: Vec<_> = Kind::ALL.iter().map(Kind::as_str).collect();
            bail!("Unknown kind '{kind}'. Expected one of: {}", known.join(", "))
        }
    }
}
