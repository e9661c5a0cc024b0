//! Organization teams: membership, repository access and permission.

use super::{GitHub, split_repo};
use crate::http::Method;
use convergence::{
    Attributes, DesiredState, Identifier, Member, RequestError, ResourceClient, ValidationError,
    check_declaration,
};
use serde::Deserialize;
use serde_json::{Value, json};

const MEMBERS: &str = "members";
const REPOS: &str = "repos";
const PERMISSION: &str = "permission";

/// Permissions a team can hold on its repositories.
pub const PERMISSIONS: &[&str] = &["pull", "triage", "push", "maintain", "admin"];

/// A team as observed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Team {
    pub id: u64,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub permission: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoRecord {
    full_name: String,
}

/// Converges the teams of one organization.
#[derive(Debug, Clone)]
pub struct TeamClient {
    github: GitHub,
    org: String,
}

impl TeamClient {
    pub fn new(github: GitHub, org: impl Into<String>) -> Self {
        Self {
            github,
            org: org.into(),
        }
    }

    fn team_segments<'a>(&'a self, team: &'a Team, rest: &[&'a str]) -> Vec<&'a str> {
        let mut segments = vec!["orgs", self.org.as_str(), "teams", team.slug.as_str()];
        segments.extend_from_slice(rest);
        segments
    }

    /// Path under the team for one member of a collection.
    fn member_segments<'a>(
        &'a self,
        team: &'a Team,
        collection: &str,
        id: &'a str,
    ) -> Result<Vec<&'a str>, RequestError> {
        match collection {
            MEMBERS => Ok(self.team_segments(team, &["memberships", id])),
            REPOS => {
                let (owner, repo) = split_repo(id).ok_or_else(|| {
                    RequestError::unsupported(self.kind(), &format!("use repository '{id}'"))
                })?;
                Ok(self.team_segments(team, &["repos", owner, repo]))
            }
            other => Err(RequestError::unsupported(self.kind(), &format!("manage '{other}'"))),
        }
    }
}

impl ResourceClient for TeamClient {
    type Resource = Team;

    fn kind(&self) -> &'static str {
        "team"
    }

    fn collections(&self) -> &'static [&'static str] {
        &[MEMBERS, REPOS]
    }

    fn attribute_keys(&self) -> &'static [&'static str] {
        &[PERMISSION]
    }

    fn validate(&self, desired: &DesiredState) -> Result<(), ValidationError> {
        check_declaration(self, desired)?;

        if let Some(permission) = desired.attributes.get(PERMISSION)
            && !permission.as_str().is_some_and(|p| PERMISSIONS.contains(&p))
        {
            return Err(ValidationError::InvalidAttribute {
                kind: self.kind().to_string(),
                key: PERMISSION.to_string(),
                expected: format!("one of {}", PERMISSIONS.join(", ")),
            });
        }

        if let Some(repos) = desired.collections.get(REPOS)
            && let Some(bad) = repos.keys().find(|id| split_repo(id).is_none())
        {
            return Err(ValidationError::InvalidAttribute {
                kind: self.kind().to_string(),
                key: format!("{REPOS}.{bad}"),
                expected: "an owner/repo name".to_string(),
            });
        }

        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Team>, RequestError> {
        let teams: Vec<Team> = self.github.list(&["orgs", self.org.as_str(), "teams"])?;
        let Some(team) = teams.into_iter().find(|team| team.name == name) else {
            return Ok(None);
        };

        // The list view can omit fields the single-team view carries
        let url = self.github.url(&["orgs", self.org.as_str(), "teams", team.slug.as_str()]);
        self.github.http().get_optional(&url)
    }

    fn create(&self, desired: &DesiredState) -> Result<Team, RequestError> {
        let mut body = json!({ "name": desired.name });
        if let Some(permission) = desired.attributes.get(PERMISSION) {
            body[PERMISSION] = permission.clone();
        }
        if let Some(repos) = desired.collections.get(REPOS)
            && !repos.is_empty()
        {
            body["repo_names"] = repos.keys().cloned().collect::<Vec<_>>().into();
        }

        let url = self.github.url(&["orgs", self.org.as_str(), "teams"]);
        self.github
            .http()
            .send_checked(Method::Post, &url, Some(&body))?
            .json()
    }

    fn attributes(&self, team: &Team) -> Attributes {
        let mut attributes = Attributes::new();
        if let Some(permission) = &team.permission {
            attributes.insert(PERMISSION.to_string(), Value::String(permission.clone()));
        }
        attributes
    }

    fn edit(&self, team: &Team, patch: &Attributes) -> Result<(), RequestError> {
        let body = Value::Object(patch.clone().into_iter().collect());
        let url = self.github.url(&self.team_segments(team, &[]));
        self.github.http().send_checked(Method::Patch, &url, Some(&body))?;
        Ok(())
    }

    fn delete(&self, team: &Team) -> Result<(), RequestError> {
        let url = self.github.url(&self.team_segments(team, &[]));
        self.github.http().send_checked(Method::Delete, &url, None)?;
        Ok(())
    }

    fn list(&self, team: &Team, collection: &str) -> Result<Vec<Member>, RequestError> {
        match collection {
            MEMBERS => {
                let users: Vec<UserRecord> =
                    self.github.list(&self.team_segments(team, &["members"]))?;
                Ok(users.into_iter().map(|u| Member::new(u.login)).collect())
            }
            REPOS => {
                let repos: Vec<RepoRecord> =
                    self.github.list(&self.team_segments(team, &["repos"]))?;
                Ok(repos.into_iter().map(|r| Member::new(r.full_name)).collect())
            }
            other => Err(RequestError::unsupported(self.kind(), &format!("manage '{other}'"))),
        }
    }

    fn add(
        &self,
        team: &Team,
        collection: &str,
        id: &Identifier,
        _spec: &Attributes,
    ) -> Result<(), RequestError> {
        let url = self.github.url(&self.member_segments(team, collection, id)?);
        // Repository access without an explicit permission inherits the team's
        let body = match collection {
            MEMBERS => json!({ "role": "member" }),
            _ => json!({}),
        };
        self.github.http().send_checked(Method::Put, &url, Some(&body))?;
        Ok(())
    }

    fn remove(&self, team: &Team, collection: &str, member: &Member) -> Result<(), RequestError> {
        let url = self.github.url(&self.member_segments(team, collection, &member.id)?);
        self.github.http().send_checked(Method::Delete, &url, None)?;
        Ok(())
    }
}
