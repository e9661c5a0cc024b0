//! Heroku Platform API: app collaborators.
//!
//! See <https://devcenter.heroku.com/articles/platform-api-reference#collaborator>.
//! Collaborators are matched on the user's email address.

use crate::error::{Error, Result};
use crate::http::{HttpClient, Method, Paging};
use convergence::{Attributes, Identifier, Member, RequestError, ResourceClient};
use serde::Deserialize;
use serde_json::json;

/// Public Heroku Platform API.
pub const DEFAULT_API_BASE: &str = "https://api.heroku.com";

const COLLABORATORS: &str = "collaborators";

/// A Heroku app as observed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct App {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct CollaboratorRecord {
    id: String,
    user: CollaboratorUser,
}

#[derive(Debug, Deserialize)]
struct CollaboratorUser {
    email: String,
}

impl From<CollaboratorRecord> for Member {
    fn from(record: CollaboratorRecord) -> Self {
        Self::new(record.user.email).with_remote_id(record.id)
    }
}

/// Converges the collaborator lists of Heroku apps. Apps themselves are
/// never created or deleted.
#[derive(Debug, Clone)]
pub struct CollaboratorClient {
    http: HttpClient,
}

impl CollaboratorClient {
    /// Create a client for api.heroku.com.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Create a client for a custom API base.
    pub fn with_api_base(token: &str, api_base: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(Error::MissingToken {
                service: "Heroku",
                env: "HEROKU_API_KEY",
            });
        }

        let http = HttpClient::new(
            api_base,
            vec![
                ("Accept", "application/vnd.heroku+json; version=3".to_string()),
                ("Authorization", format!("Bearer {}", token.trim())),
            ],
        )?;

        Ok(Self { http })
    }

    fn collaborators_url(&self, app: &App, email: Option<&str>) -> url::Url {
        let mut segments = vec!["apps", app.name.as_str(), COLLABORATORS];
        segments.extend(email);
        self.http.url(&segments)
    }
}

impl ResourceClient for CollaboratorClient {
    type Resource = App;

    fn kind(&self) -> &'static str {
        "collaborators"
    }

    fn collections(&self) -> &'static [&'static str] {
        &[COLLABORATORS]
    }

    fn dependents(&self) -> &'static [&'static str] {
        &[COLLABORATORS]
    }

    fn deletes_container(&self) -> bool {
        false
    }

    fn creates(&self) -> bool {
        false
    }

    fn get(&self, name: &str) -> std::result::Result<Option<App>, RequestError> {
        self.http.get_optional(&self.http.url(&["apps", name]))
    }

    fn list(&self, app: &App, collection: &str) -> std::result::Result<Vec<Member>, RequestError> {
        if collection != COLLABORATORS {
            return Err(RequestError::unsupported(
                self.kind(),
                &format!("manage '{collection}'"),
            ));
        }
        let records: Vec<CollaboratorRecord> =
            self.http.get_all(self.collaborators_url(app, None), Paging::Range)?;
        Ok(records.into_iter().map(Member::from).collect())
    }

    fn add(
        &self,
        app: &App,
        _collection: &str,
        id: &Identifier,
        _spec: &Attributes,
    ) -> std::result::Result<(), RequestError> {
        let body = json!({ "user": id, "silent": false });
        self.http
            .send_checked(Method::Post, &self.collaborators_url(app, None), Some(&body))?;
        Ok(())
    }

    fn remove(
        &self,
        app: &App,
        _collection: &str,
        member: &Member,
    ) -> std::result::Result<(), RequestError> {
        let url = self.collaborators_url(app, Some(member.id.as_str()));
        self.http.send_checked(Method::Delete, &url, None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convergence::{DesiredState, StrictMode};

    fn client() -> CollaboratorClient {
        CollaboratorClient::new("hk_test").unwrap()
    }

    fn app() -> App {
        App {
            id: "01234567-89ab-cdef-0123-456789abcdef".into(),
            name: "web-prod".into(),
        }
    }

    #[test]
    fn test_requires_token() {
        assert!(CollaboratorClient::new("").is_err());
    }

    #[test]
    fn test_collaborator_record_to_member() {
        let record: CollaboratorRecord = serde_json::from_value(json!({
            "id": "c0ffee",
            "role": "collaborator",
            "user": {"email": "dev@example.com", "id": "u1", "federated": false},
            "app": {"name": "web-prod", "id": "a1"}
        }))
        .unwrap();
        let member = Member::from(record);
        assert_eq!(member.id, "dev@example.com");
        assert_eq!(member.remote_id.as_deref(), Some("c0ffee"));
    }

    #[test]
    fn test_collaborator_urls() {
        let client = client();
        assert_eq!(
            client.collaborators_url(&app(), None).as_str(),
            "https://api.heroku.com/apps/web-prod/collaborators"
        );
        assert_eq!(
            client.collaborators_url(&app(), Some("dev+ops@example.com")).path(),
            "/apps/web-prod/collaborators/dev+ops@example.com"
        );
    }

    #[test]
    fn test_app_is_kept_on_absent() {
        let client = client();
        assert!(!client.deletes_container());
        assert!(!client.creates());
        assert_eq!(client.dependents(), &[COLLABORATORS]);
    }

    #[test]
    fn test_validate_strict_collaborators() {
        let desired = DesiredState::new("web-prod")
            .members(COLLABORATORS, ["dev@example.com"])
            .mode(StrictMode::Strict);
        assert_eq!(client().validate(&desired), Ok(()));
    }
}
