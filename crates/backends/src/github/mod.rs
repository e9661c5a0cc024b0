//! GitHub REST API clients.
//!
//! # Rate Limiting
//!
//! Every call is authenticated with the configured token, so the
//! per-token limit applies. List endpoints request 100 items per page and
//! follow `Link: rel="next"` until exhausted.

mod hooks;
mod teams;

pub use hooks::{HookClient, Repo};
pub use teams::{Team, TeamClient};

use crate::error::{Error, Result};
use crate::http::{HttpClient, Paging};
use convergence::RequestError;
use serde::de::DeserializeOwned;
use url::Url;

/// Public GitHub API.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Items requested per page on list endpoints.
const PER_PAGE: &str = "100";

/// Authenticated GitHub API handle shared by the team and hook clients.
#[derive(Debug, Clone)]
pub struct GitHub {
    http: HttpClient,
}

impl GitHub {
    /// Create a handle for api.github.com.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Create a handle for a custom API base (GitHub Enterprise).
    pub fn with_api_base(token: &str, api_base: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(Error::MissingToken {
                service: "GitHub",
                env: "GITHUB_TOKEN",
            });
        }

        let http = HttpClient::new(
            api_base,
            vec![
                ("Accept", "application/vnd.github+json".to_string()),
                ("Authorization", format!("Bearer {}", token.trim())),
                ("User-Agent", concat!("converge/", env!("CARGO_PKG_VERSION")).to_string()),
                ("X-GitHub-Api-Version", "2022-11-28".to_string()),
            ],
        )?;

        Ok(Self { http })
    }

    fn http(&self) -> &HttpClient {
        &self.http
    }

    fn url(&self, segments: &[&str]) -> Url {
        self.http.url(segments)
    }

    /// Fetch every item of a list endpoint.
    fn list<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> std::result::Result<Vec<T>, RequestError> {
        let mut url = self.url(segments);
        url.query_pairs_mut().append_pair("per_page", PER_PAGE);
        self.http.get_all(url, Paging::Link)
    }
}

/// Split `owner/repo`, rejecting anything else.
pub fn split_repo(full_name: &str) -> Option<(&str, &str)> {
    let (owner, repo) = full_name.split_once('/')?;
    let valid = |part: &str| !part.is_empty() && !part.contains('/') && part.trim() == part;
    (valid(owner) && valid(repo)).then_some((owner, repo))
}
