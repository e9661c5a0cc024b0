//! Error types for reconciliation.
//!
//! Three families exist:
//! - [`RequestError`]: a remote call failed or answered something unusable
//! - [`ValidationError`]: the desired state cannot be converged as written
//! - [`Failure`]: why a convergence pass stopped, wrapping one of the above
//!
//! A remote "not found" is not an error at all. Clients report it as
//! `Ok(None)` from `get`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categories of request errors.
///
/// Kept separate so a malformed response is never mistaken for absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestErrorKind {
    /// The remote answered with a non-success status.
    Status,
    /// The request never completed (network, process spawn).
    Transport,
    /// The remote answered but the body could not be understood.
    Malformed,
    /// The resource kind has no such capability.
    Unsupported,
}

impl RequestErrorKind {
    /// Short user-facing description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Status => "remote rejected the request",
            Self::Transport => "request did not complete",
            Self::Malformed => "unexpected response",
            Self::Unsupported => "operation not supported",
        }
    }
}

impl fmt::Display for RequestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A failed call against a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{context}: {}", detail(.kind, .status, .body))]
pub struct RequestError {
    /// What failed.
    pub kind: RequestErrorKind,
    /// The call that failed, e.g. `PUT /orgs/acme/teams/eng/memberships/alice`.
    pub context: String,
    /// HTTP status or process exit code when one exists.
    pub status: Option<u16>,
    /// Response body or stderr, trimmed.
    pub body: String,
}

impl RequestError {
    /// The remote answered with a failure status.
    pub fn status(context: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            kind: RequestErrorKind::Status,
            context: context.into(),
            status: Some(status),
            body: body.into().trim().to_string(),
        }
    }

    /// The request never completed.
    pub fn transport(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: RequestErrorKind::Transport,
            context: context.into(),
            status: None,
            body: message.into(),
        }
    }

    /// The response could not be parsed.
    pub fn malformed(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: RequestErrorKind::Malformed,
            context: context.into(),
            status: None,
            body: message.into(),
        }
    }

    /// The resource kind cannot perform this operation.
    pub fn unsupported(kind: &str, operation: &str) -> Self {
        Self {
            kind: RequestErrorKind::Unsupported,
            context: format!("{kind} {operation}"),
            status: None,
            body: format!("{kind} resources cannot {operation}"),
        }
    }
}

fn detail(kind: &RequestErrorKind, status: &Option<u16>, body: &str) -> String {
    match (status, body.is_empty()) {
        (Some(code), true) => format!("{kind} (status {code})"),
        (Some(code), false) => format!("{kind} (status {code}): {body}"),
        (None, true) => kind.to_string(),
        (None, false) => format!("{kind}: {body}"),
    }
}

/// A desired state that cannot be converged as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ValidationError {
    /// The resource has no name.
    #[error("{kind} resource has an empty name")]
    EmptyName {
        /// Resource kind.
        kind: String,
    },

    /// Strict pruning was requested but no membership is managed.
    #[error("strict mode on {kind} '{name}' manages no collection; declare members or drop strict")]
    StrictWithoutMembers {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// A collection the kind does not have.
    #[error("{kind} resources have no '{collection}' collection")]
    UnknownCollection {
        /// Resource kind.
        kind: String,
        /// Offending collection.
        collection: String,
    },

    /// An attribute the kind does not manage.
    #[error("{kind} resources have no '{key}' attribute")]
    UnknownAttribute {
        /// Resource kind.
        kind: String,
        /// Offending key.
        key: String,
    },

    /// An attribute value of the wrong shape.
    #[error("{kind} attribute '{key}' must be {expected}")]
    InvalidAttribute {
        /// Resource kind.
        kind: String,
        /// Offending key.
        key: String,
        /// What the value should look like.
        expected: String,
    },

    /// A declared member with an empty identifier.
    #[error("empty identifier in '{collection}' of {kind} '{name}'")]
    EmptyIdentifier {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Collection holding the empty identifier.
        collection: String,
    },
}

/// Which membership step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberAction {
    /// Adding a member.
    Add,
    /// Removing a member.
    Remove,
    /// Patching a member's attributes.
    Patch,
}

impl fmt::Display for MemberAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("adding"),
            Self::Remove => f.write_str("removing"),
            Self::Patch => f.write_str("patching"),
        }
    }
}

/// Why a convergence pass stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "step", content = "detail", rename_all = "snake_case")]
pub enum Failure {
    /// The desired state was rejected before any remote call.
    #[error("invalid desired state: {0}")]
    Invalid(ValidationError),

    /// Reading observed state failed.
    #[error("error fetching {what}: {error}")]
    Fetch {
        /// What was being read.
        what: String,
        /// Underlying error.
        error: RequestError,
    },

    /// The missing resource could not be created.
    #[error("creation error: {0}")]
    Create(RequestError),

    /// The attribute patch was rejected.
    #[error("attribute patch error: {0}")]
    Patch(RequestError),

    /// A single member operation failed.
    #[error("error {action} '{id}' in {collection}: {error}")]
    Member {
        /// Collection being reconciled.
        collection: String,
        /// Member that failed.
        id: String,
        /// Step that failed.
        action: MemberAction,
        /// Underlying error.
        error: RequestError,
    },

    /// The resource could not be deleted.
    #[error("deletion error: {0}")]
    Delete(RequestError),
}

impl Failure {
    /// The remote error behind this failure, if any.
    #[must_use]
    pub fn request_error(&self) -> Option<&RequestError> {
        match self {
            Self::Invalid(_) => None,
            Self::Fetch { error, .. } | Self::Member { error, .. } => Some(error),
            Self::Create(error) | Self::Patch(error) | Self::Delete(error) => Some(error),
        }
    }
}

impl From<ValidationError> for Failure {
    fn from(err: ValidationError) -> Self {
        Self::Invalid(err)
    }
}
