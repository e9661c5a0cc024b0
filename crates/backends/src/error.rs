//! Errors raised while setting up a backend.
//!
//! Failures of individual remote calls are [`convergence::RequestError`]s and
//! flow through the runner. The errors here happen before any resource is
//! touched: a missing token, a bad API base, an absent CLI.

use std::fmt;

/// Result type alias for backend construction.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of setup errors for user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A token is missing or empty.
    Credentials,
    /// A configured value is unusable.
    Configuration,
    /// A required external program is not installed.
    Tooling,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Credentials => "Missing credentials",
            Self::Configuration => "Invalid configuration",
            Self::Tooling => "Required tool not found",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Credentials => "Export the token variable or pass it on the command line",
            Self::Configuration => "Check the backend sections of the state file",
            Self::Tooling => "Install the tool or point the configuration at its binary",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while constructing a backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No token was supplied for an HTTP service.
    #[error("no API token for {service} (set {env})")]
    MissingToken {
        /// Service name.
        service: &'static str,
        /// Environment variable that supplies it.
        env: &'static str,
    },

    /// The API base cannot be used to build request URLs.
    #[error("invalid API base '{url}': {message}")]
    InvalidBaseUrl {
        /// Configured value.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    /// The external CLI could not be executed.
    #[error("'{binary}' is not runnable: {message}")]
    ToolNotFound {
        /// Configured binary.
        binary: String,
        /// Underlying failure.
        message: String,
    },
}

impl Error {
    /// Get the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingToken { .. } => ErrorCategory::Credentials,
            Self::InvalidBaseUrl { .. } => ErrorCategory::Configuration,
            Self::ToolNotFound { .. } => ErrorCategory::Tooling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = Error::MissingToken {
            service: "GitHub",
            env: "GITHUB_TOKEN",
        };
        assert_eq!(err.category(), ErrorCategory::Credentials);
        assert!(err.to_string().contains("GITHUB_TOKEN"));

        let err = Error::ToolNotFound {
            binary: "aws".into(),
            message: "No such file or directory".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Tooling);
    }

    #[test]
    fn test_category_advice() {
        assert!(!ErrorCategory::Configuration.advice().is_empty());
        assert_eq!(ErrorCategory::Tooling.to_string(), "Required tool not found");
    }
}
