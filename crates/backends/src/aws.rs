//! `aws` CLI runner.
//!
//! IAM is driven through the installed AWS CLI so credentials, profiles and
//! regions resolve exactly as they do in the operator's shell.

use crate::error::{Error, Result};
use convergence::RequestError;
use log::debug;
use serde_json::Value;
use std::process::{Command, Output};

/// Error code the CLI prints when an IAM entity does not exist.
const NO_SUCH_ENTITY: &str = "NoSuchEntity";

/// Runner for `aws` subcommands with JSON output.
#[derive(Debug, Clone)]
pub struct Aws {
    /// Path or name of the aws executable
    binary: String,
    /// Named profile passed as `--profile`
    profile: Option<String>,
}

impl Aws {
    /// Create a runner without checking that the binary exists.
    pub fn new(binary: impl Into<String>, profile: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            profile,
        }
    }

    /// Create a runner, failing if `binary --version` cannot be executed.
    pub fn locate(binary: impl Into<String>, profile: Option<String>) -> Result<Self> {
        let aws = Self::new(binary, profile);
        let output = Command::new(&aws.binary)
            .arg("--version")
            .output()
            .map_err(|e| Error::ToolNotFound {
                binary: aws.binary.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::ToolNotFound {
                binary: aws.binary.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(aws)
    }

    /// Full argument list for a subcommand.
    fn args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = vec!["--output", "json"];
        if let Some(profile) = &self.profile {
            full.extend(["--profile", profile.as_str()]);
        }
        full.extend_from_slice(args);
        full
    }

    fn run(&self, args: &[&str]) -> std::result::Result<Output, RequestError> {
        let context = describe(args);
        debug!("{} {context}", self.binary);
        Command::new(&self.binary)
            .args(self.args(args))
            .output()
            .map_err(|e| {
                RequestError::transport(context, format!("failed to execute {}: {e}", self.binary))
            })
    }

    /// Run a read, `Ok(None)` when the entity does not exist.
    pub fn read(&self, args: &[&str]) -> std::result::Result<Option<Value>, RequestError> {
        let output = self.run(args)?;
        interpret(&describe(args), &output, true)
    }

    /// Run a call that must succeed.
    pub fn call(&self, args: &[&str]) -> std::result::Result<Value, RequestError> {
        let output = self.run(args)?;
        interpret(&describe(args), &output, false).map(Option::unwrap_or_default)
    }
}

/// Error context such as `iam get-group --group-name eng`.
fn describe(args: &[&str]) -> String {
    args.join(" ")
}

/// Classify a finished CLI invocation.
fn interpret(
    context: &str,
    output: &Output,
    missing_is_none: bool,
) -> std::result::Result<Option<Value>, RequestError> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    classify(context, output.status.code(), &stdout, &stderr, missing_is_none)
}

fn classify(
    context: &str,
    exit_code: Option<i32>,
    stdout: &str,
    stderr: &str,
    missing_is_none: bool,
) -> std::result::Result<Option<Value>, RequestError> {
    if exit_code != Some(0) {
        if missing_is_none && stderr.contains(NO_SUCH_ENTITY) {
            return Ok(None);
        }
        return Err(match exit_code {
            Some(code) => {
                RequestError::status(context, u16::try_from(code).unwrap_or(u16::MAX), stderr)
            }
            None => RequestError::transport(context, "terminated by signal"),
        });
    }

    if stdout.trim().is_empty() {
        return Ok(Some(Value::Null));
    }

    serde_json::from_str(stdout)
        .map(Some)
        .map_err(|e| RequestError::malformed(context, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use convergence::RequestErrorKind;

    #[test]
    fn test_args_include_output_and_profile() {
        let aws = Aws::new("aws", Some("admin".into()));
        assert_eq!(
            aws.args(&["iam", "get-user", "--user-name", "alice"]),
            vec!["--output", "json", "--profile", "admin", "iam", "get-user", "--user-name", "alice"]
        );

        let aws = Aws::new("aws", None);
        assert_eq!(aws.args(&["iam", "list-groups"])[..2], ["--output", "json"]);
    }

    #[test]
    fn test_no_such_entity_is_absence_for_reads() {
        let stderr = "An error occurred (NoSuchEntity) when calling the GetGroup operation: \
                      The group with name eng cannot be found.";
        let result = classify("iam get-group", Some(254), "", stderr, true).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_no_such_entity_is_error_for_writes() {
        let stderr = "An error occurred (NoSuchEntity) when calling the AddUserToGroup operation";
        let err = classify("iam add-user-to-group", Some(254), "", stderr, false).unwrap_err();
        assert_eq!(err.kind, RequestErrorKind::Status);
        assert_eq!(err.status, Some(254));
    }

    #[test]
    fn test_access_denied_is_error() {
        let stderr = "An error occurred (AccessDenied) when calling the GetUser operation";
        let err = classify("iam get-user", Some(254), "", stderr, true).unwrap_err();
        assert!(err.body.contains("AccessDenied"));
    }

    #[test]
    fn test_unparseable_output_is_malformed() {
        let err = classify("iam get-user", Some(0), "User: alice", "", true).unwrap_err();
        assert_eq!(err.kind, RequestErrorKind::Malformed);
    }

    #[test]
    fn test_empty_output_is_null() {
        let result = classify("iam delete-group", Some(0), "\n", "", false).unwrap();
        assert_eq!(result, Some(Value::Null));
    }

    #[test]
    fn test_signal_is_transport() {
        let err = classify("iam get-user", None, "", "", true).unwrap_err();
        assert_eq!(err.kind, RequestErrorKind::Transport);
    }

    #[test]
    fn test_missing_binary_is_transport() {
        let aws = Aws::new("/nonexistent/aws-cli-binary", None);
        let err = aws.read(&["iam", "get-user", "--user-name", "alice"]).unwrap_err();
        assert_eq!(err.kind, RequestErrorKind::Transport);
        assert!(Aws::locate("/nonexistent/aws-cli-binary", None).is_err());
    }
}
