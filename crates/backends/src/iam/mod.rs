//! AWS IAM groups and users.

mod groups;
mod users;

pub use groups::{Group, GroupClient};
pub use users::{User, UserClient};

use convergence::RequestError;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetGroupOutput {
    group: GroupRecord,
    #[serde(default)]
    users: Vec<UserRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupRecord {
    group_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetUserOutput {
    user: UserRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserRecord {
    user_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListAccessKeysOutput {
    #[serde(default)]
    access_key_metadata: Vec<AccessKeyRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateAccessKeyOutput {
    access_key: AccessKeyRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AccessKeyRecord {
    access_key_id: String,
}

/// Decode CLI output into a typed record.
fn parse<T: DeserializeOwned>(context: &str, value: Value) -> Result<T, RequestError> {
    serde_json::from_value(value).map_err(|e| RequestError::malformed(context, e.to_string()))
}

/// Error for a collection this kind does not have.
fn unknown_collection(kind: &str, collection: &str) -> RequestError {
    RequestError::unsupported(kind, &format!("manage '{collection}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_get_group() {
        let output: GetGroupOutput = parse(
            "iam get-group",
            json!({
                "Group": {"GroupName": "Engineers", "Arn": "arn:aws:iam::1:group/Engineers"},
                "Users": [{"UserName": "alice"}, {"UserName": "bob"}]
            }),
        )
        .unwrap();
        assert_eq!(output.group.group_name, "Engineers");
        assert_eq!(output.users.len(), 2);
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let err = parse::<GetUserOutput>("iam get-user", json!({"Users": []})).unwrap_err();
        assert_eq!(err.kind, convergence::RequestErrorKind::Malformed);
    }

    #[test]
    fn test_parse_created_key() {
        let output: CreateAccessKeyOutput = parse(
            "iam create-access-key",
            json!({"AccessKey": {
                "UserName": "alice",
                "AccessKeyId": "AKIAEXAMPLE",
                "Status": "Active",
                "SecretAccessKey": "redacted"
            }}),
        )
        .unwrap();
        assert_eq!(output.access_key.access_key_id, "AKIAEXAMPLE");
    }
}
