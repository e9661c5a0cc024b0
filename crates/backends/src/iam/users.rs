//! IAM users and their access keys.
//!
//! The only managed attribute is `access_key = true`, which ensures the user
//! has at least one key. Keys are deleted through the `access_keys` collection:
//! declaring it empty in strict mode removes each key as its own member
//! operation. Secrets of created keys are never returned or stored; only the
//! key id is logged.

use super::{
    CreateAccessKeyOutput, GetUserOutput, ListAccessKeysOutput, parse, unknown_collection,
};
use crate::aws::Aws;
use convergence::{
    Attributes, DesiredState, Identifier, Member, RequestError, ResourceClient, ValidationError,
    check_declaration,
};
use log::info;
use serde_json::Value;

const ACCESS_KEY: &str = "access_key";
const ACCESS_KEYS: &str = "access_keys";

/// An IAM user as observed, with the ids of its access keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub access_keys: Vec<String>,
}

/// Converges IAM users.
#[derive(Debug, Clone)]
pub struct UserClient {
    aws: Aws,
}

impl UserClient {
    pub fn new(aws: Aws) -> Self {
        Self { aws }
    }

    fn access_keys(&self, user: &str) -> Result<Vec<String>, RequestError> {
        let args = ["iam", "list-access-keys", "--user-name", user];
        let output: ListAccessKeysOutput = parse(&args.join(" "), self.aws.call(&args)?)?;
        Ok(output
            .access_key_metadata
            .into_iter()
            .map(|key| key.access_key_id)
            .collect())
    }

    fn create_access_key(&self, user: &str) -> Result<(), RequestError> {
        let args = ["iam", "create-access-key", "--user-name", user];
        let output: CreateAccessKeyOutput = parse(&args.join(" "), self.aws.call(&args)?)?;
        info!("Created access key {} for {user}", output.access_key.access_key_id);
        Ok(())
    }

    fn delete_access_key(&self, user: &str, key_id: &str) -> Result<(), RequestError> {
        self.aws.call(&[
            "iam",
            "delete-access-key",
            "--user-name",
            user,
            "--access-key-id",
            key_id,
        ])?;
        Ok(())
    }
}

impl ResourceClient for UserClient {
    type Resource = User;

    fn kind(&self) -> &'static str {
        "user"
    }

    fn collections(&self) -> &'static [&'static str] {
        &[ACCESS_KEYS]
    }

    fn attribute_keys(&self) -> &'static [&'static str] {
        &[ACCESS_KEY]
    }

    // IAM refuses to delete a user that still has access keys
    fn dependents(&self) -> &'static [&'static str] {
        &[ACCESS_KEYS]
    }

    fn validate(&self, desired: &DesiredState) -> Result<(), ValidationError> {
        check_declaration(self, desired)?;
        let invalid = |key: &str, expected: &str| ValidationError::InvalidAttribute {
            kind: self.kind().to_string(),
            key: key.to_string(),
            expected: expected.to_string(),
        };

        let keys = desired.collections.get(ACCESS_KEYS);
        if keys.is_some_and(|keys| !keys.is_empty()) {
            return Err(invalid(ACCESS_KEYS, "an empty list; keys cannot be declared by id"));
        }
        match desired.attributes.get(ACCESS_KEY) {
            None => Ok(()),
            Some(Value::Bool(true)) if keys.is_none() => Ok(()),
            Some(Value::Bool(true)) => Err(invalid(
                ACCESS_KEY,
                "no access_keys collection alongside access_key = true",
            )),
            Some(_) => Err(invalid(
                ACCESS_KEY,
                "true; declare an empty access_keys collection to delete keys",
            )),
        }
    }

    fn get(&self, name: &str) -> Result<Option<User>, RequestError> {
        let args = ["iam", "get-user", "--user-name", name];
        let Some(value) = self.aws.read(&args)? else {
            return Ok(None);
        };
        let output: GetUserOutput = parse(&args.join(" "), value)?;
        let access_keys = self.access_keys(&output.user.user_name)?;
        Ok(Some(User {
            name: output.user.user_name,
            access_keys,
        }))
    }

    fn create(&self, desired: &DesiredState) -> Result<User, RequestError> {
        self.aws.call(&["iam", "create-user", "--user-name", desired.name.as_str()])?;
        Ok(User {
            name: desired.name.clone(),
            access_keys: Vec::new(),
        })
    }

    fn attributes(&self, user: &User) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(ACCESS_KEY.to_string(), Value::Bool(!user.access_keys.is_empty()));
        attributes
    }

    fn edit(&self, user: &User, patch: &Attributes) -> Result<(), RequestError> {
        match patch.get(ACCESS_KEY) {
            Some(Value::Bool(true)) if user.access_keys.is_empty() => {
                self.create_access_key(&user.name)
            }
            Some(Value::Bool(true)) | None => Ok(()),
            Some(other) => Err(RequestError::unsupported(
                self.kind(),
                &format!("set {ACCESS_KEY} to {other}"),
            )),
        }
    }

    fn delete(&self, user: &User) -> Result<(), RequestError> {
        self.aws.call(&["iam", "delete-user", "--user-name", user.name.as_str()])?;
        Ok(())
    }

    fn list(&self, user: &User, collection: &str) -> Result<Vec<Member>, RequestError> {
        if collection != ACCESS_KEYS {
            return Err(unknown_collection(self.kind(), collection));
        }
        Ok(self
            .access_keys(&user.name)?
            .into_iter()
            .map(|id| Member::new(id.clone()).with_remote_id(id))
            .collect())
    }

    fn add(
        &self,
        _user: &User,
        collection: &str,
        _id: &Identifier,
        _spec: &Attributes,
    ) -> Result<(), RequestError> {
        Err(RequestError::unsupported(
            self.kind(),
            &format!("add to '{collection}'"),
        ))
    }

    fn remove(&self, user: &User, collection: &str, member: &Member) -> Result<(), RequestError> {
        if collection != ACCESS_KEYS {
            return Err(unknown_collection(self.kind(), collection));
        }
        self.delete_access_key(&user.name, &member.id)
    }
}
