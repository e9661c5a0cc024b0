//! IAM group membership.

use super::{GetGroupOutput, parse, unknown_collection};
use crate::aws::Aws;
use convergence::{Attributes, DesiredState, Identifier, Member, RequestError, ResourceClient};

const MEMBERS: &str = "members";

/// An IAM group as observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
}

/// Converges IAM groups and their user lists.
#[derive(Debug, Clone)]
pub struct GroupClient {
    aws: Aws,
}

impl GroupClient {
    pub fn new(aws: Aws) -> Self {
        Self { aws }
    }

    fn describe(&self, name: &str) -> Result<Option<GetGroupOutput>, RequestError> {
        let args = ["iam", "get-group", "--group-name", name];
        match self.aws.read(&args)? {
            Some(value) => parse(&args.join(" "), value).map(Some),
            None => Ok(None),
        }
    }
}

impl ResourceClient for GroupClient {
    type Resource = Group;

    fn kind(&self) -> &'static str {
        "group"
    }

    fn collections(&self) -> &'static [&'static str] {
        &[MEMBERS]
    }

    // IAM refuses to delete a group that still has users
    fn dependents(&self) -> &'static [&'static str] {
        &[MEMBERS]
    }

    fn get(&self, name: &str) -> Result<Option<Group>, RequestError> {
        Ok(self.describe(name)?.map(|output| Group {
            name: output.group.group_name,
        }))
    }

    fn create(&self, desired: &DesiredState) -> Result<Group, RequestError> {
        self.aws.call(&["iam", "create-group", "--group-name", desired.name.as_str()])?;
        Ok(Group {
            name: desired.name.clone(),
        })
    }

    fn delete(&self, group: &Group) -> Result<(), RequestError> {
        self.aws.call(&["iam", "delete-group", "--group-name", group.name.as_str()])?;
        Ok(())
    }

    fn list(&self, group: &Group, collection: &str) -> Result<Vec<Member>, RequestError> {
        if collection != MEMBERS {
            return Err(unknown_collection(self.kind(), collection));
        }
        let args = ["iam", "get-group", "--group-name", group.name.as_str()];
        let output: GetGroupOutput = parse(&args.join(" "), self.aws.call(&args)?)?;
        Ok(output
            .users
            .into_iter()
            .map(|user| Member::new(user.user_name))
            .collect())
    }

    fn add(
        &self,
        group: &Group,
        collection: &str,
        id: &Identifier,
        _spec: &Attributes,
    ) -> Result<(), RequestError> {
        if collection != MEMBERS {
            return Err(unknown_collection(self.kind(), collection));
        }
        self.aws.call(&[
            "iam",
            "add-user-to-group",
            "--group-name",
            group.name.as_str(),
            "--user-name",
            id.as_str(),
        ])?;
        Ok(())
    }

    fn remove(&self, group: &Group, collection: &str, member: &Member) -> Result<(), RequestError> {
        if collection != MEMBERS {
            return Err(unknown_collection(self.kind(), collection));
        }
        self.aws.call(&[
            "iam",
            "remove-user-from-group",
            "--group-name",
            group.name.as_str(),
            "--user-name",
            member.id.as_str(),
        ])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convergence::{StrictMode, ValidationError};

    fn client() -> GroupClient {
        GroupClient::new(Aws::new("/nonexistent/aws", None))
    }

    #[test]
    fn test_descriptor() {
        let client = client();
        assert_eq!(client.kind(), "group");
        assert_eq!(client.collections(), &["members"]);
        assert!(client.deletes_container());
    }

    #[test]
    fn test_validate_rejects_attributes() {
        let desired = DesiredState::new("Engineers").attribute("path", "/eng/");
        assert!(matches!(
            client().validate(&desired),
            Err(ValidationError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_validate_accepts_strict_members() {
        let desired = DesiredState::new("Engineers")
            .members("members", ["alice"])
            .mode(StrictMode::Strict);
        assert_eq!(client().validate(&desired), Ok(()));
    }

    #[test]
    fn test_unknown_collection_is_unsupported() {
        let group = Group { name: "Engineers".into() };
        let err = client().list(&group, "policies").unwrap_err();
        assert_eq!(err.kind, convergence::RequestErrorKind::Unsupported);
    }

    #[test]
    fn test_missing_cli_surfaces_as_transport() {
        let err = client().get("Engineers").unwrap_err();
        assert_eq!(err.kind, convergence::RequestErrorKind::Transport);
    }
}
