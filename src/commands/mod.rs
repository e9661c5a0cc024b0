pub mod apply;
pub mod plan;
pub mod validate;

use anyhow::{Context as _, Result, anyhow};
use backends::aws::Aws;
use backends::github::{self, GitHub, HookClient, TeamClient};
use backends::heroku::{self, CollaboratorClient};
use backends::iam::{GroupClient, UserClient};
use convergence::{
    ChangeSummary, ConvergenceResult, ConvergenceRunner, DesiredState, Failure, Options,
    ResourceClient, ValidationError,
};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::path::Path;

use crate::Context;
use crate::config;
use crate::schema::{Declaration, Ensure, Kind, StateFile, parse_target};
use crate::ui;

/// Default executable for IAM kinds
const AWS_BINARY: &str = "aws";

/// Stand-in token for clients that only validate and never send a request
const OFFLINE_TOKEN: &str = "offline";

/// How far client construction may reach outside the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connect {
    /// Real tokens, and the aws binary must run
    Online,
    /// Nothing is checked; clients are only used for validation
    Offline,
}

/// One client per service, built only for the kinds a run needs
#[derive(Debug, Default)]
pub struct Clients {
    groups: Option<GroupClient>,
    users: Option<UserClient>,
    github: Option<GitHub>,
    hooks: Option<HookClient>,
    collaborators: Option<CollaboratorClient>,
}

fn setup_error(err: backends::Error) -> anyhow::Error {
    let category = err.category();
    anyhow!("{}: {err}\n  {}", category.description(), category.advice())
}

fn token(connect: Connect, token: Option<&str>) -> String {
    match (connect, token) {
        (_, Some(token)) => token.to_string(),
        (Connect::Online, None) => String::new(),
        (Connect::Offline, None) => OFFLINE_TOKEN.to_string(),
    }
}

impl Clients {
    pub fn build(
        ctx: &Context,
        state: &StateFile,
        declarations: &[Declaration],
        connect: Connect,
    ) -> Result<Self> {
        let needs = |kinds: &[Kind]| declarations.iter().any(|d| kinds.contains(&d.kind));
        let mut clients = Self::default();

        if needs(&[Kind::Group, Kind::User]) {
            let binary = state.aws.binary.as_deref().unwrap_or(AWS_BINARY);
            let binary = shellexpand::tilde(binary).into_owned();
            let profile = state.aws.profile.clone();
            let aws = match connect {
                Connect::Online => Aws::locate(binary, profile).map_err(setup_error)?,
                Connect::Offline => Aws::new(binary, profile),
            };
            clients.groups = Some(GroupClient::new(aws.clone()));
            clients.users = Some(UserClient::new(aws));
        }

        if needs(&[Kind::Team, Kind::Hooks]) {
            let api_base = state
                .github
                .api_base
                .as_deref()
                .unwrap_or(github::DEFAULT_API_BASE);
            let token = token(connect, ctx.github_token.as_deref());
            let github = GitHub::with_api_base(&token, api_base).map_err(setup_error)?;
            clients.hooks = Some(HookClient::new(github.clone()));
            clients.github = Some(github);
        }

        if needs(&[Kind::Collaborators]) {
            let api_base = state
                .heroku
                .api_base
                .as_deref()
                .unwrap_or(heroku::DEFAULT_API_BASE);
            let token = token(connect, ctx.heroku_token.as_deref());
            clients.collaborators =
                Some(CollaboratorClient::with_api_base(&token, api_base).map_err(setup_error)?);
        }

        Ok(clients)
    }

    fn team(&self, declaration: &Declaration) -> Option<TeamClient> {
        let github = self.github.clone()?;
        let org = declaration.org.clone()?;
        Some(TeamClient::new(github, org))
    }

    /// Converge one declaration
    pub fn converge(
        &self,
        declaration: &Declaration,
        options: Options,
    ) -> Result<ConvergenceResult> {
        let missing = || anyhow!("No client configured for {}", declaration.kind);
        Ok(match declaration.kind {
            Kind::Group => run(self.groups.as_ref().ok_or_else(missing)?, declaration, options),
            Kind::User => run(self.users.as_ref().ok_or_else(missing)?, declaration, options),
            Kind::Team => run(&self.team(declaration).ok_or_else(missing)?, declaration, options),
            Kind::Hooks => run(self.hooks.as_ref().ok_or_else(missing)?, declaration, options),
            Kind::Collaborators => run(
                self.collaborators.as_ref().ok_or_else(missing)?,
                declaration,
                options,
            ),
        })
    }

    /// Check one declaration without any remote call
    pub fn validate(&self, declaration: &Declaration) -> Result<Result<(), ValidationError>> {
        let missing = || anyhow!("No client configured for {}", declaration.kind);
        Ok(match declaration.kind {
            Kind::Group => check(self.groups.as_ref().ok_or_else(missing)?, declaration),
            Kind::User => check(self.users.as_ref().ok_or_else(missing)?, declaration),
            Kind::Team => check(&self.team(declaration).ok_or_else(missing)?, declaration),
            Kind::Hooks => check(self.hooks.as_ref().ok_or_else(missing)?, declaration),
            Kind::Collaborators => {
                check(self.collaborators.as_ref().ok_or_else(missing)?, declaration)
            }
        })
    }
}

fn run<C: ResourceClient>(
    client: &C,
    declaration: &Declaration,
    options: Options,
) -> ConvergenceResult {
    let runner = ConvergenceRunner::new(client);
    match declaration.ensure {
        Ensure::Present => runner.present(&declaration.desired, options),
        Ensure::Absent => runner.absent(declaration.name(), options),
    }
}

fn check<C: ResourceClient>(client: &C, declaration: &Declaration) -> Result<(), ValidationError> {
    match declaration.ensure {
        Ensure::Present => client.validate(&declaration.desired),
        // Only the name matters for removal
        Ensure::Absent => client.validate(&DesiredState::new(declaration.name())),
    }
}

/// Converge declarations on a pool of `jobs` workers, keeping input order
pub fn converge_all(
    clients: &Clients,
    declarations: &[Declaration],
    options: Options,
    jobs: usize,
    progress: &ProgressBar,
) -> Result<Vec<ConvergenceResult>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to create convergence thread pool")?;

    pool.install(|| {
        declarations
            .par_iter()
            .map(|declaration| {
                progress.set_message(declaration.label());
                let result = clients.converge(declaration, options);
                progress.inc(1);
                result
            })
            .collect()
    })
}

/// Print each ledger and the totals; returns how many resources failed
///
/// Converged resources are listed only with `-v`.
pub fn report(
    ctx: &Context,
    declarations: &[Declaration],
    results: &[ConvergenceResult],
) -> usize {
    let mut totals = ChangeSummary::default();
    let mut failed = 0;

    for (declaration, result) in declarations.iter().zip(results) {
        if ctx.verbose > 0 || !result.is_converged() {
            ui::report(&declaration.label(), result);
        }
        totals.merge(&result.changes.summary());
        if !result.succeeded() {
            failed += 1;
        }
    }

    ui::summary(&totals, failed);
    if rejected_credentials(results) {
        ui::warn("A remote refused the credentials; check GITHUB_TOKEN, HEROKU_API_KEY and the aws profile");
    }
    failed
}

/// Whether any failure is a 401 or 403 answer
fn rejected_credentials(results: &[ConvergenceResult]) -> bool {
    results
        .iter()
        .filter_map(|result| result.failure.as_ref())
        .filter_map(Failure::request_error)
        .any(|error| matches!(error.status, Some(401 | 403)))
}

/// Load the state file and select the targeted declarations
pub fn load(file: Option<&Path>, target: Option<&str>) -> Result<(StateFile, Vec<Declaration>)> {
    let (kind, name) = parse_target(target)?;
    let (path, state) = config::load(file)?;
    state.check()?;

    let declarations: Vec<_> = state
        .declarations()
        .into_iter()
        .filter(|d| d.matches(kind, name.as_deref()))
        .collect();

    if declarations.is_empty() {
        if let Some(target) = target {
            ui::warn(&format!("No declaration in {} matches '{target}'", path.display()));
        } else {
            ui::warn(&format!("{} declares no resources", path.display()));
        }
    }

    Ok((state, declarations))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context {
            verbose: 0,
            quiet: true,
            github_token: None,
            heroku_token: None,
        }
    }

    fn state(content: &str) -> StateFile {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_offline_clients_validate() {
        let state = state(
            r#"
            [[group]]
            name = "developers"
            members = ["alice"]

            [[team]]
            org = "acme"
            name = "Platform"
            permission = "write"

            [[hooks]]
            repo = "acme/web"
            [hooks.hooks.ci]
            events = ["push"]

            [[collaborators]]
            app = "web-prod"
            collaborators = ["dev@example.com"]
            "#,
        );
        let declarations = state.declarations();
        let clients = Clients::build(&ctx(), &state, &declarations, Connect::Offline).unwrap();

        let results: Vec<_> = declarations
            .iter()
            .map(|d| clients.validate(d).unwrap())
            .collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ValidationError::InvalidAttribute { .. })));
        assert!(results[2].is_ok());
        assert!(results[3].is_ok());
    }

    #[test]
    fn test_strict_without_members_is_invalid() {
        let state = state(
            r#"
            [[user]]
            name = "deploy"
            strict = true
            "#,
        );
        let declarations = state.declarations();
        let clients = Clients::build(&ctx(), &state, &declarations, Connect::Offline).unwrap();
        assert!(matches!(
            clients.validate(&declarations[0]).unwrap(),
            Err(ValidationError::StrictWithoutMembers { .. })
        ));
    }

    #[test]
    fn test_absent_only_checks_name() {
        let state = state(
            r#"
            [[hooks]]
            repo = "acme/web"
            ensure = "absent"
            strict = true
            "#,
        );
        let declarations = state.declarations();
        let clients = Clients::build(&ctx(), &state, &declarations, Connect::Offline).unwrap();
        assert!(clients.validate(&declarations[0]).unwrap().is_ok());
    }

    #[test]
    fn test_online_requires_token() {
        let state = state(
            r#"
            [[collaborators]]
            app = "web-prod"
            "#,
        );
        let declarations = state.declarations();
        let err = Clients::build(&ctx(), &state, &declarations, Connect::Online).unwrap_err();
        assert!(err.to_string().contains("HEROKU_API_KEY"));
    }

    fn failed(failure: Failure) -> ConvergenceResult {
        ConvergenceResult {
            kind: "team".into(),
            resource_name: "Platform".into(),
            changes: convergence::ChangeSet::new(),
            failure: Some(failure),
        }
    }

    #[test]
    fn test_rejected_credentials() {
        use convergence::{MemberAction, RequestError};

        let forbidden = failed(Failure::Member {
            collection: "members".into(),
            id: "alice".into(),
            action: MemberAction::Add,
            error: RequestError::status("PUT /orgs/acme/teams/platform/memberships/alice", 403, ""),
        });
        let missing = failed(Failure::Fetch {
            what: "teams".into(),
            error: RequestError::status("GET /orgs/acme/teams", 404, ""),
        });
        let invalid = failed(ValidationError::EmptyName { kind: "team".into() }.into());

        assert!(rejected_credentials(&[missing.clone(), forbidden]));
        assert!(!rejected_credentials(&[missing, invalid]));
        assert!(!rejected_credentials(&[]));
    }

    #[test]
    fn test_only_needed_clients_are_built() {
        let state = state(
            r#"
            [[team]]
            org = "acme"
            name = "Platform"
            "#,
        );
        let declarations = state.declarations();
        let ctx = Context {
            github_token: Some("ghp_test".into()),
            ..ctx()
        };
        // No aws binary or Heroku key is needed for a GitHub-only file
        let clients = Clients::build(&ctx, &state, &declarations, Connect::Online).unwrap();
        assert!(clients.groups.is_none());
        assert!(clients.collaborators.is_none());
        assert!(clients.team(&declarations[0]).is_some());
    }
}
