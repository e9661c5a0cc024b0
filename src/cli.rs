use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(
    about = "Converge IAM groups and users, GitHub teams and hooks, Heroku collaborators",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// GitHub token used for team and hook declarations
    #[arg(long, env = "GITHUB_TOKEN", global = true, hide_env_values = true)]
    pub github_token: Option<String>,

    /// Heroku API key used for collaborator declarations
    #[arg(long, env = "HEROKU_API_KEY", global = true, hide_env_values = true)]
    pub heroku_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change, without changing anything
    Plan(PlanArgs),

    /// Converge remote state to the declarations
    Apply(ApplyArgs),

    /// Check the state file without contacting any service
    Validate(ValidateArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Command Arguments
// ============================================================================

#[derive(Parser)]
pub struct PlanArgs {
    /// State file (default: ./converge.toml, then ~/.config/converge/)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Only plan a kind or a single resource (e.g. team, team.Platform)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// State file (default: ./converge.toml, then ~/.config/converge/)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Only apply a kind or a single resource (e.g. team, team.Platform)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Dry run - show what would be done
    #[arg(short, long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of resources converged in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ValidateArgs {
    /// State file (default: ./converge.toml, then ~/.config/converge/)
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_defaults() {
        let cli = Cli::try_parse_from(["converge", "apply"]).unwrap();
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.jobs, 4);
                assert!(!args.dry_run);
                assert!(!args.yes);
                assert!(args.file.is_none());
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["converge", "plan", "-vv", "--target", "team.Platform"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Plan(args) => assert_eq!(args.target.as_deref(), Some("team.Platform")),
            _ => panic!("expected plan"),
        }
    }
}
