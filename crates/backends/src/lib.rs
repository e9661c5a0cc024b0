//! # backends
//!
//! [`convergence::ResourceClient`] implementations for the services the
//! `converge` CLI manages.
//!
//! | Kind            | Service                 | Transport        |
//! |-----------------|-------------------------|------------------|
//! | `group`         | AWS IAM groups          | `aws` CLI        |
//! | `user`          | AWS IAM users           | `aws` CLI        |
//! | `team`          | GitHub organization     | REST v3 (ureq)   |
//! | `hooks`         | GitHub repository hooks | REST v3 (ureq)   |
//! | `collaborators` | Heroku app              | Platform API v3  |
//!
//! ## Example
//!
//! ```no_run
//! use backends::github::{GitHub, TeamClient};
//! use convergence::{ConvergenceRunner, DesiredState, Options};
//!
//! let github = GitHub::new(&std::env::var("GITHUB_TOKEN").unwrap()).unwrap();
//! let teams = TeamClient::new(github, "acme");
//!
//! let desired = DesiredState::new("Platform")
//!     .attribute("permission", "push")
//!     .members("members", ["alice", "bob"]);
//! let result = ConvergenceRunner::new(&teams).present(&desired, Options::dry_run());
//!
//! for change in &result.changes {
//!     println!("{} {}", change.operation.symbol(), change.operation);
//! }
//! ```

pub mod aws;
pub mod error;
pub mod github;
pub mod heroku;
pub mod http;
pub mod iam;

pub use error::{Error, ErrorCategory, Result};
