//! # Convergence
//!
//! Desired-state reconciliation for remote collaboration resources.
//!
//! A caller declares what a resource should look like (members of a group,
//! repositories of a team, hooks on a repo), and the runner reads the remote,
//! computes the difference, and issues the minimal sequence of mutating calls
//! to close the gap. Every pass returns an ordered record of what it did.
//!
//! ## Core Concepts
//!
//! - **DesiredState**: name, managed collections, attributes and strict mode
//! - **ResourceClient**: pure I/O for one resource kind against one backend
//! - **ConvergenceRunner**: generic `present`/`absent` over any client
//! - **ChangeSet**: truthful ledger; a failed step is always the last entry
//!
//! ## Example
//!
//! ```
//! use convergence::mock::MockClient;
//! use convergence::{ConvergenceRunner, DesiredState, Operation, Options, StrictMode};
//!
//! let client = MockClient::new("team")
//!     .with_collections(&["members", "repos"])
//!     .with_attribute_keys(&["permission"]);
//!
//! let desired = DesiredState::new("eng")
//!     .attribute("permission", "push")
//!     .members("members", ["alice"])
//!     .mode(StrictMode::Strict);
//!
//! // Plan first
//! let plan = ConvergenceRunner::new(&client).present(&desired, Options::dry_run());
//! assert_eq!(plan.changes.operations(), vec![&Operation::CreateResource]);
//!
//! // Then converge
//! let result = ConvergenceRunner::new(&client).present(&desired, Options::default());
//! assert!(result.succeeded());
//!
//! // Converged state is a fixed point
//! let again = ConvergenceRunner::new(&client).present(&desired, Options::default());
//! assert!(again.is_converged());
//! ```

pub mod change;
pub mod client;
pub mod error;
pub mod field;
pub mod mock;
pub mod runner;
pub mod set;
pub mod types;

pub use change::{Change, ChangeSet, ChangeSummary, ConvergenceResult, Operation, Outcome};
pub use client::{ResourceClient, check_declaration};
pub use error::{Failure, MemberAction, RequestError, RequestErrorKind, ValidationError};
pub use runner::ConvergenceRunner;
pub use set::SetDiff;
pub use types::{Attributes, DesiredState, Identifier, Member, Members, Options, StrictMode};
