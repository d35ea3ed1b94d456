//! Task-lifecycle workflow engine for AI-assisted development.
//!
//! devflow tracks a locked project plan as a list of tasks, allows exactly one
//! task to be in progress at a time, and coordinates git branches, commits and
//! pull requests around that lifecycle. The architecture keeps the same split
//! throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (transitions, selection, invariants,
//!   branch naming). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem stores, git, settings,
//!   hosting APIs, test commands).
//! - **[`hooks`]**: The two-phase validator pipeline that gates tool actions.
//!
//! Orchestration modules ([`plan`], [`task`], [`branch`], [`commit`],
//! [`status`], [`validate`]) coordinate core logic with I/O to implement CLI
//! commands. [`workflow::Workflow`] is the context object they share.

pub mod branch;
pub mod commit;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod hooks;
pub mod io;
pub mod issue_sync;
pub mod logging;
pub mod plan;
pub mod status;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tracker;
pub mod validate;
pub mod workflow;

pub use error::{ErrorKind, FlowError, Result};
