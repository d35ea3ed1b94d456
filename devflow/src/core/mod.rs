//! Deterministic, pure logic shared by the devflow core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod changes;
pub mod immutability;
pub mod invariants;
pub mod issue_format;
pub mod plan_validator;
pub mod selector;
pub mod task_id;
pub mod transitions;
pub mod types;
