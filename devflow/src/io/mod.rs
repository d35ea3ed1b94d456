//! I/O adapters for devflow commands.

pub mod atomic;
pub mod config;
pub mod git;
pub mod guards;
pub mod hosting;
pub mod paths;
pub mod plan_store;
pub mod platform;
pub mod schema;
pub mod templates;
pub mod tracker_store;
