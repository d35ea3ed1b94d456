//! Stable exit codes for devflow CLI commands.

/// Command succeeded, or a hook allowed the action.
pub const OK: i32 = 0;
/// Command failed validation, git preconditions, or state loading.
pub const INVALID: i32 = 1;
/// A hook pipeline blocked the action (agent hook protocol: exit 2 blocks).
pub const BLOCKED: i32 = 2;
