//! Stable exit codes for academy CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Bad arguments, unreadable config or progress, or any other error.
pub const INVALID: i32 = 1;
/// The requested mission is locked for this agent.
pub const LOCKED: i32 = 2;
