//! Stable exit codes for agent CLI commands.

/// The run submitted a final output, or the command succeeded.
pub const OK: i32 = 0;
/// Invalid layout/config or any other error.
pub const INVALID: i32 = 1;
/// `agent run` hit the configured round limit without submitting.
pub const ROUND_LIMIT: i32 = 2;
/// `agent run` stopped at an unresolved dead end.
pub const DEAD_END: i32 = 3;
