//! Stable exit codes for place-likers CLI commands.

/// Every source was handled, or the run stopped cleanly on a session limit.
pub const OK: i32 = 0;
/// Invalid arguments or config, or any other error before or during the run.
pub const INVALID: i32 = 1;
/// The run stopped on an unrecoverable device or account failure.
pub const UNRECOVERABLE: i32 = 3;
