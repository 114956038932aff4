use std::time::Duration;

use thiserror::Error;

/// Failures while running the `claude` executable
#[derive(Debug, Error)]
pub enum CliError {
    /// The executable could not be found or is not runnable
    #[error("claude CLI not found at '{path}'")]
    NotFound { path: String },

    /// The CLI has no usable credentials
    #[error("claude CLI is not authenticated: {message}")]
    AuthenticationRequired { message: String },

    /// The CLI refused to use a tool
    #[error("tool not permitted: {message}")]
    ToolNotPermitted { message: String },

    /// The CLI rejected the requested model
    #[error("model unavailable: {message}")]
    ModelUnavailable { message: String },

    /// Any other non-zero exit or CLI-reported failure
    #[error("claude CLI failed{}: {message}", exit_suffix(*.code))]
    Execution { code: Option<i32>, message: String },

    /// The wall-clock or idle limit was exceeded
    #[error("claude CLI {kind} after {}s", .limit.as_secs_f64())]
    Timeout { kind: TimeoutKind, limit: Duration },

    /// Spawning or talking to the process failed
    #[error("claude CLI I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which limit a timed-out invocation hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Total runtime ceiling
    Deadline,
    /// No output for too long
    Idle,
}

impl std::fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deadline => f.write_str("timed out"),
            Self::Idle => f.write_str("produced no output"),
        }
    }
}

fn exit_suffix(code: Option<i32>) -> String {
    code.map(|c| format!(" (exit {c})")).unwrap_or_default()
}
