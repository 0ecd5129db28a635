//! Execution results
//!
//! Every way an execution can end is encoded here as data. Nothing raised by
//! the executor crosses its boundary as an error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-facing stderr for executions stopped at the deadline.
pub const TIMEOUT_MESSAGE: &str =
    "Sandbox timed out and was aborted (consider increasing timeoutMs).";

/// Exit code reserved for "no meaningful exit code".
pub const NO_EXIT_CODE: i32 = -1;

/// Terminal state of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxOutcome {
    /// Process exited on its own (any exit code)
    Completed,
    /// Deadline elapsed; process was terminated
    TimedOut,
    /// Isolated process could not be started
    LaunchFailed,
}

impl fmt::Display for SandboxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SandboxOutcome::Completed => "completed",
            SandboxOutcome::TimedOut => "timed_out",
            SandboxOutcome::LaunchFailed => "launch_failed",
        };
        write!(f, "{}", s)
    }
}

/// Result of one sandboxed execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    #[serde(skip)]
    outcome: Option<SandboxOutcome>,
}

/// Equality over the wire fields only; the cached outcome is not part of a
/// result's identity.
impl PartialEq for SandboxResult {
    fn eq(&self, other: &Self) -> bool {
        self.stdout == other.stdout
            && self.stderr == other.stderr
            && self.exit_code == other.exit_code
            && self.timed_out == other.timed_out
    }
}

impl Eq for SandboxResult {}

impl SandboxResult {
    /// The process ran to completion with the given exit code.
    pub fn completed(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            timed_out: false,
            outcome: Some(SandboxOutcome::Completed),
        }
    }

    /// The deadline elapsed first. Partial output is discarded.
    pub fn timed_out() -> Self {
        Self {
            stdout: String::new(),
            stderr: TIMEOUT_MESSAGE.to_string(),
            exit_code: NO_EXIT_CODE,
            timed_out: true,
            outcome: Some(SandboxOutcome::TimedOut),
        }
    }

    /// The isolated process could not be started.
    pub fn launch_failed(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: NO_EXIT_CODE,
            timed_out: false,
            outcome: Some(SandboxOutcome::LaunchFailed),
        }
    }

    /// How this result was produced.
    ///
    /// Results decoded from JSON carry no outcome tag; for those it is inferred
    /// from the fields. A completed run that exited with -1 (killed by a signal)
    /// is then indistinguishable from a launch failure.
    pub fn outcome(&self) -> SandboxOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        if self.timed_out {
            SandboxOutcome::TimedOut
        } else if self.exit_code == NO_EXIT_CODE && self.stdout.is_empty() {
            SandboxOutcome::LaunchFailed
        } else {
            SandboxOutcome::Completed
        }
    }

    /// Completed with exit code 0
    pub fn is_success(&self) -> bool {
        self.outcome() == SandboxOutcome::Completed && self.exit_code == 0
    }
}
