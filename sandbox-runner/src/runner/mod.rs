//! Runner module - process launcher abstraction
//!
//! This module provides the narrow capability the executor needs from an
//! isolation mechanism:
//! - `ProcessLauncher`: launch one process under an isolation profile
//!   with piped standard streams, and forcibly terminate it
//! - `ContainerLauncher`: Docker / Podman implementation
//!
//! The runner module does NOT:
//! - Enforce deadlines or drain output
//! - Decide what a result means
//! - Retry failed launches

pub mod container;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Child;

use crate::sandbox::{IsolationProfile, SandboxError};

pub use container::{ContainerEngine, ContainerLauncher};

/// Counter for unique sandbox names within this process
static SANDBOX_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Allocate a name that is unique across concurrent executions.
///
/// Combines the service pid with a per-process counter so two service
/// instances on the same host never collide.
pub fn next_sandbox_name() -> String {
    let counter = SANDBOX_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("sandbox-{}-{}", std::process::id(), counter)
}

/// Everything a launcher needs to start one isolated process
#[derive(Debug, Clone)]
pub struct LaunchSpec<'a> {
    /// Unique name for this execution (container name, log correlation)
    pub name: &'a str,
    /// Ordered isolation constraints
    pub profile: &'a IsolationProfile,
    /// Runtime image identifier
    pub image: &'a str,
    /// Command run inside the sandbox; reads the program from stdin
    pub entrypoint: &'a [String],
}

/// A process started by a launcher
#[derive(Debug)]
pub struct LaunchedProcess {
    /// Sandbox name, used for out-of-band termination
    pub name: String,
    /// The local child process (for container engines, the CLI client)
    pub child: Child,
}

/// Launches isolated processes for one isolation mechanism.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Short identifier of the mechanism, e.g. "docker"
    fn name(&self) -> &str;

    /// Spawn the isolated process with stdin, stdout and stderr piped.
    fn launch(&self, spec: &LaunchSpec<'_>) -> Result<LaunchedProcess, SandboxError>;

    /// Forcibly stop the process. Best-effort: failures are logged, not returned.
    async fn terminate(&self, process: &mut LaunchedProcess);

    /// Whether an exit code means the mechanism failed to start the program,
    /// as opposed to the program itself exiting with that code.
    fn is_launch_failure(&self, _exit_code: i32) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sandbox_names_are_unique() {
        let names: HashSet<String> = (0..100).map(|_| next_sandbox_name()).collect();
        assert_eq!(names.len(), 100);
    }

    #[test]
    fn test_sandbox_name_contains_pid() {
        let name = next_sandbox_name();
        assert!(name.starts_with(&format!("sandbox-{}-", std::process::id())));
    }
}
