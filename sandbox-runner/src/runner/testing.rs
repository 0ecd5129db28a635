//! Shell launcher used by unit tests in place of a container engine.
//!
//! Runs the program with `sh -s`, so test programs are shell scripts. The
//! isolation profile is recorded but not applied.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::Command;

use super::{LaunchSpec, LaunchedProcess, ProcessLauncher};
use crate::runner::container::profile_args;
use crate::sandbox::SandboxError;

#[derive(Debug, Default)]
pub struct ShellLauncher {
    shell: Option<String>,
    launch_failure_code: Option<i32>,
    pids: Mutex<Vec<u32>>,
    profiles: Mutex<Vec<Vec<String>>>,
}

impl ShellLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a shell binary that does not exist, so every launch fails.
    pub fn missing() -> Self {
        Self {
            shell: Some("/nonexistent/sandbox-runner-sh".to_string()),
            ..Self::default()
        }
    }

    /// Treat this exit code as the mechanism failing to start the program.
    pub fn with_launch_failure_code(mut self, code: i32) -> Self {
        self.launch_failure_code = Some(code);
        self
    }

    /// Pids of every process launched so far
    pub fn pids(&self) -> Vec<u32> {
        self.pids.lock().unwrap().clone()
    }

    /// Rendered profiles of every launch so far
    pub fn profiles(&self) -> Vec<Vec<String>> {
        self.profiles.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessLauncher for ShellLauncher {
    fn name(&self) -> &str {
        "shell"
    }

    fn launch(&self, spec: &LaunchSpec<'_>) -> Result<LaunchedProcess, SandboxError> {
        let shell = self.shell.as_deref().unwrap_or("sh");
        let child = Command::new(shell)
            .arg("-s")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                runtime: "shell".to_string(),
                source,
            })?;

        if let Some(pid) = child.id() {
            self.pids.lock().unwrap().push(pid);
        }
        self.profiles
            .lock()
            .unwrap()
            .push(profile_args(spec.profile));

        Ok(LaunchedProcess {
            name: spec.name.to_string(),
            child,
        })
    }

    async fn terminate(&self, process: &mut LaunchedProcess) {
        let _ = process.child.start_kill();
        let _ = process.child.wait().await;
    }

    fn is_launch_failure(&self, exit_code: i32) -> bool {
        self.launch_failure_code == Some(exit_code)
    }
}
