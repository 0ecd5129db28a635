//! Sandbox executor
//!
//! Owns the lifecycle of a single execution: build the isolation profile,
//! launch, pipe the program in, drain output, race the process against a
//! wall-clock deadline and shape the result.

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::runner::{next_sandbox_name, LaunchSpec, LaunchedProcess, ProcessLauncher};
use crate::sandbox::{
    IsolationPolicy, IsolationProfileBuilder, SandboxError, SandboxOptions, SandboxResult,
    NO_EXIT_CODE,
};

/// Default wall-clock deadline (15 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Default runtime image
pub const DEFAULT_IMAGE: &str = "oven/bun:latest";

/// Default command run inside the sandbox: execute the program read from stdin
pub fn default_entrypoint() -> Vec<String> {
    vec!["bun".to_string(), "run".to_string(), "-".to_string()]
}

/// Per-invocation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Created,
    Launching,
    Running,
    Completed,
    TimedOut,
    LaunchFailed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::TimedOut | ExecutionState::LaunchFailed
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionState::Created => "created",
            ExecutionState::Launching => "launching",
            ExecutionState::Running => "running",
            ExecutionState::Completed => "completed",
            ExecutionState::TimedOut => "timed_out",
            ExecutionState::LaunchFailed => "launch_failed",
        };
        write!(f, "{}", s)
    }
}

/// Executor defaults, applied where the caller's options are silent
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub default_timeout_ms: u64,
    pub default_image: String,
    pub entrypoint: Vec<String>,
    /// Operator extras, placed ahead of any caller extras
    pub extra_constraints: Vec<String>,
    pub policy: IsolationPolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            default_image: DEFAULT_IMAGE.to_string(),
            entrypoint: default_entrypoint(),
            extra_constraints: Vec::new(),
            policy: IsolationPolicy::default(),
        }
    }
}

/// Tracks one execution for logging
struct Execution {
    name: String,
    state: ExecutionState,
    started: Instant,
}

impl Execution {
    fn new(name: String) -> Self {
        let execution = Self {
            name,
            state: ExecutionState::Created,
            started: Instant::now(),
        };
        debug!("Sandbox {} {}", execution.name, execution.state);
        execution
    }

    fn transition(&mut self, next: ExecutionState) {
        debug_assert!(!self.state.is_terminal(), "no transition out of a terminal state");
        debug!("Sandbox {}: {} -> {}", self.name, self.state, next);
        self.state = next;
    }

    fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

/// Streams taken from a freshly launched process
struct Pipes {
    stdin: ChildStdin,
    stdout: JoinHandle<io::Result<Vec<u8>>>,
    stderr: JoinHandle<io::Result<Vec<u8>>>,
}

/// Runs untrusted programs through a process launcher.
///
/// Cheap to share: invocations hold no state in common beyond the launcher.
#[derive(Clone)]
pub struct SandboxExecutor {
    launcher: Arc<dyn ProcessLauncher>,
    profiles: IsolationProfileBuilder,
    settings: ExecutorSettings,
}

impl SandboxExecutor {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, settings: ExecutorSettings) -> Self {
        let profiles = IsolationProfileBuilder::new(settings.policy.clone());
        Self {
            launcher,
            profiles,
            settings,
        }
    }

    /// Name of the isolation mechanism in use
    pub fn launcher_name(&self) -> &str {
        self.launcher.name()
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Effective deadline for the given options. Zero means "use the default".
    pub fn timeout_for(&self, options: &SandboxOptions) -> Duration {
        let ms = options
            .timeout_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(self.settings.default_timeout_ms);
        Duration::from_millis(ms)
    }

    fn with_operator_extras<'a>(&self, options: &'a SandboxOptions) -> Cow<'a, SandboxOptions> {
        if self.settings.extra_constraints.is_empty() {
            return Cow::Borrowed(options);
        }
        let mut merged = options.clone();
        merged.extra_constraints = self
            .settings
            .extra_constraints
            .iter()
            .chain(&options.extra_constraints)
            .cloned()
            .collect();
        Cow::Owned(merged)
    }

    /// Run one program to completion or timeout.
    ///
    /// Never fails: launch failures, timeouts and program errors are all
    /// reported through the returned result.
    pub async fn run(&self, code: &str, options: &SandboxOptions) -> SandboxResult {
        let mut execution = Execution::new(next_sandbox_name());
        let timeout = self.timeout_for(options);
        let image = options
            .runtime_image
            .as_deref()
            .filter(|image| !image.trim().is_empty())
            .unwrap_or(&self.settings.default_image);
        let profile = self.profiles.build(&self.with_operator_extras(options));
        debug!(
            "Sandbox {} profile: {}",
            execution.name,
            profile
                .constraints()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        );

        execution.transition(ExecutionState::Launching);
        let spec = LaunchSpec {
            name: &execution.name,
            profile: &profile,
            image,
            entrypoint: &self.settings.entrypoint,
        };
        let mut process = match self.launcher.launch(&spec) {
            Ok(process) => process,
            Err(e) => return self.launch_failed(&mut execution, e),
        };
        let pipes = match take_pipes(&mut process) {
            Ok(pipes) => pipes,
            Err(e) => {
                self.launcher.terminate(&mut process).await;
                return self.launch_failed(&mut execution, e);
            }
        };

        execution.transition(ExecutionState::Running);
        info!(
            "Sandbox {} running on {} (image: {}, timeout: {}ms, code: {} bytes)",
            execution.name,
            self.launcher.name(),
            image,
            timeout.as_millis(),
            code.len()
        );

        let result = self
            .supervise(&mut execution, &mut process, pipes, code, timeout)
            .await;

        info!(
            "Sandbox {} {} in {}ms (exit code: {})",
            execution.name,
            execution.state,
            execution.elapsed_ms(),
            result.exit_code
        );
        result
    }

    /// Feed the program, drain output, and race exit against the deadline.
    async fn supervise(
        &self,
        execution: &mut Execution,
        process: &mut LaunchedProcess,
        pipes: Pipes,
        code: &str,
        timeout: Duration,
    ) -> SandboxResult {
        let Pipes {
            stdin,
            stdout: mut stdout_task,
            stderr: mut stderr_task,
        } = pipes;
        let stdin_task = tokio::spawn(write_program(stdin, code.to_owned(), execution.name.clone()));

        let completion = tokio::time::timeout(timeout, async {
            let status = process.child.wait().await;
            let stdout = (&mut stdout_task).await;
            let stderr = (&mut stderr_task).await;
            (status, stdout, stderr)
        })
        .await;

        stdin_task.abort();

        let (status, stdout, stderr) = match completion {
            Ok(finished) => finished,
            Err(_) => {
                execution.transition(ExecutionState::TimedOut);
                self.launcher.terminate(process).await;
                stdout_task.abort();
                stderr_task.abort();
                return SandboxResult::timed_out();
            }
        };

        let collected = status.and_then(|status| {
            let stdout = flatten_drain(stdout, "stdout")?;
            let stderr = flatten_drain(stderr, "stderr")?;
            Ok((status, stdout, stderr))
        });

        let (status, stdout, stderr) = match collected {
            Ok(collected) => collected,
            Err(e) => {
                // Wait or capture broke down; make sure nothing is left running
                warn!("Sandbox {} lost track of its process: {}", execution.name, e);
                self.launcher.terminate(process).await;
                execution.transition(ExecutionState::LaunchFailed);
                return SandboxResult::launch_failed(format!("sandbox process failed: {}", e));
            }
        };

        let exit_code = status.code().unwrap_or(NO_EXIT_CODE);
        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        if self.launcher.is_launch_failure(exit_code) {
            let error = SandboxError::RuntimeRejected {
                runtime: self.launcher.name().to_string(),
                code: exit_code,
                message: stderr.trim().to_string(),
            };
            return self.launch_failed(execution, error);
        }

        execution.transition(ExecutionState::Completed);
        SandboxResult::completed(stdout, stderr, exit_code)
    }

    fn launch_failed(&self, execution: &mut Execution, error: SandboxError) -> SandboxResult {
        warn!("Sandbox {} failed to launch: {}", execution.name, error);
        execution.transition(ExecutionState::LaunchFailed);
        SandboxResult::launch_failed(error.to_string())
    }
}

/// Take the three standard streams and start draining output immediately,
/// so a chatty child never blocks on a full pipe.
fn take_pipes(process: &mut LaunchedProcess) -> Result<Pipes, SandboxError> {
    let stdin = process
        .child
        .stdin
        .take()
        .ok_or(SandboxError::MissingPipe("stdin"))?;
    let stdout = process
        .child
        .stdout
        .take()
        .ok_or(SandboxError::MissingPipe("stdout"))?;
    let stderr = process
        .child
        .stderr
        .take()
        .ok_or(SandboxError::MissingPipe("stderr"))?;

    Ok(Pipes {
        stdin,
        stdout: tokio::spawn(drain(stdout)),
        stderr: tokio::spawn(drain(stderr)),
    })
}

/// Send the whole program, then close stdin.
async fn write_program(mut stdin: ChildStdin, code: String, name: String) {
    if let Err(e) = stdin.write_all(code.as_bytes()).await {
        // The program may exit without consuming all of its input
        if e.kind() != io::ErrorKind::BrokenPipe {
            debug!("Sandbox {}: failed to write program to stdin: {}", name, e);
        }
    }
    drop(stdin);
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

fn flatten_drain(
    joined: Result<io::Result<Vec<u8>>, tokio::task::JoinError>,
    stream: &str,
) -> io::Result<Vec<u8>> {
    joined
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{} reader: {}", stream, e)))?
}
