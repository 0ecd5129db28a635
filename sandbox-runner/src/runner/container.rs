//! Container engine launcher
//!
//! Runs the untrusted program in a throwaway container via the engine's CLI:
//! `<engine> run --rm -i --name <name> <constraints...> <image> <entrypoint...>`

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{LaunchSpec, LaunchedProcess, ProcessLauncher};
use crate::sandbox::profile::format_cpus;
use crate::sandbox::{Constraint, IsolationProfile, SandboxError};

/// Exit statuses Docker and Podman use when the container never got to run
/// the program: 125 for `run` itself failing (daemon unreachable, image
/// missing, invalid flag), 126 for an entrypoint that cannot be invoked and
/// 127 for an entrypoint missing from the image.
pub const ENGINE_RUN_FAILURE_CODES: [i32; 3] = [125, 126, 127];

/// Upper bound for `<engine> rm -f` and for reaping the CLI after a kill
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Long flags an extra constraint may not name: the mandatory set and
/// anything that widens access or detaches the container from the executor.
const RESERVED_FLAGS: &[&str] = &[
    "--network",
    "--net",
    "--network-alias",
    "--read-only",
    "--privileged",
    "--security-opt",
    "--pids-limit",
    "--oom-kill-disable",
    "--ipc",
    "--pid",
    "--uts",
    "--userns",
    "--cgroupns",
    "--cgroup-parent",
    "--user",
    "--group-add",
    "--tmpfs",
    "--mount",
    "--volumes-from",
    "--runtime",
    "--gpus",
    "--sysctl",
    "--ulimit",
    "--name",
    "--rm",
    "--detach",
];

/// Flag families matched by prefix (`--memory-swap`, `--cpuset-cpus`, ...)
const RESERVED_FLAG_PREFIXES: &[&str] = &[
    "--memory",
    "--kernel-memory",
    "--cpu",
    "--cap-",
    "--device",
    "--volume",
];

/// Short forms of reserved flags: user, volume, memory, cpu-shares, detach
const RESERVED_SHORT_FLAGS: &[char] = &['u', 'v', 'm', 'c', 'd'];

/// Whether an engine argument names a reserved flag, in any spelling:
/// `--user 0`, `--user=0`, `-u0` or a short cluster such as `-iu`.
pub fn is_reserved_flag(arg: &str) -> bool {
    if let Some(long) = arg.strip_prefix("--") {
        let flag = format!("--{}", long.split('=').next().unwrap_or(long));
        RESERVED_FLAGS.contains(&flag.as_str())
            || RESERVED_FLAG_PREFIXES
                .iter()
                .any(|prefix| flag.starts_with(prefix))
    } else if let Some(short) = arg.strip_prefix('-') {
        short
            .split('=')
            .next()
            .unwrap_or(short)
            .chars()
            .any(|c| RESERVED_SHORT_FLAGS.contains(&c))
    } else {
        false
    }
}

/// Reject a profile whose extras could weaken the mandatory set.
pub fn check_extras(profile: &IsolationProfile) -> Result<(), SandboxError> {
    match profile.extras().find(|arg| is_reserved_flag(arg)) {
        Some(arg) => Err(SandboxError::ReservedConstraint(arg.to_string())),
        None => Ok(()),
    }
}

/// Supported container engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerEngine {
    Docker,
    Podman,
}

impl ContainerEngine {
    /// Default CLI binary name
    pub fn binary(&self) -> &'static str {
        match self {
            ContainerEngine::Docker => "docker",
            ContainerEngine::Podman => "podman",
        }
    }
}

impl fmt::Display for ContainerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binary())
    }
}

impl FromStr for ContainerEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docker" => Ok(ContainerEngine::Docker),
            "podman" => Ok(ContainerEngine::Podman),
            other => Err(format!("unsupported container runtime: {}", other)),
        }
    }
}

/// Render one constraint as engine CLI arguments.
pub fn constraint_args(constraint: &Constraint) -> Vec<String> {
    match constraint {
        Constraint::NoNetwork => vec!["--network=none".to_string()],
        Constraint::ReadOnlyRoot => vec!["--read-only".to_string()],
        Constraint::DropAllCapabilities => vec!["--cap-drop=ALL".to_string()],
        Constraint::NoNewPrivileges => vec![
            "--security-opt".to_string(),
            "no-new-privileges".to_string(),
        ],
        Constraint::PidsLimit(n) => vec!["--pids-limit".to_string(), n.to_string()],
        Constraint::Memory(mib) => vec!["--memory".to_string(), format!("{}m", mib)],
        Constraint::MemorySwap(mib) => vec!["--memory-swap".to_string(), format!("{}m", mib)],
        Constraint::Cpus(millis) => vec!["--cpus".to_string(), format_cpus(*millis)],
        Constraint::NoIpc => vec!["--ipc=none".to_string()],
        Constraint::User { uid, gid } => vec!["--user".to_string(), format!("{}:{}", uid, gid)],
        Constraint::ScratchTmpfs { path, size_mib } => vec![
            "--tmpfs".to_string(),
            format!("{}:rw,noexec,nosuid,nodev,size={}m", path, size_mib),
        ],
        Constraint::Extra(arg) => vec![arg.clone()],
    }
}

/// Render a whole profile, preserving order.
pub fn profile_args(profile: &IsolationProfile) -> Vec<String> {
    profile.constraints().iter().flat_map(constraint_args).collect()
}

/// Launcher backed by a Docker-compatible CLI
#[derive(Debug, Clone)]
pub struct ContainerLauncher {
    engine: ContainerEngine,
    binary: PathBuf,
}

impl ContainerLauncher {
    pub fn new(engine: ContainerEngine) -> Self {
        Self {
            engine,
            binary: PathBuf::from(engine.binary()),
        }
    }

    /// Use a specific CLI binary instead of looking it up on PATH
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn engine(&self) -> ContainerEngine {
        self.engine
    }

    /// Full argument list passed to the engine CLI
    pub fn run_args(&self, spec: &LaunchSpec<'_>) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-i".to_string(),
            "--name".to_string(),
            spec.name.to_string(),
        ];
        args.extend(profile_args(spec.profile));
        args.push(spec.image.to_string());
        args.extend(spec.entrypoint.iter().cloned());
        args
    }

    /// Check that the engine CLI runs and can reach its daemon
    pub async fn is_available(&self) -> bool {
        let mut probe = Command::new(&self.binary);
        probe.arg("version").stdin(Stdio::null()).kill_on_drop(true);

        match tokio::time::timeout(TERMINATE_TIMEOUT, probe.output()).await {
            Ok(Ok(output)) => output.status.success(),
            _ => false,
        }
    }
}

#[async_trait]
impl ProcessLauncher for ContainerLauncher {
    fn name(&self) -> &str {
        self.engine.binary()
    }

    fn launch(&self, spec: &LaunchSpec<'_>) -> Result<LaunchedProcess, SandboxError> {
        check_extras(spec.profile)?;
        let args = self.run_args(spec);
        debug!("Launching {} with args: {:?}", self.binary.display(), args);

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                runtime: self.engine.to_string(),
                source,
            })?;

        Ok(LaunchedProcess {
            name: spec.name.to_string(),
            child,
        })
    }

    async fn terminate(&self, process: &mut LaunchedProcess) {
        if let Err(e) = process.child.start_kill() {
            debug!("Failed to kill {} client for {}: {}", self.engine, process.name, e);
        }
        if tokio::time::timeout(TERMINATE_TIMEOUT, process.child.wait())
            .await
            .is_err()
        {
            warn!("{} client for {} was not reaped in time", self.engine, process.name);
        }

        // The client is gone, but the container may be created, starting or
        // running. `rm -f` removes it in any of those states.
        let mut remove = Command::new(&self.binary);
        remove
            .args(["rm", "-f", process.name.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(TERMINATE_TIMEOUT, remove.status()).await {
            Ok(Ok(status)) if status.success() => {
                debug!("Removed container {}", process.name);
            }
            // Non-zero usually means the container already exited and was removed
            Ok(Ok(status)) => {
                debug!("{} rm -f {} exited with {}", self.engine, process.name, status);
            }
            Ok(Err(e)) => warn!("Failed to run {} rm -f {}: {}", self.engine, process.name, e),
            Err(_) => warn!("{} rm -f {} timed out", self.engine, process.name),
        }
    }

    fn is_launch_failure(&self, exit_code: i32) -> bool {
        ENGINE_RUN_FAILURE_CODES.contains(&exit_code)
    }
}
