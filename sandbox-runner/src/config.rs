//! Service configuration
//!
//! Loaded from environment variables, optionally layered over a TOML file
//! named by `SANDBOX_CONFIG`. Environment values win over the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::engine::{default_entrypoint, ExecutorSettings, DEFAULT_IMAGE, DEFAULT_TIMEOUT_MS};
use crate::runner::container::is_reserved_flag;
use crate::runner::{ContainerEngine, ContainerLauncher, ProcessLauncher};
use crate::sandbox::IsolationPolicy;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8088";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.into(),
    }
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Container engine used to launch sandboxes (default: docker)
    pub runtime: ContainerEngine,
    /// Explicit path to the engine CLI (default: looked up on PATH)
    pub runtime_binary: Option<PathBuf>,
    /// Default runtime image (default: oven/bun:latest)
    pub image: String,
    /// Command run inside the sandbox (default: bun run -)
    pub entrypoint: Vec<String>,
    /// Default deadline in milliseconds (default: 15000ms)
    pub timeout_ms: u64,
    /// Engine arguments appended after the mandatory set on every launch
    pub extra_constraints: Vec<String>,
    /// HTTP bind address (default: 127.0.0.1:8088)
    pub listen_addr: String,
    /// Caps behind the mandatory isolation constraints
    pub policy: IsolationPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime: ContainerEngine::Docker,
            runtime_binary: None,
            image: DEFAULT_IMAGE.to_string(),
            entrypoint: default_entrypoint(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            extra_constraints: Vec::new(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            policy: IsolationPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("SANDBOX_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(runtime) = lookup("SANDBOX_RUNTIME") {
            config.runtime = runtime
                .parse()
                .map_err(|e: String| invalid("SANDBOX_RUNTIME", e))?;
        }
        if let Some(binary) = lookup("SANDBOX_RUNTIME_BINARY") {
            config.runtime_binary = Some(PathBuf::from(binary));
        }
        if let Some(image) = lookup("SANDBOX_IMAGE") {
            config.image = image;
        }
        if let Some(entrypoint) = lookup("SANDBOX_ENTRYPOINT") {
            config.entrypoint = into_command(&entrypoint);
        }
        if let Some(timeout) = lookup("SANDBOX_TIMEOUT_MS") {
            config.timeout_ms = timeout
                .trim()
                .parse()
                .map_err(|_| invalid("SANDBOX_TIMEOUT_MS", format!("not a number: {}", timeout)))?;
        }
        if let Some(extras) = lookup("SANDBOX_EXTRA_CONSTRAINTS") {
            config.extra_constraints = into_command(&extras);
        }
        if let Some(addr) = lookup("SANDBOX_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject values that would weaken or break the sandbox
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms", "must be positive"));
        }
        if self.image.trim().is_empty() {
            return Err(invalid("image", "must not be empty"));
        }
        if self.entrypoint.is_empty() {
            return Err(invalid("entrypoint", "must not be empty"));
        }
        if let Some(arg) = self.extra_constraints.iter().find(|arg| is_reserved_flag(arg)) {
            return Err(invalid(
                "extra_constraints",
                format!("'{}' would override the isolation profile", arg),
            ));
        }

        let policy = &self.policy;
        if policy.pids_limit == 0 {
            return Err(invalid("policy.pids_limit", "must be positive"));
        }
        if policy.memory_mib == 0 {
            return Err(invalid("policy.memory_mib", "must be positive"));
        }
        if policy.cpu_millis == 0 {
            return Err(invalid("policy.cpu_millis", "must be positive"));
        }
        if policy.uid == 0 || policy.gid == 0 {
            return Err(invalid("policy.uid", "sandbox must not run as root"));
        }
        if !policy.scratch_path.starts_with('/') {
            return Err(invalid("policy.scratch_path", "must be an absolute path"));
        }
        if policy.scratch_mib == 0 {
            return Err(invalid("policy.scratch_mib", "must be positive"));
        }
        Ok(())
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            default_timeout_ms: self.timeout_ms,
            default_image: self.image.clone(),
            entrypoint: self.entrypoint.clone(),
            extra_constraints: self.extra_constraints.clone(),
            policy: self.policy.clone(),
        }
    }

    pub fn container_launcher(&self) -> ContainerLauncher {
        let launcher = ContainerLauncher::new(self.runtime);
        match &self.runtime_binary {
            Some(binary) => launcher.with_binary(binary),
            None => launcher,
        }
    }

    /// Launcher for the configured isolation mechanism
    pub fn launcher(&self) -> Arc<dyn ProcessLauncher> {
        Arc::new(self.container_launcher())
    }
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}
