//! Sandboxed code execution for chat-bot tool calls.
//!
//! Untrusted programs are piped into a throwaway container with no network,
//! a read-only root, no capabilities and capped memory/CPU/processes, and are
//! stopped at a wall-clock deadline. Every outcome, including launch failures
//! and timeouts, comes back as a [`SandboxResult`].

pub mod config;
pub mod engine;
pub mod runner;
pub mod sandbox;
pub mod server;
pub mod tool;

pub use config::Config;
pub use engine::{ExecutorSettings, SandboxExecutor};
pub use runner::{ContainerEngine, ContainerLauncher, ProcessLauncher};
pub use sandbox::{
    Constraint, IsolationPolicy, IsolationProfile, IsolationProfileBuilder, SandboxOptions,
    SandboxOutcome, SandboxResult,
};
pub use tool::CodeSandboxTool;
