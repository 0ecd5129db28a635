//! Engine module - sandboxed execution lifecycle
//!
//! The engine ties the isolation profile, the process launcher and the
//! deadline together into a single `SandboxExecutor::run` call.

pub mod executor;

pub use executor::{
    default_entrypoint, ExecutionState, ExecutorSettings, SandboxExecutor, DEFAULT_IMAGE,
    DEFAULT_TIMEOUT_MS,
};
