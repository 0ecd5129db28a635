//! Sandbox module - isolation policy and result model
//!
//! This module provides:
//! - The isolation profile builder (mandatory constraints + caller extras)
//! - Per-call options
//! - The result type every execution resolves to
//!
//! The sandbox module does NOT:
//! - Spawn processes (that's the launcher's job)
//! - Enforce deadlines (that's the executor's job)
//! - Inspect or validate the submitted code

pub mod error;
pub mod options;
pub mod profile;
pub mod result;

// Re-exports for convenience
pub use error::SandboxError;
pub use options::SandboxOptions;
pub use profile::{Constraint, IsolationPolicy, IsolationProfile, IsolationProfileBuilder};
pub use result::{SandboxOutcome, SandboxResult, NO_EXIT_CODE, TIMEOUT_MESSAGE};
