use thiserror::Error;

/// Reasons the isolated process could not be started.
///
/// The executor turns every variant into a launch-failure result; callers of
/// the executor never see this type.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to launch {runtime}: {source}")]
    Spawn {
        runtime: String,
        #[source]
        source: std::io::Error,
    },

    #[error("extra constraint '{0}' would override the isolation profile")]
    ReservedConstraint(String),

    #[error("sandbox process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("{runtime} could not start the container (exit code {code}): {message}")]
    RuntimeRejected {
        runtime: String,
        code: i32,
        message: String,
    },
}
