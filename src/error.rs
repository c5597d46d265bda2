//! Error types for the Python sandbox.
//!
//! Failures of the *submitted program* (rejections, timeouts, exceptions) are
//! not errors at this level: they are reported as an
//! [`ExecutionOutcome`](crate::sandbox::outcome::ExecutionOutcome). The
//! variants here describe problems with the request itself or with the
//! sandbox machinery.

use thiserror::Error;

/// Errors that can occur while setting up or driving a sandbox execution.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The submitted source text was rejected before analysis.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to start the worker process.
    #[error("failed to spawn sandbox worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// The worker sent something that is not a valid protocol message.
    #[error("worker protocol error: {0}")]
    WorkerProtocol(String),

    /// The worker binary could not be located.
    #[error("sandbox worker binary not found: {0}")]
    WorkerNotFound(String),

    /// I/O error while talking to the worker.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Check if this error rejects the caller's input.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, SandboxError::InvalidInput(_))
    }

    /// Check if this error comes from configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, SandboxError::Config(_))
    }

    /// Check if this error concerns the worker process.
    pub fn is_worker(&self) -> bool {
        matches!(
            self,
            SandboxError::WorkerSpawn(_)
                | SandboxError::WorkerProtocol(_)
                | SandboxError::WorkerNotFound(_)
        )
    }
}

impl From<serde_json::Error> for SandboxError {
    fn from(err: serde_json::Error) -> Self {
        SandboxError::WorkerProtocol(err.to_string())
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
