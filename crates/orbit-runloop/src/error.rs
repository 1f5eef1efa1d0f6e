//! Error types for the run loop crate.

use thiserror::Error;

/// Errors surfaced by the port layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
    /// The receiving queue is at capacity. For the wake port this is
    /// the "a wakeup is already pending" non-error.
    #[error("port queue is full")]
    QueueFull,
}

/// Errors that can occur in run loop callouts.
#[derive(Debug, Error)]
pub enum RunLoopError {
    /// A port-backed source failed to handle its message.
    #[error("source callout failed: {0}")]
    Source(String),

    /// Port send/receive failure.
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Result type for run loop operations.
pub type RunLoopResult<T> = Result<T, RunLoopError>;
