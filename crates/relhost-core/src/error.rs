use std::time::Duration;

use thiserror::Error;

use crate::{artifact::FetchError, environment::ResolveError};

/// Failure of a worker creation attempt.
///
/// Every waiter of a single-flight attempt receives its own clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    #[error("artifact fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("environment resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    #[error("worker did not signal readiness within {0:?}")]
    StartupTimeout(Duration),

    #[error("release key {key} belongs to release {existing:?}, requested {requested:?}")]
    KeyCollision {
        key: String,
        existing: String,
        requested: String,
    },

    #[error("worker start was cancelled")]
    Cancelled,

    #[error("supervisor is shutting down")]
    ShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),
}

impl SupervisorError {
    /// Bounded label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SupervisorError::Fetch(_) => "fetch",
            SupervisorError::Resolve(_) => "resolve",
            SupervisorError::Spawn(_) => "spawn",
            SupervisorError::StartupTimeout(_) => "startup_timeout",
            SupervisorError::KeyCollision { .. } => "key_collision",
            SupervisorError::Cancelled => "cancelled",
            SupervisorError::ShuttingDown => "shutting_down",
            SupervisorError::Internal(_) => "internal",
        }
    }

    /// Finer label including the cause of fetch and resolve failures.
    pub fn detail(&self) -> &'static str {
        match self {
            SupervisorError::Fetch(e) => e.kind(),
            SupervisorError::Resolve(e) => e.kind(),
            other => other.kind(),
        }
    }
}
