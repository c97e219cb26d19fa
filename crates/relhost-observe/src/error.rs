use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log format: {0} (expected: text|json|journald)")]
    InvalidFormat(String),

    #[error("invalid log filter {expr:?}: {reason}")]
    InvalidFilter { expr: String, reason: String },

    #[error("invalid timezone: {0} (expected: utc|local)")]
    InvalidTimeZone(String),

    #[error("journald is not supported on this platform")]
    JournaldNotSupported,

    #[error("failed to connect to journald: {0}")]
    Journald(String),

    #[error("global subscriber already installed")]
    AlreadyInitialized,
}

pub type LogResult<T> = Result<T, LogError>;
