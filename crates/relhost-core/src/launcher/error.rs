use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("invalid launch spec: {0}")]
    InvalidSpec(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for LaunchError {
    fn from(e: std::io::Error) -> Self {
        LaunchError::Io(e.to_string())
    }
}
