use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid launcher configuration: {0}")]
    InvalidConfig(String),
}
