use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is too long: {len} chars (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{field} contains forbidden characters: {value:?}")]
    Forbidden { field: &'static str, value: String },

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
