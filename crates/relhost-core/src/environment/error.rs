use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("control plane unreachable: {0}")]
    Unreachable(String),

    #[error("control plane rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl ResolveError {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::Unreachable(_) => "unreachable",
            ResolveError::Rejected { .. } => "rejected",
        }
    }
}
