use std::{io, time::Duration};

use thiserror::Error;

/// Failure to fetch or unpack a release archive. Never retried by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("artifact store transport error: {0}")]
    Transport(String),

    #[error("artifact fetch timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::NotFound(_) => "not_found",
            FetchError::Io(_) => "io",
            FetchError::CorruptArchive(_) => "corrupt_archive",
            FetchError::Transport(_) => "transport",
            FetchError::Timeout(_) => "timeout",
        }
    }
}

impl From<io::Error> for FetchError {
    fn from(e: io::Error) -> Self {
        FetchError::Io(e.to_string())
    }
}
