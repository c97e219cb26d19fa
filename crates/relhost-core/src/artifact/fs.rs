use std::{io, path::PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use relhost_model::ObjectKey;
use tokio_util::io::ReaderStream;

use super::{ArtifactStore, ArtifactStream, FetchError};

/// Artifact store backed by a local directory laid out like the remote bucket.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn open(&self, key: &ObjectKey) -> Result<ArtifactStream, FetchError> {
        match tokio::fs::File::open(self.root.join(key.as_str())).await {
            Ok(file) => Ok(ReaderStream::new(file).boxed()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
