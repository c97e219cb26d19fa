//! Artifact Store Client.
//!
//! A store hands out the raw bytes of a release archive as a stream; [`fetch_artifact`]
//! pipes that stream through gzip decoding and tar extraction straight into a directory.
mod error;
pub use error::FetchError;

mod extract;
pub use extract::ExtractOptions;

mod fs;
pub use fs::FsArtifactStore;

mod http;
pub use http::HttpArtifactStore;

use std::{io, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream::BoxStream};
use relhost_model::{ObjectKey, ReleaseIdentity};
use tokio::time::{Instant, timeout_at};
use tokio_util::{
    io::{StreamReader, SyncIoBridge},
    sync::CancellationToken,
};
use tracing::{debug, instrument, warn};

/// Byte stream of a release archive.
///
/// Errors of kind [`io::ErrorKind::ConnectionAborted`] mark a broken transfer and are reported
/// as [`FetchError::Transport`]; anything else failing mid-extraction is a corrupt archive.
pub type ArtifactStream = BoxStream<'static, io::Result<Bytes>>;

/// Content store holding release archives.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store name used in logs.
    fn name(&self) -> &'static str;

    /// Open the object for streaming.
    async fn open(&self, key: &ObjectKey) -> Result<ArtifactStream, FetchError>;
}

/// Shared handle to an artifact store.
pub type ArtifactStoreHandle = Arc<dyn ArtifactStore>;

/// Download the archive of `identity` and unpack it into `dest`.
///
/// `dest` is created if absent. On error `dest` may hold a partial tree; the caller owns cleanup.
/// The whole operation, including opening the object, is bounded by `limit`.
#[instrument(
    level = "debug",
    skip(store, identity, dest, opts),
    fields(store = store.name(), object = %identity.object_key())
)]
pub async fn fetch_artifact(
    store: &dyn ArtifactStore,
    identity: &ReleaseIdentity,
    dest: &Path,
    opts: &ExtractOptions,
    limit: Duration,
) -> Result<(), FetchError> {
    let deadline = Instant::now() + limit;
    let key = identity.object_key();

    let stream = timeout_at(deadline, store.open(&key))
        .await
        .map_err(|_| FetchError::Timeout(limit))??;

    let cancel = CancellationToken::new();
    let body = Box::pin(stream.take_until(cancel.clone().cancelled_owned()));
    let reader = SyncIoBridge::new(StreamReader::new(body));

    let dest_owned = dest.to_path_buf();
    let opts_owned = opts.clone();
    let mut unpack =
        tokio::task::spawn_blocking(move || extract::unpack(reader, &dest_owned, &opts_owned));

    let joined = match timeout_at(deadline, &mut unpack).await {
        Ok(joined) => joined,
        Err(_) => {
            // End the stream so the blocking reader stops, and wait for it before handing
            // `dest` back to the caller.
            cancel.cancel();
            let _ = unpack.await;
            warn!(limit_ms = limit.as_millis() as u64, "artifact fetch timed out");
            return Err(FetchError::Timeout(limit));
        }
    };

    match joined {
        Ok(Ok(entries)) => {
            debug!(entries, "artifact unpacked");
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(e) => Err(FetchError::Io(format!("extraction task failed: {e}"))),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Write;

    use flate2::{Compression, write::GzEncoder};

    /// Build a `.tar.gz` in memory from `(path, contents)` pairs.
    pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        let gz = builder.into_inner().unwrap();
        gz.finish().unwrap()
    }

    /// Gzip arbitrary bytes without a tar wrapper.
    pub fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::{StreamExt, stream};

    use super::*;

    struct Chunks {
        chunks: Vec<io::Result<Bytes>>,
        stall: bool,
    }

    #[async_trait]
    impl ArtifactStore for Chunks {
        fn name(&self) -> &'static str {
            "chunks"
        }

        async fn open(&self, _key: &ObjectKey) -> Result<ArtifactStream, FetchError> {
            let items: Vec<io::Result<Bytes>> = self
                .chunks
                .iter()
                .map(|c| match c {
                    Ok(b) => Ok(b.clone()),
                    Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
                })
                .collect();
            let head = stream::iter(items);
            if self.stall {
                Ok(head.chain(stream::pending()).boxed())
            } else {
                Ok(head.boxed())
            }
        }
    }

    fn identity() -> ReleaseIdentity {
        ReleaseIdentity::new("org", "app", "rel-1").unwrap()
    }

    fn split(data: Vec<u8>) -> Vec<io::Result<Bytes>> {
        data.chunks(7).map(|c| Ok(Bytes::copy_from_slice(c))).collect()
    }

    #[tokio::test]
    async fn unpacks_streamed_archive() {
        let archive = testing::tar_gz(&[("index.js", b"console.log(1)"), ("lib/a.js", b"a")]);
        let store = Chunks {
            chunks: split(archive),
            stall: false,
        };
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");

        fetch_artifact(
            &store,
            &identity(),
            &dest,
            &ExtractOptions::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(dest.join("index.js")).unwrap(), b"console.log(1)");
        assert_eq!(std::fs::read(dest.join("lib/a.js")).unwrap(), b"a");
    }

    #[tokio::test]
    async fn truncated_stream_is_corrupt() {
        let mut archive = testing::tar_gz(&[("index.js", &[7u8; 4096])]);
        archive.truncate(archive.len() / 2);
        let store = Chunks {
            chunks: split(archive),
            stall: false,
        };
        let dir = tempfile::tempdir().unwrap();

        let err = fetch_artifact(
            &store,
            &identity(),
            &dir.path().join("out"),
            &ExtractOptions::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "corrupt_archive", "{err}");
    }

    #[tokio::test]
    async fn broken_transfer_is_transport_error() {
        let archive = testing::tar_gz(&[("index.js", &[1u8; 2048])]);
        let mut chunks = split(archive[..64].to_vec());
        chunks.push(Err(io::Error::new(io::ErrorKind::ConnectionAborted, "reset")));
        let store = Chunks {
            chunks,
            stall: false,
        };
        let dir = tempfile::tempdir().unwrap();

        let err = fetch_artifact(
            &store,
            &identity(),
            &dir.path().join("out"),
            &ExtractOptions::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "transport", "{err}");
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let archive = testing::tar_gz(&[("index.js", &[1u8; 2048])]);
        let store = Chunks {
            chunks: split(archive[..64].to_vec()),
            stall: true,
        };
        let dir = tempfile::tempdir().unwrap();

        let err = fetch_artifact(
            &store,
            &identity(),
            &dir.path().join("out"),
            &ExtractOptions::default(),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
        assert_eq!(err, FetchError::Timeout(Duration::from_millis(200)));
    }
}
