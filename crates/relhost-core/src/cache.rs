//! Release Cache: deterministic on-disk home of unpacked releases.
//!
//! Layout below the data directory:
//!
//! ```text
//! releases/{app}-{release_key}/   unpacked artifact + `.release` marker
//! staging/{release_key}.{uuid}/   extraction in progress
//! sockets/{digest}.sock           worker IPC endpoints
//! ```
//!
//! A release directory only appears through an atomic rename of a fully extracted and
//! verified staging directory, so presence implies validity. Published release directories
//! are never removed by the host; a non-empty directory without a marker was not published
//! here and is moved aside before the release is fetched again.
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use relhost_model::{RELEASE_MARKER_FILE, ReleaseIdentity, ReleaseKey, WorkerKey};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    artifact::{ArtifactStoreHandle, ExtractOptions, FetchError, fetch_artifact},
    error::SupervisorError,
    metrics::CacheOutcome,
};

/// Default bound for a single artifact download.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Release directory ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRelease {
    pub dir: PathBuf,
    pub outcome: CacheOutcome,
}

pub struct ReleaseCache {
    releases: PathBuf,
    staging: PathBuf,
    sockets: PathBuf,
    store: ArtifactStoreHandle,
    extract: ExtractOptions,
    fetch_timeout: Duration,
}

impl ReleaseCache {
    pub fn new(data_dir: impl AsRef<Path>, store: ArtifactStoreHandle) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            releases: data_dir.join("releases"),
            staging: data_dir.join("staging"),
            sockets: data_dir.join("sockets"),
            store,
            extract: ExtractOptions::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_extract_options(mut self, extract: ExtractOptions) -> Self {
        self.extract = extract;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Create the directory layout and drop staging leftovers of a previous run.
    pub async fn prepare(&self) -> io::Result<()> {
        for dir in [&self.releases, &self.staging, &self.sockets] {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut leftovers = tokio::fs::read_dir(&self.staging).await?;
        while let Some(entry) = leftovers.next_entry().await? {
            warn!(path = %entry.path().display(), "removing stale staging directory");
            remove_tree(&entry.path()).await;
        }
        Ok(())
    }

    pub fn release_dir(&self, key: &WorkerKey) -> PathBuf {
        self.releases.join(key.to_string())
    }

    /// IPC endpoint of the worker for `key`.
    ///
    /// The file name is a fixed-length digest of the key so the path stays within the
    /// platform limit for socket addresses regardless of application id length.
    pub fn socket_path(&self, key: &WorkerKey) -> PathBuf {
        self.sockets
            .join(format!("{}.sock", ReleaseKey::derive(&key.to_string())))
    }

    /// Remove a socket file left behind by a previous worker.
    pub async fn clear_socket(&self, key: &WorkerKey) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.sockets).await?;
        match tokio::fs::remove_file(self.socket_path(key)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Make sure the release is unpacked, downloading it on a miss.
    #[instrument(level = "debug", skip(self, identity), fields(key = %identity.worker_key()))]
    pub async fn ensure(&self, identity: &ReleaseIdentity) -> Result<CachedRelease, SupervisorError> {
        let key = identity.worker_key();
        let dir = self.release_dir(&key);

        match self.lookup(&dir, &key, identity).await? {
            Lookup::Hit => {
                debug!("release cache hit");
                return Ok(CachedRelease {
                    dir,
                    outcome: CacheOutcome::Hit,
                });
            }
            Lookup::Unmarked => self.set_aside(&dir, &key).await?,
            Lookup::Absent => {}
        }

        tokio::fs::create_dir_all(&self.releases)
            .await
            .map_err(FetchError::from)?;
        tokio::fs::create_dir_all(&self.staging)
            .await
            .map_err(FetchError::from)?;
        let staging = self
            .staging
            .join(format!("{}.{}", key.release_key(), Uuid::new_v4().simple()));

        let started = std::time::Instant::now();
        if let Err(e) = self.stage(identity, &staging).await {
            remove_tree(&staging).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&staging, &dir).await {
            remove_tree(&staging).await;
            // Lost a race against another writer of the same release.
            if let Lookup::Hit = self.lookup(&dir, &key, identity).await? {
                return Ok(CachedRelease {
                    dir,
                    outcome: CacheOutcome::Hit,
                });
            }
            return Err(FetchError::Io(format!("failed to publish {}: {e}", dir.display())).into());
        }

        info!(
            dir = %dir.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "release unpacked"
        );
        Ok(CachedRelease {
            dir,
            outcome: CacheOutcome::Miss,
        })
    }

    async fn stage(&self, identity: &ReleaseIdentity, staging: &Path) -> Result<(), FetchError> {
        fetch_artifact(
            self.store.as_ref(),
            identity,
            staging,
            &self.extract,
            self.fetch_timeout,
        )
        .await?;
        tokio::fs::write(staging.join(RELEASE_MARKER_FILE), identity.release_id()).await?;
        Ok(())
    }

    /// Classify `dir` for `identity`; a directory holding another release is a collision.
    async fn lookup(
        &self,
        dir: &Path,
        key: &WorkerKey,
        identity: &ReleaseIdentity,
    ) -> Result<Lookup, SupervisorError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Lookup::Absent),
            Err(e) => return Err(FetchError::from(e).into()),
        };
        if entries
            .next_entry()
            .await
            .map_err(FetchError::from)?
            .is_none()
        {
            return Ok(Lookup::Absent);
        }

        let existing = match tokio::fs::read_to_string(dir.join(RELEASE_MARKER_FILE)).await {
            Ok(marker) => marker.trim().to_string(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Lookup::Unmarked),
            Err(e) => return Err(FetchError::from(e).into()),
        };
        if existing == identity.release_id() {
            return Ok(Lookup::Hit);
        }

        warn!(
            existing = %existing,
            requested = %identity.release_id(),
            "release key collision on disk"
        );
        Err(SupervisorError::KeyCollision {
            key: key.to_string(),
            existing,
            requested: identity.release_id().to_string(),
        })
    }

    /// Move a directory this cache did not publish out of the way and delete it.
    async fn set_aside(&self, dir: &Path, key: &WorkerKey) -> Result<(), FetchError> {
        warn!(dir = %dir.display(), "release directory has no marker; fetching again");
        tokio::fs::create_dir_all(&self.staging).await?;
        let aside = self.staging.join(format!(
            "{}.unmarked.{}",
            key.release_key(),
            Uuid::new_v4().simple()
        ));
        match tokio::fs::rename(dir, &aside).await {
            Ok(()) => {
                remove_tree(&aside).await;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FetchError::Io(format!(
                "failed to move {} aside: {e}",
                dir.display()
            ))),
        }
    }
}

/// State of a release directory.
enum Lookup {
    Absent,
    /// Non-empty but without a `.release` marker, so not published by this cache.
    Unmarked,
    Hit,
}

async fn remove_tree(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            warn!(path = %path.display(), error = %e, "failed to remove directory");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::{StreamExt, stream};
    use relhost_model::ObjectKey;

    use super::*;
    use crate::artifact::{ArtifactStore, ArtifactStream, testing::tar_gz};

    #[derive(Default)]
    struct MemStore {
        objects: HashMap<String, Vec<u8>>,
        opened: AtomicUsize,
    }

    impl MemStore {
        fn with(mut self, id: &ReleaseIdentity, data: Vec<u8>) -> Self {
            self.objects.insert(id.object_key().to_string(), data);
            self
        }
    }

    #[async_trait]
    impl ArtifactStore for MemStore {
        fn name(&self) -> &'static str {
            "mem"
        }

        async fn open(&self, key: &ObjectKey) -> Result<ArtifactStream, FetchError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            match self.objects.get(key.as_str()) {
                Some(data) => Ok(stream::iter([Ok(Bytes::from(data.clone()))]).boxed()),
                None => Err(FetchError::NotFound(key.to_string())),
            }
        }
    }

    fn id(release: &str) -> ReleaseIdentity {
        ReleaseIdentity::new("org", "app-42", release).unwrap()
    }

    fn entrypoint() -> ExtractOptions {
        ExtractOptions {
            strip_components: 0,
            entrypoint: Some("index.js".into()),
        }
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let release = id("rel-abcdef123456");
        let store = Arc::new(MemStore::default().with(&release, tar_gz(&[("index.js", b"x")])));
        let data = tempfile::tempdir().unwrap();
        let cache = ReleaseCache::new(data.path(), store.clone()).with_extract_options(entrypoint());
        cache.prepare().await.unwrap();

        let first = cache.ensure(&release).await.unwrap();
        assert_eq!(first.outcome, CacheOutcome::Miss);
        assert_eq!(first.dir, data.path().join("releases").join(release.worker_key().to_string()));
        assert!(first.dir.join("index.js").is_file());
        assert_eq!(
            std::fs::read_to_string(first.dir.join(RELEASE_MARKER_FILE)).unwrap(),
            "rel-abcdef123456"
        );

        let second = cache.ensure(&release).await.unwrap();
        assert_eq!(second.outcome, CacheOutcome::Hit);
        assert_eq!(store.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_leaves_nothing_behind() {
        let release = id("rel-missing");
        let data = tempfile::tempdir().unwrap();
        let cache = ReleaseCache::new(data.path(), Arc::new(MemStore::default()));
        cache.prepare().await.unwrap();

        let err = cache.ensure(&release).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Fetch(FetchError::NotFound(_))));
        assert!(!cache.release_dir(&release.worker_key()).exists());
        assert_eq!(std::fs::read_dir(data.path().join("staging")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_verification_is_not_published() {
        let release = id("rel-1");
        let store = MemStore::default().with(&release, tar_gz(&[("main.js", b"x")]));
        let data = tempfile::tempdir().unwrap();
        let cache = ReleaseCache::new(data.path(), Arc::new(store)).with_extract_options(entrypoint());

        let err = cache.ensure(&release).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Fetch(FetchError::CorruptArchive(_))));
        assert!(!cache.release_dir(&release.worker_key()).exists());
        assert_eq!(std::fs::read_dir(data.path().join("staging")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn foreign_marker_is_a_collision() {
        let release = id("rel-1");
        let data = tempfile::tempdir().unwrap();
        let cache = ReleaseCache::new(data.path(), Arc::new(MemStore::default()));
        let dir = cache.release_dir(&release.worker_key());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.js"), b"x").unwrap();
        std::fs::write(dir.join(RELEASE_MARKER_FILE), b"rel-other\n").unwrap();

        let err = cache.ensure(&release).await.unwrap_err();
        assert_eq!(
            err,
            SupervisorError::KeyCollision {
                key: release.worker_key().to_string(),
                existing: "rel-other".into(),
                requested: "rel-1".into(),
            }
        );
    }

    #[tokio::test]
    async fn unmarked_directory_is_replaced() {
        let release = id("rel-1");
        let store = Arc::new(MemStore::default().with(&release, tar_gz(&[("index.js", b"fresh")])));
        let data = tempfile::tempdir().unwrap();
        let cache = ReleaseCache::new(data.path(), store.clone()).with_extract_options(entrypoint());
        let dir = cache.release_dir(&release.worker_key());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.js"), b"leftover").unwrap();
        std::fs::write(dir.join("stray.txt"), b"x").unwrap();

        let got = cache.ensure(&release).await.unwrap();
        assert_eq!(got.outcome, CacheOutcome::Miss);
        assert_eq!(std::fs::read(got.dir.join("index.js")).unwrap(), b"fresh");
        assert!(!got.dir.join("stray.txt").exists());
        assert_eq!(
            std::fs::read_to_string(got.dir.join(RELEASE_MARKER_FILE)).unwrap(),
            "rel-1"
        );
        assert_eq!(std::fs::read_dir(data.path().join("staging")).unwrap().count(), 0);

        let again = cache.ensure(&release).await.unwrap();
        assert_eq!(again.outcome, CacheOutcome::Hit);
        assert_eq!(store.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_directory_counts_as_absent() {
        let release = id("rel-1");
        let store = MemStore::default().with(&release, tar_gz(&[("index.js", b"x")]));
        let data = tempfile::tempdir().unwrap();
        let cache = ReleaseCache::new(data.path(), Arc::new(store));
        std::fs::create_dir_all(cache.release_dir(&release.worker_key())).unwrap();

        let got = cache.ensure(&release).await.unwrap();
        assert_eq!(got.outcome, CacheOutcome::Miss);
        assert!(got.dir.join("index.js").is_file());
    }

    #[tokio::test]
    async fn prepare_drops_stale_staging_and_sockets_are_short() {
        let data = tempfile::tempdir().unwrap();
        let cache = ReleaseCache::new(data.path(), Arc::new(MemStore::default()));
        let stale = data.path().join("staging").join("abc.123");
        std::fs::create_dir_all(&stale).unwrap();

        cache.prepare().await.unwrap();
        assert!(!stale.exists());

        let key = id("rel-1").worker_key();
        let socket = cache.socket_path(&key);
        assert_eq!(socket.parent().unwrap(), data.path().join("sockets"));
        assert_eq!(socket.file_name().unwrap().len(), 16 + ".sock".len());

        std::fs::write(&socket, b"").unwrap();
        cache.clear_socket(&key).await.unwrap();
        assert!(!socket.exists());
        cache.clear_socket(&key).await.unwrap();
    }
}
