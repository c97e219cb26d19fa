//! Well-known names shared by the host crates.

/// Canonical filename of a release archive inside the artifact store.
pub const ARTIFACT_FILENAME: &str = "artifact.tar.gz";

/// File written into every unpacked release directory, holding the full release id.
///
/// Used to detect two release ids that map onto the same release key.
pub const RELEASE_MARKER_FILE: &str = ".release";

/// Number of hex characters kept from the release id digest.
pub const RELEASE_KEY_LEN: usize = 16;

/// Time a freshly spawned worker has to signal readiness.
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 5_000;

/// Stdout line a worker prints once it accepts requests on its socket.
pub const DEFAULT_READY_MARKER: &str = "ready";

/// Environment variable that tells a worker where to bind its socket.
pub const DEFAULT_SOCKET_ENV: &str = "WORKER_SOCKET_PATH";
