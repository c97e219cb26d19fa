mod kv;
pub use kv::KeyValue;

mod env;
pub use env::Env;

mod constants;
pub use constants::{
    ARTIFACT_FILENAME, DEFAULT_READY_MARKER, DEFAULT_READY_TIMEOUT_MS, DEFAULT_SOCKET_ENV,
    RELEASE_KEY_LEN, RELEASE_MARKER_FILE,
};

/// Timeout value in milliseconds.
///
/// Used in configuration where an explicit time limit is required.
pub type TimeoutMs = u64;
