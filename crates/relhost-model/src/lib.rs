mod domain;
pub use domain::{
    ARTIFACT_FILENAME, DEFAULT_READY_MARKER, DEFAULT_READY_TIMEOUT_MS, DEFAULT_SOCKET_ENV,
    RELEASE_KEY_LEN, RELEASE_MARKER_FILE,
};
pub use domain::{Env, KeyValue, TimeoutMs};

mod error;
pub use error::{ModelError, ModelResult};

mod identity;
pub use identity::{ObjectKey, ReleaseIdentity, ReleaseKey, WorkerKey, validate_id};
