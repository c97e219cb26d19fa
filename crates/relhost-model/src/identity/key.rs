use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::RELEASE_KEY_LEN;

/// Short digest of a release id, used in paths and registry keys.
///
/// Lowercase hex of SHA-256 over the release id, truncated to [`RELEASE_KEY_LEN`] characters.
/// Distinct release ids may still collide; callers keep the full id next to the key to
/// detect it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ReleaseKey(String);

impl ReleaseKey {
    pub fn derive(release_id: &str) -> Self {
        let digest = Sha256::digest(release_id.as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(RELEASE_KEY_LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry slot key: `(application id, release key)`.
///
/// Displays as `{application_id}-{release_key}`, which is also the artifact directory name
/// and the socket file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerKey {
    application_id: String,
    release_key: ReleaseKey,
}

impl WorkerKey {
    pub fn new(application_id: impl Into<String>, release_key: ReleaseKey) -> Self {
        Self {
            application_id: application_id.into(),
            release_key,
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn release_key(&self) -> &ReleaseKey {
        &self.release_key
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.application_id, self.release_key)
    }
}

impl Serialize for WorkerKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
