use std::fmt;

use crate::{ARTIFACT_FILENAME, ReleaseIdentity};

/// Artifact store address of a release archive.
///
/// Always `builds/{organization_id}/{application_id}/{release_id}/artifact.tar.gz`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn for_release(identity: &ReleaseIdentity) -> Self {
        Self(format!(
            "builds/{}/{}/{}/{}",
            identity.organization_id(),
            identity.application_id(),
            identity.release_id(),
            ARTIFACT_FILENAME
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
