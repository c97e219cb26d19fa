//! Release identities and the keys derived from them.
//!
//! A release is addressed by `(organization, application, release)`. Everything the host
//! stores on disk or in memory is keyed by [`WorkerKey`], the application id plus a short
//! [`ReleaseKey`] digest of the release id.
mod key;
pub use key::{ReleaseKey, WorkerKey};

mod object;
pub use object::ObjectKey;

use serde::{Deserialize, Serialize};

use crate::{ModelError, ModelResult};

/// Longest accepted identifier.
const MAX_ID_LEN: usize = 128;

/// Check that `value` is safe to embed in a filesystem path and an object key.
///
/// Accepts `[A-Za-z0-9._-]`, 1 to 128 characters, and rejects the `.` and `..` path components.
pub fn validate_id(field: &'static str, value: &str) -> ModelResult<()> {
    if value.is_empty() {
        return Err(ModelError::Empty { field });
    }
    if value.len() > MAX_ID_LEN {
        return Err(ModelError::TooLong {
            field,
            len: value.len(),
            max: MAX_ID_LEN,
        });
    }
    let allowed = value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if !allowed || value == "." || value == ".." {
        return Err(ModelError::Forbidden {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Fully-qualified release: tenant, application and immutable release token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseIdentity {
    organization_id: String,
    application_id: String,
    release_id: String,
}

impl ReleaseIdentity {
    /// Build a validated identity.
    pub fn new(
        organization_id: impl Into<String>,
        application_id: impl Into<String>,
        release_id: impl Into<String>,
    ) -> ModelResult<Self> {
        let identity = Self {
            organization_id: organization_id.into(),
            application_id: application_id.into(),
            release_id: release_id.into(),
        };
        identity.validate()?;
        Ok(identity)
    }

    /// Re-check every component, e.g. after deserialization.
    pub fn validate(&self) -> ModelResult<()> {
        validate_id("organization_id", &self.organization_id)?;
        validate_id("application_id", &self.application_id)?;
        validate_id("release_id", &self.release_id)
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn release_id(&self) -> &str {
        &self.release_id
    }

    pub fn release_key(&self) -> ReleaseKey {
        ReleaseKey::derive(&self.release_id)
    }

    /// Registry and on-disk key of this release.
    pub fn worker_key(&self) -> WorkerKey {
        WorkerKey::new(self.application_id.clone(), self.release_key())
    }

    /// Location of the release archive in the artifact store.
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::for_release(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_path_safe_ids() {
        for id in ["app-42", "rel_1.0", "A", "x".repeat(128).as_str()] {
            assert!(validate_id("id", id).is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn rejects_unsafe_ids() {
        assert_eq!(
            validate_id("application_id", ""),
            Err(ModelError::Empty {
                field: "application_id"
            })
        );
        assert!(matches!(
            validate_id("id", &"x".repeat(129)),
            Err(ModelError::TooLong { len: 129, max: 128, .. })
        ));
        for id in [".", "..", "a/b", "a b", "ä", "../etc", "a%2F"] {
            assert!(
                matches!(validate_id("id", id), Err(ModelError::Forbidden { .. })),
                "{id:?} should be forbidden"
            );
        }
    }

    #[test]
    fn identity_validates_each_component() {
        assert!(ReleaseIdentity::new("org", "app-42", "rel-abcdef123456").is_ok());

        let err = ReleaseIdentity::new("org", "app/42", "rel").unwrap_err();
        assert!(matches!(
            err,
            ModelError::Forbidden {
                field: "application_id",
                ..
            }
        ));
        let err = ReleaseIdentity::new("", "app", "rel").unwrap_err();
        assert_eq!(
            err,
            ModelError::Empty {
                field: "organization_id"
            }
        );
    }

    #[test]
    fn derived_keys_agree() {
        let id = ReleaseIdentity::new("org-1", "app-42", "rel-abcdef123456").unwrap();
        let key = id.worker_key();
        assert_eq!(key.application_id(), "app-42");
        assert_eq!(key.release_key(), &id.release_key());
        assert_eq!(
            id.object_key().as_str(),
            "builds/org-1/app-42/rel-abcdef123456/artifact.tar.gz"
        );
    }

    #[test]
    fn serde_uses_camel_case() {
        let id = ReleaseIdentity::new("o", "a", "r").unwrap();
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"organizationId": "o", "applicationId": "a", "releaseId": "r"})
        );
    }
}
