//! On-disk cache of login details, so repeated check runs do not create a
//! new device on every invocation.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MatrixError;

/// Contents of the credential cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// e.g. `https://matrix.example.org`
    pub homeserver: String,
    /// e.g. `@bot:example.org`
    pub user_id: String,
    pub device_id: Option<String>,
    pub access_token: String,
}

impl StoredCredentials {
    /// Read the cache. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, MatrixError> {
        if !path.exists() {
            debug!(path = %path.display(), "no cached credentials");
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path).map_err(|source| MatrixError::CredentialCache {
            path: path.to_path_buf(),
            source,
        })?;
        let creds = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), "loaded cached credentials");
        Ok(Some(creds))
    }

    pub fn save(&self, path: &Path) -> Result<(), MatrixError> {
        let raw = serde_json::to_string(self)?;
        std::fs::write(path, raw).map_err(|source| MatrixError::CredentialCache {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "saved credentials");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = StoredCredentials::load(&dir.path().join("auth.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let creds = StoredCredentials {
            homeserver: "https://matrix.example.org".into(),
            user_id: "@bot:example.org".into(),
            device_id: Some("ABCDEFGHIJ".into()),
            access_token: "syt_token".into(),
        };
        creds.save(&path).unwrap();
        assert_eq!(StoredCredentials::load(&path).unwrap(), Some(creds));
    }

    #[test]
    fn test_reads_file_written_by_older_tooling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(
            &path,
            r#"{"homeserver": "https://hs.example", "user_id": "@a:hs.example", "device_id": "XYZ", "access_token": "t"}"#,
        )
        .unwrap();
        let creds = StoredCredentials::load(&path).unwrap().unwrap();
        assert_eq!(creds.user_id, "@a:hs.example");
        assert_eq!(creds.device_id.as_deref(), Some("XYZ"));
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            StoredCredentials::load(&path),
            Err(MatrixError::Serialization(_))
        ));
    }
}
