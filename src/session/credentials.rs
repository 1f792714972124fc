//! Per-provider credential storage
//!
//! Credentials live in a small versioned JSON file under the data
//! directory. Presence of a non-blank key for a provider gates whether a
//! chat request is attempted at all; a request is never sent without one.

use crate::providers::ProviderName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by credential persistence
#[derive(Error, Debug)]
pub enum CredentialError {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(String),
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(String),
    /// The file carried an unsupported format version
    #[error("Unsupported credential file version: {0}")]
    UnsupportedVersion(u32),
    /// The supplied key was blank
    #[error("API key cannot be blank")]
    BlankKey,
}

/// Serializable envelope for the credential file
#[derive(Debug, Serialize, Deserialize)]
struct CredentialFile {
    /// Version of the file format (for future migration support)
    version: u32,
    /// Map of provider name to API key
    keys: HashMap<String, String>,
}

const FILE_VERSION: u32 = 1;

/// Per-provider API key store backed by a JSON file
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    keys: HashMap<String, String>,
}

impl CredentialStore {
    /// Load the store from a file; a missing file yields an empty store.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CredentialError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self {
                path,
                keys: HashMap::new(),
            });
        }

        let json =
            std::fs::read_to_string(&path).map_err(|e| CredentialError::Io(e.to_string()))?;
        let file: CredentialFile =
            serde_json::from_str(&json).map_err(|e| CredentialError::Json(e.to_string()))?;

        if file.version != FILE_VERSION {
            return Err(CredentialError::UnsupportedVersion(file.version));
        }

        Ok(Self {
            path,
            keys: file.keys,
        })
    }

    /// Create an empty, in-memory-only store (tests and embedding callers
    /// that manage persistence themselves)
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            keys: HashMap::new(),
        }
    }

    /// Get the stored API key for a provider, if one is present
    pub fn api_key(&self, provider: ProviderName) -> Option<&str> {
        self.keys
            .get(provider.as_str())
            .map(String::as_str)
            .filter(|key| !key.trim().is_empty())
    }

    /// Store an API key for a provider and persist the file
    pub fn set_api_key(
        &mut self,
        provider: ProviderName,
        key: &str,
    ) -> Result<(), CredentialError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(CredentialError::BlankKey);
        }
        self.keys
            .insert(provider.as_str().to_string(), key.to_string());
        self.save()
    }

    /// Remove a provider's API key and persist the file
    pub fn remove_api_key(&mut self, provider: ProviderName) -> Result<(), CredentialError> {
        self.keys.remove(provider.as_str());
        self.save()
    }

    fn save(&self) -> Result<(), CredentialError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CredentialError::Io(e.to_string()))?;
            }
        }

        let file = CredentialFile {
            version: FILE_VERSION,
            keys: self.keys.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| CredentialError::Json(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| CredentialError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = CredentialStore::load(tmp.path().join("credentials.json")).unwrap();
        assert!(store.api_key(ProviderName::OpenAi).is_none());
    }

    #[test]
    fn test_set_and_reload_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");

        let mut store = CredentialStore::load(&path).unwrap();
        store.set_api_key(ProviderName::OpenAi, "sk-test").unwrap();
        store
            .set_api_key(ProviderName::Gemini, "  gm-test  ")
            .unwrap();

        let reloaded = CredentialStore::load(&path).unwrap();
        assert_eq!(reloaded.api_key(ProviderName::OpenAi), Some("sk-test"));
        // Keys are trimmed on the way in.
        assert_eq!(reloaded.api_key(ProviderName::Gemini), Some("gm-test"));
    }

    #[test]
    fn test_blank_key_rejected() {
        let mut store = CredentialStore::in_memory();
        assert!(matches!(
            store.set_api_key(ProviderName::OpenAi, "   "),
            Err(CredentialError::BlankKey)
        ));
    }

    #[test]
    fn test_remove_key() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");

        let mut store = CredentialStore::load(&path).unwrap();
        store.set_api_key(ProviderName::OpenAi, "sk-test").unwrap();
        store.remove_api_key(ProviderName::OpenAi).unwrap();

        let reloaded = CredentialStore::load(&path).unwrap();
        assert!(reloaded.api_key(ProviderName::OpenAi).is_none());
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        std::fs::write(&path, r#"{"version": 99, "keys": {}}"#).unwrap();

        assert!(matches!(
            CredentialStore::load(&path),
            Err(CredentialError::UnsupportedVersion(99))
        ));
    }
}
