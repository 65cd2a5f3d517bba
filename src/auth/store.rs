use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Persistence port: a browser-storage-like key/value map.
///
/// Tokens are addressed by [`token_key`]; the `local:` backend stores its
/// data here too. Shared process-wide, no locking across instances — for
/// concurrent writers to the same key, the last write wins and is observed
/// on the next passive login.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AuthError>;
    fn remove(&self, key: &str) -> Result<(), AuthError>;
}

/// Deterministic token-store key for an authentication provider.
///
/// Derived from the provider identity, not the adapter class, so sibling
/// adapters sharing one OAuth app share one cached token.
pub fn token_key(provider: &str) -> String {
    format!("token-{}", normalize_label(provider))
}

/// In-memory store for tests and ephemeral use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self
            .inner
            .read()
            .map_err(|e| AuthError::Storage(e.to_string()))?
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.inner
            .write()
            .map_err(|e| AuthError::Storage(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.inner
            .write()
            .map_err(|e| AuthError::Storage(e.to_string()))?
            .remove(key);
        Ok(())
    }
}

/// File-backed store: one TOML record per key under a base directory.
///
/// # Example
/// ```no_run
/// use anystore::auth::{FileStore, KeyValueStore};
///
/// let store = FileStore::new_default();
/// store.set("token-github", "gho_abc123")?;
/// # Ok::<(), anystore::auth::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Store rooted at `~/.anystore`.
    pub fn new_default() -> Self {
        Self {
            base_dir: default_store_dir(),
        }
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.toml", normalize_label(key)))
    }

    fn ensure_parent(path: &Path) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AuthError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let path = self.record_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Storage(err.to_string())),
        };
        let record: Record =
            toml::from_str(&raw).map_err(|e| AuthError::Storage(e.to_string()))?;
        Ok(Some(record.value))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let path = self.record_path(key);
        Self::ensure_parent(&path)?;
        let record = Record {
            version: 1,
            key: key.to_string(),
            value: value.to_string(),
            saved_at: Utc::now(),
        };
        let serialized =
            toml::to_string(&record).map_err(|e| AuthError::Storage(e.to_string()))?;
        fs::write(&path, serialized).map_err(|e| AuthError::Storage(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .map_err(|e| AuthError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Storage(err.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    version: u32,
    key: String,
    value: String,
    saved_at: DateTime<Utc>,
}

fn default_store_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".anystore"))
        .unwrap_or_else(|| PathBuf::from(".anystore"))
}

fn normalize_label(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || lower == '-' {
            out.push(lower);
        } else {
            out.push('-');
        }
    }
    if out.trim_matches('-').is_empty() {
        "default".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[test]
    fn file_store_round_trip_works() {
        let (_dir, store) = temp_store();
        store.set("token-github", "gho_abc").unwrap();
        assert_eq!(
            store.get("token-github").unwrap().as_deref(),
            Some("gho_abc")
        );
    }

    #[test]
    fn missing_key_reads_none() {
        let (_dir, store) = temp_store();
        assert!(store.get("token-nowhere").unwrap().is_none());
    }

    #[test]
    fn remove_clears_and_is_idempotent() {
        let (_dir, store) = temp_store();
        store.set("token-github", "gho_abc").unwrap();
        store.remove("token-github").unwrap();
        assert!(store.get("token-github").unwrap().is_none());
        store.remove("token-github").unwrap();
    }

    #[test]
    fn last_writer_wins() {
        let store = MemoryStore::new();
        store.set("token-github", "first").unwrap();
        store.set("token-github", "second").unwrap();
        assert_eq!(
            store.get("token-github").unwrap().as_deref(),
            Some("second")
        );
    }

    #[test]
    fn token_key_is_deterministic_per_provider() {
        assert_eq!(token_key("github"), "token-github");
        assert_eq!(token_key("GitHub "), "token-github");
        assert_eq!(token_key("google sheets"), "token-google-sheets");
        // Sibling adapters sharing a provider share a key.
        assert_eq!(token_key("github"), token_key("github"));
    }
}
