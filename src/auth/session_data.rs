use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;


/// Keys under which the session is persisted.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "github_access_token";
    pub const USER: &str = "github_user";
    pub const OAUTH_STATE: &str = "github_oauth_state";
    pub const PENDING_CODE: &str = "github_pending_code";
    pub const AUTH_PENDING: &str = "github_auth_pending";
    pub const RETURN_URL: &str = "github_return_url";

    /// Every key, for logout.
    pub const ALL: [&str; 6] = [ACCESS_TOKEN, USER, OAUTH_STATE, PENDING_CODE, AUTH_PENDING, RETURN_URL];

    /// Keys that only live for the duration of one login attempt.
    pub const TRANSIENT: [&str; 4] = [OAUTH_STATE, PENDING_CODE, AUTH_PENDING, RETURN_URL];
}


/// Persistent key-value storage for the session.
/// Writes of several entries happen as one batch, so a reader never sees half of it.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set_entries(&self, entries: &[(&str, String)]) -> anyhow::Result<()>;
    fn remove(&self, keys: &[&str]) -> anyhow::Result<()>;

    fn set(&self, key: &str, value: String) -> anyhow::Result<()> {
        self.set_entries(&[(key, value)])
    }

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}


fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}


#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.data).get(key).cloned()
    }

    fn set_entries(&self, entries: &[(&str, String)]) -> anyhow::Result<()> {
        let mut data = lock(&self.data);
        for (key, value) in entries {
            data.insert(key.to_string(), value.clone());
        }
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> anyhow::Result<()> {
        let mut data = lock(&self.data);
        for key in keys {
            data.remove(*key);
        }
        Ok(())
    }
}


/// A JSON file holding all keys. The whole file is rewritten on every change
/// through a temporary file and a rename.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: Mutex<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let raw = fs::read(&path)
                .with_context(|| format!("reading session file {}", path.display()))?;
            serde_json::from_slice(&raw)
                .with_context(|| format!("parsing session file {}", path.display()))?
        } else {
            HashMap::new()
        };

        Ok(FileStore {
            path,
            data: Mutex::new(data),
        })
    }

    fn flush(&self, data: &HashMap<String, String>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(data)?)
            .with_context(|| format!("writing session file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing session file {}", self.path.display()))?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.data).get(key).cloned()
    }

    fn set_entries(&self, entries: &[(&str, String)]) -> anyhow::Result<()> {
        let mut data = lock(&self.data);
        let mut next = data.clone();
        for (key, value) in entries {
            next.insert(key.to_string(), value.clone());
        }
        self.flush(&next)?;
        *data = next;
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> anyhow::Result<()> {
        let mut data = lock(&self.data);
        if !keys.iter().any(|key| data.contains_key(*key)) {
            return Ok(());
        }
        let mut next = data.clone();
        for key in keys {
            next.remove(*key);
        }
        self.flush(&next)?;
        *data = next;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use crate::auth::session_data::{keys, FileStore, MemoryStore, SessionStore};

    #[test]
    fn test_memory_store_batch() {
        let store = MemoryStore::new();
        store.set_entries(&[
            (keys::ACCESS_TOKEN, "token".to_string()),
            (keys::USER, "{}".to_string()),
        ]).unwrap();

        assert_eq!(store.get(keys::ACCESS_TOKEN).as_deref(), Some("token"));
        assert!(store.contains(keys::USER));

        store.remove(&keys::ALL).unwrap();
        assert!(!store.contains(keys::ACCESS_TOKEN));
        assert!(!store.contains(keys::USER));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set(keys::ACCESS_TOKEN, "gho_abc".to_string()).unwrap();
            store.set(keys::OAUTH_STATE, "nonce".to_string()).unwrap();
            store.remove(&[keys::OAUTH_STATE]).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get(keys::ACCESS_TOKEN).as_deref(), Some("gho_abc"));
        assert!(!store.contains(keys::OAUTH_STATE));
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"not json").unwrap();

        assert!(FileStore::open(&path).is_err());
    }
}
