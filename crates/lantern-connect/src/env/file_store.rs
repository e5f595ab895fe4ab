/*
[INPUT]:  Key names and a storage directory
[OUTPUT]: Durable key/value persistence backed by mode-0600 files
[POS]:    Environment layer - file-based KeyValueStore for native hosts
[UPDATE]: When file naming conventions or permissions change
*/

use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::env::{EphemeralStore, KeyValueStore};
use crate::error::{ConnectError, Result};

/// File-backed key/value store. One file per key under a dot directory,
/// written with owner-only permissions since values may include session
/// secrets.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at the given directory
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Default location: `./.lantern-config/store` under the working directory
    pub fn default_dir() -> Self {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(base.join(".lantern-config").join("store"))
    }

    fn key_path(&self, key: &str) -> PathBuf {
        // Keys are dotted identifiers; keep them filesystem-safe.
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.val"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| ConnectError::Storage(format!("read {}: {e}", path.display())))?;
        Ok(Some(content))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .map_err(|e| ConnectError::Storage(format!("create {}: {e}", self.dir.display())))?;
        }

        let path = self.key_path(key);
        fs::write(&path, value)
            .map_err(|e| ConnectError::Storage(format!("write {}: {e}", path.display())))?;

        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&path)
                .map_err(|e| ConnectError::Storage(format!("stat {}: {e}", path.display())))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&path, perms)
                .map_err(|e| ConnectError::Storage(format!("chmod {}: {e}", path.display())))?;
        }

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| ConnectError::Storage(format!("remove {}: {e}", path.display())))?;
        }
        Ok(())
    }
}

// Native hosts have no tab-scoped storage; redirect state lives in the same
// directory so a round-trip can span two process invocations.
impl EphemeralStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        KeyValueStore::get(self, key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        KeyValueStore::set(self, key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        KeyValueStore::remove(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("lantern-test-{}", Uuid::new_v4()));
        path
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = temp_dir();
        let store = FileStore::new(&dir);

        assert_eq!(KeyValueStore::get(&store, "connect.was-connected").unwrap(), None);
        KeyValueStore::set(&store, "connect.was-connected", "true").unwrap();
        assert_eq!(
            KeyValueStore::get(&store, "connect.was-connected").unwrap(),
            Some("true".to_string())
        );
        KeyValueStore::remove(&store, "connect.was-connected").unwrap();
        assert_eq!(KeyValueStore::get(&store, "connect.was-connected").unwrap(), None);

        fs::remove_dir_all(dir).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_owner_only_permissions() {
        let dir = temp_dir();
        let store = FileStore::new(&dir);
        KeyValueStore::set(&store, "session.keypair", "secret").unwrap();

        let path = store.key_path("session.keypair");
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_keys_are_sanitized() {
        let dir = temp_dir();
        let store = FileStore::new(&dir);
        KeyValueStore::set(&store, "weird/key name", "v").unwrap();
        assert_eq!(
            KeyValueStore::get(&store, "weird/key name").unwrap(),
            Some("v".to_string())
        );
        fs::remove_dir_all(dir).unwrap();
    }
}
