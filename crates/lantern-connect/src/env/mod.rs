/*
[INPUT]:  Host environment capabilities (storage, URL, navigation)
[OUTPUT]: Trait seams and in-memory implementations for the SDK to run on
[POS]:    Environment layer - host abstraction consumed by adapters/engine
[UPDATE]: When adding host capabilities or changing storage semantics
*/

pub mod file_store;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;
use url::Url;

use crate::error::Result;

pub use file_store::FileStore;

/// Durable cross-session key/value storage (survives page loads).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Tab-scoped ephemeral storage. Holds the CSRF state token and the auth
/// context across a redirect round-trip, and nothing longer-lived.
pub trait EphemeralStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Read and delete in one call; the single-use primitive for CSRF tokens
    fn take(&self, key: &str) -> Result<Option<String>> {
        let value = self.get(key)?;
        if value.is_some() {
            self.remove(key)?;
        }
        Ok(value)
    }
}

/// Performs the outbound navigation of a redirect-based auth flow.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &Url);
}

/// Read-only accessor for the current page/process URL query parameters.
#[derive(Debug, Clone, Default)]
pub struct UrlParams {
    url: Option<Url>,
}

impl UrlParams {
    /// No current URL (tests, non-callback process starts)
    pub fn empty() -> Self {
        Self { url: None }
    }

    pub fn from_url(url: Url) -> Self {
        Self { url: Some(url) }
    }

    /// First query parameter with the given name
    pub fn get(&self, name: &str) -> Option<String> {
        let url = self.url.as_ref()?;
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// In-memory store implementing both storage traits; used by tests and by
/// embedders that bridge to their own persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    map: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.read().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.write().unwrap().remove(key);
        Ok(())
    }
}

impl EphemeralStore for MemoryStore {
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

/// Navigator that records the destination instead of navigating; the default
/// for environments without a page to tear down, and for tests asserting on
/// the redirect URL.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    last: Arc<RwLock<Option<Url>>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent navigation target, if any
    pub fn last_url(&self) -> Option<Url> {
        self.last.read().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &Url) {
        debug!(%url, "recording navigation");
        *self.last.write().unwrap() = Some(url.clone());
    }
}
