/*
[INPUT]:  Session records produced by the auth strategies
[OUTPUT]: Persisted session storage with in-memory and file-backed impls
[POS]:    Embedded layer - the single source of truth for wallet identity
[UPDATE]: When the session schema or storage backends change
*/

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ConnectError, Result};
use crate::keypair::ApiKeypair;
use crate::types::{AuthProviderKind, SessionStatus, UserInfo};

/// The embedded wallet's persisted identity record.
///
/// At most one session exists in storage at a time. A `Pending` session is
/// only valid while its CSRF state token still exists in ephemeral storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    /// Unset while a redirect round-trip is pending
    pub wallet_id: Option<String>,
    pub organization_id: String,
    /// Local Ed25519 keypair authorizing custody API calls; the
    /// funds-controlling key never leaves the custody service
    pub keypair: ApiKeypair,
    pub auth_provider: AuthProviderKind,
    #[serde(default)]
    pub user_info: UserInfo,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl Session {
    pub fn new(
        organization_id: impl Into<String>,
        keypair: ApiKeypair,
        auth_provider: AuthProviderKind,
        status: SessionStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            wallet_id: None,
            organization_id: organization_id.into(),
            keypair,
            auth_provider,
            user_info: UserInfo::default(),
            status,
            created_at: now,
            last_used: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_used = Utc::now();
    }
}

/// Persistence seam for the one-and-only session
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self) -> Result<Option<Session>>;
    async fn save_session(&self, session: &Session) -> Result<()>;
    async fn clear_session(&self) -> Result<()>;
}

/// In-memory store for tests and embedders with their own persistence
#[derive(Default)]
pub struct MemorySessionStore {
    session: Arc<RwLock<Option<Session>>>,
    saves: AtomicUsize,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: Arc::new(RwLock::new(Some(session))),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_session(&self) -> Result<Option<Session>> {
        Ok(self.session.read().unwrap().clone())
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.session.write().unwrap() = Some(session.clone());
        Ok(())
    }

    async fn clear_session(&self) -> Result<()> {
        *self.session.write().unwrap() = None;
        Ok(())
    }
}

/// File-backed store: one JSON file with owner-only permissions
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the working directory
    pub fn default_path() -> PathBuf {
        PathBuf::from("./.lantern-config/session.json")
    }

    fn storage_err(err: std::io::Error) -> ConnectError {
        ConnectError::Storage(err.to_string())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get_session(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path).map_err(Self::storage_err)?;
        let session = serde_json::from_str(&contents)?;
        Ok(Some(session))
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(Self::storage_err)?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, contents).map_err(Self::storage_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, permissions).map_err(Self::storage_err)?;
        }

        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    async fn clear_session(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(Self::storage_err)?;
        }
        Ok(())
    }
}
