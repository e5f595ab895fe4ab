/*
[INPUT]:  Auth options, persisted sessions, callback URLs, custody endpoints
[OUTPUT]: Embedded wallet connections through resume/validate/fresh paths
[POS]:    Embedded layer - session and authentication state machine
[UPDATE]: When auth strategies or the session lifecycle change
*/

pub mod auth;
pub mod jwt;
pub mod session;

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::custody::{retry_with_backoff, CustodyClient};
use crate::env::{EphemeralStore, Navigator, UrlParams};
use crate::error::{ConnectError, Result};
use crate::events::{EventBus, WalletEvent};
use crate::keypair::ApiKeypair;
use crate::types::{
    AddressType, AuthOptions, AuthProviderKind, ConnectOutcome, EmbeddedWalletType, EventSource,
    SessionStatus, WalletAddress,
};

use auth::{CallbackCheck, RedirectAuth};

pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};

/// Configuration for the embedded (custody-backed) wallet engine
#[derive(Debug, Clone)]
pub struct EmbeddedConfig {
    pub custody_base_url: Url,
    pub auth_base_url: Url,
    /// Callback the identity provider redirects back to
    pub redirect_url: Option<Url>,
    /// Parent organization id issued to the embedding application
    pub app_id: String,
    pub wallet_type: EmbeddedWalletType,
    pub address_types: BTreeSet<AddressType>,
}

impl EmbeddedConfig {
    fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(ConnectError::Config("app_id must not be empty".to_string()));
        }
        if self.address_types.is_empty() {
            return Err(ConnectError::Config(
                "at least one address type is required".to_string(),
            ));
        }
        Ok(())
    }
}

struct ActiveConnection {
    wallet_id: String,
    addresses: Vec<WalletAddress>,
}

/// The embedded wallet's session and auth state machine.
///
/// `connect` runs one of three mutually exclusive paths: resume a redirect
/// round-trip found on the current URL, validate an already-completed stored
/// session, or provision fresh. Concurrent callers over a completed session
/// converge on the read-only validation path.
pub struct EmbeddedWallet {
    config: EmbeddedConfig,
    session_store: Arc<dyn SessionStore>,
    auth: RedirectAuth,
    navigator: Arc<dyn Navigator>,
    url_params: UrlParams,
    events: EventBus,
    active: RwLock<Option<ActiveConnection>>,
}

impl EmbeddedWallet {
    pub fn new(
        config: EmbeddedConfig,
        session_store: Arc<dyn SessionStore>,
        ephemeral: Arc<dyn EphemeralStore>,
        navigator: Arc<dyn Navigator>,
        url_params: UrlParams,
        events: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        let auth = RedirectAuth::new(
            config.auth_base_url.clone(),
            config.redirect_url.clone(),
            ephemeral,
        );
        Ok(Self {
            config,
            session_store,
            auth,
            navigator,
            url_params,
            events,
            active: RwLock::new(None),
        })
    }

    pub async fn connect(&self, auth_options: &AuthOptions) -> Result<ConnectOutcome> {
        self.events.emit(&WalletEvent::ConnectStart {
            source: EventSource::ManualConnect,
        });

        let result = self.connect_inner(auth_options).await;
        match &result {
            Ok(ConnectOutcome::Completed { addresses, .. }) => {
                self.events.emit(&WalletEvent::Connect {
                    addresses: addresses.clone(),
                    source: EventSource::ManualConnect,
                });
            }
            Ok(ConnectOutcome::Redirecting { auth_url }) => {
                info!(%auth_url, "redirecting for authentication");
            }
            Err(err) => {
                self.events.emit(&WalletEvent::ConnectError {
                    message: err.to_string(),
                    source: EventSource::ManualConnect,
                });
            }
        }
        result
    }

    async fn connect_inner(&self, auth_options: &AuthOptions) -> Result<ConnectOutcome> {
        match self.auth.inspect_callback(&self.url_params)? {
            CallbackCheck::Failed { code, message } => {
                Err(ConnectError::AuthCallback { code, message })
            }
            CallbackCheck::Success {
                wallet_id,
                provider,
                state,
                session_id,
            } => {
                match self
                    .resume(wallet_id, provider, &state, session_id)
                    .await?
                {
                    Some(outcome) => Ok(outcome),
                    // Stale or foreign pending session: cleared, start over.
                    None => self.fresh(auth_options).await,
                }
            }
            CallbackCheck::NotACallback => {
                if let Some(session) = self.session_store.get_session().await? {
                    match session.status {
                        SessionStatus::Completed => {
                            return self.validate_existing(session).await;
                        }
                        SessionStatus::Pending | SessionStatus::Failed => {
                            // A hung or abandoned redirect; cleared lazily.
                            debug!(
                                session_id = %session.session_id,
                                status = ?session.status,
                                "clearing unusable stored session"
                            );
                            self.session_store.clear_session().await?;
                        }
                    }
                }
                self.fresh(auth_options).await
            }
        }
    }

    /// Finalize a redirect round-trip. Returns `None` when the stored pending
    /// session is stale or foreign; the caller restarts fresh.
    async fn resume(
        &self,
        wallet_id: String,
        provider: Option<AuthProviderKind>,
        state: &str,
        url_session_id: Option<String>,
    ) -> Result<Option<ConnectOutcome>> {
        let Some(mut session) = self.session_store.get_session().await? else {
            // The redirect outlived local storage; unrecoverable.
            return Err(ConnectError::Session(
                "no stored session found, session may have expired".to_string(),
            ));
        };

        if session.status == SessionStatus::Pending {
            let matches = url_session_id
                .as_deref()
                .is_some_and(|id| id == session.session_id);
            if !matches {
                warn!(
                    stored = %session.session_id,
                    url = ?url_session_id,
                    "pending session does not correlate with callback, discarding"
                );
                self.session_store.clear_session().await?;
                return Ok(None);
            }
        }

        let context = match self.auth.validate_state(state) {
            Ok(context) => context,
            Err(err) => {
                // A pending session cannot outlive its CSRF token; a
                // completed one survives a replayed callback URL.
                if session.status == SessionStatus::Pending {
                    warn!(
                        session_id = %session.session_id,
                        "state validation failed, discarding pending session"
                    );
                    self.session_store.clear_session().await?;
                }
                return Err(err);
            }
        };
        if context.session_id != session.session_id {
            self.session_store.clear_session().await?;
            return Err(ConnectError::Csrf(
                "auth context does not match the stored session".to_string(),
            ));
        }

        session.status = SessionStatus::Completed;
        session.wallet_id = Some(wallet_id.clone());
        if let Some(provider) = provider {
            session.auth_provider = provider;
            session.user_info.provider = Some(provider);
        }
        session.touch();

        let custody = self.custody_for(&session)?;
        let addresses = self.fetch_addresses(&custody, &wallet_id).await?;
        self.session_store.save_session(&session).await?;

        info!(wallet_id, "redirect round-trip resumed");
        self.set_active(wallet_id.clone(), addresses.clone());
        Ok(Some(ConnectOutcome::Completed {
            wallet_id: Some(wallet_id),
            addresses,
        }))
    }

    /// Validate an already-completed session. Warm calls are pure cache
    /// reads; a cold start rebuilds the client and fetches addresses once.
    async fn validate_existing(&self, mut session: Session) -> Result<ConnectOutcome> {
        if let Some(active) = self.active.read().unwrap().as_ref() {
            return Ok(ConnectOutcome::Completed {
                wallet_id: Some(active.wallet_id.clone()),
                addresses: active.addresses.clone(),
            });
        }

        let wallet_id = session.wallet_id.clone().ok_or_else(|| {
            ConnectError::Session("completed session is missing its wallet id".to_string())
        })?;
        let custody = self.custody_for(&session)?;
        let addresses = self.fetch_addresses(&custody, &wallet_id).await?;

        session.touch();
        self.session_store.save_session(&session).await?;

        self.set_active(wallet_id.clone(), addresses.clone());
        Ok(ConnectOutcome::Completed {
            wallet_id: Some(wallet_id),
            addresses,
        })
    }

    /// Provision a brand-new session: fresh keypair, fresh organization,
    /// then one of the three auth strategies.
    async fn fresh(&self, auth_options: &AuthOptions) -> Result<ConnectOutcome> {
        let provider = self.resolve_provider(auth_options)?;

        // JWT tokens are checked for presence and shape before any network
        // call is made.
        let jwt_token = if provider == AuthProviderKind::Jwt {
            let token = auth_options.jwt_token.as_deref().ok_or_else(|| {
                ConnectError::Config("jwt_token is required for the jwt provider".to_string())
            })?;
            jwt::validate_jwt_shape(token)?;
            Some(token.to_string())
        } else {
            None
        };

        let keypair = ApiKeypair::generate();
        let client = CustodyClient::new(self.config.custody_base_url.clone())?
            .with_keypair(keypair.clone());
        let organization_name = format!("{}-{}", self.config.app_id, Uuid::new_v4().simple());
        let organization_id = client
            .create_organization(&organization_name, &keypair.public_key_base58())
            .await?;
        let custody = client.with_organization(organization_id.clone());

        match provider {
            AuthProviderKind::AppWallet => {
                let wallet_id = custody.create_wallet("Wallet").await?;
                let mut session = Session::new(
                    organization_id,
                    keypair,
                    AuthProviderKind::AppWallet,
                    SessionStatus::Completed,
                );
                session.wallet_id = Some(wallet_id.clone());
                self.session_store.save_session(&session).await?;

                let addresses = self.fetch_addresses(&custody, &wallet_id).await?;
                info!(wallet_id, "app wallet provisioned");
                self.set_active(wallet_id.clone(), addresses.clone());
                Ok(ConnectOutcome::Completed {
                    wallet_id: Some(wallet_id),
                    addresses,
                })
            }
            AuthProviderKind::Jwt => {
                let Some(token) = jwt_token.as_deref() else {
                    return Err(ConnectError::Config(
                        "jwt_token is required for the jwt provider".to_string(),
                    ));
                };
                let exchange = jwt::authenticate_jwt(
                    &custody,
                    token,
                    &organization_id,
                    &self.config.app_id,
                )
                .await?;

                let mut session = Session::new(
                    organization_id,
                    keypair,
                    AuthProviderKind::Jwt,
                    SessionStatus::Completed,
                );
                session.wallet_id = Some(exchange.wallet_id.clone());
                session.user_info = exchange.user_info;
                session.user_info.provider = Some(AuthProviderKind::Jwt);
                self.session_store.save_session(&session).await?;

                let addresses = self.fetch_addresses(&custody, &exchange.wallet_id).await?;
                self.set_active(exchange.wallet_id.clone(), addresses.clone());
                Ok(ConnectOutcome::Completed {
                    wallet_id: Some(exchange.wallet_id),
                    addresses,
                })
            }
            redirect_provider => {
                let mut session = Session::new(
                    organization_id,
                    keypair,
                    redirect_provider,
                    SessionStatus::Pending,
                );
                session.user_info.provider = Some(redirect_provider);
                // Stamped with the current timestamp so the most recent
                // tab's redirect wins a near-simultaneous race.
                session.touch();
                self.session_store.save_session(&session).await?;

                let auth_url = self.auth.begin(&session, redirect_provider)?;
                self.navigator.navigate(&auth_url);
                Ok(ConnectOutcome::Redirecting { auth_url })
            }
        }
    }

    /// Silent variant: resumes a callback or validates a completed session,
    /// but never provisions fresh. Errors are folded into `false`.
    pub async fn auto_connect(&self) -> bool {
        let result: Result<bool> = async {
            match self.auth.inspect_callback(&self.url_params)? {
                CallbackCheck::Failed { code, message } => {
                    debug!(?code, message, "auto-connect skipping failed callback");
                    Ok(false)
                }
                CallbackCheck::Success {
                    wallet_id,
                    provider,
                    state,
                    session_id,
                } => Ok(self
                    .resume(wallet_id, provider, &state, session_id)
                    .await?
                    .is_some()),
                CallbackCheck::NotACallback => {
                    match self.session_store.get_session().await? {
                        Some(session) if session.status == SessionStatus::Completed => {
                            self.validate_existing(session).await?;
                            Ok(true)
                        }
                        _ => Ok(false),
                    }
                }
            }
        }
        .await;

        match result {
            Ok(true) => {
                self.events.emit(&WalletEvent::Connect {
                    addresses: self.get_addresses(),
                    source: EventSource::AutoConnect,
                });
                true
            }
            Ok(false) => false,
            Err(err) => {
                debug!(error = %err, "embedded auto-connect failed");
                false
            }
        }
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.session_store.clear_session().await?;
        *self.active.write().unwrap() = None;
        self.events.emit(&WalletEvent::Disconnect {
            source: EventSource::ManualDisconnect,
        });
        Ok(())
    }

    /// Pure read of the in-memory cache
    pub fn get_addresses(&self) -> Vec<WalletAddress> {
        self.active
            .read()
            .unwrap()
            .as_ref()
            .map(|active| active.addresses.clone())
            .unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.active.read().unwrap().is_some()
    }

    pub fn wallet_id(&self) -> Option<String> {
        self.active
            .read()
            .unwrap()
            .as_ref()
            .map(|active| active.wallet_id.clone())
    }

    pub async fn sign_message(&self, _address_type: AddressType, message: &[u8]) -> Result<String> {
        let session = self
            .session_store
            .get_session()
            .await?
            .filter(|s| s.status == SessionStatus::Completed)
            .ok_or_else(|| {
                ConnectError::Session("no completed session to sign with".to_string())
            })?;
        // The local keypair signs the request envelope; the custody service
        // performs the chain signature.
        let signature = session.keypair.sign(message);
        Ok(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            signature.to_bytes(),
        ))
    }

    fn resolve_provider(&self, auth_options: &AuthOptions) -> Result<AuthProviderKind> {
        let provider = auth_options.provider.unwrap_or(match self.config.wallet_type {
            EmbeddedWalletType::AppWallet => AuthProviderKind::AppWallet,
            EmbeddedWalletType::UserWallet => AuthProviderKind::Connect,
        });

        match (self.config.wallet_type, provider) {
            (EmbeddedWalletType::AppWallet, AuthProviderKind::AppWallet) => Ok(provider),
            (EmbeddedWalletType::AppWallet, other) => Err(ConnectError::Config(format!(
                "provider {other:?} is not valid for an app wallet"
            ))),
            (EmbeddedWalletType::UserWallet, AuthProviderKind::AppWallet) => {
                Err(ConnectError::Config(
                    "app-wallet provider is not valid for a user wallet".to_string(),
                ))
            }
            (EmbeddedWalletType::UserWallet, other) => Ok(other),
        }
    }

    fn custody_for(&self, session: &Session) -> Result<CustodyClient> {
        Ok(CustodyClient::new(self.config.custody_base_url.clone())?
            .with_keypair(session.keypair.clone())
            .with_organization(session.organization_id.clone()))
    }

    /// Fetch and filter addresses, with bounded retry. A final failure after
    /// otherwise-successful auth deletes the session rather than leaving it
    /// dangling.
    async fn fetch_addresses(
        &self,
        custody: &CustodyClient,
        wallet_id: &str,
    ) -> Result<Vec<WalletAddress>> {
        let fetched = retry_with_backoff(
            || custody.get_wallet_addresses(wallet_id),
            "wallet addresses",
        )
        .await;

        match fetched {
            Ok(addresses) => Ok(addresses
                .into_iter()
                .filter(|a| self.config.address_types.contains(&a.address_type))
                .collect()),
            Err(err) => {
                warn!(error = %err, wallet_id, "address fetch failed, clearing session");
                if let Err(clear_err) = self.session_store.clear_session().await {
                    warn!(error = %clear_err, "session cleanup also failed");
                }
                Err(err)
            }
        }
    }

    fn set_active(&self, wallet_id: String, addresses: Vec<WalletAddress>) {
        *self.active.write().unwrap() = Some(ActiveConnection {
            wallet_id,
            addresses,
        });
    }
}
