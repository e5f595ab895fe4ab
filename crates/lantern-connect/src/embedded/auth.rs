/*
[INPUT]:  Auth base URL, ephemeral CSRF storage, callback URL parameters
[OUTPUT]: Redirect begin/resume protocol with single-use state validation
[POS]:    Embedded layer - the redirect round-trip sub-protocol
[UPDATE]: When callback parameters or the CSRF scheme change
*/

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::env::{EphemeralStore, UrlParams};
use crate::error::{ConnectError, Result};
use crate::types::{AuthCallbackCode, AuthProviderKind};

use super::session::Session;

/// Ephemeral key holding the single-use CSRF state token
const STATE_KEY: &str = "lantern.auth.state";
/// Ephemeral key holding the serialized auth context
const CONTEXT_KEY: &str = "lantern.auth.context";

/// Context written before the redirect and recovered on resume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub session_id: String,
    pub provider: AuthProviderKind,
}

/// What the current URL says about a redirect callback
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackCheck {
    /// The URL is not a redirect callback; nothing to resume
    NotACallback,
    /// The identity provider sent back an error
    Failed {
        code: AuthCallbackCode,
        message: String,
    },
    /// Successful round-trip; pending CSRF validation
    Success {
        wallet_id: String,
        provider: Option<AuthProviderKind>,
        state: String,
        session_id: Option<String>,
    },
}

/// Owns the CSRF side of the redirect flow: token issuance before the
/// navigation and single-use validation on resume.
pub struct RedirectAuth {
    auth_base_url: Url,
    redirect_url: Option<Url>,
    ephemeral: Arc<dyn EphemeralStore>,
}

impl RedirectAuth {
    pub fn new(
        auth_base_url: Url,
        redirect_url: Option<Url>,
        ephemeral: Arc<dyn EphemeralStore>,
    ) -> Self {
        Self {
            auth_base_url,
            redirect_url,
            ephemeral,
        }
    }

    /// Issue a CSRF state token, persist it with the auth context, and build
    /// the outbound auth URL. The caller performs the navigation.
    pub fn begin(&self, session: &Session, provider: AuthProviderKind) -> Result<Url> {
        let state = Uuid::new_v4().to_string();
        self.ephemeral.set(STATE_KEY, &state)?;

        let context = AuthContext {
            session_id: session.session_id.clone(),
            provider,
        };
        self.ephemeral
            .set(CONTEXT_KEY, &serde_json::to_string(&context)?)?;

        let mut url = self.auth_base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("state", &state);
            pairs.append_pair("session_id", &session.session_id);
            pairs.append_pair("organization_id", &session.organization_id);
            pairs.append_pair("public_key", &session.keypair.public_key_base58());
            if let Ok(provider_name) = serde_json::to_value(provider) {
                if let Some(name) = provider_name.as_str() {
                    pairs.append_pair("provider", name);
                }
            }
            if let Some(redirect) = &self.redirect_url {
                pairs.append_pair("redirect_uri", redirect.as_str());
            }
        }
        debug!(session_id = %session.session_id, ?provider, "auth redirect prepared");
        Ok(url)
    }

    /// Classify the current URL. An `error` parameter is fatal: the ephemeral
    /// context is cleared before the error is surfaced.
    pub fn inspect_callback(&self, params: &UrlParams) -> Result<CallbackCheck> {
        if let Some(raw_error) = params.get("error") {
            let code = AuthCallbackCode::from_param(&raw_error);
            let message = params
                .get("error_description")
                .unwrap_or_else(|| raw_error.clone());
            warn!(?code, message, "auth callback carried an error");
            self.clear_ephemeral();
            return Ok(CallbackCheck::Failed { code, message });
        }

        let (Some(wallet_id), Some(state)) = (params.get("wallet_id"), params.get("state")) else {
            return Ok(CallbackCheck::NotACallback);
        };

        let provider = params
            .get("provider")
            .and_then(|raw| serde_json::from_value(serde_json::Value::String(raw)).ok());

        Ok(CallbackCheck::Success {
            wallet_id,
            provider,
            state,
            session_id: params.get("session_id"),
        })
    }

    /// Validate the returned state against the stored token. The token is
    /// consumed exactly once; a second resume with the same URL fails.
    pub fn validate_state(&self, returned_state: &str) -> Result<AuthContext> {
        let stored = self.ephemeral.take(STATE_KEY)?;
        let context_raw = self.ephemeral.take(CONTEXT_KEY)?;

        let Some(stored) = stored else {
            return Err(ConnectError::Session(
                "auth state not found, session may have expired".to_string(),
            ));
        };
        if stored != returned_state {
            return Err(ConnectError::Csrf(
                "state token does not match the stored value".to_string(),
            ));
        }

        let context_raw = context_raw.ok_or_else(|| {
            ConnectError::Session("auth context not found, session may have expired".to_string())
        })?;
        Ok(serde_json::from_str(&context_raw)?)
    }

    fn clear_ephemeral(&self) {
        if let Err(err) = self.ephemeral.remove(STATE_KEY) {
            warn!(error = %err, "failed to clear auth state");
        }
        if let Err(err) = self.ephemeral.remove(CONTEXT_KEY) {
            warn!(error = %err, "failed to clear auth context");
        }
    }
}
