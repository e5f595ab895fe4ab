/*
[INPUT]:  Custody service base URL, organization scope, API keypair
[OUTPUT]: Typed custody operations (organizations, wallets, JWT exchange)
[POS]:    Custody layer - HTTP client for the remote wallet service
[UPDATE]: When adding endpoints or changing request signing
*/

pub mod retry;
pub mod signature;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ConnectError, Result};
use crate::keypair::ApiKeypair;
use crate::types::{UserInfo, WalletAddress};

pub use retry::retry_with_backoff;
pub use signature::{RequestSigner, SIGNATURE_VERSION};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateOrganizationResponse {
    #[serde(rename = "organizationId")]
    organization_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateWalletResponse {
    #[serde(rename = "walletId")]
    wallet_id: String,
}

#[derive(Debug, Deserialize)]
struct WalletAddressesResponse {
    addresses: Vec<WalletAddress>,
}

/// Result of exchanging a caller-supplied JWT for a custody wallet
#[derive(Debug, Clone, Deserialize)]
pub struct JwtExchange {
    #[serde(rename = "walletId")]
    pub wallet_id: String,
    #[serde(rename = "userInfo", default)]
    pub user_info: UserInfo,
}

/// HTTP client for the wallet custody service.
///
/// Mutating endpoints are signed with the session's local API keypair; the
/// service verifies the signature against the public key registered at
/// organization creation.
#[derive(Debug, Clone)]
pub struct CustodyClient {
    http_client: Client,
    base_url: Url,
    organization_id: Option<String>,
    signer: Option<Arc<RequestSigner>>,
}

impl CustodyClient {
    /// Create a new client with default configuration
    pub fn new(base_url: Url) -> Result<Self> {
        Self::with_config(ClientConfig::default(), base_url)
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig, base_url: Url) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            organization_id: None,
            signer: None,
        })
    }

    /// Scope subsequent calls to an organization
    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// Sign subsequent mutating calls with the given keypair
    pub fn with_keypair(mut self, keypair: ApiKeypair) -> Self {
        self.signer = Some(Arc::new(RequestSigner::new(keypair)));
        self
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }

    fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    /// Build a POST with a JSON body and signing headers when a keypair is set
    fn signed_post(&self, endpoint: &str, body: &serde_json::Value) -> Result<RequestBuilder> {
        let mut builder = self.request(Method::POST, endpoint)?;

        if let Some(signer) = &self.signer {
            let request_id = signer.request_id();
            let timestamp = Utc::now().timestamp_millis() as u64;
            let payload = serde_json::to_string(body)?;
            let signature =
                signer.sign_request(SIGNATURE_VERSION, &request_id, timestamp, &payload);

            builder = builder
                .header("x-request-id", request_id)
                .header("x-request-timestamp", timestamp.to_string())
                .header("x-request-signature", signature)
                .header("x-request-key", signer.public_key_base58());
        }

        Ok(builder.json(body))
    }

    /// Send a request and decode a JSON response, mapping non-2xx statuses
    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or(1);
            return Err(ConnectError::RateLimit { retry_after });
        }

        if !status.is_success() {
            let message = Self::error_message(response).await;
            return Err(ConnectError::api_error(status, message));
        }

        Ok(response.json::<T>().await?)
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<serde_json::Value>().await {
            Ok(body) => body
                .get("message")
                .or_else(|| body.get("error"))
                .and_then(|value| value.as_str())
                .map(String::from)
                .unwrap_or_else(|| format!("HTTP {status}")),
            Err(_) => format!("HTTP {status}"),
        }
    }

    /// Create an organization scoped to a local API public key
    ///
    /// POST /v1/organizations
    pub async fn create_organization(&self, name: &str, public_key: &str) -> Result<String> {
        debug!(name, "creating custody organization");
        let body = serde_json::json!({
            "name": name,
            "publicKey": public_key,
        });

        let builder = self.signed_post("/v1/organizations", &body)?;
        let response: CreateOrganizationResponse = self.send_json(builder).await?;
        info!(organization_id = %response.organization_id, "organization created");
        Ok(response.organization_id)
    }

    /// Create a wallet inside the scoped organization
    ///
    /// POST /v1/wallets
    pub async fn create_wallet(&self, name: &str) -> Result<String> {
        let organization_id = self.organization_id.as_deref().ok_or_else(|| {
            ConnectError::Config("create_wallet requires an organization scope".to_string())
        })?;

        debug!(name, organization_id, "creating custody wallet");
        let body = serde_json::json!({
            "name": name,
            "organizationId": organization_id,
        });

        let builder = self.signed_post("/v1/wallets", &body)?;
        let response: CreateWalletResponse = self.send_json(builder).await?;
        info!(wallet_id = %response.wallet_id, "wallet created");
        Ok(response.wallet_id)
    }

    /// Fetch all addresses of a wallet
    ///
    /// GET /v1/wallets/{walletId}/addresses
    pub async fn get_wallet_addresses(&self, wallet_id: &str) -> Result<Vec<WalletAddress>> {
        let endpoint = format!("/v1/wallets/{wallet_id}/addresses");
        let builder = self.request(Method::GET, &endpoint)?;
        let response: WalletAddressesResponse = self.send_json(builder).await?;
        Ok(response.addresses)
    }

    /// Exchange a caller-supplied JWT for a custody wallet
    ///
    /// POST /v1/auth/jwt
    ///
    /// Non-2xx statuses map to the JWT error taxonomy rather than the generic
    /// API error, so callers can show a meaningful message per status.
    pub async fn exchange_jwt(
        &self,
        jwt_token: &str,
        organization_id: &str,
        parent_organization_id: &str,
    ) -> Result<JwtExchange> {
        let body = serde_json::json!({
            "organizationId": organization_id,
            "parentOrganizationId": parent_organization_id,
        });

        let builder = self
            .signed_post("/v1/auth/jwt", &body)?
            .bearer_auth(jwt_token);

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = Self::error_message(response).await;
            return Err(ConnectError::jwt_status_error(status, &message));
        }

        let exchange = response.json::<JwtExchange>().await?;
        if exchange.wallet_id.is_empty() {
            return Err(ConnectError::Jwt(
                "invalid exchange response: missing walletId".to_string(),
            ));
        }
        Ok(exchange)
    }
}
