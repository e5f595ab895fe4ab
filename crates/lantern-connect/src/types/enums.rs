/*
[INPUT]:  Wire and storage schema definitions and serde requirements
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - enumerated type definitions
[UPDATE]: When supported chains, providers, or statuses change
*/

use serde::{Deserialize, Serialize};

/// Chain kind a wallet can hold addresses for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Solana,
    Ethereum,
}

/// Which backend a connection goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Injected,
    Embedded,
}

/// Variant of the embedded (custody-backed) wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddedWalletType {
    #[serde(rename = "app-wallet")]
    AppWallet,
    #[serde(rename = "user-wallet")]
    UserWallet,
}

/// Authentication strategy that produced (or will produce) a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProviderKind {
    /// Default redirect-based flow through the vendor's Connect page
    Connect,
    Google,
    Apple,
    Jwt,
    /// Direct app-wallet creation, no user interaction
    #[serde(rename = "app-wallet")]
    AppWallet,
}

impl AuthProviderKind {
    /// Whether this strategy completes through a browser redirect round-trip
    pub fn is_redirect(&self) -> bool {
        matches!(
            self,
            AuthProviderKind::Connect | AuthProviderKind::Google | AuthProviderKind::Apple
        )
    }
}

/// Which announcement protocol produced a wallet descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoverySource {
    #[serde(rename = "standard-registry")]
    StandardRegistry,
    #[serde(rename = "eip6963")]
    Eip6963,
    #[serde(rename = "built-in")]
    BuiltIn,
}

/// Lifecycle status of a persisted embedded session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Completed,
    Failed,
}

/// What triggered a wallet event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    #[serde(rename = "manual-connect")]
    ManualConnect,
    #[serde(rename = "auto-connect")]
    AutoConnect,
    /// Ambient event originating from the wallet itself
    #[serde(rename = "wallet")]
    Wallet,
    #[serde(rename = "account-change")]
    AccountChange,
    #[serde(rename = "manual-disconnect")]
    ManualDisconnect,
}

/// Error categories an identity provider can send back on the callback URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthCallbackCode {
    AccessDenied,
    InvalidRequest,
    ServerError,
    TemporarilyUnavailable,
    Other,
}

impl AuthCallbackCode {
    /// Map the raw `error` query parameter to a category
    pub fn from_param(raw: &str) -> Self {
        match raw {
            "access_denied" => AuthCallbackCode::AccessDenied,
            "invalid_request" => AuthCallbackCode::InvalidRequest,
            "server_error" => AuthCallbackCode::ServerError,
            "temporarily_unavailable" => AuthCallbackCode::TemporarilyUnavailable,
            _ => AuthCallbackCode::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_type_serde() {
        let json = serde_json::to_string(&AddressType::Solana).unwrap();
        assert_eq!(json, "\"solana\"");
        let back: AddressType = serde_json::from_str("\"ethereum\"").unwrap();
        assert_eq!(back, AddressType::Ethereum);
    }

    #[test]
    fn test_embedded_wallet_type_serde() {
        let json = serde_json::to_string(&EmbeddedWalletType::UserWallet).unwrap();
        assert_eq!(json, "\"user-wallet\"");
    }

    #[test]
    fn test_auth_provider_redirect_classification() {
        assert!(AuthProviderKind::Connect.is_redirect());
        assert!(AuthProviderKind::Google.is_redirect());
        assert!(AuthProviderKind::Apple.is_redirect());
        assert!(!AuthProviderKind::Jwt.is_redirect());
        assert!(!AuthProviderKind::AppWallet.is_redirect());
    }

    #[test]
    fn test_callback_code_mapping() {
        assert_eq!(
            AuthCallbackCode::from_param("access_denied"),
            AuthCallbackCode::AccessDenied
        );
        assert_eq!(
            AuthCallbackCode::from_param("something_else"),
            AuthCallbackCode::Other
        );
    }
}
