/*
[INPUT]:  Enum definitions and serde requirements
[OUTPUT]: Data models shared across discovery, connection, and auth layers
[POS]:    Data layer - struct definitions
[UPDATE]: When the connect surface or persisted shapes change
*/

use serde::{Deserialize, Serialize};
use url::Url;

use super::enums::{AddressType, AuthProviderKind, EmbeddedWalletType, ProviderType};

/// A single address on a specific chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAddress {
    #[serde(rename = "addressType")]
    pub address_type: AddressType,
    pub address: String,
}

/// Identity attributes attached to a session by its auth strategy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<AuthProviderKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Caller-supplied authentication options for `connect`
#[derive(Debug, Clone, Default)]
pub struct AuthOptions {
    /// Auth strategy to use; `None` defaults by wallet type
    pub provider: Option<AuthProviderKind>,
    /// Bearer token, required when `provider` is `Jwt`
    pub jwt_token: Option<String>,
}

/// Result of a connect attempt.
///
/// Redirect-based flows do not complete in-process: the navigation tears the
/// page down and the flow resumes on the next load. `Redirecting` is a normal
/// outcome, not an error; callers branch on it explicitly.
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    Completed {
        /// Custody wallet id; `None` for injected wallets
        wallet_id: Option<String>,
        addresses: Vec<WalletAddress>,
    },
    Redirecting {
        auth_url: Url,
    },
}

impl ConnectOutcome {
    /// Addresses of a completed connection, empty while redirecting
    pub fn addresses(&self) -> &[WalletAddress] {
        match self {
            ConnectOutcome::Completed { addresses, .. } => addresses,
            ConnectOutcome::Redirecting { .. } => &[],
        }
    }

    pub fn is_redirecting(&self) -> bool {
        matches!(self, ConnectOutcome::Redirecting { .. })
    }
}

/// Which backend (and embedded variant) is currently active in the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSelection {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(rename = "embeddedWalletType", skip_serializing_if = "Option::is_none")]
    pub embedded_wallet_type: Option<EmbeddedWalletType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_address_serde_round_trip() {
        let addr = WalletAddress {
            address_type: AddressType::Solana,
            address: "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".to_string(),
        };
        let json = serde_json::to_string(&addr).unwrap();
        assert!(json.contains("\"addressType\":\"solana\""));
        let back: WalletAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_outcome_addresses_accessor() {
        let outcome = ConnectOutcome::Redirecting {
            auth_url: Url::parse("https://connect.lantern.dev/auth").unwrap(),
        };
        assert!(outcome.is_redirecting());
        assert!(outcome.addresses().is_empty());
    }
}
