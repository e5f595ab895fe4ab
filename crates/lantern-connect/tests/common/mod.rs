/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for lantern-connect tests

use std::collections::BTreeSet;
use std::sync::Arc;

use url::Url;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lantern_connect::embedded::EmbeddedConfig;
use lantern_connect::types::{AddressType, EmbeddedWalletType};
use lantern_connect::{MemorySessionStore, MemoryStore, RecordingNavigator};

/// Setup a mock custody server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Mock JWT token for testing
#[allow(dead_code)]
pub fn mock_jwt_token() -> String {
    "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.test.signature".to_string()
}

pub fn both_address_types() -> BTreeSet<AddressType> {
    BTreeSet::from([AddressType::Solana, AddressType::Ethereum])
}

/// Embedded configuration pointed at a mock custody server
pub fn embedded_config(server: &MockServer, wallet_type: EmbeddedWalletType) -> EmbeddedConfig {
    EmbeddedConfig {
        custody_base_url: Url::parse(&server.uri()).unwrap(),
        auth_base_url: Url::parse("https://connect.lantern.dev/auth").unwrap(),
        redirect_url: Some(Url::parse("https://app.example.com/cb").unwrap()),
        app_id: "app-test".to_string(),
        wallet_type,
        address_types: both_address_types(),
    }
}

/// The full environment an embedded engine needs, shared across engines in a
/// test so redirect round-trips can span two engine instances.
pub struct TestEnv {
    pub session_store: Arc<MemorySessionStore>,
    #[allow(dead_code)]
    pub storage: Arc<MemoryStore>,
    pub ephemeral: Arc<MemoryStore>,
    pub navigator: Arc<RecordingNavigator>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            session_store: Arc::new(MemorySessionStore::new()),
            storage: Arc::new(MemoryStore::new()),
            ephemeral: Arc::new(MemoryStore::new()),
            navigator: Arc::new(RecordingNavigator::new()),
        }
    }
}

/// Mount the provisioning endpoints: organization and wallet creation
#[allow(dead_code)]
pub async fn mount_provisioning(server: &MockServer, organization_id: &str, wallet_id: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "organizationId": organization_id,
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/wallets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "walletId": wallet_id,
        })))
        .mount(server)
        .await;
}

/// Mount the address listing endpoint for any wallet id
#[allow(dead_code)]
pub async fn mount_addresses(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/wallets/[^/]+/addresses$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "addresses": [
                { "addressType": "solana", "address": "So1TestAddr" },
                { "addressType": "ethereum", "address": "0xTestAddr" },
            ],
        })))
        .mount(server)
        .await;
}
