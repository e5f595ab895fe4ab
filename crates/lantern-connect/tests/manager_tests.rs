/*
[INPUT]:  Mock custody responses, mock discovery, scripted environments
[OUTPUT]: Test results for the provider-manager facade
[POS]:    Integration tests - backend selection and silent reconnect
[UPDATE]: When retargeting rules or the auto-connect order change
*/

mod common;

use std::sync::Arc;

use common::{
    both_address_types, embedded_config, mount_addresses, mount_provisioning, setup_mock_server,
    TestEnv,
};
use tokio_test::assert_ok;
use wiremock::MockServer;

use lantern_connect::embedded::{Session, SessionStore};
use lantern_connect::env::KeyValueStore;
use lantern_connect::registry::MockDiscoverer;
use lantern_connect::types::{
    AddressType, AuthOptions, AuthProviderKind, ConnectOutcome, DiscoverySource,
    EmbeddedWalletType, ProviderType, SessionStatus,
};
use lantern_connect::{
    ApiKeypair, ChainProvider, MockChainProvider, ProviderManager, SdkConfig, UrlParams,
    WalletDescriptor, WalletRegistry,
};

fn injected_wallet(id: &str, address: &str) -> WalletDescriptor {
    let provider = Arc::new(MockChainProvider::new(AddressType::Solana, vec![address]));
    WalletDescriptor::new(id, id, DiscoverySource::StandardRegistry)
        .with_chain(provider as Arc<dyn ChainProvider>)
}

fn manager(
    server: &MockServer,
    env: &TestEnv,
    default_provider: ProviderType,
    wallets: Vec<WalletDescriptor>,
    url_params: UrlParams,
) -> ProviderManager {
    let config = SdkConfig {
        address_types: both_address_types(),
        default_provider,
        embedded: Some(embedded_config(server, EmbeddedWalletType::UserWallet)),
    };
    ProviderManager::new(
        config,
        WalletRegistry::new(Arc::new(MockDiscoverer::new(wallets))),
        env.storage.clone(),
        env.session_store.clone(),
        env.ephemeral.clone(),
        env.navigator.clone(),
        url_params,
    )
    .unwrap()
}

fn completed_session(wallet_id: &str) -> Session {
    let mut session = Session::new(
        "org-mgr",
        ApiKeypair::generate(),
        AuthProviderKind::Connect,
        SessionStatus::Completed,
    );
    session.wallet_id = Some(wallet_id.to_string());
    session
}

#[tokio::test]
async fn test_connect_with_auth_provider_retargets_to_embedded() {
    let server = setup_mock_server().await;
    mount_provisioning(&server, "org-rt", "unused").await;

    let env = TestEnv::new();
    let manager = manager(
        &server,
        &env,
        ProviderType::Injected,
        vec![],
        UrlParams::empty(),
    );
    assert_eq!(
        manager.get_current_provider_info().provider_type,
        ProviderType::Injected
    );

    // Naming an embedded auth strategy moves the facade off the injected
    // backend in the same call.
    let outcome = manager
        .connect(&AuthOptions {
            provider: Some(AuthProviderKind::Google),
            jwt_token: None,
        })
        .await
        .unwrap();

    assert!(outcome.is_redirecting());
    let info = manager.get_current_provider_info();
    assert_eq!(info.provider_type, ProviderType::Embedded);
    assert_eq!(info.embedded_wallet_type, Some(EmbeddedWalletType::UserWallet));
    assert!(env.navigator.last_url().is_some());
}

#[tokio::test]
async fn test_auto_connect_prefers_embedded_session() {
    let server = setup_mock_server().await;
    mount_addresses(&server).await;

    let env = TestEnv::new();
    env.session_store
        .save_session(&completed_session("w-mgr"))
        .await
        .unwrap();
    // An injected reconnect is also possible; embedded must win.
    env.storage
        .set("lantern.injected.was_connected", "true")
        .unwrap();
    env.storage
        .set("lantern.injected.last_wallet_id", "glow")
        .unwrap();

    let manager = manager(
        &server,
        &env,
        ProviderType::Injected,
        vec![injected_wallet("glow", "So1glow")],
        UrlParams::empty(),
    );

    assert!(manager.auto_connect().await);
    assert_eq!(
        manager.get_current_provider_info().provider_type,
        ProviderType::Embedded
    );
    assert!(manager.is_connected());
    assert_eq!(manager.get_addresses().len(), 2);
}

#[tokio::test]
async fn test_auto_connect_falls_through_to_injected() {
    let server = setup_mock_server().await;

    let env = TestEnv::new();
    // No embedded session; only the injected reconnect flag is set.
    env.storage
        .set("lantern.injected.was_connected", "true")
        .unwrap();
    env.storage
        .set("lantern.injected.last_wallet_id", "glow")
        .unwrap();

    let manager = manager(
        &server,
        &env,
        ProviderType::Embedded,
        vec![injected_wallet("glow", "So1glow")],
        UrlParams::empty(),
    );

    assert!(manager.auto_connect().await);
    assert_eq!(
        manager.get_current_provider_info().provider_type,
        ProviderType::Injected
    );
    let addresses = manager.get_addresses();
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].address, "So1glow");
}

#[tokio::test]
async fn test_auto_connect_with_nothing_restores_default() {
    let server = setup_mock_server().await;
    let env = TestEnv::new();
    let manager = manager(
        &server,
        &env,
        ProviderType::Embedded,
        vec![],
        UrlParams::empty(),
    );

    assert!(!manager.auto_connect().await);
    assert_eq!(
        manager.get_current_provider_info().provider_type,
        ProviderType::Embedded
    );
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_disconnect_clears_embedded_session() {
    let server = setup_mock_server().await;
    mount_addresses(&server).await;

    let env = TestEnv::new();
    env.session_store
        .save_session(&completed_session("w-dc"))
        .await
        .unwrap();

    let manager = manager(
        &server,
        &env,
        ProviderType::Embedded,
        vec![],
        UrlParams::empty(),
    );
    let outcome = manager.connect(&AuthOptions::default()).await.unwrap();
    assert!(matches!(outcome, ConnectOutcome::Completed { .. }));

    tokio_test::assert_ok!(manager.disconnect().await);
    assert!(!manager.is_connected());
    assert!(env.session_store.get_session().await.unwrap().is_none());
}
