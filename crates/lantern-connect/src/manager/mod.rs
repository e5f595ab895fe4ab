/*
[INPUT]:  SDK configuration, environment seams, caller intent
[OUTPUT]: One connect/disconnect/sign/event surface over both backends
[POS]:    Facade layer - owns and switches the backend instances
[UPDATE]: When backend selection, caching, or auto-connect order changes
*/

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::embedded::{EmbeddedConfig, EmbeddedWallet};
use crate::embedded::session::SessionStore;
use crate::env::{EphemeralStore, KeyValueStore, Navigator, UrlParams};
use crate::error::{ConnectError, Result};
use crate::events::{EventBus, EventKind, Subscription, WalletEvent};
use crate::injected::InjectedWallet;
use crate::registry::WalletRegistry;
use crate::types::{
    AddressType, AuthOptions, AuthProviderKind, ConnectOutcome, EmbeddedWalletType,
    ProviderSelection, ProviderType, WalletAddress,
};

/// Top-level SDK configuration, validated at construction
#[derive(Debug, Clone)]
pub struct SdkConfig {
    pub address_types: BTreeSet<AddressType>,
    pub default_provider: ProviderType,
    /// Present iff the application supplies what embedded flows require
    pub embedded: Option<EmbeddedConfig>,
}

impl SdkConfig {
    fn validate(&self) -> Result<()> {
        if self.address_types.is_empty() {
            return Err(ConnectError::Config(
                "at least one address type is required".to_string(),
            ));
        }
        if self.default_provider == ProviderType::Embedded && self.embedded.is_none() {
            return Err(ConnectError::Config(
                "embedded default provider requires embedded configuration".to_string(),
            ));
        }
        Ok(())
    }
}

/// Backend instance cache key
type ProviderKey = (ProviderType, Option<EmbeddedWalletType>);

/// A cached backend instance
#[derive(Clone)]
pub enum Backend {
    Injected(Arc<InjectedWallet>),
    Embedded(Arc<EmbeddedWallet>),
}

struct BackendEntry {
    backend: Backend,
    bus: EventBus,
}

/// The facade: at most one injected adapter and one embedded engine per
/// wallet type, cached by `(type, embedded_wallet_type)`, one active at a
/// time. Both are kept warm so auto-connect can try each without paying
/// construction latency mid-flow.
pub struct ProviderManager {
    config: SdkConfig,
    registry: WalletRegistry,
    storage: Arc<dyn KeyValueStore>,
    session_store: Arc<dyn SessionStore>,
    ephemeral: Arc<dyn EphemeralStore>,
    navigator: Arc<dyn Navigator>,
    url_params: UrlParams,
    events: EventBus,
    backends: RwLock<HashMap<ProviderKey, BackendEntry>>,
    // Forwarding wires installed at most once per backend instance.
    wired: RwLock<HashSet<ProviderKey>>,
    active: RwLock<ProviderKey>,
}

impl ProviderManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SdkConfig,
        registry: WalletRegistry,
        storage: Arc<dyn KeyValueStore>,
        session_store: Arc<dyn SessionStore>,
        ephemeral: Arc<dyn EphemeralStore>,
        navigator: Arc<dyn Navigator>,
        url_params: UrlParams,
    ) -> Result<Self> {
        config.validate()?;

        let default_key = match config.default_provider {
            ProviderType::Injected => (ProviderType::Injected, None),
            ProviderType::Embedded => {
                let wallet_type = config
                    .embedded
                    .as_ref()
                    .map(|embedded| embedded.wallet_type)
                    .ok_or_else(|| {
                        ConnectError::Config("embedded configuration missing".to_string())
                    })?;
                (ProviderType::Embedded, Some(wallet_type))
            }
        };

        let manager = Self {
            config,
            registry,
            storage,
            session_store,
            ephemeral,
            navigator,
            url_params,
            events: EventBus::new(),
            backends: RwLock::new(HashMap::new()),
            wired: RwLock::new(HashSet::new()),
            active: RwLock::new(default_key),
        };

        // Eagerly construct the injected adapter always, and the embedded
        // engine when configured, so auto-connect can try both.
        manager.ensure_backend((ProviderType::Injected, None))?;
        if let Some(embedded) = manager.config.embedded.clone() {
            manager.ensure_backend((ProviderType::Embedded, Some(embedded.wallet_type)))?;
        }
        manager.switch_to(default_key)?;
        Ok(manager)
    }

    /// Connect through the active backend. An `auth_options.provider` naming
    /// an embedded strategy retargets the facade to the embedded backend
    /// first, so a single call can move from injected to embedded.
    pub async fn connect(&self, auth_options: &AuthOptions) -> Result<ConnectOutcome> {
        if let Some(provider) = auth_options.provider {
            let wallet_type = match provider {
                AuthProviderKind::AppWallet => EmbeddedWalletType::AppWallet,
                _ => EmbeddedWalletType::UserWallet,
            };
            let target = (ProviderType::Embedded, Some(wallet_type));
            if *self.active.read().unwrap() != target {
                self.switch_provider(ProviderType::Embedded, Some(wallet_type))?;
            }
        }

        match self.active_backend()? {
            Backend::Injected(injected) => {
                let addresses = injected.connect(None).await?;
                Ok(ConnectOutcome::Completed {
                    wallet_id: None,
                    addresses,
                })
            }
            Backend::Embedded(embedded) => embedded.connect(auth_options).await,
        }
    }

    /// Activate a backend, constructing it on first use. Instances are
    /// cached; switching back and forth reuses them and never re-wires event
    /// forwarding.
    pub fn switch_provider(
        &self,
        provider_type: ProviderType,
        embedded_wallet_type: Option<EmbeddedWalletType>,
    ) -> Result<()> {
        let key = match provider_type {
            ProviderType::Injected => (ProviderType::Injected, None),
            ProviderType::Embedded => {
                let wallet_type = embedded_wallet_type
                    .or_else(|| self.config.embedded.as_ref().map(|e| e.wallet_type))
                    .ok_or_else(|| {
                        ConnectError::Config(
                            "embedded wallet type required to switch to embedded".to_string(),
                        )
                    })?;
                (ProviderType::Embedded, Some(wallet_type))
            }
        };
        self.switch_to(key)
    }

    fn switch_to(&self, key: ProviderKey) -> Result<()> {
        self.ensure_backend(key)?;
        self.wire_forwarding(key);
        *self.active.write().unwrap() = key;
        debug!(provider = ?key.0, wallet_type = ?key.1, "active backend switched");
        Ok(())
    }

    fn ensure_backend(&self, key: ProviderKey) -> Result<()> {
        if self.backends.read().unwrap().contains_key(&key) {
            return Ok(());
        }

        let bus = EventBus::new();
        let backend = match key {
            (ProviderType::Injected, _) => Backend::Injected(Arc::new(InjectedWallet::new(
                self.registry.clone(),
                self.config.address_types.clone(),
                self.storage.clone(),
                bus.clone(),
            ))),
            (ProviderType::Embedded, wallet_type) => {
                let mut embedded_config = self.config.embedded.clone().ok_or_else(|| {
                    ConnectError::Config(
                        "embedded flows require embedded configuration".to_string(),
                    )
                })?;
                if let Some(wallet_type) = wallet_type {
                    embedded_config.wallet_type = wallet_type;
                }
                Backend::Embedded(Arc::new(EmbeddedWallet::new(
                    embedded_config,
                    self.session_store.clone(),
                    self.ephemeral.clone(),
                    self.navigator.clone(),
                    self.url_params.clone(),
                    bus.clone(),
                )?))
            }
        };

        info!(provider = ?key.0, wallet_type = ?key.1, "backend constructed");
        self.backends
            .write()
            .unwrap()
            .insert(key, BackendEntry { backend, bus });
        Ok(())
    }

    /// Re-emit a backend's events into the stable listener registry; wired
    /// at most once per instance so repeated switching never double-delivers
    fn wire_forwarding(&self, key: ProviderKey) {
        {
            let mut wired = self.wired.write().unwrap();
            if !wired.insert(key) {
                return;
            }
        }

        let backends = self.backends.read().unwrap();
        let Some(entry) = backends.get(&key) else {
            return;
        };
        for kind in [
            EventKind::ConnectStart,
            EventKind::Connect,
            EventKind::ConnectError,
            EventKind::Disconnect,
        ] {
            let events = self.events.clone();
            entry.bus.on(kind, move |event| events.emit(event));
        }
    }

    fn active_backend(&self) -> Result<Backend> {
        let key = *self.active.read().unwrap();
        self.backend_for(key)
    }

    fn backend_for(&self, key: ProviderKey) -> Result<Backend> {
        self.backends
            .read()
            .unwrap()
            .get(&key)
            .map(|entry| entry.backend.clone())
            .ok_or_else(|| ConnectError::Config("backend not constructed".to_string()))
    }

    /// Silent reconnect: embedded first when constructed, then injected,
    /// restoring the previously active backend on each failure. Returns
    /// `false` when the URL is a failed auth callback; retrying a backend
    /// mid-failed-callback would be pointless.
    pub async fn auto_connect(&self) -> bool {
        if self.url_params.get("error").is_some() {
            debug!("auth-failure callback detected, skipping auto-connect");
            return false;
        }

        let previous = *self.active.read().unwrap();

        let embedded_key = self
            .backends
            .read()
            .unwrap()
            .keys()
            .find(|(provider_type, _)| *provider_type == ProviderType::Embedded)
            .copied();
        if let Some(key) = embedded_key {
            if let Ok(Backend::Embedded(embedded)) = self.backend_for(key) {
                *self.active.write().unwrap() = key;
                if embedded.auto_connect().await && embedded.is_connected() {
                    info!("auto-connected through embedded backend");
                    return true;
                }
                *self.active.write().unwrap() = previous;
            }
        }

        let injected_key = (ProviderType::Injected, None);
        if let Ok(Backend::Injected(injected)) = self.backend_for(injected_key) {
            *self.active.write().unwrap() = injected_key;
            if injected.auto_connect().await && injected.is_connected() {
                info!("auto-connected through injected backend");
                return true;
            }
            *self.active.write().unwrap() = previous;
        }

        false
    }

    pub async fn disconnect(&self) -> Result<()> {
        match self.active_backend()? {
            Backend::Injected(injected) => injected.disconnect().await,
            Backend::Embedded(embedded) => embedded.disconnect().await,
        }
    }

    pub async fn sign_message(&self, address_type: AddressType, message: &[u8]) -> Result<String> {
        match self.active_backend()? {
            Backend::Injected(injected) => injected.sign_message(address_type, message).await,
            Backend::Embedded(embedded) => embedded.sign_message(address_type, message).await,
        }
    }

    pub fn is_connected(&self) -> bool {
        match self.active_backend() {
            Ok(Backend::Injected(injected)) => injected.is_connected(),
            Ok(Backend::Embedded(embedded)) => embedded.is_connected(),
            Err(_) => false,
        }
    }

    pub fn get_addresses(&self) -> Vec<WalletAddress> {
        match self.active_backend() {
            Ok(Backend::Injected(injected)) => injected.get_addresses(),
            Ok(Backend::Embedded(embedded)) => embedded.get_addresses(),
            Err(_) => Vec::new(),
        }
    }

    pub fn get_current_provider_info(&self) -> ProviderSelection {
        let (provider_type, embedded_wallet_type) = *self.active.read().unwrap();
        ProviderSelection {
            provider_type,
            embedded_wallet_type,
        }
    }

    /// The currently active backend instance; reference-equal across
    /// repeated switches to the same key
    pub fn get_current_provider(&self) -> Option<Backend> {
        self.active_backend().ok()
    }

    /// Register a listener on the stable registry; survives backend switches
    pub fn on<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&WalletEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, callback)
    }

    pub fn off(&self, subscription: &Subscription) {
        self.events.off(subscription);
    }

    /// The wallet registry, for callers that browse discovered wallets
    pub fn registry(&self) -> &WalletRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{MemoryStore, RecordingNavigator};
    use crate::embedded::MemorySessionStore;
    use crate::registry::MockDiscoverer;
    use crate::types::EventSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    fn embedded_config() -> EmbeddedConfig {
        EmbeddedConfig {
            custody_base_url: Url::parse("http://127.0.0.1:1").unwrap(),
            auth_base_url: Url::parse("https://connect.lantern.dev/auth").unwrap(),
            redirect_url: None,
            app_id: "app-1".to_string(),
            wallet_type: EmbeddedWalletType::AppWallet,
            address_types: BTreeSet::from([AddressType::Solana]),
        }
    }

    fn manager_with(
        default_provider: ProviderType,
        embedded: Option<EmbeddedConfig>,
        url_params: UrlParams,
    ) -> ProviderManager {
        let config = SdkConfig {
            address_types: BTreeSet::from([AddressType::Solana, AddressType::Ethereum]),
            default_provider,
            embedded,
        };
        ProviderManager::new(
            config,
            WalletRegistry::new(Arc::new(MockDiscoverer::new(vec![]))),
            Arc::new(MemoryStore::new()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingNavigator::new()),
            url_params,
        )
        .unwrap()
    }

    #[test]
    fn test_config_validation() {
        let config = SdkConfig {
            address_types: BTreeSet::new(),
            default_provider: ProviderType::Injected,
            embedded: None,
        };
        assert!(config.validate().is_err());

        let config = SdkConfig {
            address_types: BTreeSet::from([AddressType::Solana]),
            default_provider: ProviderType::Embedded,
            embedded: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_switching_twice_reuses_instances() {
        let manager = manager_with(
            ProviderType::Injected,
            Some(embedded_config()),
            UrlParams::empty(),
        );

        let first_injected = match manager.get_current_provider().unwrap() {
            Backend::Injected(instance) => instance,
            _ => panic!("expected injected backend"),
        };

        manager
            .switch_provider(ProviderType::Embedded, Some(EmbeddedWalletType::AppWallet))
            .unwrap();
        assert_eq!(
            manager.get_current_provider_info().provider_type,
            ProviderType::Embedded
        );

        manager.switch_provider(ProviderType::Injected, None).unwrap();
        let second_injected = match manager.get_current_provider().unwrap() {
            Backend::Injected(instance) => instance,
            _ => panic!("expected injected backend"),
        };

        assert!(Arc::ptr_eq(&first_injected, &second_injected));
    }

    #[test]
    fn test_listeners_survive_backend_switches() {
        let manager = manager_with(
            ProviderType::Injected,
            Some(embedded_config()),
            UrlParams::empty(),
        );

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        // Listener attached while injected is active.
        manager.on(EventKind::ConnectStart, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        manager
            .switch_provider(ProviderType::Embedded, Some(EmbeddedWalletType::AppWallet))
            .unwrap();

        // An event emitted by the now-active embedded backend reaches the
        // stable registry.
        let backends = manager.backends.read().unwrap();
        let entry = backends
            .get(&(ProviderType::Embedded, Some(EmbeddedWalletType::AppWallet)))
            .unwrap();
        entry.bus.emit(&WalletEvent::ConnectStart {
            source: EventSource::ManualConnect,
        });
        drop(backends);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_forwarding_wired_once_per_instance() {
        let manager = manager_with(
            ProviderType::Injected,
            Some(embedded_config()),
            UrlParams::empty(),
        );

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        manager.on(EventKind::Disconnect, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Switch back and forth repeatedly.
        for _ in 0..3 {
            manager
                .switch_provider(ProviderType::Embedded, Some(EmbeddedWalletType::AppWallet))
                .unwrap();
            manager.switch_provider(ProviderType::Injected, None).unwrap();
        }

        let backends = manager.backends.read().unwrap();
        let entry = backends.get(&(ProviderType::Injected, None)).unwrap();
        entry.bus.emit(&WalletEvent::Disconnect {
            source: EventSource::ManualDisconnect,
        });
        drop(backends);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auto_connect_short_circuits_on_error_callback() {
        let params = UrlParams::from_url(
            Url::parse("https://app.example.com/cb?error=access_denied").unwrap(),
        );
        let manager = manager_with(ProviderType::Injected, Some(embedded_config()), params);
        assert!(!manager.auto_connect().await);
    }

    #[tokio::test]
    async fn test_auto_connect_restores_active_backend_on_failure() {
        let manager = manager_with(
            ProviderType::Injected,
            Some(embedded_config()),
            UrlParams::empty(),
        );
        // Neither backend has anything to reconnect to.
        assert!(!manager.auto_connect().await);
        assert_eq!(
            manager.get_current_provider_info().provider_type,
            ProviderType::Injected
        );
    }
}
