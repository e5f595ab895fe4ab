/*
[INPUT]:  Discovery results and per-wallet connection state updates
[OUTPUT]: Catalog of wallet descriptors with wrapped chain providers
[POS]:    Registry layer - source of truth for known wallets
[UPDATE]: When registration, dedup, or connection-state semantics change
*/

pub mod wrappers;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::discovery::{DiscoveryService, WalletDescriptor};
use crate::error::{ConnectError, Result};
use crate::types::{AddressType, DiscoverySource, WalletAddress};

pub use wrappers::{InstrumentedProvider, StandardChainAdapter};

/// Per-wallet connection state; never persisted
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub connected: bool,
    pub addresses: Vec<WalletAddress>,
}

/// Source of discovery results for the registry. `DiscoveryService` is the
/// production implementation; tests substitute counting mocks.
#[async_trait::async_trait]
pub trait Discoverer: Send + Sync {
    async fn discover(&self, requested: &BTreeSet<AddressType>) -> Result<Vec<WalletDescriptor>>;
}

#[async_trait::async_trait]
impl Discoverer for crate::discovery::DiscoveryService {
    async fn discover(&self, requested: &BTreeSet<AddressType>) -> Result<Vec<WalletDescriptor>> {
        Ok(DiscoveryService::discover(self, requested).await)
    }
}

struct Entry {
    descriptor: WalletDescriptor,
    state: ConnectionState,
}

#[derive(Default)]
struct WalletMap {
    // Insertion order is discovery order; first discovered is the default.
    order: Vec<String>,
    entries: HashMap<String, Entry>,
}

type SharedDiscovery =
    Shared<BoxFuture<'static, std::result::Result<Vec<WalletDescriptor>, Arc<ConnectError>>>>;

struct RegistryInner {
    discoverer: Arc<dyn Discoverer>,
    wallets: RwLock<WalletMap>,
    in_flight: Mutex<Option<SharedDiscovery>>,
}

/// Explicitly constructed wallet catalog; owned by the provider manager (or
/// the embedding application) and passed down by reference, never a global.
#[derive(Clone)]
pub struct WalletRegistry {
    inner: Arc<RegistryInner>,
}

impl WalletRegistry {
    pub fn new(discoverer: Arc<dyn Discoverer>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                discoverer,
                wallets: RwLock::new(WalletMap::default()),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Register a descriptor, wrapping each chain provider per its discovery
    /// source. Re-registering an id replaces the descriptor in place; its
    /// recorded connection state survives, since rediscovery must not appear
    /// as a disconnect.
    pub fn register(&self, descriptor: WalletDescriptor) {
        let wrapped = Self::wrap_providers(descriptor);
        let mut map = self.inner.wallets.write().unwrap();
        let id = wrapped.id.clone();
        match map.entries.get_mut(&id) {
            Some(entry) => {
                debug!(wallet_id = %id, "replacing registered wallet");
                entry.descriptor = wrapped;
            }
            None => {
                debug!(wallet_id = %id, source = ?wrapped.source, "registering wallet");
                map.order.push(id.clone());
                map.entries.insert(
                    id,
                    Entry {
                        descriptor: wrapped,
                        state: ConnectionState::default(),
                    },
                );
            }
        }
    }

    fn wrap_providers(mut descriptor: WalletDescriptor) -> WalletDescriptor {
        let wallet_id = descriptor.id.clone();
        descriptor.chain_providers = descriptor
            .chain_providers
            .into_iter()
            .map(|(address_type, provider)| {
                let wrapped: Arc<dyn crate::chain::ChainProvider> = match descriptor.source {
                    DiscoverySource::StandardRegistry => {
                        Arc::new(StandardChainAdapter::new(&wallet_id, provider))
                    }
                    _ => Arc::new(InstrumentedProvider::new(&wallet_id, provider)),
                };
                (address_type, wrapped)
            })
            .collect();
        descriptor
    }

    /// Run discovery and register every wallet serving the requested address
    /// types. Concurrent callers share one in-flight operation; the probes
    /// run exactly once no matter how many callers await it.
    pub async fn discover(
        &self,
        requested: &BTreeSet<AddressType>,
    ) -> Result<Vec<WalletDescriptor>> {
        let shared = {
            let mut guard = self.inner.in_flight.lock().await;
            match guard.as_ref() {
                Some(shared) => {
                    debug!("joining in-flight discovery");
                    shared.clone()
                }
                None => {
                    let registry = self.clone();
                    let requested = requested.clone();
                    let future = async move {
                        let result = async {
                            let descriptors = registry
                                .inner
                                .discoverer
                                .discover(&requested)
                                .await
                                .map_err(Arc::new)?;
                            for descriptor in &descriptors {
                                if descriptor.supports_any(&requested) {
                                    registry.register(descriptor.clone());
                                }
                            }
                            Ok(descriptors)
                        }
                        .await;
                        // The probe clears its own marker before resolving.
                        // Memoization covers in-flight callers only, and an
                        // awaiter resuming late can never wipe a newer probe
                        // that was installed in the meantime.
                        *registry.inner.in_flight.lock().await = None;
                        result
                    }
                    .boxed()
                    .shared();
                    *guard = Some(future.clone());
                    future
                }
            }
        };

        match shared.await {
            Ok(descriptors) => Ok(descriptors
                .into_iter()
                .filter(|d| d.supports_any(requested))
                .collect()),
            Err(err) => {
                warn!(error = %err, "discovery failed");
                Err(ConnectError::Connection(format!("discovery failed: {err}")))
            }
        }
    }

    pub fn get_by_id(&self, wallet_id: &str) -> Option<WalletDescriptor> {
        let map = self.inner.wallets.read().unwrap();
        map.entries
            .get(wallet_id)
            .map(|entry| entry.descriptor.clone())
    }

    /// All registered wallets in discovery order
    pub fn get_all(&self) -> Vec<WalletDescriptor> {
        let map = self.inner.wallets.read().unwrap();
        map.order
            .iter()
            .filter_map(|id| map.entries.get(id))
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Wallets whose address types intersect the filter; an empty filter
    /// returns everything
    pub fn get_by_address_types(&self, requested: &BTreeSet<AddressType>) -> Vec<WalletDescriptor> {
        self.get_all()
            .into_iter()
            .filter(|d| d.supports_any(requested))
            .collect()
    }

    pub fn has(&self, wallet_id: &str) -> bool {
        self.inner
            .wallets
            .read()
            .unwrap()
            .entries
            .contains_key(wallet_id)
    }

    pub fn is_wallet_connected(&self, wallet_id: &str) -> bool {
        let map = self.inner.wallets.read().unwrap();
        map.entries
            .get(wallet_id)
            .map(|entry| entry.state.connected)
            .unwrap_or(false)
    }

    pub fn get_wallet_addresses(&self, wallet_id: &str) -> Vec<WalletAddress> {
        let map = self.inner.wallets.read().unwrap();
        map.entries
            .get(wallet_id)
            .map(|entry| entry.state.addresses.clone())
            .unwrap_or_default()
    }

    /// No-op for unknown ids; event callbacks may race with unregistration
    pub fn set_wallet_connected(&self, wallet_id: &str, connected: bool) {
        let mut map = self.inner.wallets.write().unwrap();
        if let Some(entry) = map.entries.get_mut(wallet_id) {
            entry.state.connected = connected;
            if !connected {
                entry.state.addresses.clear();
            }
        }
    }

    /// No-op for unknown ids
    pub fn set_wallet_addresses(&self, wallet_id: &str, addresses: Vec<WalletAddress>) {
        let mut map = self.inner.wallets.write().unwrap();
        if let Some(entry) = map.entries.get_mut(wallet_id) {
            entry.state.addresses = addresses;
        }
    }
}

/// Counting discoverer for tests; serves a fixed list after an optional delay
pub struct MockDiscoverer {
    descriptors: RwLock<Vec<WalletDescriptor>>,
    delay: std::time::Duration,
    fail: std::sync::atomic::AtomicBool,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockDiscoverer {
    pub fn new(descriptors: Vec<WalletDescriptor>) -> Self {
        Self {
            descriptors: RwLock::new(descriptors),
            delay: std::time::Duration::from_millis(50),
            fail: std::sync::atomic::AtomicBool::new(false),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn set_descriptors(&self, descriptors: Vec<WalletDescriptor>) {
        *self.descriptors.write().unwrap() = descriptors;
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Discoverer for MockDiscoverer {
    async fn discover(&self, _requested: &BTreeSet<AddressType>) -> Result<Vec<WalletDescriptor>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ConnectError::Connection("probe exploded".to_string()));
        }
        Ok(self.descriptors.read().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainProvider;

    fn descriptor(id: &str, address_type: AddressType) -> WalletDescriptor {
        WalletDescriptor::new(id, id, DiscoverySource::Eip6963).with_chain(Arc::new(
            MockChainProvider::new(address_type, vec!["addr1"]),
        ))
    }

    fn all_types() -> BTreeSet<AddressType> {
        BTreeSet::from([AddressType::Solana, AddressType::Ethereum])
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_discover_probes_once() {
        let discoverer = Arc::new(MockDiscoverer::new(vec![descriptor(
            "glow",
            AddressType::Solana,
        )]));
        let registry = WalletRegistry::new(discoverer.clone());

        let types = all_types();
        let (a, b, c) = tokio::join!(
            registry.discover(&types),
            registry.discover(&types),
            registry.discover(&types),
        );

        assert_eq!(a.unwrap().len(), 1);
        assert_eq!(b.unwrap().len(), 1);
        assert_eq!(c.unwrap().len(), 1);
        assert_eq!(discoverer.calls(), 1);
        assert!(registry.has("glow"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_awaiter_cannot_split_newer_probe() {
        let discoverer = Arc::new(MockDiscoverer::new(vec![descriptor(
            "glow",
            AddressType::Solana,
        )]));
        let registry = WalletRegistry::new(discoverer.clone());
        let types = all_types();

        let spawn_discover = || {
            let registry = registry.clone();
            let types = types.clone();
            tokio::spawn(async move { registry.discover(&types).await })
        };

        // First generation: an owner plus a parked joiner.
        let j1 = spawn_discover();
        let j2 = spawn_discover();
        tokio::task::yield_now().await;

        // Fire the first probe, then start two more callers while the first
        // generation's awaiters are still resuming. However the resumptions
        // interleave with the new arrivals, the late callers share at most
        // one follow-up probe; a stale awaiter clearing the in-flight marker
        // underneath them would split it in two.
        tokio::time::advance(std::time::Duration::from_millis(50)).await;
        let j3 = spawn_discover();
        tokio::task::yield_now().await;
        let j4 = spawn_discover();

        for handle in [j1, j2, j3, j4] {
            assert_eq!(handle.await.unwrap().unwrap().len(), 1);
        }
        assert!(discoverer.calls() <= 2, "calls = {}", discoverer.calls());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_failure_clears_marker_for_retry() {
        let discoverer = Arc::new(MockDiscoverer::new(vec![descriptor(
            "glow",
            AddressType::Solana,
        )]));
        discoverer.set_fail(true);
        let registry = WalletRegistry::new(discoverer.clone());

        assert!(registry.discover(&all_types()).await.is_err());

        discoverer.set_fail(false);
        let wallets = registry.discover(&all_types()).await.unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(discoverer.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_registers_only_matching_types() {
        let discoverer = Arc::new(MockDiscoverer::new(vec![
            descriptor("sol-wallet", AddressType::Solana),
            descriptor("eth-wallet", AddressType::Ethereum),
        ]));
        let registry = WalletRegistry::new(discoverer);

        let solana_only = BTreeSet::from([AddressType::Solana]);
        let wallets = registry.discover(&solana_only).await.unwrap();

        assert_eq!(wallets.len(), 1);
        assert!(registry.has("sol-wallet"));
        assert!(!registry.has("eth-wallet"));
    }

    #[tokio::test]
    async fn test_connection_state_round_trip_and_unknown_id_noop() {
        let registry = WalletRegistry::new(Arc::new(MockDiscoverer::new(vec![])));
        registry.register(descriptor("glow", AddressType::Solana));

        assert!(!registry.is_wallet_connected("glow"));
        registry.set_wallet_connected("glow", true);
        registry.set_wallet_addresses(
            "glow",
            vec![WalletAddress {
                address_type: AddressType::Solana,
                address: "addr1".to_string(),
            }],
        );
        assert!(registry.is_wallet_connected("glow"));
        assert_eq!(registry.get_wallet_addresses("glow").len(), 1);

        // Unknown ids are ignored, not invented.
        registry.set_wallet_connected("ghost", true);
        assert!(!registry.has("ghost"));
        assert!(!registry.is_wallet_connected("ghost"));

        // Disconnect clears recorded addresses.
        registry.set_wallet_connected("glow", false);
        assert!(registry.get_wallet_addresses("glow").is_empty());
    }

    #[tokio::test]
    async fn test_reregister_replaces_but_keeps_order_and_state() {
        let registry = WalletRegistry::new(Arc::new(MockDiscoverer::new(vec![])));
        registry.register(descriptor("first", AddressType::Solana));
        registry.register(descriptor("second", AddressType::Ethereum));
        registry.set_wallet_connected("first", true);

        registry.register(descriptor("first", AddressType::Solana));

        let all = registry.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "first");
        assert!(registry.is_wallet_connected("first"));
    }
}
