/*
[INPUT]:  Announce-protocol events, pull-registry snapshots, built-in probe
[OUTPUT]: Deduplicated WalletDescriptor list within a fixed time budget
[POS]:    Discovery layer - finds injected wallets in the host environment
[UPDATE]: When probe protocols, budgets, or the merge heuristic change
*/

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::chain::ChainProvider;
use crate::error::Result;
use crate::types::{AddressType, DiscoverySource};

/// Fixed id the vendor's built-in wallet registers under
pub const BUILTIN_WALLET_ID: &str = "lantern";

/// Wall-clock budget shared by both probes
const DISCOVERY_WINDOW: Duration = Duration::from_millis(400);
/// Delay before the catalog probe's first poll
const CATALOG_INITIAL_DELAY: Duration = Duration::from_millis(100);
/// Spacing between catalog polls
const CATALOG_POLL_STEP: Duration = Duration::from_millis(100);
const CATALOG_POLL_ATTEMPTS: usize = 5;

/// Polling step while waiting for the built-in wallet to appear
const BUILTIN_POLL_STEP: Duration = Duration::from_millis(100);

/// Words carrying no identity in a wallet's display name
const GENERIC_NAME_WORDS: [&str; 4] = ["wallet", "extension", "app", "browser"];

/// One discovered injected wallet. Identity is immutable once registered; a
/// rediscovered wallet replaces the stored entry rather than mutating it.
#[derive(Clone)]
pub struct WalletDescriptor {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub address_types: BTreeSet<AddressType>,
    pub chain_providers: HashMap<AddressType, Arc<dyn ChainProvider>>,
    pub source: DiscoverySource,
}

impl fmt::Debug for WalletDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address_types", &self.address_types)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl WalletDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, source: DiscoverySource) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: None,
            address_types: BTreeSet::new(),
            chain_providers: HashMap::new(),
            source,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Attach a chain provider; its address type is added to the set
    pub fn with_chain(mut self, provider: Arc<dyn ChainProvider>) -> Self {
        let address_type = provider.address_type();
        self.address_types.insert(address_type);
        self.chain_providers.insert(address_type, provider);
        self
    }

    /// Whether this wallet serves any of the requested address types.
    /// An empty request matches everything.
    pub fn supports_any(&self, requested: &BTreeSet<AddressType>) -> bool {
        requested.is_empty() || self.address_types.iter().any(|t| requested.contains(t))
    }
}

/// One announcement received over the broadcast/announce protocol
#[derive(Clone)]
pub struct AnnouncedProvider {
    /// Stable reverse-domain identifier, e.g. `dev.lantern.app`
    pub rdns: String,
    pub name: String,
    pub icon: Option<String>,
    pub chain_providers: HashMap<AddressType, Arc<dyn ChainProvider>>,
}

impl fmt::Debug for AnnouncedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnouncedProvider")
            .field("rdns", &self.rdns)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One entry read out of the pull-registry catalog
#[derive(Clone)]
pub struct CatalogWallet {
    pub name: String,
    pub icon: Option<String>,
    pub chain_providers: HashMap<AddressType, Arc<dyn ChainProvider>>,
}

/// Broadcast/announce probe seam: dispatches the request signal and collects
/// announcements arriving within the window.
#[async_trait]
pub trait ProviderAnnouncer: Send + Sync {
    async fn request_providers(&self, window: Duration) -> Result<Vec<AnnouncedProvider>>;
}

/// Pull-registry probe seam: snapshots the shared wallet catalog. Wallets may
/// register late, so the snapshot can be empty on early polls.
#[async_trait]
pub trait WalletCatalog: Send + Sync {
    async fn get_wallets(&self) -> Result<Vec<CatalogWallet>>;
}

/// Synchronous presence check for the vendor's built-in wallet.
pub trait BuiltinProbe: Send + Sync {
    fn builtin_wallet(&self) -> Option<WalletDescriptor>;
}

/// Normalize a display name to its identity-bearing core: lowercase, strip
/// generic words, drop non-alphanumerics.
pub(crate) fn core_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut core = String::new();
    for token in lowered.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() || GENERIC_NAME_WORDS.contains(&token) {
            continue;
        }
        core.push_str(token);
    }
    core
}

/// Best-effort identity match between two display names: equal cores, or one
/// core contained in the other. Cores shorter than 3 characters never match
/// by containment, so stripped-to-nothing generic names cannot over-merge.
pub(crate) fn names_match(a: &str, b: &str) -> bool {
    let core_a = core_name(a);
    let core_b = core_name(b);
    if core_a.is_empty() || core_b.is_empty() {
        return false;
    }
    if core_a == core_b {
        return true;
    }
    let (short, long) = if core_a.len() <= core_b.len() {
        (&core_a, &core_b)
    } else {
        (&core_b, &core_a)
    };
    short.len() >= 3 && long.contains(short.as_str())
}

/// Derive a stable id for an announced provider. The normalized display name
/// is preferred when the reverse-domain identifier corroborates it, so the
/// same wallet found over either protocol lands on one id; otherwise the
/// reverse-domain string itself is the id.
fn derive_announce_id(rdns: &str, name: &str) -> String {
    let core = core_name(name);
    if core.len() >= 3 && core_name(rdns).contains(&core) {
        core
    } else {
        rdns.to_lowercase()
    }
}

/// Runs the two discovery probes concurrently under one wall-clock budget and
/// merges their output with the built-in wallet.
pub struct DiscoveryService {
    announcer: Option<Arc<dyn ProviderAnnouncer>>,
    catalog: Option<Arc<dyn WalletCatalog>>,
    builtin: Option<Arc<dyn BuiltinProbe>>,
}

impl DiscoveryService {
    pub fn new(
        announcer: Option<Arc<dyn ProviderAnnouncer>>,
        catalog: Option<Arc<dyn WalletCatalog>>,
        builtin: Option<Arc<dyn BuiltinProbe>>,
    ) -> Self {
        Self {
            announcer,
            catalog,
            builtin,
        }
    }

    /// Probe the environment and return deduplicated descriptors.
    ///
    /// The built-in wallet, when present, is always first and is excluded
    /// from both probes' output. Probe failure contributes zero wallets and
    /// is never fatal.
    pub async fn discover(&self, requested: &BTreeSet<AddressType>) -> Vec<WalletDescriptor> {
        let started = Instant::now();
        let mut results: Vec<WalletDescriptor> = Vec::new();

        let builtin = self.builtin.as_ref().and_then(|probe| probe.builtin_wallet());
        if let Some(descriptor) = &builtin {
            debug!(id = %descriptor.id, "built-in wallet present");
            results.push(descriptor.clone());
        }

        let (announced, catalog) =
            tokio::join!(self.announce_probe(), self.catalog_probe(started));

        for provider in announced {
            let descriptor = Self::descriptor_from_announcement(provider);
            Self::merge_into(&mut results, descriptor, builtin.as_ref());
        }
        for wallet in catalog {
            let descriptor = Self::descriptor_from_catalog(wallet);
            Self::merge_into(&mut results, descriptor, builtin.as_ref());
        }

        results.retain(|descriptor| descriptor.supports_any(requested));
        debug!(
            wallets = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "discovery complete"
        );
        results
    }

    /// Poll the built-in probe until the wallet appears or the caller's
    /// deadline passes.
    pub async fn wait_for_builtin(&self, timeout: Duration) -> Option<WalletDescriptor> {
        let probe = self.builtin.as_ref()?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(descriptor) = probe.builtin_wallet() {
                return Some(descriptor);
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(BUILTIN_POLL_STEP).await;
        }
    }

    async fn announce_probe(&self) -> Vec<AnnouncedProvider> {
        let Some(announcer) = &self.announcer else {
            return Vec::new();
        };
        // The announcer owns the listening window; it resolves when the
        // window closes.
        match announcer.request_providers(DISCOVERY_WINDOW).await {
            Ok(providers) => providers,
            Err(err) => {
                warn!(error = %err, "announce probe failed, contributing zero wallets");
                Vec::new()
            }
        }
    }

    /// Catalog probe: short initial delay, bounded polling until the catalog
    /// is non-empty, then topped up to the shared window floor so both probes
    /// complete together.
    async fn catalog_probe(&self, started: Instant) -> Vec<CatalogWallet> {
        let Some(catalog) = &self.catalog else {
            return Vec::new();
        };

        sleep(CATALOG_INITIAL_DELAY).await;
        let mut wallets = Vec::new();
        for attempt in 0..CATALOG_POLL_ATTEMPTS {
            match catalog.get_wallets().await {
                Ok(list) if !list.is_empty() => {
                    wallets = list;
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "catalog probe failed, contributing zero wallets");
                    break;
                }
            }
            if attempt + 1 < CATALOG_POLL_ATTEMPTS {
                sleep(CATALOG_POLL_STEP).await;
            }
        }

        let elapsed = started.elapsed();
        if elapsed < DISCOVERY_WINDOW {
            sleep(DISCOVERY_WINDOW - elapsed).await;
        }
        wallets
    }

    fn descriptor_from_announcement(provider: AnnouncedProvider) -> WalletDescriptor {
        let id = derive_announce_id(&provider.rdns, &provider.name);
        let mut descriptor = WalletDescriptor::new(id, provider.name, DiscoverySource::Eip6963);
        descriptor.icon = provider.icon;
        descriptor.address_types = provider.chain_providers.keys().copied().collect();
        descriptor.chain_providers = provider.chain_providers;
        descriptor
    }

    fn descriptor_from_catalog(wallet: CatalogWallet) -> WalletDescriptor {
        let core = core_name(&wallet.name);
        let id = if core.is_empty() {
            wallet.name.to_lowercase()
        } else {
            core
        };
        let mut descriptor =
            WalletDescriptor::new(id, wallet.name, DiscoverySource::StandardRegistry);
        descriptor.icon = wallet.icon;
        descriptor.address_types = wallet.chain_providers.keys().copied().collect();
        descriptor.chain_providers = wallet.chain_providers;
        descriptor
    }

    /// Merge one probe result into the accumulated list: keyed by id first,
    /// then by name similarity. The built-in wallet shadows any probe entry
    /// claiming its id or name.
    fn merge_into(
        results: &mut Vec<WalletDescriptor>,
        incoming: WalletDescriptor,
        builtin: Option<&WalletDescriptor>,
    ) {
        if let Some(builtin) = builtin {
            if incoming.id == builtin.id || names_match(&incoming.name, &builtin.name) {
                debug!(id = %incoming.id, "probe entry shadowed by built-in wallet");
                return;
            }
        }

        if let Some(existing) = results.iter_mut().find(|d| d.id == incoming.id) {
            Self::union(existing, incoming);
            return;
        }
        if let Some(existing) = results
            .iter_mut()
            .find(|d| names_match(&d.name, &incoming.name))
        {
            Self::union(existing, incoming);
            return;
        }
        results.push(incoming);
    }

    /// Union address types and chain providers; first-discovered entry keeps
    /// its id, name, and per-chain providers on conflict.
    fn union(existing: &mut WalletDescriptor, incoming: WalletDescriptor) {
        existing.address_types.extend(incoming.address_types);
        for (address_type, provider) in incoming.chain_providers {
            existing.chain_providers.entry(address_type).or_insert(provider);
        }
        if existing.icon.is_none() {
            existing.icon = incoming.icon;
        }
    }
}

/// Scripted announce probe for tests
pub struct MockAnnouncer {
    providers: std::sync::RwLock<Vec<AnnouncedProvider>>,
    fail: std::sync::atomic::AtomicBool,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockAnnouncer {
    pub fn new(providers: Vec<AnnouncedProvider>) -> Self {
        Self {
            providers: std::sync::RwLock::new(providers),
            fail: std::sync::atomic::AtomicBool::new(false),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAnnouncer for MockAnnouncer {
    async fn request_providers(&self, window: Duration) -> Result<Vec<AnnouncedProvider>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        sleep(window).await;
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::error::ConnectError::Connection(
                "announce probe unavailable".to_string(),
            ));
        }
        Ok(self.providers.read().unwrap().clone())
    }
}

/// Scripted pull-registry catalog for tests; returns an empty snapshot for
/// the first `empty_polls` calls to exercise the polling loop.
pub struct MockCatalog {
    wallets: std::sync::RwLock<Vec<CatalogWallet>>,
    empty_polls: std::sync::atomic::AtomicUsize,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockCatalog {
    pub fn new(wallets: Vec<CatalogWallet>) -> Self {
        Self {
            wallets: std::sync::RwLock::new(wallets),
            empty_polls: std::sync::atomic::AtomicUsize::new(0),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn with_empty_polls(self, count: usize) -> Self {
        self.empty_polls
            .store(count, std::sync::atomic::Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletCatalog for MockCatalog {
    async fn get_wallets(&self) -> Result<Vec<CatalogWallet>> {
        let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if call < self.empty_polls.load(std::sync::atomic::Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(self.wallets.read().unwrap().clone())
    }
}

/// Built-in probe whose presence can be toggled mid-test
pub struct MockBuiltinProbe {
    descriptor: std::sync::RwLock<Option<WalletDescriptor>>,
}

impl MockBuiltinProbe {
    pub fn present(descriptor: WalletDescriptor) -> Self {
        Self {
            descriptor: std::sync::RwLock::new(Some(descriptor)),
        }
    }

    pub fn absent() -> Self {
        Self {
            descriptor: std::sync::RwLock::new(None),
        }
    }

    pub fn set(&self, descriptor: Option<WalletDescriptor>) {
        *self.descriptor.write().unwrap() = descriptor;
    }
}

impl BuiltinProbe for MockBuiltinProbe {
    fn builtin_wallet(&self) -> Option<WalletDescriptor> {
        self.descriptor.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainProvider;
    use rstest::rstest;

    fn solana_provider(address: &str) -> Arc<dyn ChainProvider> {
        Arc::new(MockChainProvider::new(AddressType::Solana, vec![address]))
    }

    fn ethereum_provider(address: &str) -> Arc<dyn ChainProvider> {
        Arc::new(MockChainProvider::new(AddressType::Ethereum, vec![address]))
    }

    fn builtin_descriptor() -> WalletDescriptor {
        WalletDescriptor::new(BUILTIN_WALLET_ID, "Lantern", DiscoverySource::BuiltIn)
            .with_chain(solana_provider("So1builtin"))
            .with_chain(ethereum_provider("0xbuiltin"))
    }

    fn all_types() -> BTreeSet<AddressType> {
        BTreeSet::from([AddressType::Solana, AddressType::Ethereum])
    }

    #[rstest]
    #[case("Glow Wallet", "glow")]
    #[case("MetaMask Browser Extension", "metamask")]
    #[case("Wallet", "")]
    #[case("Wallet Extension App", "")]
    #[case("dev.lantern.app", "devlantern")]
    fn test_core_name_strips_generic_words(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(core_name(name), expected);
    }

    #[rstest]
    #[case("Glow Wallet", "glow", true)]
    #[case("MetaMask", "io MetaMask Extension", true)]
    // All-generic names never match anything.
    #[case("Wallet", "Wallet App", false)]
    // Two-character cores cannot match by containment.
    #[case("Ox", "Oxide Vault", false)]
    #[case("Phantom Wallet", "Phantom", true)]
    #[case("Glow", "Slow", false)]
    fn test_names_match(#[case] a: &str, #[case] b: &str, #[case] expected: bool) {
        assert_eq!(names_match(a, b), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_wallet_under_two_protocols_merges_to_one() {
        let announced = AnnouncedProvider {
            rdns: "com.glow.wallet".to_string(),
            name: "Glow Wallet".to_string(),
            icon: None,
            chain_providers: HashMap::from([(
                AddressType::Ethereum,
                ethereum_provider("0xglow"),
            )]),
        };
        let catalog_entry = CatalogWallet {
            name: "Glow".to_string(),
            icon: Some("data:glow".to_string()),
            chain_providers: HashMap::from([(AddressType::Solana, solana_provider("So1glow"))]),
        };

        let service = DiscoveryService::new(
            Some(Arc::new(MockAnnouncer::new(vec![announced]))),
            Some(Arc::new(MockCatalog::new(vec![catalog_entry]))),
            None,
        );

        let wallets = service.discover(&all_types()).await;
        assert_eq!(wallets.len(), 1);
        let wallet = &wallets[0];
        assert_eq!(wallet.id, "glow");
        assert_eq!(wallet.address_types, all_types());
        assert_eq!(wallet.chain_providers.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_builtin_first_and_never_duplicated() {
        let announced = AnnouncedProvider {
            rdns: "dev.lantern.app".to_string(),
            name: "Lantern Wallet".to_string(),
            icon: None,
            chain_providers: HashMap::from([(AddressType::Solana, solana_provider("So1dup"))]),
        };
        let other = AnnouncedProvider {
            rdns: "com.other".to_string(),
            name: "Other".to_string(),
            icon: None,
            chain_providers: HashMap::from([(AddressType::Solana, solana_provider("So1other"))]),
        };

        let service = DiscoveryService::new(
            Some(Arc::new(MockAnnouncer::new(vec![announced, other]))),
            None,
            Some(Arc::new(MockBuiltinProbe::present(builtin_descriptor()))),
        );

        let wallets = service.discover(&all_types()).await;
        assert_eq!(wallets.len(), 2);
        assert_eq!(wallets[0].id, BUILTIN_WALLET_ID);
        assert_eq!(wallets[1].id, "com.other");
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_is_not_fatal() {
        let announcer = Arc::new(MockAnnouncer::new(vec![]));
        announcer.set_fail(true);
        let catalog_entry = CatalogWallet {
            name: "Solo".to_string(),
            icon: None,
            chain_providers: HashMap::from([(AddressType::Solana, solana_provider("So1solo"))]),
        };

        let service = DiscoveryService::new(
            Some(announcer),
            Some(Arc::new(MockCatalog::new(vec![catalog_entry]))),
            None,
        );

        let wallets = service.discover(&all_types()).await;
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].id, "solo");
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_polls_until_non_empty() {
        let catalog_entry = CatalogWallet {
            name: "Late".to_string(),
            icon: None,
            chain_providers: HashMap::from([(AddressType::Solana, solana_provider("So1late"))]),
        };
        let catalog = Arc::new(MockCatalog::new(vec![catalog_entry]).with_empty_polls(2));

        let service = DiscoveryService::new(None, Some(catalog.clone()), None);
        let wallets = service.discover(&all_types()).await;

        assert_eq!(wallets.len(), 1);
        assert_eq!(catalog.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_types_filter_results() {
        let announced = AnnouncedProvider {
            rdns: "com.ethonly".to_string(),
            name: "EthOnly".to_string(),
            icon: None,
            chain_providers: HashMap::from([(
                AddressType::Ethereum,
                ethereum_provider("0xonly"),
            )]),
        };
        let service = DiscoveryService::new(
            Some(Arc::new(MockAnnouncer::new(vec![announced]))),
            None,
            None,
        );

        let solana_only = BTreeSet::from([AddressType::Solana]);
        assert!(service.discover(&solana_only).await.is_empty());

        let wallets = service.discover(&all_types()).await;
        assert_eq!(wallets.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_builtin_polls_until_present() {
        let probe = Arc::new(MockBuiltinProbe::absent());
        let service = DiscoveryService::new(None, None, Some(probe.clone()));

        let waiter = tokio::spawn({
            let service_probe = probe.clone();
            async move {
                // Appears after 250 ms of polling.
                sleep(Duration::from_millis(250)).await;
                service_probe.set(Some(builtin_descriptor()));
            }
        });

        let found = service.wait_for_builtin(Duration::from_secs(1)).await;
        waiter.await.unwrap();
        assert!(found.is_some());

        let absent = DiscoveryService::new(None, None, Some(Arc::new(MockBuiltinProbe::absent())));
        assert!(absent
            .wait_for_builtin(Duration::from_millis(300))
            .await
            .is_none());
    }
}
