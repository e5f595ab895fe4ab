/*
[INPUT]:  Registry-selected wallet descriptors, durable reconnect flags
[OUTPUT]: Unified connect/disconnect/sign surface over injected wallets
[POS]:    Adapter layer - drives per-chain providers for one wallet
[UPDATE]: When connect sequencing, auto-connect, or event forwarding changes
*/

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chain::{ChainCapability, ChainEvent, ChainProvider};
use crate::discovery::WalletDescriptor;
use crate::env::KeyValueStore;
use crate::error::{ConnectError, Result};
use crate::events::{EventBus, WalletEvent};
use crate::registry::WalletRegistry;
use crate::types::{AddressType, EventSource, WalletAddress};

/// Durable flag: a wallet was connected in a previous page session
const WAS_CONNECTED_KEY: &str = "lantern.injected.was_connected";
/// Durable record of the last connected wallet id
const LAST_WALLET_KEY: &str = "lantern.injected.last_wallet_id";

/// Bounded wait for a slow-discovering remembered wallet during auto-connect
const AUTO_CONNECT_DISCOVERY_ATTEMPTS: usize = 3;
const AUTO_CONNECT_DISCOVERY_STEP: Duration = Duration::from_millis(100);

/// Connects to a registry-selected injected wallet across every chain it
/// shares with the configured address types, and normalizes per-chain events
/// into the unified wallet event stream.
pub struct InjectedWallet {
    registry: WalletRegistry,
    address_types: BTreeSet<AddressType>,
    storage: Arc<dyn KeyValueStore>,
    events: EventBus,
    current_wallet_id: RwLock<Option<String>>,
    addresses: RwLock<Vec<WalletAddress>>,
    // Per-wallet-id forwarding wires, installed at most once per id.
    wired: RwLock<HashSet<String>>,
    forwarding_tasks: RwLock<HashMap<String, Vec<JoinHandle<()>>>>,
}

impl InjectedWallet {
    pub fn new(
        registry: WalletRegistry,
        address_types: BTreeSet<AddressType>,
        storage: Arc<dyn KeyValueStore>,
        events: EventBus,
    ) -> Self {
        Self {
            registry,
            address_types,
            storage,
            events,
            current_wallet_id: RwLock::new(None),
            addresses: RwLock::new(Vec::new()),
            wired: RwLock::new(HashSet::new()),
            forwarding_tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Connect to the requested wallet, or to the first discovered one.
    ///
    /// Chains are attempted in sequence; the first failure aborts the whole
    /// operation after a `connect_error` event, so a later chain's failure
    /// never leaves an earlier chain silently connected.
    pub async fn connect(&self, wallet_id: Option<&str>) -> Result<Vec<WalletAddress>> {
        self.events.emit(&WalletEvent::ConnectStart {
            source: EventSource::ManualConnect,
        });

        match self.connect_inner(wallet_id).await {
            Ok(addresses) => Ok(addresses),
            Err(err) => {
                self.events.emit(&WalletEvent::ConnectError {
                    message: err.to_string(),
                    source: EventSource::ManualConnect,
                });
                Err(err)
            }
        }
    }

    async fn connect_inner(&self, wallet_id: Option<&str>) -> Result<Vec<WalletAddress>> {
        let descriptor = self.resolve_wallet(wallet_id).await?;
        info!(wallet_id = %descriptor.id, "connecting injected wallet");

        let addresses = self.connect_chains(&descriptor).await?;
        if addresses.is_empty() {
            return Err(ConnectError::Connection(format!(
                "wallet {} returned no addresses",
                descriptor.id
            )));
        }

        self.finish_connect(&descriptor, addresses.clone(), EventSource::ManualConnect)?;
        Ok(addresses)
    }

    /// Silent reconnect driven by the durable flags from a prior session.
    ///
    /// Individual chain failures are expected (trust may not have been
    /// granted) and are swallowed; `connect_error` is emitted only when zero
    /// chains succeed. Zero addresses from succeeding chains is a quiet
    /// no-op. Never returns an error to the caller.
    pub async fn auto_connect(&self) -> bool {
        if !self.was_previously_connected() {
            debug!("no prior injected connection, skipping auto-connect");
            return false;
        }
        let Some(remembered) = self.last_wallet_id() else {
            return false;
        };

        self.events.emit(&WalletEvent::ConnectStart {
            source: EventSource::AutoConnect,
        });

        let Some(descriptor) = self.wait_for_wallet(&remembered).await else {
            debug!(wallet_id = %remembered, "remembered wallet never discovered");
            return false;
        };

        let mut addresses = Vec::new();
        let mut any_chain_succeeded = false;
        for address_type in &self.address_types {
            let Some(provider) = descriptor.chain_providers.get(address_type) else {
                continue;
            };
            match self.connect_one_chain(provider, true).await {
                Ok(chain_addresses) => {
                    any_chain_succeeded = true;
                    addresses.extend(chain_addresses);
                }
                Err(err) => {
                    debug!(
                        wallet_id = %descriptor.id,
                        address_type = ?address_type,
                        error = %err,
                        "silent chain connect failed"
                    );
                }
            }
        }

        if !any_chain_succeeded {
            self.events.emit(&WalletEvent::ConnectError {
                message: format!("auto-connect failed for wallet {}", descriptor.id),
                source: EventSource::AutoConnect,
            });
            return false;
        }
        if addresses.is_empty() {
            debug!(wallet_id = %descriptor.id, "silent connect yielded no addresses");
            return false;
        }

        match self.finish_connect(&descriptor, addresses, EventSource::AutoConnect) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "auto-connect could not persist state");
                false
            }
        }
    }

    /// Best-effort disconnect on every chain the wallet exposes; per-chain
    /// failures are logged, never propagated.
    pub async fn disconnect(&self) -> Result<()> {
        let wallet_id = self.current_wallet_id.read().unwrap().clone();

        if let Some(wallet_id) = &wallet_id {
            if let Some(descriptor) = self.registry.get_by_id(wallet_id) {
                for (address_type, provider) in &descriptor.chain_providers {
                    if let Err(err) = provider.disconnect().await {
                        warn!(
                            wallet_id = %wallet_id,
                            address_type = ?address_type,
                            error = %err,
                            "chain disconnect failed"
                        );
                    }
                }
            }
            self.registry.set_wallet_connected(wallet_id, false);
            self.unwire_events(wallet_id);
        }

        self.storage.remove(WAS_CONNECTED_KEY)?;
        self.storage.remove(LAST_WALLET_KEY)?;
        *self.current_wallet_id.write().unwrap() = None;
        self.addresses.write().unwrap().clear();

        self.events.emit(&WalletEvent::Disconnect {
            source: EventSource::ManualDisconnect,
        });
        Ok(())
    }

    pub async fn sign_message(&self, address_type: AddressType, message: &[u8]) -> Result<String> {
        let wallet_id = self
            .current_wallet_id
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| ConnectError::Connection("no wallet connected".to_string()))?;
        let descriptor = self
            .registry
            .get_by_id(&wallet_id)
            .ok_or(ConnectError::WalletNotFound { wallet_id })?;
        let provider = descriptor.chain_providers.get(&address_type).ok_or_else(|| {
            ConnectError::Connection(format!(
                "wallet {} has no {address_type:?} provider",
                descriptor.id
            ))
        })?;
        provider.sign_message(message).await
    }

    pub fn is_connected(&self) -> bool {
        self.current_wallet_id.read().unwrap().is_some()
    }

    pub fn get_addresses(&self) -> Vec<WalletAddress> {
        self.addresses.read().unwrap().clone()
    }

    pub fn current_wallet_id(&self) -> Option<String> {
        self.current_wallet_id.read().unwrap().clone()
    }

    async fn resolve_wallet(&self, wallet_id: Option<&str>) -> Result<WalletDescriptor> {
        match wallet_id {
            Some(id) => {
                if !self.registry.has(id) {
                    self.registry.discover(&self.address_types).await?;
                }
                let descriptor = self.registry.get_by_id(id).ok_or_else(|| {
                    ConnectError::WalletNotFound {
                        wallet_id: id.to_string(),
                    }
                })?;
                self.require_usable(&descriptor)?;
                Ok(descriptor)
            }
            None => {
                self.registry.discover(&self.address_types).await?;
                let descriptor = self
                    .registry
                    .get_by_address_types(&self.address_types)
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        ConnectError::Connection("no injected wallets discovered".to_string())
                    })?;
                self.require_usable(&descriptor)?;
                Ok(descriptor)
            }
        }
    }

    fn require_usable(&self, descriptor: &WalletDescriptor) -> Result<()> {
        let has_usable_chain = self
            .address_types
            .iter()
            .any(|t| descriptor.chain_providers.contains_key(t));
        if has_usable_chain {
            Ok(())
        } else {
            Err(ConnectError::Connection(format!(
                "wallet {} supports none of the configured address types",
                descriptor.id
            )))
        }
    }

    /// Sequential per-chain manual connect; the first failure aborts.
    /// Auto-connect drives `connect_one_chain` with its own swallow policy.
    async fn connect_chains(&self, descriptor: &WalletDescriptor) -> Result<Vec<WalletAddress>> {
        let mut addresses = Vec::new();
        for address_type in &self.address_types {
            let Some(provider) = descriptor.chain_providers.get(address_type) else {
                continue;
            };
            addresses.extend(self.connect_one_chain(provider, false).await?);
        }
        Ok(addresses)
    }

    async fn connect_one_chain(
        &self,
        provider: &Arc<dyn ChainProvider>,
        silent: bool,
    ) -> Result<Vec<WalletAddress>> {
        let raw = provider.connect(silent).await?;
        // Ethereum-style connects may return a chain id and no addresses.
        let raw = if raw.is_empty()
            && !silent
            && provider.capabilities().contains(&ChainCapability::Accounts)
        {
            provider.accounts().await?
        } else {
            raw
        };
        let address_type = provider.address_type();
        Ok(raw
            .into_iter()
            .map(|address| WalletAddress {
                address_type,
                address,
            })
            .collect())
    }

    fn finish_connect(
        &self,
        descriptor: &WalletDescriptor,
        addresses: Vec<WalletAddress>,
        source: EventSource,
    ) -> Result<()> {
        self.registry.set_wallet_connected(&descriptor.id, true);
        self.registry
            .set_wallet_addresses(&descriptor.id, addresses.clone());
        self.storage.set(WAS_CONNECTED_KEY, "true")?;
        self.storage.set(LAST_WALLET_KEY, &descriptor.id)?;

        *self.current_wallet_id.write().unwrap() = Some(descriptor.id.clone());
        *self.addresses.write().unwrap() = addresses.clone();

        self.wire_events(descriptor);
        self.events.emit(&WalletEvent::Connect { addresses, source });
        Ok(())
    }

    fn was_previously_connected(&self) -> bool {
        matches!(self.storage.get(WAS_CONNECTED_KEY), Ok(Some(_)))
    }

    fn last_wallet_id(&self) -> Option<String> {
        self.storage.get(LAST_WALLET_KEY).ok().flatten()
    }

    /// Wait for the remembered wallet to show up in discovery; external
    /// wallets can announce well after page load.
    async fn wait_for_wallet(&self, wallet_id: &str) -> Option<WalletDescriptor> {
        for attempt in 0..AUTO_CONNECT_DISCOVERY_ATTEMPTS {
            if let Some(descriptor) = self.registry.get_by_id(wallet_id) {
                return Some(descriptor);
            }
            if let Err(err) = self.registry.discover(&self.address_types).await {
                debug!(error = %err, "auto-connect discovery pass failed");
            }
            if let Some(descriptor) = self.registry.get_by_id(wallet_id) {
                return Some(descriptor);
            }
            if attempt + 1 < AUTO_CONNECT_DISCOVERY_ATTEMPTS {
                tokio::time::sleep(AUTO_CONNECT_DISCOVERY_STEP).await;
            }
        }
        None
    }

    /// Install event forwarding for a wallet at most once per id
    fn wire_events(&self, descriptor: &WalletDescriptor) {
        {
            let mut wired = self.wired.write().unwrap();
            if !wired.insert(descriptor.id.clone()) {
                return;
            }
        }

        let mut tasks = Vec::new();
        for provider in descriptor.chain_providers.values() {
            let receiver = provider.subscribe();
            tasks.push(self.spawn_forwarder(
                descriptor.id.clone(),
                provider.clone(),
                receiver,
            ));
        }
        self.forwarding_tasks
            .write()
            .unwrap()
            .insert(descriptor.id.clone(), tasks);
    }

    fn unwire_events(&self, wallet_id: &str) {
        self.wired.write().unwrap().remove(wallet_id);
        if let Some(tasks) = self.forwarding_tasks.write().unwrap().remove(wallet_id) {
            for task in tasks {
                task.abort();
            }
        }
    }

    /// Normalize one chain's raw event stream into unified wallet events
    fn spawn_forwarder(
        &self,
        wallet_id: String,
        provider: Arc<dyn ChainProvider>,
        mut receiver: tokio::sync::mpsc::UnboundedReceiver<ChainEvent>,
    ) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match event {
                    ChainEvent::Connect {
                        addresses,
                        chain_id,
                    } => {
                        let raw = if addresses.is_empty()
                            && provider.capabilities().contains(&ChainCapability::Accounts)
                        {
                            match provider.accounts().await {
                                Ok(accounts) => accounts,
                                Err(err) => {
                                    debug!(error = %err, "account fetch after connect failed");
                                    continue;
                                }
                            }
                        } else {
                            addresses
                        };
                        debug!(wallet_id = %wallet_id, ?chain_id, "wallet-driven connect");
                        let wallet_addresses: Vec<WalletAddress> = raw
                            .into_iter()
                            .map(|address| WalletAddress {
                                address_type: provider.address_type(),
                                address,
                            })
                            .collect();
                        registry.set_wallet_connected(&wallet_id, true);
                        registry.set_wallet_addresses(&wallet_id, wallet_addresses.clone());
                        events.emit(&WalletEvent::Connect {
                            addresses: wallet_addresses,
                            source: EventSource::Wallet,
                        });
                    }
                    ChainEvent::Disconnect => {
                        registry.set_wallet_connected(&wallet_id, false);
                        events.emit(&WalletEvent::Disconnect {
                            source: EventSource::Wallet,
                        });
                    }
                    ChainEvent::AccountsChanged { addresses } => {
                        let wallet_addresses: Vec<WalletAddress> = addresses
                            .into_iter()
                            .map(|address| WalletAddress {
                                address_type: provider.address_type(),
                                address,
                            })
                            .collect();
                        registry.set_wallet_addresses(&wallet_id, wallet_addresses.clone());
                        events.emit(&WalletEvent::Connect {
                            addresses: wallet_addresses,
                            source: EventSource::AccountChange,
                        });
                    }
                    ChainEvent::ChainChanged { chain_id } => {
                        debug!(wallet_id = %wallet_id, chain_id, "chain changed");
                    }
                }
            }
        })
    }
}
