/*
[INPUT]:  Per-chain wallet capability objects supplied by the host page
[OUTPUT]: Uniform async chain interface with explicit capability sets
[POS]:    Chain seam - boundary between the SDK and injected providers
[UPDATE]: When adding chain operations or event payload shapes
*/

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{ConnectError, Result};
use crate::types::AddressType;

/// Optional operations a chain provider declares support for.
///
/// Capability membership replaces runtime shape probing: a provider that does
/// not list an operation is never called with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainCapability {
    Connect,
    Disconnect,
    SignMessage,
    /// Can list current accounts on demand (needed for chains whose connect
    /// event carries a chain id instead of addresses)
    Accounts,
    Events,
}

/// Raw event emitted by a chain provider, payload shapes are chain-specific
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// Connected; Ethereum-style providers send a chain id and no addresses,
    /// requiring a follow-up `accounts()` call
    Connect {
        addresses: Vec<String>,
        chain_id: Option<String>,
    },
    Disconnect,
    AccountsChanged { addresses: Vec<String> },
    ChainChanged { chain_id: String },
}

/// One chain's connect/disconnect/sign surface on an injected wallet.
///
/// The trait is async to support providers that round-trip through extension
/// messaging or hardware devices.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    fn address_type(&self) -> AddressType;

    fn capabilities(&self) -> &HashSet<ChainCapability>;

    /// Connect to this chain. `silent` requests a trusted-only connect that
    /// must not prompt the user; providers without prior trust return an
    /// empty address list or an error.
    async fn connect(&self, silent: bool) -> Result<Vec<String>>;

    async fn disconnect(&self) -> Result<()>;

    /// Current account addresses; only valid when `Accounts` is declared
    async fn accounts(&self) -> Result<Vec<String>>;

    async fn sign_message(&self, message: &[u8]) -> Result<String>;

    /// Subscribe to this chain's raw event stream
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChainEvent>;
}

/// Configurable chain provider for testing adapters without a host page
pub struct MockChainProvider {
    address_type: AddressType,
    capabilities: HashSet<ChainCapability>,
    addresses: Arc<RwLock<Vec<String>>>,
    fail_connect: AtomicBool,
    silent_yields_empty: AtomicBool,
    connect_calls: AtomicUsize,
    silent_connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    event_senders: Arc<RwLock<Vec<mpsc::UnboundedSender<ChainEvent>>>>,
}

impl MockChainProvider {
    pub fn new(address_type: AddressType, addresses: Vec<&str>) -> Self {
        Self {
            address_type,
            capabilities: HashSet::from([
                ChainCapability::Connect,
                ChainCapability::Disconnect,
                ChainCapability::SignMessage,
                ChainCapability::Accounts,
                ChainCapability::Events,
            ]),
            addresses: Arc::new(RwLock::new(
                addresses.into_iter().map(String::from).collect(),
            )),
            fail_connect: AtomicBool::new(false),
            silent_yields_empty: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            silent_connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            event_senders: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_capabilities(mut self, capabilities: HashSet<ChainCapability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Make every connect attempt fail (user rejection)
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make silent connects return zero addresses (trust not yet granted)
    pub fn set_silent_yields_empty(&self, empty: bool) {
        self.silent_yields_empty.store(empty, Ordering::SeqCst);
    }

    /// Push a raw event to every subscriber
    pub fn push_event(&self, event: ChainEvent) {
        let senders = self.event_senders.read().unwrap();
        for sender in senders.iter() {
            let _ = sender.send(event.clone());
        }
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn silent_connect_calls(&self) -> usize {
        self.silent_connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainProvider for MockChainProvider {
    fn address_type(&self) -> AddressType {
        self.address_type
    }

    fn capabilities(&self) -> &HashSet<ChainCapability> {
        &self.capabilities
    }

    async fn connect(&self, silent: bool) -> Result<Vec<String>> {
        if silent {
            self.silent_connect_calls.fetch_add(1, Ordering::SeqCst);
        } else {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
        }

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectError::Connection("user rejected".to_string()));
        }
        if silent && self.silent_yields_empty.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(self.addresses.read().unwrap().clone())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<String>> {
        Ok(self.addresses.read().unwrap().clone())
    }

    async fn sign_message(&self, _message: &[u8]) -> Result<String> {
        Ok("mock-signature".to_string())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChainEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.event_senders.write().unwrap().push(tx);
        rx
    }
}
