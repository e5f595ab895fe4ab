/*
[INPUT]:  Raw chain providers from discovery probes
[OUTPUT]: Instrumented / capability-checked ChainProvider wrappers
[POS]:    Registry layer - provider wrapping applied at registration
[UPDATE]: When wrapper behavior or capability enforcement changes
*/

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::chain::{ChainCapability, ChainEvent, ChainProvider};
use crate::error::{ConnectError, Result};
use crate::types::AddressType;

/// Generic wrapper for announce-protocol providers: delegates every call with
/// debug logging keyed by wallet id.
pub struct InstrumentedProvider {
    wallet_id: String,
    inner: Arc<dyn ChainProvider>,
}

impl InstrumentedProvider {
    pub fn new(wallet_id: impl Into<String>, inner: Arc<dyn ChainProvider>) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            inner,
        }
    }
}

#[async_trait]
impl ChainProvider for InstrumentedProvider {
    fn address_type(&self) -> AddressType {
        self.inner.address_type()
    }

    fn capabilities(&self) -> &HashSet<ChainCapability> {
        self.inner.capabilities()
    }

    async fn connect(&self, silent: bool) -> Result<Vec<String>> {
        debug!(
            wallet_id = %self.wallet_id,
            address_type = ?self.inner.address_type(),
            silent,
            "chain connect"
        );
        self.inner.connect(silent).await
    }

    async fn disconnect(&self) -> Result<()> {
        debug!(
            wallet_id = %self.wallet_id,
            address_type = ?self.inner.address_type(),
            "chain disconnect"
        );
        self.inner.disconnect().await
    }

    async fn accounts(&self) -> Result<Vec<String>> {
        self.inner.accounts().await
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String> {
        debug!(
            wallet_id = %self.wallet_id,
            address_type = ?self.inner.address_type(),
            bytes = message.len(),
            "chain sign_message"
        );
        self.inner.sign_message(message).await
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChainEvent> {
        self.inner.subscribe()
    }
}

/// Wrapper for pull-registry wallets, whose providers advertise an explicit
/// feature set. Every operation checks capability membership before
/// delegating, so a wallet that never advertised a feature is never called
/// with it.
pub struct StandardChainAdapter {
    wallet_id: String,
    inner: Arc<dyn ChainProvider>,
}

impl StandardChainAdapter {
    pub fn new(wallet_id: impl Into<String>, inner: Arc<dyn ChainProvider>) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            inner,
        }
    }

    fn require(&self, capability: ChainCapability) -> Result<()> {
        if self.inner.capabilities().contains(&capability) {
            Ok(())
        } else {
            Err(ConnectError::Connection(format!(
                "wallet {} does not support {capability:?} on {:?}",
                self.wallet_id,
                self.inner.address_type()
            )))
        }
    }
}

#[async_trait]
impl ChainProvider for StandardChainAdapter {
    fn address_type(&self) -> AddressType {
        self.inner.address_type()
    }

    fn capabilities(&self) -> &HashSet<ChainCapability> {
        self.inner.capabilities()
    }

    async fn connect(&self, silent: bool) -> Result<Vec<String>> {
        self.require(ChainCapability::Connect)?;
        debug!(
            wallet_id = %self.wallet_id,
            address_type = ?self.inner.address_type(),
            silent,
            "standard chain connect"
        );
        self.inner.connect(silent).await
    }

    async fn disconnect(&self) -> Result<()> {
        self.require(ChainCapability::Disconnect)?;
        self.inner.disconnect().await
    }

    async fn accounts(&self) -> Result<Vec<String>> {
        self.require(ChainCapability::Accounts)?;
        self.inner.accounts().await
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String> {
        self.require(ChainCapability::SignMessage)?;
        self.inner.sign_message(message).await
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChainEvent> {
        self.inner.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainProvider;

    #[tokio::test]
    async fn test_instrumented_wrapper_delegates() {
        let raw = Arc::new(MockChainProvider::new(AddressType::Solana, vec!["addr1"]));
        let wrapped = InstrumentedProvider::new("w1", raw.clone());

        let addresses = wrapped.connect(false).await.unwrap();
        assert_eq!(addresses, vec!["addr1"]);
        assert_eq!(raw.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_standard_adapter_enforces_capabilities() {
        let raw = Arc::new(
            MockChainProvider::new(AddressType::Ethereum, vec!["0xabc"]).with_capabilities(
                HashSet::from([ChainCapability::Connect, ChainCapability::Events]),
            ),
        );
        let wrapped = StandardChainAdapter::new("w1", raw);

        assert!(wrapped.connect(false).await.is_ok());
        let err = wrapped.sign_message(b"hello").await.unwrap_err();
        assert!(matches!(err, ConnectError::Connection(_)));
        assert!(wrapped.disconnect().await.is_err());
    }
}
