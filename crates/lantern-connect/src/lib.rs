/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Lantern wallet-connect SDK surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod chain;
pub mod custody;
pub mod discovery;
pub mod embedded;
pub mod env;
pub mod error;
pub mod events;
pub mod injected;
pub mod keypair;
pub mod manager;
pub mod registry;
pub mod types;

// Re-export the error surface
pub use error::{ConnectError, Result};

// Re-export commonly used types from the chain seam
pub use chain::{ChainCapability, ChainEvent, ChainProvider, MockChainProvider};

// Re-export commonly used types from discovery
pub use discovery::{
    AnnouncedProvider,
    BuiltinProbe,
    CatalogWallet,
    DiscoveryService,
    ProviderAnnouncer,
    WalletCatalog,
    WalletDescriptor,
    BUILTIN_WALLET_ID,
};

// Re-export commonly used types from the registry
pub use registry::{ConnectionState, Discoverer, WalletRegistry};

// Re-export the backends and the facade
pub use embedded::{EmbeddedConfig, EmbeddedWallet, FileSessionStore, MemorySessionStore};
pub use injected::InjectedWallet;
pub use manager::{Backend, ProviderManager, SdkConfig};

// Re-export the event and environment surfaces
pub use env::{
    EphemeralStore,
    FileStore,
    KeyValueStore,
    MemoryStore,
    Navigator,
    RecordingNavigator,
    UrlParams,
};
pub use events::{EventBus, EventKind, Subscription, WalletEvent};

// Re-export the custody client and keypair
pub use custody::{CustodyClient, JwtExchange, RequestSigner};
pub use keypair::ApiKeypair;

// Re-export all data-model types
pub use types::*;
