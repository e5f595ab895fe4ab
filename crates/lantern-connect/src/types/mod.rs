/*
[INPUT]:  Shared type requirements across all SDK layers
[OUTPUT]: Typed enums and data models with serde support
[POS]:    Data layer - type definitions used by every module
[UPDATE]: When the public data model changes
*/

pub mod enums;
pub mod models;

pub use enums::{
    AddressType,
    AuthCallbackCode,
    AuthProviderKind,
    DiscoverySource,
    EmbeddedWalletType,
    EventSource,
    ProviderType,
    SessionStatus,
};
pub use models::{AuthOptions, ConnectOutcome, ProviderSelection, UserInfo, WalletAddress};
