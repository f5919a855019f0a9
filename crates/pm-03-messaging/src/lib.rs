//! # Peer Market Messaging
//!
//! The trust and messaging protocols riding on the pub/sub transport:
//! per-conversation key derivation, the provider-selection handshake, the
//! encrypted chat channel, item listings with replies, and profile sync.
//!
//! ## Conversation Flow
//!
//! ```text
//!  Provider                         Seeker
//!     │  ItemReply (+ KeyExchange)     │
//!     ├───────────────────────────────►│  buffered as candidate
//!     │                                │
//!     │  SelectProvider (+ KeyExchange)│
//!     │◄───────────────────────────────┤  candidate promoted
//!     │  confirm seeker keys           │
//!     │                                │
//!     │◄════════ encrypted chat ══════►│
//! ```
//!
//! ## Architecture
//!
//! - `domain/`: payloads, key derivation, pure protocol rules
//! - `ports/`: chain, wallet, and persistence traits
//! - `adapters/`: JSON file and in-memory repositories, key store
//! - `service/`: flows over the shared `MessagingContext`
//! - `topics`: content topic naming
//! - `config`: TOML configuration with environment overrides

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;
pub mod topics;

pub use adapters::{InMemoryRepository, JsonFileRepository, KeyMaterialStore, LocalWallet};
pub use config::{MarketplaceInfo, MessagingConfig};
pub use domain::chat::{ChatEntry, ChatMessage, ChatState, SealedChatMessage, Sender};
pub use domain::errors::{
    ChainError, ChatError, ConfigError, MarketError, ProfileError, StoreError, WalletError,
};
pub use domain::items::{
    item_reply_domain, reconcile_items, ItemMetadata, ItemReply, ItemStatus, MarketplaceItem,
    OnChainItem, ReconcileReport,
};
pub use domain::key_material::{ConversationId, ConversationKeyMaterial, Promotion};
pub use domain::keys::{
    derive_chat_private_key, ChatKeyring, FormattedChatKeys, KeyExchange, KeyKind,
};
pub use domain::profile::{profile_domain, Profile, PublicProfile};
pub use domain::select_provider::{SelectProvider, SelectionRole};
pub use ports::{CallArg, ChainGateway, ContractCall, Repository, TxReceipt, WalletProvider};
pub use service::{
    ChatService, ChatSource, HandshakeOutcome, ItemService, MessagingContext, ProfileSync,
    PublishedItem, ReplySource, SelectProviderService, SelectionSource, SyncOutcome, SyncState,
};
pub use topics::TopicNamer;
