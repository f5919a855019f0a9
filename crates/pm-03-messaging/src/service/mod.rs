//! # Service Layer
//!
//! Flows that glue the domain rules to the transport, the chain, and the
//! key store. Each service shares one `MessagingContext`.

pub mod chat;
pub mod context;
pub mod handshake;
pub mod items;
pub mod profile_sync;
pub(crate) mod stream;

pub use chat::{ChatService, ChatSource};
pub use context::MessagingContext;
pub use handshake::{HandshakeOutcome, SelectProviderService, SelectionSource};
pub use items::{ItemService, PublishedItem, ReplySource};
pub use profile_sync::{ProfileSync, SyncOutcome, SyncState};
