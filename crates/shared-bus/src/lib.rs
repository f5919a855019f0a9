//! # Shared Bus - Pub/Sub Transport
//!
//! The decentralized transport the messaging layer rides on, expressed as a
//! port (`Transport`) with an in-memory adapter (`InMemoryNetwork`).
//!
//! ## Operations
//!
//! ```text
//!   publish(topic, bytes) ──────────────┐
//!                                        ▼
//!                               ┌──────────────────┐
//!   query_history(topics) ◄──── │  stored history  │
//!                               └──────────────────┘
//!                                        │ broadcast
//!   subscribe_live(topics) ◄─────────────┘
//! ```
//!
//! ## Readiness
//!
//! Callers that need delivery confidence await `wait_for_capability` before
//! the corresponding operation class. Publishing with no reachable peer
//! fails with `TransportError::NoPeersAvailable`.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

use thiserror::Error;

// Re-export main types
pub use events::{
    Capability, ContentTopic, QueryDirection, QueryOptions, QueryOutcome, TopicFilter,
    TransportMessage,
};
pub use publisher::{InMemoryNetwork, PageCallback, Transport};
pub use subscriber::{LiveSubscription, SubscriptionError};

/// Maximum messages to buffer per live subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Default history page size.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Errors surfaced by a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No reachable peer exists to accept the message.
    #[error("No peers available")]
    NoPeersAvailable,

    /// A required capability did not become available in time.
    #[error("Timed out waiting for capability {0:?}")]
    CapabilityTimeout(Capability),

    /// The transport was shut down.
    #[error("Transport closed")]
    Closed,
}
