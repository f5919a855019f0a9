//! # Transport Messages
//!
//! Content topics, the messages carried under them, and the knobs for
//! history queries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport-level routing key.
///
/// Content topics follow the `/{application}/{version}/{name}/{encoding}`
/// shape. Construction and namespacing belong to the caller; the transport
/// treats a topic as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentTopic(String);

impl ContentTopic {
    /// Wrap a topic string.
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    /// Topic as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMessage {
    /// Topic the message was published under.
    pub topic: ContentTopic,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// Sender-side publish time (milliseconds since the Unix epoch).
    pub timestamp_ms: u64,
}

/// Transport capabilities that must be available before an operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Pushing messages into the network.
    LightPush,
    /// Querying stored history.
    Store,
    /// Receiving live messages.
    Filter,
}

/// Order in which history pages are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryDirection {
    /// Oldest first.
    #[default]
    Forward,
    /// Newest first.
    Backward,
}

/// Options for a history query.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Messages per page handed to the callback.
    pub page_size: usize,
    /// Delivery order.
    pub direction: QueryDirection,
    /// Only messages published at or after this time.
    pub start_time_ms: Option<u64>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            page_size: crate::DEFAULT_PAGE_SIZE,
            direction: QueryDirection::Forward,
            start_time_ms: None,
        }
    }
}

/// Result of a completed history query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Number of messages handed to the callback.
    pub delivered: usize,
    /// `true` once the whole history was walked; `false` if the callback stopped early.
    pub done: bool,
}

/// Filter restricting a live subscription to a set of topics.
#[derive(Debug, Clone, Default)]
pub struct TopicFilter {
    /// Topics to deliver; empty means every topic.
    pub topics: Vec<ContentTopic>,
}

impl TopicFilter {
    /// Filter for the given topics.
    #[must_use]
    pub fn topics(topics: Vec<ContentTopic>) -> Self {
        Self { topics }
    }

    /// Filter matching every topic.
    #[must_use]
    pub fn all() -> Self {
        Self { topics: Vec::new() }
    }

    /// Check if a message matches this filter.
    #[must_use]
    pub fn matches(&self, message: &TransportMessage) -> bool {
        self.topics.is_empty() || self.topics.contains(&message.topic)
    }
}
