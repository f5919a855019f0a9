//! # Transport Port and In-Memory Network
//!
//! Defines the pub/sub-with-history interface the messaging layer consumes,
//! plus a single-process implementation used by tests and local runs.

use crate::events::{
    Capability, ContentTopic, QueryDirection, QueryOptions, QueryOutcome, TopicFilter,
    TransportMessage,
};
use crate::subscriber::LiveSubscription;
use crate::{TransportError, DEFAULT_CHANNEL_CAPACITY};
use async_trait::async_trait;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

/// Callback invoked once per history page. Returning `Break` stops the query.
pub type PageCallback<'a> = dyn FnMut(&[TransportMessage]) -> ControlFlow<()> + Send + 'a;

/// Decentralized pub/sub transport with stored history.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Wait until `capability` is available, or fail after `timeout`.
    ///
    /// # Errors
    ///
    /// `TransportError::CapabilityTimeout` if no peer offers the capability in time.
    async fn wait_for_capability(
        &self,
        capability: Capability,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Publish `payload` under `topic`.
    ///
    /// # Errors
    ///
    /// `TransportError::NoPeersAvailable` if no peer can accept the message.
    async fn publish(&self, topic: &ContentTopic, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Walk stored history for `topics`, handing each page to `on_page`.
    ///
    /// Returning from this call is the backfill-complete signal.
    async fn query_history(
        &self,
        topics: &[ContentTopic],
        options: QueryOptions,
        on_page: &mut PageCallback<'_>,
    ) -> Result<QueryOutcome, TransportError>;

    /// Subscribe to future messages on `topics`. Dropping the handle stops delivery.
    async fn subscribe_live(
        &self,
        topics: &[ContentTopic],
    ) -> Result<LiveSubscription, TransportError>;
}

/// In-memory implementation of the transport.
///
/// Uses `tokio::sync::broadcast` for live delivery and a per-topic vector
/// for history. Every participant sharing one `Arc<InMemoryNetwork>` sees
/// the same network.
pub struct InMemoryNetwork {
    /// Broadcast sender for live messages.
    sender: broadcast::Sender<TransportMessage>,

    /// Stored history by topic.
    history: RwLock<HashMap<ContentTopic, Vec<TransportMessage>>>,

    /// Whether any peer is reachable.
    online: watch::Sender<bool>,

    /// Active subscription count by topic set.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Total messages published.
    messages_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryNetwork {
    /// Create a new, online in-memory network with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new, online in-memory network with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let (online, _) = watch::channel(true);
        Self {
            sender,
            history: RwLock::new(HashMap::new()),
            online,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            messages_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Simulate peers joining or leaving.
    pub fn set_online(&self, online: bool) {
        self.online.send_replace(online);
        debug!(online, "Network peer availability changed");
    }

    /// Get the number of active live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Number of live subscriptions registered for exactly this topic set.
    #[must_use]
    pub fn topic_subscriptions(&self, topics: &[ContentTopic]) -> usize {
        let key = topic_key(topics);
        self.subscriptions
            .read()
            .map(|subs| subs.get(&key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Get the total number of messages published.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn is_online(&self) -> bool {
        *self.online.borrow()
    }
}

impl Default for InMemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryNetwork {
    async fn wait_for_capability(
        &self,
        capability: Capability,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut receiver = self.online.subscribe();
        // The awaited `watch::Ref` borrows `receiver`; keep it in a local so
        // it is dropped first.
        let waited = tokio::time::timeout(timeout, receiver.wait_for(|online| *online)).await;
        match waited {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::CapabilityTimeout(capability)),
        }
    }

    async fn publish(&self, topic: &ContentTopic, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_online() {
            warn!(topic = %topic, "Publish refused (no peers available)");
            return Err(TransportError::NoPeersAvailable);
        }

        let message = TransportMessage {
            topic: topic.clone(),
            payload,
            timestamp_ms: now_ms(),
        };

        self.history
            .write()
            .map_err(|_| TransportError::Closed)?
            .entry(topic.clone())
            .or_default()
            .push(message.clone());
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        // No live receivers is fine: the message is still stored.
        let receivers = self.sender.send(message).unwrap_or(0);
        debug!(topic = %topic, receivers, "Message published");
        Ok(())
    }

    async fn query_history(
        &self,
        topics: &[ContentTopic],
        options: QueryOptions,
        on_page: &mut PageCallback<'_>,
    ) -> Result<QueryOutcome, TransportError> {
        if !self.is_online() {
            return Err(TransportError::NoPeersAvailable);
        }

        let mut matching: Vec<TransportMessage> = {
            let history = self.history.read().map_err(|_| TransportError::Closed)?;
            topics
                .iter()
                .filter_map(|topic| history.get(topic))
                .flatten()
                .filter(|m| options.start_time_ms.map_or(true, |t| m.timestamp_ms >= t))
                .cloned()
                .collect()
        };

        // Stable sort keeps publish order for equal timestamps.
        matching.sort_by_key(|m| m.timestamp_ms);
        if options.direction == QueryDirection::Backward {
            matching.reverse();
        }

        let mut delivered = 0;
        for page in matching.chunks(options.page_size.max(1)) {
            delivered += page.len();
            if on_page(page).is_break() {
                debug!(?topics, delivered, "History query stopped by caller");
                return Ok(QueryOutcome {
                    delivered,
                    done: false,
                });
            }
        }

        debug!(?topics, delivered, "History query complete");
        Ok(QueryOutcome {
            delivered,
            done: true,
        })
    }

    async fn subscribe_live(
        &self,
        topics: &[ContentTopic],
    ) -> Result<LiveSubscription, TransportError> {
        let receiver = self.sender.subscribe();
        let key = topic_key(topics);

        if let Ok(mut subs) = self.subscriptions.write() {
            *subs.entry(key.clone()).or_insert(0) += 1;
        }

        debug!(?topics, "New live subscription created");

        Ok(LiveSubscription::new(
            receiver,
            TopicFilter::topics(topics.to_vec()),
            self.subscriptions.clone(),
            key,
        ))
    }
}

fn topic_key(topics: &[ContentTopic]) -> String {
    let mut names: Vec<&str> = topics.iter().map(ContentTopic::as_str).collect();
    names.sort_unstable();
    names.join(",")
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
