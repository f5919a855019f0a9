//! # Encrypted Chat Channel
//!
//! ## Stream Lifecycle
//!
//! ```text
//! WaitingForPeer ──(counterparty keys confirmed)──► Open { messages }
//! ```
//!
//! A chat stream starts in `WaitingForPeer` whenever the counterparty is
//! not confirmed, and opens by itself as soon as the key store reports a
//! confirmation for the conversation. Messages are kept in local arrival
//! order; duplicates seen through both history and live delivery are
//! collapsed.

use crate::domain::chat::{receive, seal, ChatMessage, ChatState};
use crate::domain::errors::ChatError;
use crate::domain::key_material::ConversationId;
use crate::domain::keys::FormattedChatKeys;
use crate::service::context::{now_ms, MessagingContext};
use crate::service::stream::follow_topics;
use pm_01_signed_envelope::{JsonCodec, PayloadCodec};
use pm_02_event_cache::{CacheHandle, CacheSink, CacheSource, EventCache, Teardown};
use shared_bus::TransportMessage;
use shared_types::{Address, ItemId};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Cache source producing one conversation's chat state.
pub struct ChatSource {
    ctx: Arc<MessagingContext>,
}

impl ChatSource {
    /// Source over `ctx`.
    #[must_use]
    pub fn new(ctx: Arc<MessagingContext>) -> Self {
        Self { ctx }
    }
}

/// Wait until the counterparty of `id` is confirmed.
///
/// `None` if the key store shuts down or derivation fails.
async fn await_chat_keys(
    ctx: &MessagingContext,
    id: &ConversationId,
    sink: &CacheSink<ChatState>,
) -> Option<FormattedChatKeys> {
    let mut changes = ctx.keys.subscribe_changes();
    let mut announced = false;
    loop {
        let material = ctx.keys.get(id);
        match ctx.keyring.format_chat_keys(&id.marketplace, &id.item, &material) {
            Ok(Some(keys)) => return Some(keys),
            Ok(None) => {}
            Err(e) => {
                warn!(conversation = %id, error = %e, "Chat key derivation failed");
                return None;
            }
        }

        if !announced {
            sink.emit(ChatState::WaitingForPeer);
            announced = true;
            debug!(conversation = %id, "Chat waiting for peer");
        }

        loop {
            match changes.recv().await {
                Ok(changed) if changed == *id => break,
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => break,
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl CacheSource<ConversationId, ChatState> for ChatSource {
    fn subscribe(&self, id: &ConversationId, sink: CacheSink<ChatState>) -> Teardown {
        let ctx = self.ctx.clone();
        let id = *id;

        let task = tokio::spawn(async move {
            let Some(keys) = await_chat_keys(&ctx, &id, &sink).await else {
                return;
            };
            info!(conversation = %id, "Chat channel open");
            sink.emit(ChatState::open());

            let topics = vec![ctx.topics.chat(&id.marketplace, &id.item)];
            let mut state = ChatState::open();
            let on_message = {
                let sink = sink.clone();
                move |message: &TransportMessage| {
                    if let Some(entry) = receive(&keys, &message.payload) {
                        if state.append(entry) {
                            sink.emit(state.clone());
                        }
                    }
                }
            };
            follow_topics(
                ctx.transport.clone(),
                topics,
                ctx.config.page_size,
                ctx.config.peer_timeout,
                sink,
                on_message,
            )
            .await;
        });
        Teardown::abort_task(task)
    }
}

/// Sends chat messages and exposes chat streams.
pub struct ChatService {
    ctx: Arc<MessagingContext>,
    chats: EventCache<ConversationId, ChatState>,
}

impl ChatService {
    /// Service over `ctx`.
    #[must_use]
    pub fn new(ctx: Arc<MessagingContext>) -> Self {
        let source = Arc::new(ChatSource::new(ctx.clone()));
        let chats = EventCache::with_capacity(source, ctx.config.cache_capacity);
        Self { ctx, chats }
    }

    /// Chat keys for `(marketplace, item)`, or `None` while unconfirmed.
    pub fn chat_keys(
        &self,
        marketplace: &Address,
        item: &ItemId,
    ) -> Result<Option<FormattedChatKeys>, ChatError> {
        let material = self.ctx.keys.get(&ConversationId::new(*marketplace, *item));
        Ok(self.ctx.keyring.format_chat_keys(marketplace, item, &material)?)
    }

    /// Encrypt, sign, and publish `text` in the conversation.
    ///
    /// # Errors
    ///
    /// - `NoSymmetricKey` while the counterparty is only a candidate
    /// - `Transport` if no peer accepts the message
    pub async fn post_chat_message(
        &self,
        marketplace: Address,
        item: ItemId,
        text: impl Into<String>,
    ) -> Result<(), ChatError> {
        let payload = {
            let keys = self
                .chat_keys(&marketplace, &item)?
                .ok_or(ChatError::NoSymmetricKey)?;
            let message = ChatMessage {
                text: text.into(),
                sent_at: now_ms(),
            };
            JsonCodec.encode(&seal(&keys, &message)?)?
        };

        let topic = self.ctx.topics.chat(&marketplace, &item);
        self.ctx.publish(&topic, payload).await?;
        Ok(())
    }

    /// Follow the chat of `(marketplace, item)`.
    pub fn messages(&self, marketplace: Address, item: ItemId) -> CacheHandle<ConversationId, ChatState> {
        self.chats.get(ConversationId::new(marketplace, item))
    }
}
