//! # Item & Reply Pipeline
//!
//! Publishes listings and replies, follows replies to a listing, and
//! reconciles local listings with the chain. Value transfer is entirely the
//! chain collaborator's business.

use crate::domain::errors::MarketError;
use crate::domain::items::{
    item_reply_domain, reconcile_items, ItemMetadata, ItemReply, MarketplaceItem, ReconcileReport,
};
use crate::domain::key_material::ConversationId;
use crate::ports::{CallArg, ChainGateway, ContractCall, TxReceipt};
use crate::service::context::{now_ms, MessagingContext};
use crate::service::stream::follow_topics;
use pm_01_signed_envelope::{
    create_signed_payload, decode_signed_payload, JsonCodec, PayloadCodec, SignedEnvelope,
    TypedDataSigner,
};
use pm_02_event_cache::{CacheHandle, CacheSink, CacheSource, EventCache, Teardown};
use shared_bus::{Capability, QueryOptions, TransportMessage};
use shared_crypto::keccak256;
use shared_types::{Address, Hash, ItemId, U256};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Contract method that lists an item.
pub const CREATE_ITEM_METHOD: &str = "createItem";

/// Result of listing an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedItem {
    /// Hash committed on-chain.
    pub metadata_hash: Hash,
    /// Listing transaction.
    pub receipt: TxReceipt,
}

/// Cache source following one listing's reply topic.
///
/// On the listing owner's side every reply from another account is buffered
/// as a candidate counterparty. Other participants only collect the replies.
pub struct ReplySource {
    ctx: Arc<MessagingContext>,
}

impl ReplySource {
    /// Source over `ctx`.
    #[must_use]
    pub fn new(ctx: Arc<MessagingContext>) -> Self {
        Self { ctx }
    }
}

impl CacheSource<ConversationId, Vec<ItemReply>> for ReplySource {
    fn subscribe(&self, id: &ConversationId, sink: CacheSink<Vec<ItemReply>>) -> Teardown {
        let domain = match self.ctx.marketplace(&id.marketplace) {
            Ok(info) => item_reply_domain(info, &id.item),
            Err(e) => {
                warn!(conversation = %id, error = %e, "Not following replies");
                return Teardown::noop();
            }
        };

        let ctx = self.ctx.clone();
        let id = *id;
        let topics = vec![ctx.topics.item_reply(&id.marketplace, &id.item)];
        let on_message = {
            let ctx = ctx.clone();
            let sink = sink.clone();
            move |message: &TransportMessage| {
                let Some(envelope) =
                    decode_signed_payload::<ItemReply, _>(&domain, &JsonCodec, &message.payload)
                else {
                    return;
                };
                let reply = envelope.payload;
                if reply.marketplace != id.marketplace || reply.item != id.item {
                    debug!(conversation = %id, "Dropping reply for another listing");
                    return;
                }
                let owned = ctx.listing_owner(&id) == Some(ctx.account);
                if owned && reply.replier != ctx.account {
                    if let Err(e) = ctx.keys.add_candidate(&id, reply.replier, reply.key_exchange) {
                        warn!(conversation = %id, error = %e, "Failed to buffer candidate keys");
                    }
                }
                sink.update(|replies| {
                    let mut replies = replies.cloned().unwrap_or_default();
                    if !replies.contains(&reply) {
                        replies.push(reply);
                    }
                    replies
                });
            }
        };

        let task = tokio::spawn(async move {
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

/// Listing and reply flows.
pub struct ItemService {
    ctx: Arc<MessagingContext>,
    replies: EventCache<ConversationId, Vec<ItemReply>>,
}

impl ItemService {
    /// Service over `ctx`.
    #[must_use]
    pub fn new(ctx: Arc<MessagingContext>) -> Self {
        let source = Arc::new(ReplySource::new(ctx.clone()));
        let replies = EventCache::with_capacity(source, ctx.config.cache_capacity);
        Self { ctx, replies }
    }

    /// Publish `metadata` and list the item on-chain at `price`.
    ///
    /// # Errors
    ///
    /// Chain failures are returned as-is and never retried.
    pub async fn publish_item(
        &self,
        chain: &dyn ChainGateway,
        marketplace: Address,
        price: U256,
        metadata: &ItemMetadata,
    ) -> Result<PublishedItem, MarketError> {
        self.ctx.marketplace(&marketplace)?;
        let document = metadata.to_document()?;
        let metadata_hash = keccak256(&document);

        self.ctx
            .publish(&self.ctx.topics.item_metadata(&metadata_hash), document)
            .await?;

        let receipt = chain
            .submit(ContractCall {
                contract: marketplace,
                method: CREATE_ITEM_METHOD.to_string(),
                args: vec![CallArg::Uint(price), CallArg::Bytes32(metadata_hash)],
            })
            .await?;
        info!(
            marketplace = %marketplace,
            metadata = %hex::encode(metadata_hash),
            block = receipt.block_number,
            "Item listed"
        );

        Ok(PublishedItem {
            metadata_hash,
            receipt,
        })
    }

    /// Fetch the metadata document committed as `hash`.
    ///
    /// Documents that do not hash to `hash` are ignored.
    pub async fn fetch_item_metadata(&self, hash: &Hash) -> Result<Option<ItemMetadata>, MarketError> {
        let transport = &self.ctx.transport;
        transport
            .wait_for_capability(Capability::Store, self.ctx.config.peer_timeout)
            .await?;

        let mut found = None;
        let options = QueryOptions {
            page_size: self.ctx.config.page_size,
            ..QueryOptions::default()
        };
        transport
            .query_history(&[self.ctx.topics.item_metadata(hash)], options, &mut |page| {
                found = page
                    .iter()
                    .find_map(|m| ItemMetadata::from_document(&m.payload, hash));
                if found.is_some() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await?;
        Ok(found)
    }

    /// Reply to `item` with `message`, attaching our conversation keys.
    pub async fn publish_reply(
        &self,
        signer: &dyn TypedDataSigner,
        marketplace: Address,
        item: ItemId,
        message: impl Into<String>,
    ) -> Result<SignedEnvelope<ItemReply>, MarketError> {
        let info = self.ctx.marketplace(&marketplace)?;
        let key_exchange = self.ctx.keyring.key_exchange(&marketplace, &item)?;
        let message = message.into();
        let created_at = now_ms();

        let envelope = create_signed_payload(
            &item_reply_domain(info, &item),
            |replier| ItemReply {
                replier,
                marketplace,
                item,
                message,
                key_exchange,
                created_at,
            },
            signer,
        )
        .await?;

        let topic = self.ctx.topics.item_reply(&marketplace, &item);
        self.ctx.publish(&topic, JsonCodec.encode(&envelope)?).await?;
        debug!(marketplace = %marketplace, item = %item, "Reply published");
        Ok(envelope)
    }

    /// Follow replies to `item`. On our own listings repliers become
    /// candidates while the handle is held.
    pub fn replies(&self, marketplace: Address, item: ItemId) -> CacheHandle<ConversationId, Vec<ItemReply>> {
        self.replies.get(ConversationId::new(marketplace, item))
    }

    /// Bring `local` listings of `marketplace` in line with the chain.
    ///
    /// Also records every listing's owner in the messaging context.
    pub async fn reconcile(
        &self,
        chain: &dyn ChainGateway,
        marketplace: Address,
        local: &mut BTreeMap<ItemId, MarketplaceItem>,
    ) -> Result<ReconcileReport, MarketError> {
        let states = chain.item_states(marketplace).await?;
        for state in &states {
            self.ctx
                .record_listing_owner(ConversationId::new(marketplace, state.id), state.owner)?;
        }
        let report = reconcile_items(marketplace, local, &states);
        debug!(
            marketplace = %marketplace,
            updated = report.updated.len(),
            discovered = report.discovered.len(),
            illegal = report.illegal.len(),
            "Items reconciled"
        );
        Ok(report)
    }
}
