//! # Provider-Selection Handshake
//!
//! The seeker signs "I chose this provider, here are my keys" under the
//! marketplace domain and publishes it on the listing's selection topic.
//!
//! ## Listener Behaviour
//!
//! | Local role       | Effect on key material                              |
//! |------------------|-----------------------------------------------------|
//! | chosen provider  | seeker's keys confirmed if the seeker owns the item |
//! |                  | buffered as a candidate while the owner is unknown  |
//! | seeker           | buffered candidate of the provider promoted         |
//! | observer         | none                                                |
//!
//! Anyone can sign a selection naming themselves as seeker, so only the
//! listing owner's selection counts. Owners are learned from chain state
//! (`MessagingContext::record_listing_owner`). Selections from anyone else
//! are dropped once the owner is known. Until then the first valid
//! selection is reported, and a later one from the owner replaces it.

use crate::domain::errors::{MarketError, StoreError};
use crate::domain::key_material::{ConversationId, Promotion};
use crate::domain::select_provider::{SelectProvider, SelectionRole};
use crate::ports::WalletProvider;
use crate::service::context::MessagingContext;
use crate::service::stream::follow_topics;
use pm_01_signed_envelope::{
    create_signed_payload, decode_signed_payload, Eip712Domain, JsonCodec, PayloadCodec,
    SignedEnvelope, TypedDataSigner,
};
use pm_02_event_cache::{CacheHandle, CacheSink, CacheSource, EventCache, Teardown};
use shared_types::{Address, ItemId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a selection did to local key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// We are the provider and now trust the seeker's keys.
    ConfirmedSeeker,
    /// We are the seeker and the provider's candidate keys were promoted.
    PromotedProvider,
    /// Keys were already confirmed; nothing changed.
    AlreadyConfirmed,
    /// We are the provider; the seeker's keys wait until the owner is known.
    BufferedSeeker,
    /// Signed by someone other than the listing owner.
    NotListingOwner,
    /// We are the seeker but never saw the provider's reply keys.
    NoCandidate,
    /// Not our conversation.
    Ignored,
}

/// Feed a verified selection into the local key store.
///
/// As the chosen provider, only a selection signed by the listing owner
/// confirms keys.
pub fn apply_selection(
    ctx: &MessagingContext,
    selection: &SelectProvider,
) -> Result<HandshakeOutcome, StoreError> {
    let id = ConversationId::new(selection.marketplace, selection.item);
    let outcome = match selection.role_of(&ctx.account) {
        SelectionRole::ChosenProvider => match ctx.listing_owner(&id) {
            Some(owner) if owner == selection.seeker => {
                if ctx.keys.confirm(&id, selection.key_exchange)? {
                    HandshakeOutcome::ConfirmedSeeker
                } else {
                    HandshakeOutcome::AlreadyConfirmed
                }
            }
            Some(_) => HandshakeOutcome::NotListingOwner,
            None => {
                ctx.keys
                    .add_candidate(&id, selection.seeker, selection.key_exchange)?;
                HandshakeOutcome::BufferedSeeker
            }
        },
        SelectionRole::Seeker => match ctx.keys.select_temp_chat_key(&id, &selection.provider)? {
            Promotion::Promoted => HandshakeOutcome::PromotedProvider,
            Promotion::AlreadyConfirmed => HandshakeOutcome::AlreadyConfirmed,
            Promotion::NoCandidate => HandshakeOutcome::NoCandidate,
        },
        SelectionRole::Observer => HandshakeOutcome::Ignored,
    };
    debug!(conversation = %id, ?outcome, "Applied provider selection");
    Ok(outcome)
}

/// Decode a selection received on the topic of `id`.
///
/// Rejects forged envelopes and selections that name another listing.
#[must_use]
pub fn decode_selection(
    domain: &Eip712Domain,
    id: &ConversationId,
    bytes: &[u8],
) -> Option<SignedEnvelope<SelectProvider>> {
    let envelope: SignedEnvelope<SelectProvider> = decode_signed_payload(domain, &JsonCodec, bytes)?;
    let selection = &envelope.payload;
    if selection.marketplace != id.marketplace || selection.item != id.item {
        debug!(conversation = %id, "Dropping selection for another listing");
        return None;
    }
    Some(envelope)
}

/// Cache source following one listing's selection topic.
pub struct SelectionSource {
    ctx: Arc<MessagingContext>,
}

impl SelectionSource {
    /// Source over `ctx`.
    #[must_use]
    pub fn new(ctx: Arc<MessagingContext>) -> Self {
        Self { ctx }
    }
}

impl CacheSource<ConversationId, SelectProvider> for SelectionSource {
    fn subscribe(&self, id: &ConversationId, sink: CacheSink<SelectProvider>) -> Teardown {
        let domain = match self.ctx.marketplace(&id.marketplace) {
            Ok(info) => info.domain(),
            Err(e) => {
                warn!(conversation = %id, error = %e, "Not following selections");
                return Teardown::noop();
            }
        };

        let ctx = self.ctx.clone();
        let id = *id;
        let topics = vec![ctx.topics.select_provider(&id.marketplace, &id.item)];
        let on_message = {
            let ctx = ctx.clone();
            let sink = sink.clone();
            let mut reported: Option<Address> = None;
            move |message: &shared_bus::TransportMessage| {
                let Some(envelope) = decode_selection(&domain, &id, &message.payload) else {
                    return;
                };
                let selection = envelope.payload;
                let owner = ctx.listing_owner(&id);
                if owner.is_some_and(|owner| owner != selection.seeker) {
                    debug!(
                        conversation = %id,
                        seeker = %selection.seeker,
                        "Dropping selection not made by the listing owner"
                    );
                    return;
                }
                if let Err(e) = apply_selection(&ctx, &selection) {
                    warn!(conversation = %id, error = %e, "Failed to store selection keys");
                }
                let from_owner = owner == Some(selection.seeker);
                if reported.is_none() || (from_owner && reported != owner) {
                    reported = Some(selection.seeker);
                    sink.emit(selection);
                }
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

/// Creates selections and follows them.
pub struct SelectProviderService {
    ctx: Arc<MessagingContext>,
    selections: EventCache<ConversationId, SelectProvider>,
}

impl SelectProviderService {
    /// Service over `ctx`.
    #[must_use]
    pub fn new(ctx: Arc<MessagingContext>) -> Self {
        let source = Arc::new(SelectionSource::new(ctx.clone()));
        let selections = EventCache::with_capacity(source, ctx.config.cache_capacity);
        Self { ctx, selections }
    }

    /// Choose `provider` for `item` and announce our keys to them.
    ///
    /// On success the provider's buffered reply keys are promoted locally.
    ///
    /// # Errors
    ///
    /// - `UnknownMarketplace` if `marketplace` is not configured
    /// - `Envelope` if the signer is unsupported or fails
    /// - `Transport` if no peer accepts the selection
    pub async fn create_select_provider(
        &self,
        signer: &dyn TypedDataSigner,
        marketplace: Address,
        provider: Address,
        item: ItemId,
    ) -> Result<SignedEnvelope<SelectProvider>, MarketError> {
        let info = self.ctx.marketplace(&marketplace)?;
        let key_exchange = self.ctx.keyring.key_exchange(&marketplace, &item)?;

        let envelope = create_signed_payload(
            &info.domain(),
            |seeker| SelectProvider {
                seeker,
                provider,
                item,
                marketplace,
                key_exchange,
            },
            signer,
        )
        .await?;

        let topic = self.ctx.topics.select_provider(&marketplace, &item);
        self.ctx.publish(&topic, JsonCodec.encode(&envelope)?).await?;
        info!(marketplace = %marketplace, item = %item, provider = %provider, "Provider selected");

        apply_selection(&self.ctx, &envelope.payload)?;
        Ok(envelope)
    }

    /// `create_select_provider` with the signer of the connected wallet.
    ///
    /// # Errors
    ///
    /// `Wallet` if no wallet is connected, otherwise as `create_select_provider`.
    pub async fn select_provider_with(
        &self,
        wallet: &dyn WalletProvider,
        marketplace: Address,
        provider: Address,
        item: ItemId,
    ) -> Result<SignedEnvelope<SelectProvider>, MarketError> {
        let signer = wallet.signer().await?;
        self.create_select_provider(signer.as_ref(), marketplace, provider, item)
            .await
    }

    /// Follow selections for `item`. Key material is updated while held.
    pub fn selection(&self, marketplace: Address, item: ItemId) -> CacheHandle<ConversationId, SelectProvider> {
        self.selections.get(ConversationId::new(marketplace, item))
    }
}
