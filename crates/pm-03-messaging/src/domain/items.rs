//! # Marketplace Items and Replies
//!
//! Listings are announced on-chain (price plus a metadata hash commitment)
//! while the metadata document itself travels over the transport, addressed
//! by its Keccak-256 hash. Replies are signed intents under a domain bound
//! to both the marketplace and the item.
//!
//! ## Status Lifecycle
//!
//! ```text
//! Open ──► Funded ──► Done
//!   │         │
//!   ▼         ▼
//! Cancelled  Disputed ──► Resolved
//! ```
//!
//! The chain is authoritative. Local state follows it even across an
//! illegal jump, which is reported rather than refused.

use crate::config::MarketplaceInfo;
use crate::domain::keys::KeyExchange;
use pm_01_signed_envelope::{
    CodecError, Eip712Domain, JsonCodec, PayloadCodec, TypedPayload, TypedStruct, TypedValue,
};
use serde::{Deserialize, Serialize};
use shared_crypto::keccak256;
use shared_types::{u256_word, Address, Hash, ItemId, TimestampMs, U256};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// On-chain status of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    /// Listed, awaiting a provider.
    Open,
    /// Provider selected and escrow funded.
    Funded,
    /// Work accepted and paid out.
    Done,
    /// Withdrawn before funding.
    Cancelled,
    /// Funded work under dispute.
    Disputed,
    /// Dispute settled.
    Resolved,
}

impl ItemStatus {
    /// Whether `self -> next` is a legal lifecycle step.
    #[must_use]
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (ItemStatus::Open, ItemStatus::Funded)
                | (ItemStatus::Open, ItemStatus::Cancelled)
                | (ItemStatus::Funded, ItemStatus::Done)
                | (ItemStatus::Funded, ItemStatus::Disputed)
                | (ItemStatus::Disputed, ItemStatus::Resolved)
        )
    }

    /// No further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Done | ItemStatus::Cancelled | ItemStatus::Resolved
        )
    }
}

/// Off-chain description of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Search tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ItemMetadata {
    /// Canonical document bytes.
    pub fn to_document(&self) -> Result<Vec<u8>, CodecError> {
        JsonCodec.encode(self)
    }

    /// Parse a fetched document, accepting it only if it hashes to `expected`.
    #[must_use]
    pub fn from_document(bytes: &[u8], expected: &Hash) -> Option<Self> {
        if keccak256(bytes) != *expected {
            debug!(expected = %hex::encode(expected), "Metadata document hash mismatch");
            return None;
        }
        serde_json::from_slice(bytes).ok()
    }
}

/// A listing as known locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceItem {
    /// Listing id.
    pub id: ItemId,
    /// Marketplace contract.
    pub marketplace: Address,
    /// Account that listed it (the seeker).
    pub owner: Address,
    /// Price in the marketplace's token units.
    pub price: U256,
    /// Keccak-256 of the metadata document.
    pub metadata_hash: Hash,
    /// Last known status.
    pub status: ItemStatus,
    /// Resolved metadata, once fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ItemMetadata>,
}

/// Item state as reported by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainItem {
    /// Listing id.
    pub id: ItemId,
    /// Listing owner.
    pub owner: Address,
    /// Listed price.
    pub price: U256,
    /// Committed metadata hash.
    pub metadata_hash: Hash,
    /// Current status.
    pub status: ItemStatus,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Items whose status changed.
    pub updated: Vec<ItemId>,
    /// Items first seen on-chain.
    pub discovered: Vec<ItemId>,
    /// Status changes that skipped lifecycle steps.
    pub illegal: Vec<(ItemId, ItemStatus, ItemStatus)>,
}

/// Bring `local` in line with the chain's view of `marketplace`.
pub fn reconcile_items(
    marketplace: Address,
    local: &mut BTreeMap<ItemId, MarketplaceItem>,
    chain: &[OnChainItem],
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for on_chain in chain {
        match local.get_mut(&on_chain.id) {
            Some(item) if item.status == on_chain.status => {}
            Some(item) => {
                if !item.status.can_transition_to(on_chain.status) {
                    warn!(
                        item = %on_chain.id,
                        from = ?item.status,
                        to = ?on_chain.status,
                        "On-chain status skipped lifecycle steps, following chain"
                    );
                    report.illegal.push((on_chain.id, item.status, on_chain.status));
                }
                item.status = on_chain.status;
                report.updated.push(on_chain.id);
            }
            None => {
                local.insert(
                    on_chain.id,
                    MarketplaceItem {
                        id: on_chain.id,
                        marketplace,
                        owner: on_chain.owner,
                        price: on_chain.price,
                        metadata_hash: on_chain.metadata_hash,
                        status: on_chain.status,
                        metadata: None,
                    },
                );
                report.discovered.push(on_chain.id);
            }
        }
    }
    report
}

/// A provider's answer to a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReply {
    /// Replying provider; signs the reply.
    pub replier: Address,
    /// Marketplace contract.
    pub marketplace: Address,
    /// Listing id.
    pub item: ItemId,
    /// Pitch to the seeker.
    pub message: String,
    /// Provider's conversation keys, buffered by the seeker as a candidate.
    pub key_exchange: KeyExchange,
    /// Creation time.
    pub created_at: TimestampMs,
}

impl TypedPayload for ItemReply {
    fn to_typed_struct(&self) -> TypedStruct {
        TypedStruct::new("ItemReply")
            .field("replier", TypedValue::Address(self.replier))
            .field("marketplace", TypedValue::Address(self.marketplace))
            .field("item", TypedValue::Uint(self.item))
            .field("message", TypedValue::String(self.message.clone()))
            .field("keyExchange", TypedValue::Struct(self.key_exchange.to_typed_struct()))
            .field("createdAt", TypedValue::Uint(U256::from(self.created_at)))
    }

    fn signer(&self) -> Address {
        self.replier
    }
}

/// Signing domain for replies to `item` on `marketplace`.
#[must_use]
pub fn item_reply_domain(marketplace: &MarketplaceInfo, item: &ItemId) -> Eip712Domain {
    Eip712Domain::new(format!("{} ItemReply", marketplace.name), "1")
        .with_chain_id(marketplace.chain_id)
        .with_verifying_contract(marketplace.address)
        .with_salt(u256_word(item))
}
