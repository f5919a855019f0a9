//! # Provider Selection Payload
//!
//! A seeker picks one provider for a listing and, in the same signed act,
//! announces the keys the provider needs to open the encrypted channel.
//! The payload is signed under the marketplace's own domain, so it cannot be
//! replayed on another marketplace.

use crate::domain::keys::KeyExchange;
use pm_01_signed_envelope::{TypedPayload, TypedStruct, TypedValue};
use serde::{Deserialize, Serialize};
use shared_types::{Address, ItemId};

/// "Seeker chose this provider for this item, here are my keys."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectProvider {
    /// Account that owns the listing and signs the selection.
    pub seeker: Address,
    /// Chosen provider.
    pub provider: Address,
    /// Listing id.
    pub item: ItemId,
    /// Marketplace contract.
    pub marketplace: Address,
    /// Seeker's conversation keys.
    pub key_exchange: KeyExchange,
}

impl TypedPayload for SelectProvider {
    fn to_typed_struct(&self) -> TypedStruct {
        TypedStruct::new("SelectProvider")
            .field("seeker", TypedValue::Address(self.seeker))
            .field("provider", TypedValue::Address(self.provider))
            .field("item", TypedValue::Uint(self.item))
            .field("marketplace", TypedValue::Address(self.marketplace))
            .field("keyExchange", TypedValue::Struct(self.key_exchange.to_typed_struct()))
    }

    fn signer(&self) -> Address {
        self.seeker
    }
}

/// How a received selection relates to the local account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRole {
    /// We are the chosen provider: the seeker's keys are confirmed.
    ChosenProvider,
    /// We are the seeker: our chosen candidate is promoted.
    Seeker,
    /// Someone else's conversation.
    Observer,
}

impl SelectProvider {
    /// Role of `me` in this selection.
    #[must_use]
    pub fn role_of(&self, me: &Address) -> SelectionRole {
        if self.provider == *me {
            SelectionRole::ChosenProvider
        } else if self.seeker == *me {
            SelectionRole::Seeker
        } else {
            SelectionRole::Observer
        }
    }
}
