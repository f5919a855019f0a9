//! # Conversation Key Material
//!
//! Per `(marketplace, item)` record of the counterparty's public keys.
//!
//! ## Invariants
//!
//! - Confirmation is one-way: once confirmed keys exist they are never
//!   replaced, and candidate entries are discarded.
//! - Candidates are only consulted while nothing is confirmed.

use crate::domain::errors::StoreError;
use crate::domain::keys::KeyExchange;
use serde::{Deserialize, Serialize};
use serde_with::base64::{Base64, UrlSafe};
use serde_with::formats::Unpadded;
use serde_with::serde_as;
use shared_crypto::Secp256k1PublicKey;
use shared_types::{Address, ItemId, U256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Identifies one listing's conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId {
    /// Marketplace contract.
    pub marketplace: Address,
    /// Listing id.
    pub item: ItemId,
}

impl ConversationId {
    /// Conversation for `(marketplace, item)`.
    #[must_use]
    pub fn new(marketplace: Address, item: ItemId) -> Self {
        Self { marketplace, item }
    }
}

/// Renders the persisted `<marketplace>:<item>` key.
impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.marketplace, self.item)
    }
}

impl FromStr for ConversationId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || StoreError::BadKey(s.to_string());
        let (marketplace, item) = s.split_once(':').ok_or_else(bad)?;
        Ok(Self {
            marketplace: marketplace.parse().map_err(|_| bad())?,
            item: U256::from_dec_str(item).map_err(|_| bad())?,
        })
    }
}

/// What a candidate promotion did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// The candidate became the confirmed counterparty.
    Promoted,
    /// Keys were already confirmed; nothing changed.
    AlreadyConfirmed,
    /// No candidate is buffered for that address.
    NoCandidate,
}

/// Counterparty key state of one conversation.
///
/// Persisted with public keys as unpadded base64url.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationKeyMaterial {
    #[serde_as(as = "Option<Base64<UrlSafe, Unpadded>>")]
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "theirSigPubKey")]
    their_sig_pub_key: Option<Secp256k1PublicKey>,
    #[serde_as(as = "Option<Base64<UrlSafe, Unpadded>>")]
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "theirECDHPubKey")]
    their_ecdh_pub_key: Option<Secp256k1PublicKey>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    temp: BTreeMap<Address, KeyExchange>,
}

impl ConversationKeyMaterial {
    /// Confirmed counterparty keys, if both halves are known.
    #[must_use]
    pub fn confirmed(&self) -> Option<KeyExchange> {
        Some(KeyExchange {
            sig_pub_key: self.their_sig_pub_key?,
            ecdh_pub_key: self.their_ecdh_pub_key?,
        })
    }

    /// True once a counterparty is confirmed.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.confirmed().is_some()
    }

    /// Buffered candidate for `address`.
    #[must_use]
    pub fn candidate(&self, address: &Address) -> Option<&KeyExchange> {
        self.temp.get(address)
    }

    /// Number of buffered candidates.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.temp.len()
    }

    /// Buffer a candidate's keys. Ignored once confirmed.
    ///
    /// Returns true if the record changed.
    pub fn add_candidate(&mut self, address: Address, keys: KeyExchange) -> bool {
        if self.is_confirmed() {
            return false;
        }
        self.temp.insert(address, keys) != Some(keys)
    }

    /// Confirm `keys` as the counterparty. No-op if already confirmed.
    ///
    /// Returns true if the record changed.
    pub fn confirm(&mut self, keys: KeyExchange) -> bool {
        if self.is_confirmed() {
            return false;
        }
        self.their_sig_pub_key = Some(keys.sig_pub_key);
        self.their_ecdh_pub_key = Some(keys.ecdh_pub_key);
        self.temp.clear();
        true
    }

    /// Promote the candidate buffered for `address`.
    pub fn select_temp(&mut self, address: &Address) -> Promotion {
        if self.is_confirmed() {
            return Promotion::AlreadyConfirmed;
        }
        match self.temp.get(address).copied() {
            Some(keys) => {
                self.confirm(keys);
                Promotion::Promoted
            }
            None => Promotion::NoCandidate,
        }
    }
}
