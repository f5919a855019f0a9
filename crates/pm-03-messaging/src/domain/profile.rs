//! # Local Profile
//!
//! The at-rest record of the local account plus the signed public subset
//! announced on the profile topic. Byte fields are persisted as unpadded
//! base64url.

use pm_01_signed_envelope::{Eip712Domain, TypedPayload, TypedStruct, TypedValue};
use serde::{Deserialize, Serialize};
use serde_with::base64::{Base64, UrlSafe};
use serde_with::formats::Unpadded;
use serde_with::serde_as;
use shared_crypto::SecretKey;
use shared_types::{Address, TimestampMs, U256};
use std::fmt;

/// Persisted local profile.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Display name.
    pub username: String,
    /// Account address.
    pub address: Address,
    /// Wallet key, encrypted at rest by the wallet layer.
    #[serde_as(as = "Base64<UrlSafe, Unpadded>")]
    pub encrypted_wallet_blob: Vec<u8>,
    /// Avatar URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Last local edit.
    pub last_update: TimestampMs,
    /// Last successful sync with the network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<TimestampMs>,
    /// Root secret for per-conversation keys.
    #[serde_as(as = "Base64<UrlSafe, Unpadded>")]
    pub chat_base_key: [u8; 32],
}

impl Profile {
    /// Root secret as a key.
    #[must_use]
    pub fn chat_base_key(&self) -> SecretKey {
        SecretKey::from_bytes(self.chat_base_key)
    }

    /// Public subset for announcing.
    #[must_use]
    pub fn public(&self) -> PublicProfile {
        PublicProfile {
            address: self.address,
            username: self.username.clone(),
            avatar: self.avatar.clone().unwrap_or_default(),
            last_update: self.last_update,
        }
    }

    /// Take the public fields of a newer announcement.
    pub fn merge_public(&mut self, remote: &PublicProfile) {
        self.username = remote.username.clone();
        self.avatar = (!remote.avatar.is_empty()).then(|| remote.avatar.clone());
        self.last_update = remote.last_update;
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("username", &self.username)
            .field("address", &self.address)
            .field("avatar", &self.avatar)
            .field("last_update", &self.last_update)
            .field("last_sync", &self.last_sync)
            .finish_non_exhaustive()
    }
}

/// Signed public profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    /// Account address; signs the announcement.
    pub address: Address,
    /// Display name.
    pub username: String,
    /// Avatar URI, empty if none.
    pub avatar: String,
    /// Edit time; the newest announcement wins.
    pub last_update: TimestampMs,
}

impl TypedPayload for PublicProfile {
    fn to_typed_struct(&self) -> TypedStruct {
        TypedStruct::new("Profile")
            .field("address", TypedValue::Address(self.address))
            .field("username", TypedValue::String(self.username.clone()))
            .field("avatar", TypedValue::String(self.avatar.clone()))
            .field("lastUpdate", TypedValue::Uint(U256::from(self.last_update)))
    }

    fn signer(&self) -> Address {
        self.address
    }
}

/// Signing domain for profile announcements of `app`.
#[must_use]
pub fn profile_domain(app: &str) -> Eip712Domain {
    Eip712Domain::new(format!("{app} Profile"), "1")
}
