//! # Chat Key Derivation
//!
//! Every per-conversation key is a pure function of one long-term root
//! secret (the chat base key) and public parameters:
//!
//! ```text
//! ikm  = chat base key
//! salt = kind label || marketplace (20 bytes) || item (32-byte word)
//! info = "peer-market/chat/" || kind label || counter
//! key  = HKDF-SHA256(ikm, salt, info)   retried with counter+1 until
//!                                       the output is a valid scalar
//! ```
//!
//! Nothing derived here is persisted. Keys are rebuilt whenever needed.

use crate::domain::key_material::ConversationKeyMaterial;
use pm_01_signed_envelope::{TypedStruct, TypedValue};
use serde::{Deserialize, Serialize};
use serde_with::base64::{Base64, UrlSafe};
use serde_with::formats::Unpadded;
use serde_with::serde_as;
use shared_crypto::{
    hkdf_sha256, CryptoError, EcdhSecret, Secp256k1KeyPair, Secp256k1PublicKey, SecretKey,
};
use shared_types::{u256_word, Address, ItemId};
use std::fmt;

const INFO_PREFIX: &[u8] = b"peer-market/chat/";

/// Bound on scalar-rejection retries. Each retry fails with probability
/// below 2^-127, so this is never reached in practice.
const MAX_DERIVE_ATTEMPTS: u8 = 16;

/// Purpose of a derived key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Key agreement with the counterparty.
    Ecdh,
    /// Signing chat messages.
    Ecdsa,
}

impl KeyKind {
    /// Domain-separation label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            KeyKind::Ecdh => "ecdh",
            KeyKind::Ecdsa => "ecdsa",
        }
    }
}

/// Derive the raw private key of `kind` for one conversation.
///
/// # Errors
///
/// `CryptoError::InvalidPrivateKey` only if every retry lands outside the
/// scalar field.
pub fn derive_chat_private_key(
    chat_base_key: &SecretKey,
    marketplace: &Address,
    item: &ItemId,
    kind: KeyKind,
) -> Result<SecretKey, CryptoError> {
    let label = kind.label().as_bytes();
    let mut salt = Vec::with_capacity(label.len() + 20 + 32);
    salt.extend_from_slice(label);
    salt.extend_from_slice(marketplace.as_bytes());
    salt.extend_from_slice(&u256_word(item));

    for counter in 0..MAX_DERIVE_ATTEMPTS {
        let mut info = Vec::with_capacity(INFO_PREFIX.len() + label.len() + 1);
        info.extend_from_slice(INFO_PREFIX);
        info.extend_from_slice(label);
        info.push(counter);

        let candidate = SecretKey::from_bytes(hkdf_sha256::<32>(
            chat_base_key.as_bytes(),
            &salt,
            &info,
        )?);
        if Secp256k1KeyPair::is_valid_secret(candidate.as_bytes()) {
            return Ok(candidate);
        }
    }
    Err(CryptoError::InvalidPrivateKey)
}

/// Public half of a party's conversation keys, announced to the counterparty.
///
/// Keys travel and persist as unpadded base64url of the compressed point.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyExchange {
    /// Public key chat messages are signed with.
    #[serde_as(as = "Base64<UrlSafe, Unpadded>")]
    pub sig_pub_key: Secp256k1PublicKey,
    /// Public key for ECDH.
    #[serde_as(as = "Base64<UrlSafe, Unpadded>")]
    pub ecdh_pub_key: Secp256k1PublicKey,
}

impl KeyExchange {
    /// Signing encoding, nested inside other typed payloads.
    #[must_use]
    pub fn to_typed_struct(&self) -> TypedStruct {
        TypedStruct::new("KeyExchange")
            .field("sigPubKey", TypedValue::Bytes(self.sig_pub_key.as_bytes().to_vec()))
            .field("ecdhPubKey", TypedValue::Bytes(self.ecdh_pub_key.as_bytes().to_vec()))
    }
}

/// Ready-to-use key set for one confirmed conversation.
///
/// Held only for the duration of the operation that needs it.
pub struct FormattedChatKeys {
    /// AES-256-GCM key shared with the counterparty.
    pub sym_key: SecretKey,
    /// Our per-conversation signing key.
    pub my_sig_key: Secp256k1KeyPair,
    /// Public half of `my_sig_key`.
    pub my_sig_pub_key: Secp256k1PublicKey,
    /// Counterparty's confirmed signing key.
    pub their_sig_pub_key: Secp256k1PublicKey,
}

impl fmt::Debug for FormattedChatKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormattedChatKeys")
            .field("my_sig_pub_key", &self.my_sig_pub_key)
            .field("their_sig_pub_key", &self.their_sig_pub_key)
            .finish_non_exhaustive()
    }
}

/// Key derivation bound to one root secret.
#[derive(Clone)]
pub struct ChatKeyring {
    chat_base_key: SecretKey,
}

impl ChatKeyring {
    /// Keyring over `chat_base_key`.
    #[must_use]
    pub fn new(chat_base_key: SecretKey) -> Self {
        Self { chat_base_key }
    }

    /// Raw private key of `kind` for `(marketplace, item)`.
    pub fn derive(
        &self,
        marketplace: &Address,
        item: &ItemId,
        kind: KeyKind,
    ) -> Result<SecretKey, CryptoError> {
        derive_chat_private_key(&self.chat_base_key, marketplace, item, kind)
    }

    fn signing_key(&self, marketplace: &Address, item: &ItemId) -> Result<Secp256k1KeyPair, CryptoError> {
        let secret = self.derive(marketplace, item, KeyKind::Ecdsa)?;
        Secp256k1KeyPair::from_bytes(*secret.as_bytes())
    }

    fn ecdh_secret(&self, marketplace: &Address, item: &ItemId) -> Result<EcdhSecret, CryptoError> {
        let secret = self.derive(marketplace, item, KeyKind::Ecdh)?;
        EcdhSecret::from_bytes(*secret.as_bytes())
    }

    /// Public keys to announce for `(marketplace, item)`.
    pub fn key_exchange(&self, marketplace: &Address, item: &ItemId) -> Result<KeyExchange, CryptoError> {
        Ok(KeyExchange {
            sig_pub_key: self.signing_key(marketplace, item)?.public_key(),
            ecdh_pub_key: self.ecdh_secret(marketplace, item)?.public_key(),
        })
    }

    /// Full chat key set, or `None` while the counterparty is unconfirmed.
    pub fn format_chat_keys(
        &self,
        marketplace: &Address,
        item: &ItemId,
        material: &ConversationKeyMaterial,
    ) -> Result<Option<FormattedChatKeys>, CryptoError> {
        let Some(theirs) = material.confirmed() else {
            return Ok(None);
        };

        let sym_key = self
            .ecdh_secret(marketplace, item)?
            .shared_key(&theirs.ecdh_pub_key)?;
        let my_sig_key = self.signing_key(marketplace, item)?;
        let my_sig_pub_key = my_sig_key.public_key();

        Ok(Some(FormattedChatKeys {
            sym_key,
            my_sig_key,
            my_sig_pub_key,
            their_sig_pub_key: theirs.sig_pub_key,
        }))
    }
}

impl fmt::Debug for ChatKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChatKeyring(..)")
    }
}
