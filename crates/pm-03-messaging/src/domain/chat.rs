//! # Encrypted Chat Envelope
//!
//! ```text
//! ChatMessage ──json──► body
//! body, sign(keccak(body)) ──json──► SignedBody
//! SignedBody ──AES-256-GCM(symKey)──► SealedChatMessage { nonce, ciphertext }
//! ```
//!
//! Confidentiality comes from the shared symmetric key, authorship from the
//! per-conversation signing key. A holder of the symmetric key alone cannot
//! forge a message that attributes to either participant.

use crate::domain::errors::ChatError;
use crate::domain::keys::FormattedChatKeys;
use pm_01_signed_envelope::{JsonCodec, PayloadCodec};
use serde::{Deserialize, Serialize};
use serde_with::base64::{Base64, UrlSafe};
use serde_with::formats::Unpadded;
use serde_with::serde_as;
use shared_crypto::{
    decrypt, encrypt, keccak256, Nonce, RecoverableSignature, Secp256k1PublicKey, SecretKey,
};
use shared_types::{Hash, TimestampMs};
use tracing::debug;

/// A chat message as written by its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message text.
    pub text: String,
    /// Author's clock at send time.
    pub sent_at: TimestampMs,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignedBody {
    #[serde_as(as = "Base64<UrlSafe, Unpadded>")]
    body: Vec<u8>,
    signature: RecoverableSignature,
}

/// Wire form of a chat message.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedChatMessage {
    /// AES-GCM nonce.
    #[serde_as(as = "Base64<UrlSafe, Unpadded>")]
    pub nonce: [u8; 12],
    /// Encrypted `SignedBody`.
    #[serde_as(as = "Base64<UrlSafe, Unpadded>")]
    pub ciphertext: Vec<u8>,
}

/// A decrypted message and the key that signed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedChatMessage {
    /// The message.
    pub message: ChatMessage,
    /// Recovered signing key.
    pub signer: Secp256k1PublicKey,
}

/// Encrypt and sign `message` for the conversation `keys` belong to.
pub fn seal(keys: &FormattedChatKeys, message: &ChatMessage) -> Result<SealedChatMessage, ChatError> {
    let body = JsonCodec.encode(message)?;
    let signature = keys.my_sig_key.sign_message(&body)?;
    let plaintext = JsonCodec.encode(&SignedBody { body, signature })?;

    let (ciphertext, nonce) = encrypt(&keys.sym_key, &plaintext)?;
    Ok(SealedChatMessage {
        nonce: *nonce.as_bytes(),
        ciphertext,
    })
}

/// Decrypt `sealed` and recover its signer. `None` for anything malformed.
#[must_use]
pub fn open(sym_key: &SecretKey, sealed: &SealedChatMessage) -> Option<OpenedChatMessage> {
    let plaintext = decrypt(sym_key, &sealed.ciphertext, &Nonce::from_bytes(sealed.nonce))
        .map_err(|e| debug!(error = %e, "Dropping chat message that does not decrypt"))
        .ok()?;
    let signed: SignedBody = serde_json::from_slice(&plaintext).ok()?;
    let signer = signed
        .signature
        .recover_public_key(&keccak256(&signed.body))
        .ok()?;
    let message = serde_json::from_slice(&signed.body).ok()?;
    Some(OpenedChatMessage { message, signer })
}

/// Who wrote a message, from the reader's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The local participant.
    Me,
    /// The counterparty.
    Them,
}

/// Label `signer` against the two known conversation keys.
///
/// `None` means neither participant signed it; such messages are dropped.
#[must_use]
pub fn attribute(
    signer: &Secp256k1PublicKey,
    my_sig_pub_key: &Secp256k1PublicKey,
    their_sig_pub_key: &Secp256k1PublicKey,
) -> Option<Sender> {
    if signer == my_sig_pub_key {
        Some(Sender::Me)
    } else if signer == their_sig_pub_key {
        Some(Sender::Them)
    } else {
        None
    }
}

/// One displayed chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    /// Hash of the wire payload, used to suppress duplicate deliveries.
    pub id: Hash,
    /// Message text.
    pub text: String,
    /// Author, from the reader's point of view.
    pub from: Sender,
    /// Author's clock at send time.
    pub sent_at: TimestampMs,
}

/// State of one conversation's chat as seen by a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    /// Counterparty keys are not confirmed yet.
    WaitingForPeer,
    /// Channel is open; messages in local arrival order.
    Open {
        /// Received messages.
        messages: Vec<ChatEntry>,
    },
}

impl ChatState {
    /// Open channel with no messages.
    #[must_use]
    pub fn open() -> Self {
        ChatState::Open {
            messages: Vec::new(),
        }
    }

    /// Messages received so far.
    #[must_use]
    pub fn messages(&self) -> &[ChatEntry] {
        match self {
            ChatState::WaitingForPeer => &[],
            ChatState::Open { messages } => messages,
        }
    }

    /// Whether the channel is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, ChatState::Open { .. })
    }

    /// Append `entry` unless the same payload was already seen.
    ///
    /// Returns true if the entry was added.
    pub fn append(&mut self, entry: ChatEntry) -> bool {
        if let ChatState::WaitingForPeer = self {
            *self = ChatState::open();
        }
        let ChatState::Open { messages } = self else {
            return false;
        };
        if messages.iter().any(|m| m.id == entry.id) {
            return false;
        }
        messages.push(entry);
        true
    }
}

/// Turn one wire payload into a chat entry for the reader holding `keys`.
#[must_use]
pub fn receive(keys: &FormattedChatKeys, payload: &[u8]) -> Option<ChatEntry> {
    let sealed: SealedChatMessage = serde_json::from_slice(payload).ok()?;
    let opened = open(&keys.sym_key, &sealed)?;
    let Some(from) = attribute(&opened.signer, &keys.my_sig_pub_key, &keys.their_sig_pub_key)
    else {
        debug!(signer = ?opened.signer, "Dropping unattributable chat message");
        return None;
    };
    Some(ChatEntry {
        id: keccak256(payload),
        text: opened.message.text,
        from,
        sent_at: opened.message.sent_at,
    })
}
