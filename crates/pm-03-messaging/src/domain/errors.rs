//! # Messaging Errors
//!
//! Only capability, storage, and chain failures appear here. Forged or
//! malformed network input never becomes an error; it is filtered out.

use pm_01_signed_envelope::{CodecError, EnvelopeError};
use shared_bus::TransportError;
use shared_crypto::CryptoError;
use shared_types::{Address, Hash};
use thiserror::Error;

/// Errors from the encrypted chat channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    /// Counterparty keys are not confirmed yet.
    #[error("No symmetric key: counterparty keys not confirmed")]
    NoSymmetricKey,

    /// Key derivation, signing, or encryption failed.
    #[error("Chat crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Message could not be encoded.
    #[error("Chat codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport refused the message.
    #[error("Chat transport error: {0}")]
    Transport(#[from] TransportError),

    /// Key material could not be read.
    #[error("Chat store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the item, reply, and provider-selection flows.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarketError {
    /// Marketplace is not in the configuration.
    #[error("Unknown marketplace {0}")]
    UnknownMarketplace(Address),

    /// Signing the payload failed.
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// Payload could not be encoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport refused the message.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The on-chain collaborator failed.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Key derivation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Key material could not be persisted.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No signer could be obtained.
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
}

/// Errors from the profile sync actor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProfileError {
    /// Profile could not be read or written.
    #[error("Profile store error: {0}")]
    Store(#[from] StoreError),

    /// Signing the public profile failed.
    #[error("Profile envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// Public profile could not be encoded.
    #[error("Profile codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport failed.
    #[error("Profile transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors from local persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// File I/O failed.
    #[error("I/O error on {path}: {reason}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        reason: String,
    },

    /// Stored document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serde(String),

    /// Stored conversation key is not `<marketplace>:<item>`.
    #[error("Malformed conversation key: {0}")]
    BadKey(String),
}

/// Errors from loading configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// File I/O failed.
    #[error("Failed to read config {path}: {error}")]
    Io {
        /// Path of the file that failed to load.
        path: String,
        /// Error message from the I/O operation.
        error: String,
    },

    /// TOML was malformed.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("Invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors from the on-chain collaborator.
///
/// None of these are retried automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// No wallet or RPC connector is available.
    #[error("No connector available")]
    NoConnectorAvailable,

    /// The transaction was mined and reverted.
    #[error("Transaction 0x{} reverted: {reason}", hex::encode(.tx_hash))]
    TransactionReverted {
        /// Transaction hash.
        tx_hash: Hash,
        /// Revert reason, if decoded.
        reason: String,
    },

    /// The transaction was not mined in time.
    #[error("Transaction 0x{} not mined in time", hex::encode(.tx_hash))]
    TransactionTimeout {
        /// Transaction hash.
        tx_hash: Hash,
    },
}

/// Errors from the wallet collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    /// No wallet is connected.
    #[error("No connector available")]
    NoConnectorAvailable,
}
