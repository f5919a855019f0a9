//! # Envelope Errors
//!
//! Only capability failures are errors. A forged or malformed envelope is
//! not an error: decoding yields `None` and verification yields `false`.

use crate::ports::outbound::SignerKind;
use shared_crypto::CryptoError;
use shared_types::Address;
use thiserror::Error;

/// Errors raised while creating a signed envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The signer cannot produce typed-data signatures we accept.
    #[error("Unsupported signer kind: {0:?}")]
    UnsupportedSignerKind(SignerKind),

    /// The formatted payload names a different signer than the one signing.
    #[error("Payload signer {claimed} does not match signing account {actual}")]
    SignerFieldMismatch {
        /// Signer named inside the payload.
        claimed: Address,
        /// Account that holds the signing capability.
        actual: Address,
    },

    /// The signing capability failed.
    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),
}

/// Errors raised by a typed-data signing capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignerError {
    /// The user or wallet declined to sign.
    #[error("Signature request rejected: {0}")]
    Rejected(String),

    /// The key material could not sign.
    #[error("Signing failed: {0}")]
    Crypto(#[from] CryptoError),
}

/// Errors raised by a payload codec.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Value could not be encoded.
    #[error("{codec} encode failed: {reason}")]
    Encode {
        /// Codec name.
        codec: &'static str,
        /// Underlying error.
        reason: String,
    },

    /// Bytes could not be decoded.
    #[error("{codec} decode failed: {reason}")]
    Decode {
        /// Codec name.
        codec: &'static str,
        /// Underlying error.
        reason: String,
    },
}
