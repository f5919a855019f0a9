//! # Outbound Ports (Driven Ports / SPI)
//!
//! The signing capability and the wire codec are supplied by the caller.

use crate::domain::eip712::{Eip712Domain, TypedStruct};
use crate::domain::errors::{CodecError, SignerError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_crypto::RecoverableSignature;
use shared_types::Address;

/// Where the signing key lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignerKind {
    /// Key held in this process.
    LocalKey,
    /// Browser-extension style wallet.
    Injected,
    /// Remote signer reached over a bridge protocol.
    Remote,
}

/// A capability that signs EIP-712 typed data for one account.
#[async_trait]
pub trait TypedDataSigner: Send + Sync {
    /// Where the key lives.
    fn kind(&self) -> SignerKind;

    /// Account this signer signs for.
    async fn address(&self) -> Result<Address, SignerError>;

    /// Sign `value` under `domain`.
    ///
    /// # Errors
    ///
    /// `SignerError::Rejected` if the holder declines.
    async fn sign_typed_data(
        &self,
        domain: &Eip712Domain,
        value: &TypedStruct,
    ) -> Result<RecoverableSignature, SignerError>;
}

/// Wire codec for payloads carried by the transport.
pub trait PayloadCodec: Send + Sync {
    /// Codec name for logs.
    fn name(&self) -> &'static str;

    /// Encode a value.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode a value.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}
