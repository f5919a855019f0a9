//! # Signed Envelope
//!
//! A payload bound to its author's account by an EIP-712 signature.
//!
//! Each payload type has two explicit encodings:
//! - the wire form, derived with serde
//! - the signing form, built by `TypedPayload::to_typed_struct`

use super::eip712::{typed_data_digest, Eip712Domain, TypedStruct};
use serde::{Deserialize, Serialize};
use shared_crypto::RecoverableSignature;
use shared_types::Address;

/// A payload type that can be signed as EIP-712 typed data.
pub trait TypedPayload {
    /// Signing encoding of this value.
    fn to_typed_struct(&self) -> TypedStruct;

    /// Account expected to have signed this value.
    fn signer(&self) -> Address;
}

/// A payload plus the signature over its typed-data digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope<T> {
    /// The signed value.
    pub payload: T,
    /// 65-byte recoverable signature.
    pub signature: RecoverableSignature,
}

impl<T: TypedPayload> SignedEnvelope<T> {
    /// Digest the signature must cover under `domain`.
    #[must_use]
    pub fn digest(&self, domain: &Eip712Domain) -> [u8; 32] {
        typed_data_digest(domain, &self.payload.to_typed_struct())
    }

    /// Account that produced the signature under `domain`, if recoverable.
    #[must_use]
    pub fn recover_signer(&self, domain: &Eip712Domain) -> Option<Address> {
        self.signature.recover_address(&self.digest(domain)).ok()
    }
}
