//! # Signed Envelope Codec
//!
//! Binds marketplace payloads to their author's account with EIP-712
//! typed-data signatures, and decodes them off the wire.
//!
//! ## Security
//!
//! Every payload is verified against the domain it was received under. The
//! domain carries the chain id and marketplace contract, so a payload signed
//! for one marketplace never verifies in another.
//!
//! ## Architecture
//!
//! - `domain/`: EIP-712 encoding, the envelope type, errors
//! - `ports/`: the signing capability and wire codec traits
//! - `adapters/`: local-key signer, JSON and bincode codecs
//! - `service`: create, verify, and decode operations

#![warn(missing_docs)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{BincodeCodec, JsonCodec, LocalKeySigner};
pub use domain::eip712::{typed_data_digest, Eip712Domain, TypedStruct, TypedValue};
pub use domain::envelope::{SignedEnvelope, TypedPayload};
pub use domain::errors::{CodecError, EnvelopeError, SignerError};
pub use ports::outbound::{PayloadCodec, SignerKind, TypedDataSigner};
pub use service::{
    create_signed_payload, decode_signed_batch, decode_signed_payload, verify_payload,
    verify_payload_as,
};
