//! # Adapters Layer
//!
//! Concrete codecs and the local-key signer.

pub mod codec;
pub mod local_signer;

pub use codec::{BincodeCodec, JsonCodec};
pub use local_signer::LocalKeySigner;
