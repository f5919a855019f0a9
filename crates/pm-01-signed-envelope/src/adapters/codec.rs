//! # Payload Codecs
//!
//! `JsonCodec` is the default wire format. `BincodeCodec` is the compact
//! alternative; it caps decoded sizes so hostile length prefixes cannot force
//! large allocations.

use crate::domain::errors::CodecError;
use crate::ports::outbound::PayloadCodec;
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Largest payload the bincode codec will decode.
pub const MAX_BINCODE_PAYLOAD: u64 = 256 * 1024;

/// JSON wire codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }
}

/// Bincode wire codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    fn options() -> impl Options {
        bincode::DefaultOptions::new().with_limit(MAX_BINCODE_PAYLOAD)
    }
}

impl PayloadCodec for BincodeCodec {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Self::options().serialize(value).map_err(|e| CodecError::Encode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        Self::options()
            .deserialize(bytes)
            .map_err(|e| CodecError::Decode {
                codec: self.name(),
                reason: e.to_string(),
            })
    }
}
