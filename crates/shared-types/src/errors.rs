//! # Error Types
//!
//! Defines error types used across crates.

use thiserror::Error;

/// Errors produced while parsing or constructing an `Address`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    /// Address is not 20 bytes long.
    #[error("Invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),

    /// Address contains non-hex characters.
    #[error("Invalid address hex: {0}")]
    InvalidHex(String),

    /// Mixed-case address whose EIP-55 checksum does not match.
    #[error("Address checksum mismatch: {0}")]
    BadChecksum(String),
}
