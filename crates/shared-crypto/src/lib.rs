//! # Shared Crypto - Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `ecdsa` | secp256k1 (recoverable) | Typed-data and chat message signing |
//! | `ecdh` | secp256k1 ECDH + SHA-256 | Per-conversation symmetric keys |
//! | `kdf` | HKDF-SHA256 | Root secret → per-conversation subkeys |
//! | `symmetric` | AES-256-GCM | Chat message confidentiality |
//! | `hashing` | Keccak-256, SHA-256 | Digests, content addressing |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic, low-S normalization (EIP-2)
//! - **AES-GCM**: authenticated encryption, random 96-bit nonces
//! - **HKDF**: salt and info domain-separate every derived key

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdh;
pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod kdf;
pub mod symmetric;

// Re-exports
pub use ecdh::EcdhSecret;
pub use ecdsa::{RecoverableSignature, Secp256k1KeyPair, Secp256k1PublicKey};
pub use errors::CryptoError;
pub use hashing::{keccak256, keccak256_many, sha256, KeccakHasher};
pub use kdf::hkdf_sha256;
pub use symmetric::{decrypt, encrypt, Nonce, SecretKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
