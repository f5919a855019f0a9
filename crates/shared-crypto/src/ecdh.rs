//! # ECDH Key Agreement (secp256k1)
//!
//! Static-static Diffie-Hellman over secp256k1. The raw shared x-coordinate
//! is never used directly as a key; callers hash it first.

use crate::ecdsa::Secp256k1PublicKey;
use crate::hashing::sha256;
use crate::symmetric::SecretKey;
use crate::CryptoError;
use k256::ecdsa::VerifyingKey;
use k256::{ecdh::diffie_hellman, PublicKey};
use zeroize::Zeroize;

/// secp256k1 ECDH secret.
pub struct EcdhSecret {
    secret: k256::SecretKey,
}

impl EcdhSecret {
    /// Create from secret scalar bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let secret =
            k256::SecretKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { secret })
    }

    /// Compressed public key to announce to the counterparty.
    pub fn public_key(&self) -> Secp256k1PublicKey {
        Secp256k1PublicKey::from_verifying_key(&VerifyingKey::from(self.secret.public_key()))
    }

    /// Compute SHA-256 of the shared x-coordinate with `their_public`.
    pub fn shared_key(&self, their_public: &Secp256k1PublicKey) -> Result<SecretKey, CryptoError> {
        let public =
            PublicKey::from_sec1_bytes(their_public.as_bytes()).map_err(|_| CryptoError::InvalidPublicKey)?;

        let shared = diffie_hellman(self.secret.to_nonzero_scalar(), public.as_affine());
        let mut raw: [u8; 32] = (*shared.raw_secret_bytes()).into();
        let key = sha256(&raw);
        raw.zeroize();

        Ok(SecretKey::from_bytes(key))
    }
}
