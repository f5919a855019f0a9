//! # Local Key Signer
//!
//! Signs typed data with a secp256k1 key held in process memory.

use crate::domain::eip712::{typed_data_digest, Eip712Domain, TypedStruct};
use crate::domain::errors::SignerError;
use crate::ports::outbound::{SignerKind, TypedDataSigner};
use async_trait::async_trait;
use shared_crypto::{RecoverableSignature, Secp256k1KeyPair};
use shared_types::Address;
use tracing::debug;

/// Typed-data signer backed by an in-memory keypair.
pub struct LocalKeySigner {
    keypair: Secp256k1KeyPair,
}

impl LocalKeySigner {
    /// Wrap an existing keypair.
    pub fn new(keypair: Secp256k1KeyPair) -> Self {
        Self { keypair }
    }

    /// Create from secret key bytes.
    pub fn from_secret(secret: [u8; 32]) -> Result<Self, SignerError> {
        Ok(Self::new(Secp256k1KeyPair::from_bytes(secret)?))
    }

    /// Generate a fresh random account.
    pub fn random() -> Self {
        Self::new(Secp256k1KeyPair::generate())
    }

    /// Account address, available synchronously for local keys.
    pub fn account(&self) -> Address {
        self.keypair.address()
    }
}

#[async_trait]
impl TypedDataSigner for LocalKeySigner {
    fn kind(&self) -> SignerKind {
        SignerKind::LocalKey
    }

    async fn address(&self) -> Result<Address, SignerError> {
        Ok(self.keypair.address())
    }

    async fn sign_typed_data(
        &self,
        domain: &Eip712Domain,
        value: &TypedStruct,
    ) -> Result<RecoverableSignature, SignerError> {
        let digest = typed_data_digest(domain, value);
        debug!(primary_type = %value.name, signer = %self.keypair.address(), "Signing typed data");
        Ok(self.keypair.sign_prehash(&digest)?)
    }
}
