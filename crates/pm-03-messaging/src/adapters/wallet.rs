//! # Local Wallet
//!
//! A `WalletProvider` over an in-process signer that can be connected and
//! disconnected at runtime.

use crate::domain::errors::WalletError;
use crate::ports::WalletProvider;
use async_trait::async_trait;
use parking_lot::RwLock;
use pm_01_signed_envelope::TypedDataSigner;
use std::sync::Arc;
use tracing::debug;

/// Wallet holding at most one connected signer.
#[derive(Default)]
pub struct LocalWallet {
    signer: RwLock<Option<Arc<dyn TypedDataSigner>>>,
}

impl LocalWallet {
    /// Wallet with nothing connected.
    #[must_use]
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Wallet already connected to `signer`.
    #[must_use]
    pub fn connected(signer: Arc<dyn TypedDataSigner>) -> Self {
        Self {
            signer: RwLock::new(Some(signer)),
        }
    }

    /// Replace the connected signer.
    pub fn connect(&self, signer: Arc<dyn TypedDataSigner>) {
        *self.signer.write() = Some(signer);
        debug!("Wallet connected");
    }

    /// Drop the connected signer.
    pub fn disconnect(&self) {
        *self.signer.write() = None;
        debug!("Wallet disconnected");
    }

    /// Whether a signer is connected.
    pub fn is_connected(&self) -> bool {
        self.signer.read().is_some()
    }
}

#[async_trait]
impl WalletProvider for LocalWallet {
    async fn signer(&self) -> Result<Arc<dyn TypedDataSigner>, WalletError> {
        self.signer
            .read()
            .clone()
            .ok_or(WalletError::NoConnectorAvailable)
    }
}
