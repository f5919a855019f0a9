//! # Outbound Ports (Driven Ports / SPI)

use crate::domain::errors::{ChainError, StoreError, WalletError};
use crate::domain::items::OnChainItem;
use async_trait::async_trait;
use pm_01_signed_envelope::TypedDataSigner;
use shared_types::{Address, Hash, U256};
use std::sync::Arc;

/// One ABI argument of a contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    /// `address`
    Address(Address),
    /// `uint256`
    Uint(U256),
    /// `bytes32`
    Bytes32(Hash),
    /// `bytes`
    Bytes(Vec<u8>),
}

/// A state-changing call on a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    /// Target contract.
    pub contract: Address,
    /// Method name.
    pub method: String,
    /// Arguments in ABI order.
    pub args: Vec<CallArg>,
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash.
    pub tx_hash: Hash,
    /// Block it was mined in.
    pub block_number: u64,
}

/// On-chain collaborator.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Submit `call` and wait until it is mined.
    ///
    /// # Errors
    ///
    /// - `NoConnectorAvailable` if no chain connection exists
    /// - `TransactionReverted` / `TransactionTimeout` after submission
    async fn submit(&self, call: ContractCall) -> Result<TxReceipt, ChainError>;

    /// Current state of every item on `marketplace`.
    async fn item_states(&self, marketplace: Address) -> Result<Vec<OnChainItem>, ChainError>;
}

/// Wallet collaborator that hands out the account's signer.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// The connected account's typed-data signer.
    ///
    /// # Errors
    ///
    /// `WalletError::NoConnectorAvailable` if no wallet is connected.
    async fn signer(&self) -> Result<Arc<dyn TypedDataSigner>, WalletError>;
}

/// Load/save of one document.
pub trait Repository<T>: Send + Sync {
    /// Stored value, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<T>, StoreError>;

    /// Replace the stored value.
    fn save(&self, value: &T) -> Result<(), StoreError>;
}
