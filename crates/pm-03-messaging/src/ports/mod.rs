//! # Ports Layer
//!
//! Collaborators the messaging layer drives: the chain, the wallet, and
//! local persistence. The transport port lives in `shared-bus`.

pub mod outbound;

pub use outbound::{CallArg, ChainGateway, ContractCall, Repository, TxReceipt, WalletProvider};
