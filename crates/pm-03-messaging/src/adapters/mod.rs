//! # Adapters Layer
//!
//! Persistence adapters for the `Repository` port, the conversation key
//! store built on top of them, and an in-process wallet.

pub mod key_store;
pub mod repository;
pub mod wallet;

pub use key_store::KeyMaterialStore;
pub use repository::{InMemoryRepository, JsonFileRepository};
pub use wallet::LocalWallet;
