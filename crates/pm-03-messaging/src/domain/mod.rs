//! # Domain Layer
//!
//! Payload types, key derivation, and the pure rules of each protocol.

pub mod chat;
pub mod errors;
pub mod items;
pub mod key_material;
pub mod keys;
pub mod profile;
pub mod select_provider;
