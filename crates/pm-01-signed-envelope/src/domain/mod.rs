//! # Domain Layer
//!
//! Pure typed-data hashing and envelope shapes with no I/O dependencies.

pub mod eip712;
pub mod envelope;
pub mod errors;
