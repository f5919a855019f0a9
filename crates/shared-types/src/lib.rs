//! # Shared Types Crate
//!
//! Identity and primitive types shared by every Peer Market crate.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: account identity is the `Address` newtype;
//!   raw 20-byte arrays never cross a crate boundary.
//! - **Canonical Form**: addresses render checksummed (EIP-55) and compare by
//!   value, so they are safe to use as map keys.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
