//! # Ports Layer
//!
//! Driven ports this crate needs from the outside world.

pub mod outbound;
