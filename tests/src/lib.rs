//! # Peer Market Test Suite
//!
//! Cross-crate scenarios run against a shared in-memory network.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs      # participants, marketplaces, waiting helpers
//!     ├── properties.rs    # envelope, key, cache and attribution properties
//!     ├── chat_flow.rs     # reply → selection → encrypted chat
//!     └── item_flow.rs     # listing, metadata, chain failures, reconciliation
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p pm-tests
//!
//! # Scenarios pending the on-chain selection interface
//! cargo test -p pm-tests -- --ignored
//! ```

#![allow(unused_variables)]
#![allow(dead_code)]

pub mod integration;
