//! # Event-Driven Cache
//!
//! Many consumers ask for "the current and all future values for key K".
//! The cache makes sure only one underlying subscription exists per key,
//! shares every pushed value with all attached consumers, and releases the
//! subscription when the last consumer goes away.
//!
//! ## Lifecycle
//!
//! ```text
//!   get(k) ──► entry exists? ── yes ──► attach handle
//!                  │
//!                  no
//!                  ▼
//!          insert entry, source.subscribe(k, sink) ──► Teardown
//!
//!   drop(last handle) ──► remove entry ──► Teardown::run()
//! ```
//!
//! ## Delivery
//!
//! A new handle observes the latest stored value via `current()` and then
//! every later value via `recv()`, in the order the source emitted them.
//! There is no replay of older history.

pub mod cache;
pub mod sink;

pub use cache::{CacheHandle, CacheSource, EventCache};
pub use sink::{CacheSink, CacheStatus, Teardown};

/// Broadcast buffer per entry before slow handles start lagging.
pub const DEFAULT_ENTRY_CAPACITY: usize = 64;
