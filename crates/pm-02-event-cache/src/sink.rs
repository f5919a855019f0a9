//! # Source-Facing Side of an Entry
//!
//! A `CacheSink` is what a source writes into. A `Teardown` is what a source
//! hands back so the cache can stop it.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Whether an entry has finished its historical backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Backfill still running; the value may be stale or absent.
    Loading,
    /// Backfill done; the value tracks live updates.
    Live,
}

pub(crate) struct Slot<V> {
    pub(crate) value: Option<V>,
    pub(crate) status: CacheStatus,
}

/// State shared between a source and every handle on one key.
pub(crate) struct Shared<V> {
    pub(crate) slot: Mutex<Slot<V>>,
    pub(crate) sender: broadcast::Sender<V>,
    closed: AtomicBool,
}

impl<V: Clone> Shared<V> {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            slot: Mutex::new(Slot {
                value: None,
                status: CacheStatus::Loading,
            }),
            sender,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Write side of a cache entry, owned by the source.
///
/// Values are stored and broadcast under the entry lock, so a handle
/// created between two emits sees the first as `current()` and the second
/// through `recv()`.
pub struct CacheSink<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for CacheSink<V> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<V: Clone + Send + 'static> CacheSink<V> {
    pub(crate) fn new(shared: Arc<Shared<V>>) -> Self {
        Self { shared }
    }

    /// Replace the stored value and notify every handle.
    pub fn emit(&self, value: V) {
        self.update(|_| value);
    }

    /// Derive the next value from the stored one and notify every handle.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(Option<&V>) -> V,
    {
        if self.shared.is_closed() {
            trace!("Emit after teardown ignored");
            return;
        }
        let mut slot = self.shared.slot.lock();
        let next = f(slot.value.as_ref());
        // No attached receivers is fine: the value is still stored.
        let _ = self.shared.sender.send(next.clone());
        slot.value = Some(next);
    }

    /// Like `update`, but a failing step leaves the entry untouched.
    ///
    /// One bad input must not take the entry down with it.
    pub fn try_update<F, E>(&self, f: F)
    where
        F: FnOnce(Option<&V>) -> Result<V, E>,
        E: fmt::Display,
    {
        if self.shared.is_closed() {
            return;
        }
        let mut slot = self.shared.slot.lock();
        match f(slot.value.as_ref()) {
            Ok(next) => {
                let _ = self.shared.sender.send(next.clone());
                slot.value = Some(next);
            }
            Err(e) => warn!(error = %e, "Cache source update failed, keeping previous value"),
        }
    }

    /// Mark historical backfill as complete.
    pub fn backfill_complete(&self) {
        self.shared.slot.lock().status = CacheStatus::Live;
    }

    /// True once the cache has torn this entry down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

/// Handle that stops a source's underlying subscription.
pub struct Teardown(Option<Box<dyn FnOnce() + Send>>);

impl Teardown {
    /// Run `f` on teardown.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Some(Box::new(f)))
    }

    /// Abort `task` on teardown.
    #[must_use]
    pub fn abort_task<T: Send + 'static>(task: JoinHandle<T>) -> Self {
        Self::new(move || task.abort())
    }

    /// A teardown with nothing to release.
    #[must_use]
    pub fn noop() -> Self {
        Self(None)
    }

    /// Release the underlying subscription.
    pub fn run(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Teardown")
            .field(&if self.0.is_some() { "armed" } else { "noop" })
            .finish()
    }
}
