//! # Cache and Handles
//!
//! `EventCache` owns a map from key to entry. Each entry holds the shared
//! value slot, the number of attached handles, and the source's teardown.

use crate::sink::{CacheSink, CacheStatus, Shared, Teardown};
use crate::DEFAULT_ENTRY_CAPACITY;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// A streaming producer of values for a key.
///
/// `subscribe` is called at most once per live entry. It should start the
/// underlying subscription (typically by spawning a task that writes into
/// `sink`) and return immediately.
pub trait CacheSource<K, V>: Send + Sync + 'static {
    /// Start producing values for `key` into `sink`.
    fn subscribe(&self, key: &K, sink: CacheSink<V>) -> Teardown;
}

struct Entry<V> {
    shared: Arc<Shared<V>>,
    handles: usize,
    teardown: Option<Teardown>,
}

struct Inner<K, V> {
    source: Arc<dyn CacheSource<K, V>>,
    entries: Mutex<HashMap<K, Entry<V>>>,
    capacity: usize,
}

/// Per-key deduplicating subscription cache.
///
/// Cloning yields another reference to the same cache.
pub struct EventCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for EventCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> EventCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache over `source`.
    pub fn new(source: Arc<dyn CacheSource<K, V>>) -> Self {
        Self::with_capacity(source, DEFAULT_ENTRY_CAPACITY)
    }

    /// Create a cache whose entries buffer `capacity` values per handle.
    pub fn with_capacity(source: Arc<dyn CacheSource<K, V>>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                entries: Mutex::new(HashMap::new()),
                capacity,
            }),
        }
    }

    /// Attach to the entry for `key`, creating it on first use.
    ///
    /// Only the call that creates the entry invokes the source. The entry
    /// lock is not held across `CacheSource::subscribe`, so a source may
    /// emit synchronously from inside it.
    pub fn get(&self, key: K) -> CacheHandle<K, V> {
        let (shared, created) = {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(&key) {
                Some(entry) => {
                    entry.handles += 1;
                    (entry.shared.clone(), false)
                }
                None => {
                    let shared = Arc::new(Shared::new(self.inner.capacity));
                    entries.insert(
                        key.clone(),
                        Entry {
                            shared: shared.clone(),
                            handles: 1,
                            teardown: None,
                        },
                    );
                    (shared, true)
                }
            }
        };

        // Attach before the source starts so the first emit is not missed.
        let handle = CacheHandle::attach(key.clone(), shared.clone(), self.inner.clone());

        if created {
            debug!(key = ?key, "Cache miss, subscribing to source");
            let teardown = self
                .inner
                .source
                .subscribe(&key, CacheSink::new(shared.clone()));

            let mut entries = self.inner.entries.lock();
            match entries.get_mut(&key) {
                Some(entry) if Arc::ptr_eq(&entry.shared, &shared) => {
                    entry.teardown = Some(teardown);
                }
                _ => {
                    drop(entries);
                    teardown.run();
                }
            }
        } else {
            debug!(key = ?key, "Cache hit, attached to existing entry");
        }

        handle
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// True if no entry is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of handles attached to `key`.
    #[must_use]
    pub fn handle_count(&self, key: &K) -> usize {
        self.inner
            .entries
            .lock()
            .get(key)
            .map_or(0, |entry| entry.handles)
    }
}

/// A consumer's view of one cache entry.
///
/// Dropping the last handle for a key tears the source subscription down.
pub struct CacheHandle<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    key: K,
    shared: Arc<Shared<V>>,
    receiver: broadcast::Receiver<V>,
    inner: Arc<Inner<K, V>>,
}

impl<K, V> CacheHandle<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn attach(key: K, shared: Arc<Shared<V>>, inner: Arc<Inner<K, V>>) -> Self {
        let receiver = {
            let _slot = shared.slot.lock();
            shared.sender.subscribe()
        };
        Self {
            key,
            shared,
            receiver,
            inner,
        }
    }

    /// Key this handle is attached to.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Latest value the source produced, if any.
    #[must_use]
    pub fn current(&self) -> Option<V> {
        self.shared.slot.lock().value.clone()
    }

    /// Whether the source has finished its backfill.
    #[must_use]
    pub fn status(&self) -> CacheStatus {
        self.shared.slot.lock().status
    }

    /// Wait for the next value.
    ///
    /// A handle that falls behind skips to the latest value.
    pub async fn recv(&mut self) -> Option<V> {
        match self.receiver.recv().await {
            Ok(value) => Some(value),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(key = ?self.key, skipped, "Cache handle lagged, skipping to latest");
                self.receiver = self.receiver.resubscribe();
                self.current()
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<V> {
        loop {
            match self.receiver.try_recv() {
                Ok(value) => return Some(value),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

impl<K, V> Drop for CacheHandle<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let released = {
            let mut entries = self.inner.entries.lock();
            let last = match entries.get_mut(&self.key) {
                Some(entry) if Arc::ptr_eq(&entry.shared, &self.shared) => {
                    entry.handles = entry.handles.saturating_sub(1);
                    entry.handles == 0
                }
                _ => false,
            };
            if last {
                entries.remove(&self.key)
            } else {
                None
            }
        };

        if let Some(entry) = released {
            entry.shared.close();
            if let Some(teardown) = entry.teardown {
                teardown.run();
            }
            debug!(key = ?self.key, "Last cache handle dropped, source torn down");
        }
    }
}
