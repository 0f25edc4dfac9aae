//! In-memory query cache for one annotation collection
//!
//! Entries are keyed by user and read scope and bounded with LRU eviction.
//! Every screen reading the same collection shares one cache; any of them may
//! invalidate an entry, and every subscriber hears about it.
//!
//! # Thread Safety
//!
//! Locks are `parking_lot` and are never held across an await point or while
//! listeners run.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use lru::LruCache;
use parking_lot::Mutex;

use super::types::{Annotation, Payload, QueryScope};

/// Default number of cached scopes
const DEFAULT_CAPACITY: usize = 256;

/// Cache key: one user's view of one scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub user_id: String,
    pub scope: QueryScope,
}

impl QueryKey {
    pub fn new(user_id: &str, scope: QueryScope) -> Self {
        Self {
            user_id: user_id.to_string(),
            scope,
        }
    }
}

/// Change notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Entry replaced or patched
    Updated(QueryKey),
    /// Entry marked stale; the next read goes back to an authoritative source
    Invalidated(QueryKey),
}

struct CacheEntry<P> {
    data: Vec<Annotation<P>>,
    stale: bool,
}

type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Shared query cache handle
pub struct QueryCache<P> {
    inner: Arc<CacheInner<P>>,
}

struct CacheInner<P> {
    entries: Mutex<LruCache<QueryKey, CacheEntry<P>>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl<P> Clone for QueryCache<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Payload> Default for QueryCache<P> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<P: Payload> QueryCache<P> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(LruCache::new(capacity)),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Fresh data for `key`, if cached and not invalidated
    pub fn get(&self, key: &QueryKey) -> Option<Vec<Annotation<P>>> {
        let mut entries = self.inner.entries.lock();
        entries
            .get(key)
            .filter(|entry| !entry.stale)
            .map(|entry| entry.data.clone())
    }

    /// Cached data for `key` even if invalidated
    pub fn get_stale(&self, key: &QueryKey) -> Option<Vec<Annotation<P>>> {
        let mut entries = self.inner.entries.lock();
        entries.get(key).map(|entry| entry.data.clone())
    }

    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.inner.entries.lock().peek(key).map(|entry| entry.stale)
    }

    /// Replace the entry for `key` with fresh data
    pub fn set(&self, key: QueryKey, data: Vec<Annotation<P>>) {
        self.inner
            .entries
            .lock()
            .put(key.clone(), CacheEntry { data, stale: false });
        self.emit(CacheEvent::Updated(key));
    }

    /// Patch the entry for `key` in place
    ///
    /// Returns `false` (and leaves the cache alone) when nothing is cached
    /// for `key`; a later read fetches the authoritative data anyway.
    pub fn update<F>(&self, key: &QueryKey, patch: F) -> bool
    where
        F: FnOnce(&mut Vec<Annotation<P>>),
    {
        let patched = {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(key) {
                Some(entry) => {
                    patch(&mut entry.data);
                    true
                }
                None => false,
            }
        };

        if patched {
            self.emit(CacheEvent::Updated(key.clone()));
        }
        patched
    }

    /// Mark `key` stale and notify subscribers
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(entry) = self.inner.entries.lock().peek_mut(key) {
            entry.stale = true;
        }
        self.emit(CacheEvent::Invalidated(key.clone()));
    }

    /// Mark every cached scope of `user_id` stale
    pub fn invalidate_user(&self, user_id: &str) {
        let keys: Vec<QueryKey> = {
            let mut entries = self.inner.entries.lock();
            entries
                .iter_mut()
                .filter(|(key, _)| key.user_id == user_id)
                .map(|(key, entry)| {
                    entry.stale = true;
                    key.clone()
                })
                .collect()
        };

        for key in keys {
            self.emit(CacheEvent::Invalidated(key));
        }
    }

    /// Drop everything cached for `user_id` (sign-out)
    pub fn clear_user(&self, user_id: &str) {
        let mut entries = self.inner.entries.lock();
        let keys: Vec<QueryKey> = entries
            .iter()
            .filter(|(key, _)| key.user_id == user_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            entries.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Register a listener for cache events
    pub fn subscribe<F>(&self, listener: F) -> CacheSubscription<P>
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        CacheSubscription {
            id,
            cache: Arc::downgrade(&self.inner),
        }
    }

    fn emit(&self, event: CacheEvent) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }
}

/// Handle returned by [`QueryCache::subscribe`]
pub struct CacheSubscription<P> {
    id: u64,
    cache: Weak<CacheInner<P>>,
}

impl<P> CacheSubscription<P> {
    /// Stop receiving events. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl<P> Drop for CacheSubscription<P> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
