//! Broadcast store for the displayed position
//!
//! Single writer (the navigation state), any number of readers. Display-only
//! consumers subscribe here instead of hanging off the screen that owns the
//! session, so a position change only reaches code that actually shows it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

/// Latest committed position with its book name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionSnapshot {
    #[serde(rename = "bookId")]
    pub book_id: u32,
    #[serde(rename = "chapterNumber")]
    pub chapter_number: u32,
    #[serde(rename = "bookName")]
    pub book_name: String,
}

impl Default for PositionSnapshot {
    fn default() -> Self {
        Self {
            book_id: 1,
            chapter_number: 1,
            book_name: "Genesis".to_string(),
        }
    }
}

type Listener = Arc<dyn Fn(&PositionSnapshot) + Send + Sync>;

/// Cloneable handle to one shared store
#[derive(Clone, Default)]
pub struct NavigationStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    snapshot: RwLock<PositionSnapshot>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl NavigationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest committed value
    pub fn get_snapshot(&self) -> PositionSnapshot {
        self.inner.snapshot.read().clone()
    }

    /// Register a listener, called synchronously after every change
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PositionSnapshot) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// Commit a new position and notify every subscriber
    pub fn set_position(&self, book_id: u32, chapter_number: u32, book_name: &str) {
        let snapshot = PositionSnapshot {
            book_id,
            chapter_number,
            book_name: book_name.to_string(),
        };
        *self.inner.snapshot.write() = snapshot.clone();

        // Listeners run outside the lock so they may read or unsubscribe
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

/// Handle returned by [`NavigationStore::subscribe`]
pub struct Subscription {
    id: u64,
    store: std::sync::Weak<StoreInner>,
}

impl Subscription {
    /// Stop receiving changes. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(store) = self.store.upgrade() {
            store.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_snapshot_reflects_latest_set() {
        let store = NavigationStore::new();
        assert_eq!(store.get_snapshot(), PositionSnapshot::default());

        store.set_position(43, 3, "John");
        let snapshot = store.get_snapshot();
        assert_eq!(snapshot.book_id, 43);
        assert_eq!(snapshot.chapter_number, 3);
        assert_eq!(snapshot.book_name, "John");
    }

    #[test]
    fn test_multiple_subscribers_notified() {
        let store = NavigationStore::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(Mutex::new(Vec::new()));

        let counter = Arc::clone(&first);
        let _a = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let seen = Arc::clone(&second);
        let _b = store.subscribe(move |snapshot| {
            seen.lock().push(snapshot.chapter_number);
        });

        store.set_position(1, 2, "Genesis");
        store.set_position(1, 3, "Genesis");

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(*second.lock(), vec![2, 3]);
    }

    #[test]
    fn test_listener_sees_committed_snapshot() {
        let store = NavigationStore::new();
        let reader = store.clone();
        let observed = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&observed);
        let _sub = store.subscribe(move |_| {
            *slot.lock() = Some(reader.get_snapshot().book_id);
        });

        store.set_position(40, 1, "Matthew");
        assert_eq!(*observed.lock(), Some(40));
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let store = NavigationStore::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let sub = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let _other = store.subscribe(|_| {});
        assert_eq!(store.subscriber_count(), 2);

        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(store.subscriber_count(), 1);

        store.set_position(2, 1, "Exodus");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dropping_handle_unsubscribes() {
        let store = NavigationStore::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let sub = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(store.subscriber_count(), 1);

        drop(sub);
        assert_eq!(store.subscriber_count(), 0);

        store.set_position(3, 1, "Leviticus");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
