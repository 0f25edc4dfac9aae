//! Sync gate
//!
//! Once the bulk initial sync of a user's annotation collections has
//! completed, the durable local store is authoritative and per-collection
//! remote queries are skipped. The gate is consulted on every read and never
//! cached, so flipping it takes effect for the very next read.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Read-only view of the initial sync state
pub trait SyncGate: Send + Sync {
    fn is_user_data_synced(&self) -> bool;
}

/// Process-wide, per-session initial sync flag
#[derive(Debug, Default)]
pub struct SyncState {
    synced: AtomicBool,
    synced_at: Mutex<Option<DateTime<Utc>>>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the bulk sync finished
    pub fn mark_synced(&self) {
        *self.synced_at.lock() = Some(Utc::now());
        self.synced.store(true, Ordering::SeqCst);
        tracing::info!("User data synced, local store is now authoritative");
    }

    /// Forget the bulk sync (sign-out, user switch)
    pub fn reset(&self) {
        self.synced.store(false, Ordering::SeqCst);
        *self.synced_at.lock() = None;
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        *self.synced_at.lock()
    }
}

impl SyncGate for SyncState {
    fn is_user_data_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}
