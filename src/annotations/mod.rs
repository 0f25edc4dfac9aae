//! Annotation module
//!
//! Bookmarks, highlights and notes share one offline-first engine:
//! - `types`: the generic annotation record and per-kind payloads
//! - `cache`: the shared in-memory query cache
//! - `local`: durable SQLite copy with tombstones
//! - `remote`: the REST data source
//! - `engine`: optimistic reads and writes tying them together

mod cache;
mod engine;
mod local;
mod remote;
mod types;

pub use cache::{CacheEvent, CacheSubscription, QueryCache, QueryKey};
pub use engine::{AnnotationCache, SyncContext};
pub use local::{LocalStore, SqliteLocalStore};
#[cfg(test)]
pub use remote::MockRemote;
pub use remote::{HttpRemote, RemoteSource};
pub use types::{
    Annotation, Bookmark, BookmarkPayload, EntityType, Highlight, HighlightColor,
    HighlightPayload, Note, NotePayload, Payload, QueryScope,
};

/// Engine for bookmarks
pub type Bookmarks = AnnotationCache<BookmarkPayload>;
/// Engine for highlights
pub type Highlights = AnnotationCache<HighlightPayload>;
/// Engine for notes
pub type Notes = AnnotationCache<NotePayload>;
