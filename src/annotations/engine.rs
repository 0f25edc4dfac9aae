//! Offline-first annotation engine
//!
//! One [`AnnotationCache`] is instantiated per collection (bookmarks,
//! highlights, notes). Reads pick their source from the sync gate and
//! connectivity; writes are applied optimistically to the shared query cache,
//! committed to the server when online or to the local store and pending
//! queue when offline, and always end by invalidating the chapter scope they
//! touched.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::cache::{QueryCache, QueryKey};
use super::local::LocalStore;
use super::remote::RemoteSource;
use super::types::{
    Annotation, BookmarkPayload, Highlight, HighlightColor, HighlightPayload, Payload, QueryScope,
};
use crate::canon::BookTable;
use crate::connectivity::Connectivity;
use crate::error::{Result, SyncError};
use crate::gate::SyncGate;
use crate::position::{self, ChapterPosition};
use crate::sync::{PendingAction, PendingQueue};

/// Collaborators shared by every collection engine
#[derive(Clone)]
pub struct SyncContext {
    pub books: Arc<BookTable>,
    pub queue: Arc<dyn PendingQueue>,
    pub gate: Arc<dyn SyncGate>,
    pub connectivity: Arc<dyn Connectivity>,
}

/// Query cache plus optimistic mutations for one annotation collection
pub struct AnnotationCache<P: Payload> {
    user_id: String,
    cache: QueryCache<P>,
    local: Arc<dyn LocalStore<P>>,
    remote: Arc<dyn RemoteSource<P>>,
    context: SyncContext,
}

impl<P: Payload> AnnotationCache<P> {
    pub fn new(
        user_id: impl Into<String>,
        cache: QueryCache<P>,
        local: Arc<dyn LocalStore<P>>,
        remote: Arc<dyn RemoteSource<P>>,
        context: SyncContext,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            cache,
            local,
            remote,
            context,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The shared query cache, for subscribing to changes
    pub fn cache(&self) -> &QueryCache<P> {
        &self.cache
    }

    pub fn key(&self, scope: QueryScope) -> QueryKey {
        QueryKey::new(&self.user_id, scope)
    }

    /// Every annotation of the user
    pub async fn all(&self) -> Vec<Annotation<P>> {
        self.read(QueryScope::All).await
    }

    /// Annotations in one chapter
    pub async fn for_chapter(&self, chapter: ChapterPosition) -> Vec<Annotation<P>> {
        self.read(QueryScope::Chapter(chapter)).await
    }

    /// Mark every cached scope stale so the next reads refetch
    pub fn refresh(&self) {
        self.cache.invalidate_user(&self.user_id);
    }

    /// Look up an annotation by local id in the cache, then the local store
    pub async fn find(&self, local_id: Uuid) -> Option<Annotation<P>> {
        let cached = self
            .cache
            .get_stale(&self.key(QueryScope::All))
            .and_then(|items| items.into_iter().find(|a| a.local_id == local_id));
        if cached.is_some() {
            return cached;
        }

        match self.local.get(&self.user_id, local_id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(%local_id, "Local lookup failed: {}", e);
                None
            }
        }
    }

    /// Create an annotation
    ///
    /// Online, the entity is committed to the server and appended to the
    /// all-annotations cache with its server id; a failure removes the
    /// optimistic entry and is returned. Offline, it is stored locally,
    /// queued for replay and shown without a server id.
    pub async fn add(&self, chapter: ChapterPosition, payload: P) -> Result<Annotation<P>> {
        if !position::is_valid(chapter, &self.context.books) {
            return Err(SyncError::InvalidData(format!(
                "{} is not a chapter of the canon",
                chapter
            )));
        }

        let entity = Annotation::new(chapter, payload);
        let result = if self.context.connectivity.is_online() {
            self.add_online(entity).await
        } else {
            self.add_offline(entity).await
        };

        self.settle(chapter);
        result
    }

    /// Delete an annotation; `Ok(false)` when it does not exist
    pub async fn delete(&self, local_id: Uuid) -> Result<bool> {
        let Some(current) = self.find(local_id).await else {
            return Ok(false);
        };

        self.cache.update(&self.key(QueryScope::All), |items| {
            items.retain(|a| a.local_id != local_id)
        });

        let result = match current.server_id.as_deref() {
            Some(server_id) if self.context.connectivity.is_online() => {
                self.delete_online(local_id, server_id).await
            }
            _ => self.delete_offline(&current).await,
        };

        self.settle(current.chapter());
        result.map(|_| true)
    }

    async fn read(&self, scope: QueryScope) -> Vec<Annotation<P>> {
        let key = self.key(scope);

        if self.context.gate.is_user_data_synced() {
            return match self.read_local(scope).await {
                Ok(items) => {
                    self.cache.set(key, items.clone());
                    items
                }
                Err(e) => {
                    tracing::warn!(entity_type = %P::ENTITY, "Local read failed: {}", e);
                    self.cache.get_stale(&key).unwrap_or_default()
                }
            };
        }

        if let Some(items) = self.cache.get(&key) {
            return items;
        }

        if !self.context.connectivity.is_online() {
            return self.read_fallback(scope, &key).await;
        }

        let fetched = match scope {
            QueryScope::All => self.remote.list_all(&self.user_id).await,
            QueryScope::Chapter(chapter) => {
                self.remote.list_for_chapter(&self.user_id, chapter).await
            }
        };

        match fetched {
            Ok(remote) => {
                let items = self.overlay_local(scope, remote).await;
                self.cache.set(key, items.clone());
                items
            }
            Err(e) => {
                tracing::warn!(entity_type = %P::ENTITY, "Remote read failed: {}", e);
                self.read_fallback(scope, &key).await
            }
        }
    }

    async fn read_local(&self, scope: QueryScope) -> Result<Vec<Annotation<P>>> {
        match scope {
            QueryScope::All => self.local.get_all(&self.user_id).await,
            QueryScope::Chapter(chapter) => self.local.get_by_chapter(&self.user_id, chapter).await,
        }
    }

    /// Local store, then whatever the cache last held, then nothing
    async fn read_fallback(&self, scope: QueryScope, key: &QueryKey) -> Vec<Annotation<P>> {
        match self.read_local(scope).await {
            Ok(items) if !items.is_empty() => items,
            Ok(_) => self.cache.get_stale(key).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(entity_type = %P::ENTITY, "Local read failed: {}", e);
                self.cache.get_stale(key).unwrap_or_default()
            }
        }
    }

    /// Lay local state the server has not seen yet over a remote listing
    ///
    /// Tombstoned rows stay hidden and a local edit newer than the server
    /// copy wins. Unsynced local rows are appended.
    async fn overlay_local(
        &self,
        scope: QueryScope,
        remote: Vec<Annotation<P>>,
    ) -> Vec<Annotation<P>> {
        let local = match self.read_local(scope).await {
            Ok(local) => local,
            Err(e) => {
                tracing::debug!(entity_type = %P::ENTITY, "Skipping local overlay: {}", e);
                return remote;
            }
        };
        let tombstoned = match self.local.tombstoned(&self.user_id, scope).await {
            Ok(tombstoned) => tombstoned,
            Err(e) => {
                tracing::debug!(entity_type = %P::ENTITY, "Skipping tombstone filter: {}", e);
                Vec::new()
            }
        };

        let mut merged: Vec<Annotation<P>> = remote
            .into_iter()
            .filter(|r| !tombstoned.iter().any(|t| t.is_same_record(r)))
            .map(|r| match local.iter().find(|l| l.is_same_record(&r)) {
                Some(l) if l.updated_at > r.updated_at => l.clone(),
                Some(l) => Annotation {
                    local_id: l.local_id,
                    ..r
                },
                None => r,
            })
            .collect();

        for item in local.into_iter().filter(|a| !a.is_synced()) {
            if !merged.iter().any(|m| m.local_id == item.local_id) {
                merged.push(item);
            }
        }
        merged
    }

    async fn add_online(&self, entity: Annotation<P>) -> Result<Annotation<P>> {
        let all_key = self.key(QueryScope::All);
        let local_id = entity.local_id;
        let optimistic = entity.clone();
        self.cache.update(&all_key, move |items| items.push(optimistic));

        let mut created = match self.remote.create(&self.user_id, &entity).await {
            Ok(created) => created,
            Err(e) => {
                self.cache
                    .update(&all_key, |items| items.retain(|a| a.local_id != local_id));
                tracing::warn!(entity_type = %P::ENTITY, "Remote create failed: {}", e);
                return Err(e);
            }
        };
        created.local_id = local_id;

        let confirmed = created.clone();
        self.cache.update(&all_key, move |items| {
            match items.iter_mut().find(|a| a.local_id == local_id) {
                Some(slot) => *slot = confirmed,
                None => items.push(confirmed),
            }
        });

        if let Err(e) = self.local.upsert(&self.user_id, &created).await {
            tracing::error!(entity_type = %P::ENTITY, %local_id, "Failed to mirror created annotation: {}", e);
        }

        tracing::debug!(entity_type = %P::ENTITY, %local_id, "Annotation created");
        Ok(created)
    }

    async fn add_offline(&self, entity: Annotation<P>) -> Result<Annotation<P>> {
        let visible = entity.clone();
        self.cache
            .update(&self.key(QueryScope::All), move |items| items.push(visible));

        self.persist_offline(&entity, PendingAction::create(&entity)?)
            .await?;
        tracing::debug!(entity_type = %P::ENTITY, local_id = %entity.local_id, "Annotation stored offline");
        Ok(entity)
    }

    async fn delete_online(&self, local_id: Uuid, server_id: &str) -> Result<()> {
        if let Err(e) = self.remote.delete(&self.user_id, server_id).await {
            tracing::warn!(entity_type = %P::ENTITY, %local_id, "Remote delete failed: {}", e);
            return Err(e);
        }

        if let Err(e) = self.local.remove(&self.user_id, local_id).await {
            tracing::error!(entity_type = %P::ENTITY, %local_id, "Failed to remove local copy: {}", e);
        }
        Ok(())
    }

    async fn delete_offline(&self, current: &Annotation<P>) -> Result<()> {
        let local_id = current.local_id;
        let action = PendingAction::delete::<P>(local_id, current.server_id.as_deref());

        let stored = self.local.tombstone(&self.user_id, local_id).await;
        if let Err(e) = &stored {
            tracing::error!(entity_type = %P::ENTITY, %local_id, "Failed to tombstone annotation: {}", e);
        }
        stored?;

        self.enqueue(action).await
    }

    /// Store locally and queue for replay, logging storage failures
    async fn persist_offline(&self, entity: &Annotation<P>, action: PendingAction) -> Result<()> {
        if let Err(e) = self.local.upsert(&self.user_id, entity).await {
            tracing::error!(
                entity_type = %P::ENTITY,
                local_id = %entity.local_id,
                "Failed to store annotation offline: {}",
                e
            );
            return Err(e);
        }

        self.enqueue(action).await
    }

    async fn enqueue(&self, action: PendingAction) -> Result<()> {
        let result = self.context.queue.enqueue(&self.user_id, &action).await;
        if let Err(e) = &result {
            tracing::error!(action_id = %action.id, "Failed to queue offline action: {}", e);
        }
        result
    }

    /// Invalidate the chapter scope a mutation touched
    fn settle(&self, chapter: ChapterPosition) {
        self.cache.invalidate(&self.key(QueryScope::Chapter(chapter)));
    }
}

impl AnnotationCache<HighlightPayload> {
    /// Recolor a highlight; `Ok(None)` when it does not exist
    ///
    /// A failed online update restores the previous color in the cache.
    pub async fn update_color(
        &self,
        local_id: Uuid,
        color: HighlightColor,
    ) -> Result<Option<Highlight>> {
        let Some(current) = self.find(local_id).await else {
            return Ok(None);
        };

        let mut updated = current.clone();
        updated.payload.color = color;
        updated.updated_at = Utc::now();

        let all_key = self.key(QueryScope::All);
        let patched = updated.clone();
        self.cache.update(&all_key, move |items| {
            if let Some(slot) = items.iter_mut().find(|a| a.local_id == local_id) {
                *slot = patched;
            }
        });

        let result = if updated.is_synced() && self.context.connectivity.is_online() {
            self.update_online(current.clone(), updated).await
        } else {
            self.update_offline(updated).await
        };

        self.settle(current.chapter());
        result.map(Some)
    }

    async fn update_online(&self, previous: Highlight, updated: Highlight) -> Result<Highlight> {
        let local_id = updated.local_id;

        if let Err(e) = self.remote.update(&self.user_id, &updated).await {
            self.cache.update(&self.key(QueryScope::All), move |items| {
                if let Some(slot) = items.iter_mut().find(|a| a.local_id == local_id) {
                    *slot = previous;
                }
            });
            tracing::warn!(%local_id, "Remote color update failed: {}", e);
            return Err(e);
        }

        if let Err(e) = self.local.upsert(&self.user_id, &updated).await {
            tracing::error!(%local_id, "Failed to mirror color update: {}", e);
        }
        Ok(updated)
    }

    async fn update_offline(&self, updated: Highlight) -> Result<Highlight> {
        let action = PendingAction::update(&updated)?;
        self.persist_offline(&updated, action).await?;
        Ok(updated)
    }

    /// Highlights covering a verse of a chapter
    pub async fn covering(&self, chapter: ChapterPosition, verse: u32) -> Vec<Highlight> {
        self.for_chapter(chapter)
            .await
            .into_iter()
            .filter(|h| h.payload.covers(verse))
            .collect()
    }
}

impl AnnotationCache<BookmarkPayload> {
    pub async fn is_bookmarked(&self, chapter: ChapterPosition) -> bool {
        !self.for_chapter(chapter).await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sqlx::SqlitePool;

    use super::*;
    use crate::annotations::cache::{CacheEvent, CacheSubscription};
    use crate::annotations::local::SqliteLocalStore;
    use crate::annotations::remote::MockRemote;
    use crate::annotations::types::{Bookmark, Note, NotePayload};
    use crate::connectivity::NetworkStatus;
    use crate::db::memory_pool;
    use crate::gate::SyncState;
    use crate::sync::{OperationType, SqlitePendingQueue};

    const USER: &str = "user-1";

    struct Harness<P: Payload> {
        engine: AnnotationCache<P>,
        remote: Arc<MockRemote<P>>,
        local: Arc<SqliteLocalStore>,
        queue: Arc<SqlitePendingQueue>,
        gate: Arc<SyncState>,
        network: Arc<NetworkStatus>,
        pool: SqlitePool,
    }

    async fn harness<P: Payload>(remote: MockRemote<P>) -> Harness<P> {
        let pool = memory_pool().await;
        let remote = Arc::new(remote);
        let local = Arc::new(SqliteLocalStore::new(pool.clone()));
        let queue = Arc::new(SqlitePendingQueue::new(pool.clone()));
        let gate = Arc::new(SyncState::new());
        let network = Arc::new(NetworkStatus::new(true));

        let context = SyncContext {
            books: Arc::new(BookTable::canonical()),
            queue: queue.clone(),
            gate: gate.clone(),
            connectivity: network.clone(),
        };
        let engine = AnnotationCache::new(
            USER,
            QueryCache::default(),
            local.clone(),
            remote.clone(),
            context,
        );

        Harness {
            engine,
            remote,
            local,
            queue,
            gate,
            network,
            pool,
        }
    }

    fn chapter_invalidations<P: Payload>(
        engine: &AnnotationCache<P>,
        chapter: ChapterPosition,
    ) -> (Arc<AtomicUsize>, CacheSubscription<P>) {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        let key = engine.key(QueryScope::Chapter(chapter));
        let sub = engine.cache().subscribe(move |event| {
            if *event == CacheEvent::Invalidated(key.clone()) {
                sink.fetch_add(1, Ordering::SeqCst);
            }
        });
        (count, sub)
    }

    fn note(content: &str) -> NotePayload {
        NotePayload {
            verse_number: None,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_online_add_appends_server_entity() {
        let existing = Bookmark::new(ChapterPosition::new(1, 1), BookmarkPayload {})
            .with_server_id("srv-0");
        let h = harness(MockRemote::with_records(vec![existing.clone()])).await;

        assert_eq!(h.engine.all().await, vec![existing.clone()]);

        let chapter = ChapterPosition::new(43, 3);
        let created = h.engine.add(chapter, BookmarkPayload {}).await.unwrap();
        assert!(created.is_synced());

        let cached = h
            .engine
            .cache()
            .get(&h.engine.key(QueryScope::All))
            .unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0], existing);
        assert_eq!(cached[1].local_id, created.local_id);
        assert_eq!(cached.iter().filter(|b| b.server_id == created.server_id).count(), 1);

        // Mirrored locally, nothing queued
        let mirrored: Option<Bookmark> = h.local.get(USER, created.local_id).await.unwrap();
        assert!(mirrored.is_some());
        assert_eq!(h.queue.pending_count(USER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_chapter_invalidated_once_on_success() {
        let h = harness(MockRemote::<NotePayload>::new()).await;
        let chapter = ChapterPosition::new(19, 23);
        let (invalidations, _sub) = chapter_invalidations(&h.engine, chapter);

        h.engine.add(chapter, note("The Lord is my shepherd")).await.unwrap();
        assert_eq!(invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_add_rolls_back_and_invalidates_once() {
        let h = harness(MockRemote::<NotePayload>::new()).await;
        h.engine.all().await;
        let chapter = ChapterPosition::new(19, 23);
        let (invalidations, _sub) = chapter_invalidations(&h.engine, chapter);

        h.remote.set_failing(true);
        let err = h.engine.add(chapter, note("lost")).await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(invalidations.load(Ordering::SeqCst), 1);

        let cached = h
            .engine
            .cache()
            .get(&h.engine.key(QueryScope::All))
            .unwrap();
        assert!(cached.is_empty());
        assert_eq!(h.queue.pending_count(USER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_chapter_rejected() {
        let h = harness(MockRemote::<BookmarkPayload>::new()).await;
        let err = h
            .engine
            .add(ChapterPosition::new(1, 51), BookmarkPayload {})
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidData(_)));
        assert_eq!(h.remote.creates(), 0);
    }

    #[tokio::test]
    async fn test_sync_gate_short_circuits_remote() {
        let h = harness(MockRemote::<BookmarkPayload>::new()).await;
        let chapter = ChapterPosition::new(1, 1);

        h.engine.for_chapter(chapter).await;
        assert_eq!(h.remote.lists(), 1);

        h.gate.mark_synced();
        h.engine.refresh();
        h.engine.for_chapter(chapter).await;
        h.engine.all().await;
        assert_eq!(h.remote.lists(), 1);
    }

    #[tokio::test]
    async fn test_synced_reads_come_from_local_store() {
        let h = harness(MockRemote::<BookmarkPayload>::new()).await;
        let stored = Bookmark::new(ChapterPosition::new(2, 1), BookmarkPayload {});
        h.local.upsert(USER, &stored).await.unwrap();
        h.gate.mark_synced();

        assert_eq!(h.engine.all().await, vec![stored.clone()]);
        assert!(h.engine.is_bookmarked(ChapterPosition::new(2, 1)).await);
        assert!(!h.engine.is_bookmarked(ChapterPosition::new(2, 2)).await);
    }

    #[tokio::test]
    async fn test_offline_read_with_empty_store_is_empty() {
        let h = harness(MockRemote::<NotePayload>::new()).await;
        h.network.set_online(false);

        assert!(h.engine.all().await.is_empty());
        assert!(h.engine.for_chapter(ChapterPosition::new(1, 1)).await.is_empty());
        assert_eq!(h.remote.lists(), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_degrades_to_local() {
        let h = harness(MockRemote::<NotePayload>::new()).await;
        let stored = Note::new(ChapterPosition::new(1, 1), note("kept"));
        h.local.upsert(USER, &stored).await.unwrap();

        h.remote.set_failing(true);
        assert_eq!(h.engine.all().await, vec![stored]);
    }

    #[tokio::test]
    async fn test_offline_add_enqueues_and_shows_unsynced() {
        let h = harness(MockRemote::<NotePayload>::new()).await;
        h.engine.all().await;
        h.network.set_online(false);

        let chapter = ChapterPosition::new(40, 5);
        let (invalidations, _sub) = chapter_invalidations(&h.engine, chapter);
        let created = h.engine.add(chapter, note("Blessed")).await.unwrap();

        assert!(!created.is_synced());
        assert_eq!(h.remote.creates(), 0);
        assert_eq!(invalidations.load(Ordering::SeqCst), 1);

        let cached = h
            .engine
            .cache()
            .get(&h.engine.key(QueryScope::All))
            .unwrap();
        assert_eq!(cached, vec![created.clone()]);

        let pending = h.queue.pending(USER, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, OperationType::Create);
        assert_eq!(pending[0].entity_id, created.local_id);
    }

    #[tokio::test]
    async fn test_online_reads_include_unsynced_local_entries() {
        let h = harness(MockRemote::<NotePayload>::new()).await;
        h.network.set_online(false);
        let offline = h
            .engine
            .add(ChapterPosition::new(1, 1), note("offline"))
            .await
            .unwrap();

        h.network.set_online(true);
        h.engine.refresh();
        let all = h.engine.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].local_id, offline.local_id);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_optimistic_state() {
        let h = harness(MockRemote::<NotePayload>::new()).await;
        h.network.set_online(false);
        h.engine.cache().set(h.engine.key(QueryScope::All), vec![]);
        h.pool.close().await;

        let err = h
            .engine
            .add(ChapterPosition::new(1, 1), note("unsaved"))
            .await
            .unwrap_err();
        assert!(err.is_storage());

        let cached = h
            .engine
            .cache()
            .get(&h.engine.key(QueryScope::All))
            .unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].payload.content, "unsaved");
    }

    #[tokio::test]
    async fn test_online_delete() {
        let h = harness(MockRemote::<BookmarkPayload>::new()).await;
        h.engine.all().await;
        let created = h
            .engine
            .add(ChapterPosition::new(3, 1), BookmarkPayload {})
            .await
            .unwrap();

        assert!(h.engine.delete(created.local_id).await.unwrap());
        assert_eq!(h.remote.deletes(), 1);
        assert!(h.remote.records().is_empty());
        assert!(h
            .engine
            .cache()
            .get(&h.engine.key(QueryScope::All))
            .unwrap()
            .is_empty());

        let local: Option<Bookmark> = h.local.get(USER, created.local_id).await.unwrap();
        assert!(local.is_none());
        assert!(!h.engine.delete(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_delete_tombstones_and_enqueues() {
        let h = harness(MockRemote::<BookmarkPayload>::new()).await;
        h.engine.all().await;
        let created = h
            .engine
            .add(ChapterPosition::new(3, 1), BookmarkPayload {})
            .await
            .unwrap();

        h.network.set_online(false);
        assert!(h.engine.delete(created.local_id).await.unwrap());
        assert_eq!(h.remote.deletes(), 0);

        let hidden: Option<Bookmark> = h.local.get(USER, created.local_id).await.unwrap();
        assert!(hidden.is_none());

        let pending = h.queue.pending(USER, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, OperationType::Delete);
        assert_eq!(pending[0].recorded_server_id(), created.server_id);
    }

    #[tokio::test]
    async fn test_failed_online_delete_surfaces_error_and_invalidates_once() {
        let h = harness(MockRemote::<BookmarkPayload>::new()).await;
        h.engine.all().await;
        let chapter = ChapterPosition::new(3, 1);
        let created = h.engine.add(chapter, BookmarkPayload {}).await.unwrap();
        let (invalidations, _sub) = chapter_invalidations(&h.engine, chapter);

        h.remote.set_failing(true);
        let err = h.engine.delete(created.local_id).await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(invalidations.load(Ordering::SeqCst), 1);

        let kept: Option<Bookmark> = h.local.get(USER, created.local_id).await.unwrap();
        assert!(kept.is_some());
        assert_eq!(h.remote.records().len(), 1);
        assert_eq!(h.queue.pending_count(USER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_delete_stays_hidden_online_before_replay() {
        let h = harness(MockRemote::<BookmarkPayload>::new()).await;
        h.engine.all().await;
        let chapter = ChapterPosition::new(3, 1);
        let created = h.engine.add(chapter, BookmarkPayload {}).await.unwrap();

        h.network.set_online(false);
        assert!(h.engine.delete(created.local_id).await.unwrap());

        // Server still has it until the queue is replayed
        h.network.set_online(true);
        h.engine.refresh();
        assert!(h.engine.for_chapter(chapter).await.is_empty());
        assert!(h.engine.all().await.is_empty());
        assert!(!h.engine.is_bookmarked(chapter).await);
        assert_eq!(h.remote.records().len(), 1);
        assert!(h.remote.lists() >= 2);
    }

    #[tokio::test]
    async fn test_offline_recolor_shown_online_before_replay() {
        let h = harness(MockRemote::<HighlightPayload>::new()).await;
        h.engine.all().await;
        let chapter = ChapterPosition::new(43, 3);
        let created = h
            .engine
            .add(chapter, HighlightPayload::verses(16, 16, HighlightColor::Yellow))
            .await
            .unwrap();

        h.network.set_online(false);
        h.engine
            .update_color(created.local_id, HighlightColor::Pink)
            .await
            .unwrap();

        h.network.set_online(true);
        h.engine.refresh();
        let shown = h.engine.for_chapter(chapter).await;
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].local_id, created.local_id);
        assert_eq!(shown[0].payload.color, HighlightColor::Pink);
        assert_eq!(h.remote.records()[0].payload.color, HighlightColor::Yellow);
    }

    #[tokio::test]
    async fn test_update_color_online_and_rollback() {
        let h = harness(MockRemote::<HighlightPayload>::new()).await;
        h.engine.all().await;
        let chapter = ChapterPosition::new(43, 3);
        let created = h
            .engine
            .add(chapter, HighlightPayload::verses(16, 16, HighlightColor::Yellow))
            .await
            .unwrap();

        let updated = h
            .engine
            .update_color(created.local_id, HighlightColor::Green)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.payload.color, HighlightColor::Green);
        assert_eq!(h.remote.records()[0].payload.color, HighlightColor::Green);

        h.remote.set_failing(true);
        let (invalidations, _sub) = chapter_invalidations(&h.engine, chapter);
        assert!(h
            .engine
            .update_color(created.local_id, HighlightColor::Pink)
            .await
            .is_err());
        assert_eq!(invalidations.load(Ordering::SeqCst), 1);

        let cached = h.engine.find(created.local_id).await.unwrap();
        assert_eq!(cached.payload.color, HighlightColor::Green);
        assert!(h
            .engine
            .update_color(Uuid::new_v4(), HighlightColor::Blue)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_color_offline_enqueues() {
        let h = harness(MockRemote::<HighlightPayload>::new()).await;
        h.network.set_online(false);
        let created = h
            .engine
            .add(
                ChapterPosition::new(1, 1),
                HighlightPayload::verses(1, 3, HighlightColor::Yellow),
            )
            .await
            .unwrap();

        h.engine
            .update_color(created.local_id, HighlightColor::Orange)
            .await
            .unwrap();

        let stored: Highlight = h.local.get(USER, created.local_id).await.unwrap().unwrap();
        assert_eq!(stored.payload.color, HighlightColor::Orange);

        let ops: Vec<OperationType> = h
            .queue
            .pending(USER, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.operation)
            .collect();
        assert_eq!(ops, vec![OperationType::Create, OperationType::Update]);
        assert_eq!(
            h.engine.covering(ChapterPosition::new(1, 1), 2).await.len(),
            1
        );
    }
}
