//! Durable local store for annotations
//!
//! Keeps an offline copy of every collection so reads work without a
//! network and offline writes survive a restart. Deletes made offline leave
//! a tombstone until the server confirms them.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::types::{Annotation, Payload, QueryScope};
use crate::error::{Result, SyncError};
use crate::position::ChapterPosition;

/// Offline storage for one annotation collection
#[async_trait]
pub trait LocalStore<P: Payload>: Send + Sync {
    /// Every live (non-tombstoned) annotation of the user
    async fn get_all(&self, user_id: &str) -> Result<Vec<Annotation<P>>>;

    /// Live annotations in one chapter
    async fn get_by_chapter(
        &self,
        user_id: &str,
        chapter: ChapterPosition,
    ) -> Result<Vec<Annotation<P>>>;

    /// A live annotation by local id
    async fn get(&self, user_id: &str, local_id: Uuid) -> Result<Option<Annotation<P>>>;

    /// Annotations deleted offline whose deletion has not reached the server
    async fn tombstoned(&self, user_id: &str, scope: QueryScope) -> Result<Vec<Annotation<P>>>;

    /// Server id of an annotation, tombstoned or not
    async fn server_id(&self, user_id: &str, local_id: Uuid) -> Result<Option<String>>;

    /// Insert or replace, clearing any tombstone
    async fn upsert(&self, user_id: &str, annotation: &Annotation<P>) -> Result<()>;

    /// Attach the server identity without touching anything else
    async fn set_server_id(&self, user_id: &str, local_id: Uuid, server_id: &str)
        -> Result<bool>;

    /// Hide an annotation until its deletion is confirmed
    async fn tombstone(&self, user_id: &str, local_id: Uuid) -> Result<bool>;

    /// Remove an annotation for good
    async fn remove(&self, user_id: &str, local_id: Uuid) -> Result<bool>;

    /// Reconcile with a full server listing
    ///
    /// Server rows replace their local copies (matched by server id), rows the
    /// server no longer has are dropped, and unsynced local rows and
    /// tombstones are kept for replay. Returns the number of server rows
    /// stored.
    async fn merge_remote(&self, user_id: &str, remote: &[Annotation<P>]) -> Result<u64>;
}

/// SQLite-backed store shared by all three collections
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Count of live rows for a collection, for status reporting
    pub async fn count<P: Payload>(&self, user_id: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM offline_annotations
            WHERE user_id = ? AND entity_type = ? AND deleted = 0
            "#,
        )
        .bind(user_id)
        .bind(P::ENTITY.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT local_id, server_id, book_id, chapter_number, payload_json,
           created_at, updated_at
    FROM offline_annotations
"#;

#[async_trait]
impl<P: Payload> LocalStore<P> for SqliteLocalStore {
    async fn get_all(&self, user_id: &str) -> Result<Vec<Annotation<P>>> {
        let sql = format!(
            "{} WHERE user_id = ? AND entity_type = ? AND deleted = 0 ORDER BY created_at ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AnnotationRow>(&sql)
            .bind(user_id)
            .bind(P::ENTITY.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.into_annotation()).collect()
    }

    async fn get_by_chapter(
        &self,
        user_id: &str,
        chapter: ChapterPosition,
    ) -> Result<Vec<Annotation<P>>> {
        let sql = format!(
            r#"{} WHERE user_id = ? AND entity_type = ? AND book_id = ? AND chapter_number = ?
               AND deleted = 0 ORDER BY created_at ASC"#,
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AnnotationRow>(&sql)
            .bind(user_id)
            .bind(P::ENTITY.as_str())
            .bind(i64::from(chapter.book_id))
            .bind(i64::from(chapter.chapter_number))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.into_annotation()).collect()
    }

    async fn get(&self, user_id: &str, local_id: Uuid) -> Result<Option<Annotation<P>>> {
        let sql = format!(
            "{} WHERE user_id = ? AND entity_type = ? AND local_id = ? AND deleted = 0",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, AnnotationRow>(&sql)
            .bind(user_id)
            .bind(P::ENTITY.as_str())
            .bind(local_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_annotation()).transpose()
    }

    async fn tombstoned(&self, user_id: &str, scope: QueryScope) -> Result<Vec<Annotation<P>>> {
        let rows = match scope {
            QueryScope::All => {
                let sql = format!(
                    "{} WHERE user_id = ? AND entity_type = ? AND deleted = 1",
                    SELECT_COLUMNS
                );
                sqlx::query_as::<_, AnnotationRow>(&sql)
                    .bind(user_id)
                    .bind(P::ENTITY.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            QueryScope::Chapter(chapter) => {
                let sql = format!(
                    r#"{} WHERE user_id = ? AND entity_type = ? AND book_id = ? AND chapter_number = ?
                       AND deleted = 1"#,
                    SELECT_COLUMNS
                );
                sqlx::query_as::<_, AnnotationRow>(&sql)
                    .bind(user_id)
                    .bind(P::ENTITY.as_str())
                    .bind(i64::from(chapter.book_id))
                    .bind(i64::from(chapter.chapter_number))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(|r| r.into_annotation()).collect()
    }

    async fn server_id(&self, user_id: &str, local_id: Uuid) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            SELECT server_id FROM offline_annotations
            WHERE user_id = ? AND entity_type = ? AND local_id = ?
            "#,
        )
        .bind(user_id)
        .bind(P::ENTITY.as_str())
        .bind(local_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(server_id,)| server_id))
    }

    async fn upsert(&self, user_id: &str, annotation: &Annotation<P>) -> Result<()> {
        let payload_json = serde_json::to_string(&annotation.payload)?;

        sqlx::query(
            r#"
            INSERT INTO offline_annotations (
                local_id, user_id, entity_type, server_id, book_id, chapter_number,
                payload_json, created_at, updated_at, deleted
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(local_id) DO UPDATE SET
                server_id = COALESCE(excluded.server_id, offline_annotations.server_id),
                book_id = excluded.book_id,
                chapter_number = excluded.chapter_number,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at,
                deleted = 0
            "#,
        )
        .bind(annotation.local_id.to_string())
        .bind(user_id)
        .bind(P::ENTITY.as_str())
        .bind(&annotation.server_id)
        .bind(i64::from(annotation.book_id))
        .bind(i64::from(annotation.chapter_number))
        .bind(&payload_json)
        .bind(annotation.created_at.to_rfc3339())
        .bind(annotation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_server_id(
        &self,
        user_id: &str,
        local_id: Uuid,
        server_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE offline_annotations SET server_id = ?
            WHERE user_id = ? AND entity_type = ? AND local_id = ?
            "#,
        )
        .bind(server_id)
        .bind(user_id)
        .bind(P::ENTITY.as_str())
        .bind(local_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn tombstone(&self, user_id: &str, local_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE offline_annotations SET deleted = 1, updated_at = ?
            WHERE user_id = ? AND entity_type = ? AND local_id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .bind(P::ENTITY.as_str())
        .bind(local_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, user_id: &str, local_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM offline_annotations WHERE user_id = ? AND entity_type = ? AND local_id = ?",
        )
        .bind(user_id)
        .bind(P::ENTITY.as_str())
        .bind(local_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn merge_remote(&self, user_id: &str, remote: &[Annotation<P>]) -> Result<u64> {
        let entity_type = P::ENTITY.as_str();
        let mut tx = self.pool.begin().await?;

        let existing: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT local_id, server_id, deleted FROM offline_annotations
            WHERE user_id = ? AND entity_type = ? AND server_id IS NOT NULL
            "#,
        )
        .bind(user_id)
        .bind(entity_type)
        .fetch_all(&mut *tx)
        .await?;

        let mut stored = 0u64;
        let mut seen = HashSet::new();

        for annotation in remote {
            let Some(server_id) = annotation.server_id.as_deref() else {
                tracing::warn!(local_id = %annotation.local_id, "Skipping remote {} without server id", entity_type);
                continue;
            };
            seen.insert(server_id.to_string());

            let local = existing.iter().find(|(_, sid, _)| sid == server_id);
            if matches!(local, Some((_, _, deleted)) if *deleted != 0) {
                // Deletion still pending replay
                continue;
            }
            let local_id = local
                .map(|(id, _, _)| id.clone())
                .unwrap_or_else(|| annotation.local_id.to_string());

            let payload_json = serde_json::to_string(&annotation.payload)?;
            sqlx::query(
                r#"
                INSERT INTO offline_annotations (
                    local_id, user_id, entity_type, server_id, book_id, chapter_number,
                    payload_json, created_at, updated_at, deleted
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
                ON CONFLICT(local_id) DO UPDATE SET
                    server_id = excluded.server_id,
                    book_id = excluded.book_id,
                    chapter_number = excluded.chapter_number,
                    payload_json = excluded.payload_json,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&local_id)
            .bind(user_id)
            .bind(entity_type)
            .bind(server_id)
            .bind(i64::from(annotation.book_id))
            .bind(i64::from(annotation.chapter_number))
            .bind(&payload_json)
            .bind(annotation.created_at.to_rfc3339())
            .bind(annotation.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
            stored += 1;
        }

        // Synced rows the server no longer lists were deleted elsewhere
        for (local_id, server_id, deleted) in &existing {
            if *deleted == 0 && !seen.contains(server_id) {
                sqlx::query("DELETE FROM offline_annotations WHERE local_id = ?")
                    .bind(local_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(stored)
    }
}

/// Internal row type for SQLite queries
#[derive(sqlx::FromRow)]
struct AnnotationRow {
    local_id: String,
    server_id: Option<String>,
    book_id: i64,
    chapter_number: i64,
    payload_json: String,
    created_at: String,
    updated_at: String,
}

impl AnnotationRow {
    fn into_annotation<P: Payload>(self) -> Result<Annotation<P>> {
        let local_id = Uuid::parse_str(&self.local_id)
            .map_err(|e| SyncError::InvalidData(format!("local id {}: {}", self.local_id, e)))?;
        let book_id = u32::try_from(self.book_id)
            .map_err(|_| SyncError::InvalidData(format!("book id {}", self.book_id)))?;
        let chapter_number = u32::try_from(self.chapter_number)
            .map_err(|_| SyncError::InvalidData(format!("chapter {}", self.chapter_number)))?;

        Ok(Annotation {
            local_id,
            server_id: self.server_id,
            book_id,
            chapter_number,
            payload: serde_json::from_str(&self.payload_json)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::InvalidData(format!("timestamp {}: {}", raw, e)))
}
