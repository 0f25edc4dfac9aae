//! Pending action persistence
//!
//! Durable, ordered queue of writes made while offline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::types::{OperationType, PendingAction};
use crate::annotations::EntityType;
use crate::error::{Result, SyncError};

/// Ordered queue of offline writes
#[async_trait]
pub trait PendingQueue: Send + Sync {
    /// Append an action; it is replayed after every action enqueued before it
    async fn enqueue(&self, user_id: &str, action: &PendingAction) -> Result<()>;

    /// Oldest unapplied actions first
    async fn pending(&self, user_id: &str, limit: usize) -> Result<Vec<PendingAction>>;

    async fn mark_applied(&self, action_ids: &[Uuid]) -> Result<()>;

    async fn pending_count(&self, user_id: &str) -> Result<u64>;
}

/// Repository for the pending action queue
#[derive(Clone)]
pub struct SqlitePendingQueue {
    pool: SqlitePool,
}

impl SqlitePendingQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Clean up applied actions older than `older_than`
    pub async fn cleanup_applied(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM pending_sync_actions WHERE applied = 1 AND applied_at < ?")
                .bind(older_than.to_rfc3339())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PendingQueue for SqlitePendingQueue {
    async fn enqueue(&self, user_id: &str, action: &PendingAction) -> Result<()> {
        let payload = serde_json::to_string(&action.payload)?;

        sqlx::query(
            r#"
            INSERT INTO pending_sync_actions (
                id, user_id, entity_type, operation_type, entity_id, payload, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(action.id.to_string())
        .bind(user_id)
        .bind(action.entity_type.as_str())
        .bind(action.operation.as_str())
        .bind(action.entity_id.to_string())
        .bind(&payload)
        .bind(action.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            action_id = %action.id,
            entity_type = %action.entity_type,
            operation = action.operation.as_str(),
            "Queued offline action"
        );
        Ok(())
    }

    async fn pending(&self, user_id: &str, limit: usize) -> Result<Vec<PendingAction>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT id, entity_type, operation_type, entity_id, payload, created_at
            FROM pending_sync_actions
            WHERE user_id = ? AND applied = 0
            ORDER BY seq ASC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_action()).collect()
    }

    async fn mark_applied(&self, action_ids: &[Uuid]) -> Result<()> {
        if action_ids.is_empty() {
            return Ok(());
        }

        let placeholders: Vec<&str> = action_ids.iter().map(|_| "?").collect();
        let query = format!(
            "UPDATE pending_sync_actions SET applied = 1, applied_at = ? WHERE id IN ({})",
            placeholders.join(", ")
        );

        let mut q = sqlx::query(&query).bind(Utc::now().to_rfc3339());
        for id in action_ids {
            q = q.bind(id.to_string());
        }

        q.execute(&self.pool).await?;
        Ok(())
    }

    async fn pending_count(&self, user_id: &str) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pending_sync_actions WHERE user_id = ? AND applied = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0.max(0) as u64)
    }
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: String,
    entity_type: String,
    operation_type: String,
    entity_id: String,
    payload: String,
    created_at: String,
}

impl ActionRow {
    fn into_action(self) -> Result<PendingAction> {
        let entity_type = EntityType::parse(&self.entity_type)
            .ok_or_else(|| SyncError::InvalidData(format!("entity type {}", self.entity_type)))?;
        let operation = OperationType::parse(&self.operation_type).ok_or_else(|| {
            SyncError::InvalidData(format!("operation type {}", self.operation_type))
        })?;
        let parse_id = |raw: &str| {
            Uuid::parse_str(raw).map_err(|e| SyncError::InvalidData(format!("id {}: {}", raw, e)))
        };
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| SyncError::InvalidData(format!("timestamp {}: {}", self.created_at, e)))?
            .with_timezone(&Utc);

        Ok(PendingAction {
            id: parse_id(&self.id)?,
            entity_type,
            operation,
            entity_id: parse_id(&self.entity_id)?,
            payload: serde_json::from_str(&self.payload)?,
            created_at,
        })
    }
}
