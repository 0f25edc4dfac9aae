//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Offline copy of bookmarks, highlights and notes
CREATE TABLE IF NOT EXISTS offline_annotations (
    local_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    server_id TEXT,
    book_id INTEGER NOT NULL,
    chapter_number INTEGER NOT NULL,
    payload_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_offline_annotations_chapter
    ON offline_annotations(user_id, entity_type, book_id, chapter_number);
CREATE INDEX IF NOT EXISTS idx_offline_annotations_server
    ON offline_annotations(user_id, entity_type, server_id);

-- Writes made offline, replayed in order once connectivity returns
CREATE TABLE IF NOT EXISTS pending_sync_actions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    operation_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    applied INTEGER NOT NULL DEFAULT 0,
    applied_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_pending_user ON pending_sync_actions(user_id, applied);
CREATE INDEX IF NOT EXISTS idx_pending_entity ON pending_sync_actions(entity_type, entity_id);
"#;
