//! Sync data types
//!
//! Defines the pending actions recorded while offline and the reports
//! produced when they are replayed or when a bulk sync runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::annotations::{Annotation, EntityType, Payload};
use crate::error::Result;

/// Types of sync operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(OperationType::Create),
            "update" => Some(OperationType::Update),
            "delete" => Some(OperationType::Delete),
            _ => None,
        }
    }
}

/// A write made offline, waiting to be sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Unique action ID
    pub id: Uuid,
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    #[serde(rename = "type")]
    pub operation: OperationType,
    /// Local id of the annotation the action applies to
    #[serde(rename = "entityId")]
    pub entity_id: Uuid,
    /// Full annotation for create/update, `{"serverId": ...}` for delete
    pub payload: serde_json::Value,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn create<P: Payload>(annotation: &Annotation<P>) -> Result<Self> {
        Ok(Self::new(
            P::ENTITY,
            OperationType::Create,
            annotation.local_id,
            serde_json::to_value(annotation)?,
        ))
    }

    pub fn update<P: Payload>(annotation: &Annotation<P>) -> Result<Self> {
        Ok(Self::new(
            P::ENTITY,
            OperationType::Update,
            annotation.local_id,
            serde_json::to_value(annotation)?,
        ))
    }

    pub fn delete<P: Payload>(local_id: Uuid, server_id: Option<&str>) -> Self {
        Self::new(
            P::ENTITY,
            OperationType::Delete,
            local_id,
            serde_json::json!({ "serverId": server_id }),
        )
    }

    fn new(
        entity_type: EntityType,
        operation: OperationType,
        entity_id: Uuid,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type,
            operation,
            entity_id,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Server id recorded in a delete payload
    pub fn recorded_server_id(&self) -> Option<String> {
        self.payload
            .get("serverId")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

/// Outcome of draining the pending queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub applied: usize,
    /// Actions dropped because they could not be interpreted
    pub failed: usize,
    /// Actions still queued (replay stopped early or hit the batch limit)
    pub remaining: u64,
    /// Set when replay stopped on a network failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-collection result of a bulk sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    pub stored: u64,
}

/// Outcome of the bulk initial sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitialSyncReport {
    pub collections: Vec<CollectionReport>,
    #[serde(rename = "syncedAt", skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl InitialSyncReport {
    pub fn total(&self) -> u64 {
        self.collections.iter().map(|c| c.stored).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{Bookmark, BookmarkPayload};
    use crate::position::ChapterPosition;

    #[test]
    fn test_operation_type_strings() {
        for op in [OperationType::Create, OperationType::Update, OperationType::Delete] {
            assert_eq!(OperationType::parse(op.as_str()), Some(op));
        }
        assert_eq!(OperationType::parse("upsert"), None);
    }

    #[test]
    fn test_create_action_carries_annotation() {
        let bookmark = Bookmark::new(ChapterPosition::new(19, 23), BookmarkPayload {});
        let action = PendingAction::create(&bookmark).unwrap();

        assert_eq!(action.entity_type, EntityType::Bookmark);
        assert_eq!(action.entity_id, bookmark.local_id);
        let restored: Bookmark = serde_json::from_value(action.payload).unwrap();
        assert_eq!(restored, bookmark);
    }

    #[test]
    fn test_delete_action_server_id() {
        let id = Uuid::new_v4();
        let synced = PendingAction::delete::<BookmarkPayload>(id, Some("srv-9"));
        assert_eq!(synced.recorded_server_id().as_deref(), Some("srv-9"));

        let unsynced = PendingAction::delete::<BookmarkPayload>(id, None);
        assert!(unsynced.recorded_server_id().is_none());
    }
}
