//! Per-collection sync operations
//!
//! Replay and the bulk sync work across all three collections through the
//! object-safe [`SyncTarget`] trait; [`Collection`] implements it for any
//! payload type by pairing a remote source with the local store.

use std::sync::Arc;

use async_trait::async_trait;

use super::types::{OperationType, PendingAction};
use crate::annotations::{Annotation, EntityType, LocalStore, Payload, RemoteSource};
use crate::error::Result;

/// One annotation collection as seen by replay and bulk sync
#[async_trait]
pub trait SyncTarget: Send + Sync {
    fn entity_type(&self) -> EntityType;

    /// Send one queued offline write to the server
    async fn apply(&self, user_id: &str, action: &PendingAction) -> Result<()>;

    /// Fetch the full server listing and merge it into the local store
    async fn pull(&self, user_id: &str) -> Result<u64>;
}

/// Remote source and local store for one payload type
pub struct Collection<P: Payload> {
    remote: Arc<dyn RemoteSource<P>>,
    local: Arc<dyn LocalStore<P>>,
}

impl<P: Payload> Collection<P> {
    pub fn new(remote: Arc<dyn RemoteSource<P>>, local: Arc<dyn LocalStore<P>>) -> Self {
        Self { remote, local }
    }

    async fn replay_create(&self, user_id: &str, action: &PendingAction) -> Result<()> {
        let entity: Annotation<P> = serde_json::from_value(action.payload.clone())?;

        // A previous replay reached the server but was not marked applied
        if self.local.server_id(user_id, entity.local_id).await?.is_some() {
            tracing::debug!(local_id = %entity.local_id, "Create already replayed");
            return Ok(());
        }

        let created = self.remote.create(user_id, &entity).await?;
        if let Some(server_id) = created.server_id.as_deref() {
            self.local
                .set_server_id(user_id, entity.local_id, server_id)
                .await?;
        }
        Ok(())
    }

    async fn replay_update(&self, user_id: &str, action: &PendingAction) -> Result<()> {
        let mut entity: Annotation<P> = serde_json::from_value(action.payload.clone())?;

        let server_id = self
            .local
            .server_id(user_id, entity.local_id)
            .await?
            .or_else(|| entity.server_id.clone());
        let Some(server_id) = server_id else {
            tracing::warn!(local_id = %entity.local_id, "Update for annotation the server never saw");
            return Ok(());
        };

        entity.server_id = Some(server_id);
        self.remote.update(user_id, &entity).await?;
        Ok(())
    }

    async fn replay_delete(&self, user_id: &str, action: &PendingAction) -> Result<()> {
        let server_id = self
            .local
            .server_id(user_id, action.entity_id)
            .await?
            .or_else(|| action.recorded_server_id());

        if let Some(server_id) = server_id {
            self.remote.delete(user_id, &server_id).await?;
        }
        self.local.remove(user_id, action.entity_id).await?;
        Ok(())
    }
}

#[async_trait]
impl<P: Payload> SyncTarget for Collection<P> {
    fn entity_type(&self) -> EntityType {
        P::ENTITY
    }

    async fn apply(&self, user_id: &str, action: &PendingAction) -> Result<()> {
        match action.operation {
            OperationType::Create => self.replay_create(user_id, action).await,
            OperationType::Update => self.replay_update(user_id, action).await,
            OperationType::Delete => self.replay_delete(user_id, action).await,
        }
    }

    async fn pull(&self, user_id: &str) -> Result<u64> {
        let remote = self.remote.list_all(user_id).await?;
        let stored = self.local.merge_remote(user_id, &remote).await?;
        tracing::info!(entity_type = %P::ENTITY, stored, "Pulled remote annotations");
        Ok(stored)
    }
}
