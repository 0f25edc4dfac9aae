//! Pending action replay
//!
//! Drains the offline queue in order once connectivity returns. Replay stops
//! at the first network failure so later actions never overtake earlier
//! ones; delivery is at-least-once.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::collection::SyncTarget;
use super::queue::PendingQueue;
use super::types::ReplayReport;
use crate::annotations::EntityType;
use crate::connectivity::Connectivity;
use crate::error::{Result, SyncError};

/// Actions fetched per queue read
const DEFAULT_BATCH_SIZE: usize = 50;

pub struct PendingReplayer {
    queue: Arc<dyn PendingQueue>,
    connectivity: Arc<dyn Connectivity>,
    targets: HashMap<EntityType, Arc<dyn SyncTarget>>,
    batch_size: usize,
}

impl PendingReplayer {
    pub fn new(queue: Arc<dyn PendingQueue>, connectivity: Arc<dyn Connectivity>) -> Self {
        Self {
            queue,
            connectivity,
            targets: HashMap::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_target(mut self, target: Arc<dyn SyncTarget>) -> Self {
        self.targets.insert(target.entity_type(), target);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Replay every queued action of `user_id`
    pub async fn replay(&self, user_id: &str) -> Result<ReplayReport> {
        let mut report = ReplayReport::default();

        if !self.connectivity.is_online() {
            report.remaining = self.queue.pending_count(user_id).await?;
            report.error = Some("offline".to_string());
            return Ok(report);
        }

        loop {
            let batch = self.queue.pending(user_id, self.batch_size).await?;
            if batch.is_empty() {
                break;
            }

            let mut done: Vec<Uuid> = Vec::with_capacity(batch.len());
            let mut stopped = None;

            for action in &batch {
                let Some(target) = self.targets.get(&action.entity_type) else {
                    stopped = Some(SyncError::InvalidData(format!(
                        "no replay target for {}",
                        action.entity_type
                    )));
                    break;
                };

                match target.apply(user_id, action).await {
                    Ok(()) => {
                        done.push(action.id);
                        report.applied += 1;
                    }
                    Err(e @ (SyncError::InvalidData(_) | SyncError::Serialization(_))) => {
                        tracing::warn!(action_id = %action.id, "Dropping malformed action: {}", e);
                        done.push(action.id);
                        report.failed += 1;
                    }
                    Err(e) => {
                        stopped = Some(e);
                        break;
                    }
                }
            }

            self.queue.mark_applied(&done).await?;

            if let Some(e) = stopped {
                if e.is_storage() {
                    return Err(e);
                }
                tracing::warn!(user_id, "Replay stopped: {}", e);
                report.error = Some(e.to_string());
                break;
            }
        }

        report.remaining = self.queue.pending_count(user_id).await?;
        tracing::info!(
            user_id,
            applied = report.applied,
            failed = report.failed,
            remaining = report.remaining,
            "Replay finished"
        );
        Ok(report)
    }
}
