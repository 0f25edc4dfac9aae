//! Offline sync module
//!
//! Provides the pieces that move offline writes to the server:
//! - Durable pending action queue
//! - In-order replay with at-least-once delivery
//! - Bulk initial sync that makes the local store authoritative

mod collection;
mod initial;
mod queue;
mod replay;
mod types;

pub use collection::{Collection, SyncTarget};
pub use initial::InitialSync;
pub use queue::{PendingQueue, SqlitePendingQueue};
pub use replay::PendingReplayer;
pub use types::{
    CollectionReport, InitialSyncReport, OperationType, PendingAction, ReplayReport,
};
