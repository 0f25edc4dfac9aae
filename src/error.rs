//! Error types for the VerseMate sync engine

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the annotation engine, stores, remote source and replay
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote call rejected, timed out, or returned a non-success status
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl SyncError {
    /// Whether the failure came from talking to the remote data source
    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Http(_))
    }

    /// Whether the failure came from the durable local store
    pub fn is_storage(&self) -> bool {
        matches!(self, SyncError::Database(_) | SyncError::Serialization(_))
    }
}

/// Errors building a canonical book table
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CanonError {
    #[error("Book table is empty")]
    Empty,

    #[error("Book ids must be sequential from 1: expected {expected}, found {found}")]
    OutOfOrder { expected: u32, found: u32 },

    #[error("Book {0} has no chapters")]
    NoChapters(u32),
}
