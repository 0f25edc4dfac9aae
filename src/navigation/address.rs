//! Externally observable reading address
//!
//! The hosting shell reads this once when a reading session mounts (deep
//! link, restored route) and the navigation state writes it back, debounced.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::position::ChapterPosition;

/// A deep-linkable "book id + chapter number" address
pub trait ExternalAddress: Send + Sync {
    /// Current value, if one has been set
    fn read(&self) -> Option<ChapterPosition>;

    /// Replace the current value
    fn write(&self, position: ChapterPosition);
}

/// In-process address that also records every write
#[derive(Debug, Default)]
pub struct MemoryAddress {
    current: Mutex<Option<ChapterPosition>>,
    writes: Mutex<Vec<ChapterPosition>>,
}

impl MemoryAddress {
    pub fn new(initial: Option<ChapterPosition>) -> Self {
        Self {
            current: Mutex::new(initial),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Every position written so far, oldest first
    pub fn writes(&self) -> Vec<ChapterPosition> {
        self.writes.lock().clone()
    }
}

impl ExternalAddress for MemoryAddress {
    fn read(&self) -> Option<ChapterPosition> {
        *self.current.lock()
    }

    fn write(&self, position: ChapterPosition) {
        *self.current.lock() = Some(position);
        self.writes.lock().push(position);
    }
}

/// Address persisted as a small JSON file so it survives restarts
#[derive(Debug, Clone)]
pub struct FileAddress {
    path: PathBuf,
}

impl FileAddress {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExternalAddress for FileAddress {
    fn read(&self) -> Option<ChapterPosition> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read address file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(position) => Some(position),
            Err(e) => {
                tracing::warn!("Ignoring malformed address file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn write(&self, position: ChapterPosition) {
        let result = serde_json::to_string(&position)
            .map_err(std::io::Error::from)
            .and_then(|json| std::fs::write(&self.path, json));

        if let Err(e) = result {
            tracing::warn!("Failed to write address file {}: {}", self.path.display(), e);
        }
    }
}
