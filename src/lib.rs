//! VerseMate reading position and annotation sync
//!
//! Maps every chapter of the 66-book canon onto a dense index for paging,
//! keeps the displayed position in sync with an external address, and keeps
//! a user's bookmarks, highlights and notes usable offline.

pub mod annotations;
pub mod canon;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod gate;
pub mod navigation;
pub mod position;
pub mod sync;

pub use canon::{BookTable, CanonicalBook};
pub use config::Config;
pub use error::{CanonError, Result, SyncError};
pub use position::ChapterPosition;
