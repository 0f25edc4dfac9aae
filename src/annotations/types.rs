//! Annotation types
//!
//! One generic [`Annotation`] record carries the fields every annotation
//! shares; the per-kind fields live in a payload type. The payload type also
//! names the entity collection it belongs to, which is how the sync engine,
//! stores and remote source are parameterized.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::position::ChapterPosition;

/// Annotation collections kept per user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Bookmark,
    Highlight,
    Note,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Bookmark => "bookmark",
            EntityType::Highlight => "highlight",
            EntityType::Note => "note",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bookmark" => Some(EntityType::Bookmark),
            "highlight" => Some(EntityType::Highlight),
            "note" => Some(EntityType::Note),
            _ => None,
        }
    }

    /// REST collection path segment
    pub fn resource(&self) -> &'static str {
        match self {
            EntityType::Bookmark => "bookmarks",
            EntityType::Highlight => "highlights",
            EntityType::Note => "notes",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind annotation content
pub trait Payload:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Collection this payload belongs to
    const ENTITY: EntityType;
}

/// A user annotation anchored to one chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation<P> {
    /// Client-generated id, stable for the life of the annotation
    #[serde(rename = "localId")]
    pub local_id: Uuid,
    /// Server identity, absent until the first successful sync
    #[serde(rename = "serverId", default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(rename = "bookId")]
    pub book_id: u32,
    #[serde(rename = "chapterNumber")]
    pub chapter_number: u32,
    pub payload: P,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl<P: Payload> Annotation<P> {
    /// Create a local annotation with a fresh id and no server identity
    pub fn new(chapter: ChapterPosition, payload: P) -> Self {
        let now = Utc::now();
        Self {
            local_id: Uuid::new_v4(),
            server_id: None,
            book_id: chapter.book_id,
            chapter_number: chapter.chapter_number,
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn chapter(&self) -> ChapterPosition {
        ChapterPosition::new(self.book_id, self.chapter_number)
    }

    /// Whether the server has acknowledged this annotation
    pub fn is_synced(&self) -> bool {
        self.server_id.is_some()
    }

    /// Whether two copies describe the same annotation, by local or server id
    pub fn is_same_record(&self, other: &Self) -> bool {
        self.local_id == other.local_id
            || (self.server_id.is_some() && self.server_id == other.server_id)
    }

    pub fn entity_type(&self) -> EntityType {
        P::ENTITY
    }

    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }
}

/// Bookmarks mark a whole chapter and carry no content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkPayload {}

impl Payload for BookmarkPayload {
    const ENTITY: EntityType = EntityType::Bookmark;
}

/// Highlight palette
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    #[default]
    Yellow,
    Green,
    Blue,
    Pink,
    Orange,
    Purple,
}

impl HighlightColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
            HighlightColor::Orange => "orange",
            HighlightColor::Purple => "purple",
        }
    }
}

/// A verse range, optionally narrowed to character offsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightPayload {
    #[serde(rename = "startVerse")]
    pub start_verse: u32,
    #[serde(rename = "endVerse")]
    pub end_verse: u32,
    #[serde(default)]
    pub color: HighlightColor,
    #[serde(rename = "startChar", default, skip_serializing_if = "Option::is_none")]
    pub start_char: Option<u32>,
    #[serde(rename = "endChar", default, skip_serializing_if = "Option::is_none")]
    pub end_char: Option<u32>,
}

impl HighlightPayload {
    /// Whole-verse highlight
    pub fn verses(start_verse: u32, end_verse: u32, color: HighlightColor) -> Self {
        Self {
            start_verse,
            end_verse,
            color,
            start_char: None,
            end_char: None,
        }
    }

    /// Whether `verse` falls inside the highlighted range
    pub fn covers(&self, verse: u32) -> bool {
        (self.start_verse..=self.end_verse).contains(&verse)
    }
}

impl Payload for HighlightPayload {
    const ENTITY: EntityType = EntityType::Highlight;
}

/// Free text attached to a chapter or a single verse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePayload {
    #[serde(rename = "verseNumber", default, skip_serializing_if = "Option::is_none")]
    pub verse_number: Option<u32>,
    pub content: String,
}

impl Payload for NotePayload {
    const ENTITY: EntityType = EntityType::Note;
}

pub type Bookmark = Annotation<BookmarkPayload>;
pub type Highlight = Annotation<HighlightPayload>;
pub type Note = Annotation<NotePayload>;

/// Read scope of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryScope {
    /// Every annotation of the user
    All,
    /// Annotations in one chapter
    Chapter(ChapterPosition),
}
