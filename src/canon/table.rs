//! Ordered book table with precomputed chapter offsets

use serde::{Deserialize, Serialize};

use super::books::CANONICAL_BOOKS;
use crate::error::CanonError;

/// One book of the canonical text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalBook {
    /// Book id, 1-based and sequential
    pub id: u32,
    /// Display name
    pub name: String,
    /// Number of chapters, always positive
    #[serde(rename = "chapterCount")]
    pub chapter_count: u32,
}

/// Immutable, validated table of books ordered by id
///
/// Loaded once at startup and shared by reference; the cumulative chapter
/// offsets are computed here so that position math never re-walks the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookTable {
    books: Vec<CanonicalBook>,
    /// `offsets[i]` = chapters in all books before `books[i]`
    offsets: Vec<u32>,
    total_chapters: u32,
}

impl BookTable {
    /// The built-in 66 book table
    pub fn canonical() -> Self {
        let books = CANONICAL_BOOKS
            .iter()
            .zip(1u32..)
            .map(|(&(name, chapter_count), id)| CanonicalBook {
                id,
                name: name.to_string(),
                chapter_count,
            })
            .collect();

        Self::build(books)
    }

    /// Validate and index a table supplied by a data loader
    ///
    /// Ids must run 1, 2, 3, ... in order and every book needs at least one
    /// chapter.
    pub fn from_books(books: Vec<CanonicalBook>) -> Result<Self, CanonError> {
        if books.is_empty() {
            return Err(CanonError::Empty);
        }

        for (book, expected) in books.iter().zip(1u32..) {
            if book.id != expected {
                return Err(CanonError::OutOfOrder {
                    expected,
                    found: book.id,
                });
            }
            if book.chapter_count == 0 {
                return Err(CanonError::NoChapters(book.id));
            }
        }

        Ok(Self::build(books))
    }

    fn build(books: Vec<CanonicalBook>) -> Self {
        let mut offsets = Vec::with_capacity(books.len());
        let mut running = 0u32;
        for book in &books {
            offsets.push(running);
            running += book.chapter_count;
        }

        Self {
            books,
            offsets,
            total_chapters: running,
        }
    }

    /// All books in id order
    pub fn books(&self) -> &[CanonicalBook] {
        &self.books
    }

    pub fn book_count(&self) -> u32 {
        self.books.len() as u32
    }

    pub fn total_chapters(&self) -> u32 {
        self.total_chapters
    }

    /// Look up a book by id
    pub fn get(&self, book_id: u32) -> Option<&CanonicalBook> {
        let slot = book_id.checked_sub(1)? as usize;
        self.books.get(slot)
    }

    pub fn chapter_count(&self, book_id: u32) -> Option<u32> {
        self.get(book_id).map(|b| b.chapter_count)
    }

    /// Display name of a book, if it exists
    pub fn name(&self, book_id: u32) -> Option<&str> {
        self.get(book_id).map(|b| b.name.as_str())
    }

    /// Chapters in all books preceding `book_id`
    pub fn chapters_before(&self, book_id: u32) -> Option<u32> {
        let slot = book_id.checked_sub(1)? as usize;
        self.offsets.get(slot).copied()
    }

    /// Book whose cumulative chapter range contains `index`, with the
    /// chapters preceding it
    pub(crate) fn book_at_index(&self, index: u32) -> Option<(&CanonicalBook, u32)> {
        if index >= self.total_chapters {
            return None;
        }
        // Last book whose offset is <= index
        let slot = self.offsets.partition_point(|&offset| offset <= index) - 1;
        Some((&self.books[slot], self.offsets[slot]))
    }
}

impl Default for BookTable {
    fn default() -> Self {
        Self::canonical()
    }
}
