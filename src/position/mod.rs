//! Chapter position indexing
//!
//! Pure functions mapping a `(book, chapter)` reference to and from an
//! absolute, zero-based chapter index across the whole canonical text, plus
//! neighbor lookups with optional circular wrap-around.
//!
//! All functions are total: unknown books or out-of-range chapters yield
//! `None` instead of panicking.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::canon::BookTable;

/// A book/chapter reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChapterPosition {
    #[serde(rename = "bookId")]
    pub book_id: u32,
    #[serde(rename = "chapterNumber")]
    pub chapter_number: u32,
}

impl ChapterPosition {
    pub const fn new(book_id: u32, chapter_number: u32) -> Self {
        Self {
            book_id,
            chapter_number,
        }
    }

    /// First chapter of the first book
    pub const fn start() -> Self {
        Self::new(1, 1)
    }
}

impl Default for ChapterPosition {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for ChapterPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.book_id, self.chapter_number)
    }
}

/// Whether `position` names an existing chapter
pub fn is_valid(position: ChapterPosition, books: &BookTable) -> bool {
    books
        .chapter_count(position.book_id)
        .is_some_and(|count| (1..=count).contains(&position.chapter_number))
}

/// Absolute index of `position`, or `None` if it does not exist
pub fn to_absolute_index(position: ChapterPosition, books: &BookTable) -> Option<u32> {
    if !is_valid(position, books) {
        return None;
    }
    let before = books.chapters_before(position.book_id)?;
    Some(before + position.chapter_number - 1)
}

/// Position at absolute `index`, or `None` past the last chapter
pub fn from_absolute_index(index: u32, books: &BookTable) -> Option<ChapterPosition> {
    let (book, before) = books.book_at_index(index)?;
    Some(ChapterPosition::new(book.id, index - before + 1))
}

/// Highest valid absolute index
pub fn max_index(books: &BookTable) -> u32 {
    books.total_chapters().saturating_sub(1)
}

/// Chapter following `position`
///
/// Crosses into chapter 1 of the next book at the end of a book. At the very
/// last chapter, wraps to the first chapter when `circular`, otherwise `None`.
pub fn next_position(
    position: ChapterPosition,
    books: &BookTable,
    circular: bool,
) -> Option<ChapterPosition> {
    let count = books.chapter_count(position.book_id)?;
    if !(1..=count).contains(&position.chapter_number) {
        return None;
    }

    if position.chapter_number < count {
        return Some(ChapterPosition::new(
            position.book_id,
            position.chapter_number + 1,
        ));
    }
    if position.book_id < books.book_count() {
        return Some(ChapterPosition::new(position.book_id + 1, 1));
    }

    circular.then(ChapterPosition::start)
}

/// Chapter preceding `position`
///
/// Crosses into the last chapter of the previous book at chapter 1. At the
/// very first chapter, wraps to the last chapter of the last book when
/// `circular`, otherwise `None`.
pub fn prev_position(
    position: ChapterPosition,
    books: &BookTable,
    circular: bool,
) -> Option<ChapterPosition> {
    let count = books.chapter_count(position.book_id)?;
    if !(1..=count).contains(&position.chapter_number) {
        return None;
    }

    if position.chapter_number > 1 {
        return Some(ChapterPosition::new(
            position.book_id,
            position.chapter_number - 1,
        ));
    }
    if position.book_id > 1 {
        let prev_book = position.book_id - 1;
        return books
            .chapter_count(prev_book)
            .map(|last| ChapterPosition::new(prev_book, last));
    }

    if circular {
        last_position(books)
    } else {
        None
    }
}

/// Last chapter of the last book
pub fn last_position(books: &BookTable) -> Option<ChapterPosition> {
    from_absolute_index(max_index(books), books)
}

/// Whether a "next" action is available
///
/// Always true in circular mode.
pub fn can_go_next(position: ChapterPosition, books: &BookTable, circular: bool) -> bool {
    circular || next_position(position, books, false).is_some()
}

/// Whether a "previous" action is available
///
/// Always true in circular mode.
pub fn can_go_previous(position: ChapterPosition, books: &BookTable, circular: bool) -> bool {
    circular || prev_position(position, books, false).is_some()
}

/// Clamp raw, possibly out-of-range input onto an existing chapter
///
/// The book id is clamped into the table, the chapter to `[1, chapter count]`.
pub fn clamp(book_id: i64, chapter_number: i64, books: &BookTable) -> ChapterPosition {
    let book_id = book_id.clamp(1, i64::from(books.book_count().max(1))) as u32;
    let count = books.chapter_count(book_id).unwrap_or(1);
    let chapter_number = chapter_number.clamp(1, i64::from(count)) as u32;
    ChapterPosition::new(book_id, chapter_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::CanonicalBook;

    fn canon() -> BookTable {
        BookTable::canonical()
    }

    #[test]
    fn test_bijection_over_every_chapter() {
        let books = canon();
        for index in 0..=max_index(&books) {
            let position = from_absolute_index(index, &books).unwrap();
            assert_eq!(to_absolute_index(position, &books), Some(index));
        }
        for book in books.books() {
            for chapter in 1..=book.chapter_count {
                let position = ChapterPosition::new(book.id, chapter);
                let index = to_absolute_index(position, &books).unwrap();
                assert_eq!(from_absolute_index(index, &books), Some(position));
            }
        }
    }

    #[test]
    fn test_index_endpoints() {
        let books = canon();
        assert_eq!(max_index(&books), 1188);
        assert_eq!(to_absolute_index(ChapterPosition::new(1, 1), &books), Some(0));
        assert_eq!(
            from_absolute_index(1188, &books),
            Some(ChapterPosition::new(66, 22))
        );
        assert_eq!(from_absolute_index(1189, &books), None);
    }

    #[test]
    fn test_invalid_positions() {
        let books = canon();
        assert_eq!(to_absolute_index(ChapterPosition::new(0, 1), &books), None);
        assert_eq!(to_absolute_index(ChapterPosition::new(67, 1), &books), None);
        assert_eq!(to_absolute_index(ChapterPosition::new(1, 0), &books), None);
        assert_eq!(to_absolute_index(ChapterPosition::new(1, 51), &books), None);
        assert_eq!(next_position(ChapterPosition::new(99, 1), &books, true), None);
        assert_eq!(prev_position(ChapterPosition::new(99, 1), &books, true), None);
    }

    #[test]
    fn test_linear_boundaries() {
        let books = canon();
        assert_eq!(next_position(ChapterPosition::new(66, 22), &books, false), None);
        assert_eq!(prev_position(ChapterPosition::new(1, 1), &books, false), None);
        assert!(!can_go_next(ChapterPosition::new(66, 22), &books, false));
        assert!(!can_go_previous(ChapterPosition::new(1, 1), &books, false));
        assert!(can_go_next(ChapterPosition::new(1, 1), &books, false));
        assert!(can_go_previous(ChapterPosition::new(66, 22), &books, false));
    }

    #[test]
    fn test_circular_boundaries() {
        let books = canon();
        assert_eq!(
            next_position(ChapterPosition::new(66, 22), &books, true),
            Some(ChapterPosition::new(1, 1))
        );
        assert_eq!(
            prev_position(ChapterPosition::new(1, 1), &books, true),
            Some(ChapterPosition::new(66, 22))
        );
        assert!(can_go_next(ChapterPosition::new(66, 22), &books, true));
        assert!(can_go_previous(ChapterPosition::new(1, 1), &books, true));
    }

    #[test]
    fn test_cross_book_transition() {
        let books = canon();
        assert_eq!(
            next_position(ChapterPosition::new(1, 50), &books, false),
            Some(ChapterPosition::new(2, 1))
        );
        assert_eq!(
            prev_position(ChapterPosition::new(2, 1), &books, false),
            Some(ChapterPosition::new(1, 50))
        );
    }

    #[test]
    fn test_single_chapter_books() {
        let books = canon();
        // Obadiah (31) has one chapter
        assert_eq!(
            next_position(ChapterPosition::new(31, 1), &books, false),
            Some(ChapterPosition::new(32, 1))
        );
        assert_eq!(
            prev_position(ChapterPosition::new(31, 1), &books, false),
            Some(ChapterPosition::new(30, 9))
        );
        // 2 John (63) -> 3 John (64) -> Jude (65)
        assert_eq!(
            next_position(ChapterPosition::new(63, 1), &books, false),
            Some(ChapterPosition::new(64, 1))
        );
        assert_eq!(
            prev_position(ChapterPosition::new(65, 1), &books, false),
            Some(ChapterPosition::new(64, 1))
        );
    }

    #[test]
    fn test_single_book_single_chapter_table() {
        let books = BookTable::from_books(vec![CanonicalBook {
            id: 1,
            name: "Only".to_string(),
            chapter_count: 1,
        }])
        .unwrap();
        let only = ChapterPosition::start();
        assert_eq!(next_position(only, &books, false), None);
        assert_eq!(next_position(only, &books, true), Some(only));
        assert_eq!(prev_position(only, &books, true), Some(only));
    }

    #[test]
    fn test_clamp() {
        let books = canon();
        assert_eq!(clamp(0, 0, &books), ChapterPosition::new(1, 1));
        assert_eq!(clamp(-4, 3, &books), ChapterPosition::new(1, 3));
        assert_eq!(clamp(70, 1, &books), ChapterPosition::new(66, 1));
        assert_eq!(clamp(1, 99, &books), ChapterPosition::new(1, 50));
        assert_eq!(clamp(19, 150, &books), ChapterPosition::new(19, 150));
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&ChapterPosition::new(43, 3)).unwrap();
        assert_eq!(json, r#"{"bookId":43,"chapterNumber":3}"#);
    }
}
