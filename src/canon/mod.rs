//! Canonical text module
//!
//! The fixed, ordered set of 66 books and their chapter counts that defines
//! the addressable space of the reader (1,189 chapters in total).

mod books;
mod table;

pub use books::{CANONICAL_BOOKS, TOTAL_CHAPTERS};
pub use table::{BookTable, CanonicalBook};
