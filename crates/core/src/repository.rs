//! Persistence boundary consumed by the playback session
//!
//! The session never talks to SQL directly. It writes through this trait so the
//! store can be SQLite in the app and an in-memory fake in tests.

use crate::error::Result;
use crate::types::{Audiobook, AudiobookId, Bookmark, BookmarkId};
use async_trait::async_trait;

#[async_trait]
pub trait AudiobookRepository: Send + Sync {
    /// Writes the book's playback state. `Ok(None)` means the store accepted
    /// the call but did not persist anything (the book row is gone).
    async fn upsert_audiobook(&self, book: &Audiobook) -> Result<Option<Audiobook>>;

    /// All bookmarks of a book, sorted ascending by `position_ms`
    async fn get_bookmarks_by_audiobook(&self, id: AudiobookId) -> Result<Vec<Bookmark>>;

    async fn upsert_bookmark(&self, bookmark: &Bookmark) -> Result<Option<Bookmark>>;

    /// Fails with `ConcurrentDeleteConflict` when the row is already gone
    async fn delete_bookmark(&self, id: BookmarkId) -> Result<()>;
}
