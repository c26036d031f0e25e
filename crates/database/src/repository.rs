//! SQLite-backed implementation of the playback session's repository boundary

use crate::queries;
use crate::DbPool;
use async_trait::async_trait;
use storystream_core::{
    AppError, Audiobook, AudiobookId, AudiobookRepository, Bookmark, BookmarkId,
};

/// Repository over a shared connection pool. Clones share the pool.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl AudiobookRepository for SqliteRepository {
    /// Playback only ever changes the cursor and preferences, so this writes
    /// those columns. A book deleted mid-session is not recreated.
    async fn upsert_audiobook(&self, book: &Audiobook) -> Result<Option<Audiobook>, AppError> {
        if queries::update_progress(&self.pool, book).await? {
            Ok(Some(book.clone()))
        } else {
            log::warn!("Audiobook {} vanished before its progress was saved", book.id);
            Ok(None)
        }
    }

    async fn get_bookmarks_by_audiobook(
        &self,
        id: AudiobookId,
    ) -> Result<Vec<Bookmark>, AppError> {
        queries::get_bookmarks_by_audiobook(&self.pool, id).await
    }

    async fn upsert_bookmark(&self, bookmark: &Bookmark) -> Result<Option<Bookmark>, AppError> {
        if queries::upsert_bookmark(&self.pool, bookmark).await? {
            Ok(Some(bookmark.clone()))
        } else {
            Ok(None)
        }
    }

    async fn delete_bookmark(&self, id: BookmarkId) -> Result<(), AppError> {
        queries::delete_bookmark(&self.pool, id).await
    }
}
