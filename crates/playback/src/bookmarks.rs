//! Bookmark creation, deletion and listing for an audiobook

use std::sync::Arc;
use storystream_core::{AppError, AudiobookId, AudiobookRepository, Bookmark, BookmarkId, Result};

/// Format of the note given to bookmarks created without one
pub const DEFAULT_NOTE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct BookmarkManager {
    repository: Arc<dyn AudiobookRepository>,
}

impl BookmarkManager {
    pub fn new(repository: Arc<dyn AudiobookRepository>) -> Self {
        Self { repository }
    }

    /// Persists a bookmark at an absolute position
    ///
    /// A blank note is replaced by the local creation time.
    pub async fn add(
        &self,
        audiobook_id: AudiobookId,
        position_ms: u64,
        note: Option<&str>,
    ) -> Result<Bookmark> {
        let bookmark = Bookmark::new(audiobook_id, position_ms, note_or_timestamp(note));

        match self.repository.upsert_bookmark(&bookmark).await {
            Ok(Some(saved)) => {
                log::info!("Added bookmark '{}' at {}", saved.note, saved.position());
                Ok(saved)
            }
            Ok(None) => Err(AppError::PersistenceFailure {
                message: format!("audiobook {} is no longer stored", audiobook_id),
                source: None,
            }),
            Err(e) => Err(AppError::persistence("Failed to save bookmark", e)),
        }
    }

    /// Like [`add`](Self::add), and also inserts the result into a sorted view
    pub async fn add_into(
        &self,
        audiobook_id: AudiobookId,
        position_ms: u64,
        note: Option<&str>,
        view: &mut Vec<Bookmark>,
    ) -> Result<Bookmark> {
        let bookmark = self.add(audiobook_id, position_ms, note).await?;
        insert_sorted(view, bookmark.clone());
        Ok(bookmark)
    }

    /// Deletes a bookmark. One that is already gone counts as deleted.
    pub async fn delete(&self, id: BookmarkId) -> Result<()> {
        match self.repository.delete_bookmark(id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_benign() => {
                log::debug!("Bookmark {} was already deleted", id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// All bookmarks of a book in position order
    pub async fn list(&self, audiobook_id: AudiobookId) -> Result<Vec<Bookmark>> {
        let mut bookmarks = self
            .repository
            .get_bookmarks_by_audiobook(audiobook_id)
            .await?;
        bookmarks.sort_by_key(Bookmark::sort_key);
        Ok(bookmarks)
    }
}

/// Trimmed note, or the current local time when it is blank
pub fn note_or_timestamp(note: Option<&str>) -> String {
    match note.map(str::trim) {
        Some(note) if !note.is_empty() => note.to_string(),
        _ => chrono::Local::now().format(DEFAULT_NOTE_FORMAT).to_string(),
    }
}

/// Inserts after any bookmarks at the same position; returns the new index
pub fn insert_sorted(view: &mut Vec<Bookmark>, bookmark: Bookmark) -> usize {
    let index = view.partition_point(|existing| existing.sort_key() <= bookmark.sort_key());
    view.insert(index, bookmark);
    index
}
