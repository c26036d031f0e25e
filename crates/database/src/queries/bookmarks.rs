//! Bookmark database operations

use crate::DbPool;
use storystream_core::{AppError, AudiobookId, Bookmark, BookmarkId, Timestamp};

/// Inserts or updates a bookmark
///
/// Returns false when the owning audiobook no longer exists.
pub async fn upsert_bookmark(pool: &DbPool, bookmark: &Bookmark) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO bookmarks (id, audiobook_id, note, position_ms, created_at)
        SELECT ?, ?, ?, ?, ?
        WHERE EXISTS (SELECT 1 FROM audiobooks WHERE id = ?)
        ON CONFLICT(id) DO UPDATE SET
            note = excluded.note,
            position_ms = excluded.position_ms
        "#,
    )
    .bind(bookmark.id.as_string())
    .bind(bookmark.audiobook_id.as_string())
    .bind(&bookmark.note)
    .bind(bookmark.position_ms as i64)
    .bind(bookmark.created_at.as_millis())
    .bind(bookmark.audiobook_id.as_string())
    .execute(pool)
    .await
    .map_err(|e| AppError::database("Failed to upsert bookmark", e))?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_bookmark(pool: &DbPool, id: BookmarkId) -> Result<Bookmark, AppError> {
    let row = sqlx::query(
        "SELECT id, audiobook_id, note, position_ms, created_at FROM bookmarks WHERE id = ?",
    )
    .bind(id.as_string())
    .fetch_optional(pool)
    .await
    .map_err(|e| AppError::database("Failed to fetch bookmark", e))?
    .ok_or_else(|| AppError::RecordNotFound {
        entity: "Bookmark".to_string(),
        identifier: id.to_string(),
    })?;

    row_to_bookmark(row)
}

/// Gets all bookmarks for an audiobook, ascending by position
pub async fn get_bookmarks_by_audiobook(
    pool: &DbPool,
    audiobook_id: AudiobookId,
) -> Result<Vec<Bookmark>, AppError> {
    let rows = sqlx::query(
        r#"
        SELECT id, audiobook_id, note, position_ms, created_at
        FROM bookmarks WHERE audiobook_id = ?
        ORDER BY position_ms, created_at
        "#,
    )
    .bind(audiobook_id.as_string())
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::database("Failed to get audiobook bookmarks", e))?;

    rows.into_iter().map(row_to_bookmark).collect()
}

/// Deletes a bookmark
///
/// A bookmark that is already gone yields `ConcurrentDeleteConflict`.
pub async fn delete_bookmark(pool: &DbPool, id: BookmarkId) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM bookmarks WHERE id = ?")
        .bind(id.as_string())
        .execute(pool)
        .await
        .map_err(|e| AppError::database("Failed to delete bookmark", e))?;

    if result.rows_affected() == 0 {
        return Err(AppError::ConcurrentDeleteConflict {
            entity: "Bookmark".to_string(),
            identifier: id.to_string(),
        });
    }

    Ok(())
}

pub(crate) fn row_to_bookmark(row: sqlx::sqlite::SqliteRow) -> Result<Bookmark, AppError> {
    use sqlx::Row;

    let id_str: String = row
        .try_get("id")
        .map_err(|e| AppError::database("Missing bookmark ID", e))?;
    let id = BookmarkId::from_string(&id_str)
        .map_err(|e| AppError::database("Invalid bookmark ID", e))?;

    let audiobook_id_str: String = row
        .try_get("audiobook_id")
        .map_err(|e| AppError::database("Missing audiobook ID", e))?;
    let audiobook_id = AudiobookId::from_string(&audiobook_id_str)
        .map_err(|e| AppError::database("Invalid audiobook ID", e))?;

    let note: String = row
        .try_get("note")
        .map_err(|e| AppError::database("Missing note", e))?;
    let position_ms: i64 = row
        .try_get("position_ms")
        .map_err(|e| AppError::database("Missing position", e))?;
    let created_at_ms: i64 = row
        .try_get("created_at")
        .map_err(|e| AppError::database("Missing created_at", e))?;

    Ok(Bookmark {
        id,
        audiobook_id,
        note,
        position_ms: position_ms.max(0) as u64,
        created_at: Timestamp::from_millis(created_at_ms),
    })
}
