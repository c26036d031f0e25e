//! Audiobook database operations
//!
//! An audiobook is stored across three tables. Reads reassemble the aggregate;
//! full writes replace the child rows inside one transaction.

use crate::DbPool;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use std::path::PathBuf;
use storystream_core::{AppError, Audiobook, AudiobookId, Chapter, SourceFile, Timestamp};

const AUDIOBOOK_COLUMNS: &str = r#"
    id, title, author, total_duration_seconds,
    current_source_file_index, current_chapter_index, current_time_ms,
    progress_percent, is_completed, playback_speed, volume,
    added_date, last_played
"#;

/// Inserts the audiobook or replaces every stored field, including its files and chapters
pub async fn upsert_audiobook(pool: &DbPool, book: &Audiobook) -> Result<(), AppError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::database("Failed to begin transaction", e))?;

    sqlx::query(
        r#"
        INSERT INTO audiobooks (
            id, title, author, total_duration_seconds,
            current_source_file_index, current_chapter_index, current_time_ms,
            progress_percent, is_completed, playback_speed, volume,
            added_date, last_played
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            author = excluded.author,
            total_duration_seconds = excluded.total_duration_seconds,
            current_source_file_index = excluded.current_source_file_index,
            current_chapter_index = excluded.current_chapter_index,
            current_time_ms = excluded.current_time_ms,
            progress_percent = excluded.progress_percent,
            is_completed = excluded.is_completed,
            playback_speed = excluded.playback_speed,
            volume = excluded.volume,
            last_played = excluded.last_played
        "#,
    )
    .bind(book.id.as_string())
    .bind(&book.title)
    .bind(&book.author)
    .bind(book.total_duration_seconds)
    .bind(book.current_source_file_index as i64)
    .bind(book.current_chapter_index as i64)
    .bind(book.current_time_ms as i64)
    .bind(book.progress_percent)
    .bind(book.is_completed)
    .bind(book.playback_speed)
    .bind(book.volume.map(i64::from))
    .bind(book.added_date.as_millis())
    .bind(book.last_played.map(|t| t.as_millis()))
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::database("Failed to upsert audiobook", e))?;

    replace_children(&mut tx, book).await?;

    tx.commit()
        .await
        .map_err(|e| AppError::database("Failed to commit audiobook", e))?;

    Ok(())
}

async fn replace_children(
    tx: &mut Transaction<'_, Sqlite>,
    book: &Audiobook,
) -> Result<(), AppError> {
    let id = book.id.as_string();

    sqlx::query("DELETE FROM source_files WHERE audiobook_id = ?")
        .bind(&id)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::database("Failed to clear source files", e))?;

    sqlx::query("DELETE FROM chapters WHERE audiobook_id = ?")
        .bind(&id)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::database("Failed to clear chapters", e))?;

    for file in &book.source_files {
        sqlx::query(
            "INSERT INTO source_files (audiobook_id, file_index, path, duration_seconds) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(file.index as i64)
        .bind(file.path.to_string_lossy().into_owned())
        .bind(file.duration_seconds)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::database("Failed to insert source file", e))?;
    }

    for chapter in &book.chapters {
        sqlx::query(
            r#"
            INSERT INTO chapters (audiobook_id, chapter_index, parent_source_file_index, start_ms, end_ms, title)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(chapter.index as i64)
        .bind(chapter.parent_source_file_index as i64)
        .bind(chapter.start_ms as i64)
        .bind(chapter.end_ms as i64)
        .bind(&chapter.title)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::database("Failed to insert chapter", e))?;
    }

    Ok(())
}

/// Writes only the playback cursor and per-book preferences
///
/// Returns false when the audiobook row no longer exists.
pub async fn update_progress(pool: &DbPool, book: &Audiobook) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE audiobooks SET
            current_source_file_index = ?, current_chapter_index = ?, current_time_ms = ?,
            progress_percent = ?, is_completed = ?, playback_speed = ?, volume = ?,
            last_played = ?
        WHERE id = ?
        "#,
    )
    .bind(book.current_source_file_index as i64)
    .bind(book.current_chapter_index as i64)
    .bind(book.current_time_ms as i64)
    .bind(book.progress_percent)
    .bind(book.is_completed)
    .bind(book.playback_speed)
    .bind(book.volume.map(i64::from))
    .bind(book.last_played.map(|t| t.as_millis()))
    .bind(book.id.as_string())
    .execute(pool)
    .await
    .map_err(|e| AppError::database("Failed to update progress", e))?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_audiobook(pool: &DbPool, id: AudiobookId) -> Result<Audiobook, AppError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM audiobooks WHERE id = ?",
        AUDIOBOOK_COLUMNS
    ))
    .bind(id.as_string())
    .fetch_optional(pool)
    .await
    .map_err(|e| AppError::database("Failed to fetch audiobook", e))?
    .ok_or_else(|| AppError::RecordNotFound {
        entity: "Audiobook".to_string(),
        identifier: id.to_string(),
    })?;

    let mut book = row_to_audiobook(row)?;
    load_children(pool, &mut book).await?;
    Ok(book)
}

/// Lists every audiobook, most recently played first, then newest imports
pub async fn list_audiobooks(pool: &DbPool) -> Result<Vec<Audiobook>, AppError> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM audiobooks ORDER BY last_played IS NULL, last_played DESC, added_date DESC",
        AUDIOBOOK_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::database("Failed to list audiobooks", e))?;

    let mut books = Vec::with_capacity(rows.len());
    for row in rows {
        let mut book = row_to_audiobook(row)?;
        load_children(pool, &mut book).await?;
        books.push(book);
    }
    Ok(books)
}

/// Deletes an audiobook together with its files, chapters and bookmarks
pub async fn delete_audiobook(pool: &DbPool, id: AudiobookId) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM audiobooks WHERE id = ?")
        .bind(id.as_string())
        .execute(pool)
        .await
        .map_err(|e| AppError::database("Failed to delete audiobook", e))?;

    if result.rows_affected() == 0 {
        return Err(AppError::RecordNotFound {
            entity: "Audiobook".to_string(),
            identifier: id.to_string(),
        });
    }

    Ok(())
}

async fn load_children(pool: &DbPool, book: &mut Audiobook) -> Result<(), AppError> {
    let id = book.id.as_string();

    let file_rows = sqlx::query(
        "SELECT file_index, path, duration_seconds FROM source_files WHERE audiobook_id = ? ORDER BY file_index",
    )
    .bind(&id)
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::database("Failed to fetch source files", e))?;

    book.source_files = file_rows
        .into_iter()
        .map(row_to_source_file)
        .collect::<Result<_, _>>()?;

    let chapter_rows = sqlx::query(
        r#"
        SELECT chapter_index, parent_source_file_index, start_ms, end_ms, title
        FROM chapters WHERE audiobook_id = ? ORDER BY chapter_index
        "#,
    )
    .bind(&id)
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::database("Failed to fetch chapters", e))?;

    book.chapters = chapter_rows
        .into_iter()
        .map(row_to_chapter)
        .collect::<Result<_, _>>()?;

    Ok(())
}

fn get_index(row: &SqliteRow, column: &str) -> Result<usize, AppError> {
    let value: i64 = row
        .try_get(column)
        .map_err(|e| AppError::database(format!("Missing {}", column), e))?;
    usize::try_from(value).map_err(|e| AppError::database(format!("Invalid {}", column), e))
}

fn get_millis(row: &SqliteRow, column: &str) -> Result<u64, AppError> {
    let value: i64 = row
        .try_get(column)
        .map_err(|e| AppError::database(format!("Missing {}", column), e))?;
    u64::try_from(value).map_err(|e| AppError::database(format!("Invalid {}", column), e))
}

/// Converts the audiobook row alone; files and chapters are loaded separately
fn row_to_audiobook(row: SqliteRow) -> Result<Audiobook, AppError> {
    let id_str: String = row
        .try_get("id")
        .map_err(|e| AppError::database("Missing audiobook ID", e))?;
    let id = AudiobookId::from_string(&id_str)
        .map_err(|e| AppError::database("Invalid audiobook ID", e))?;

    let title: String = row
        .try_get("title")
        .map_err(|e| AppError::database("Missing title", e))?;
    let total_duration_seconds: f64 = row
        .try_get("total_duration_seconds")
        .map_err(|e| AppError::database("Missing total duration", e))?;
    let progress_percent: f64 = row
        .try_get("progress_percent")
        .map_err(|e| AppError::database("Missing progress", e))?;
    let is_completed: bool = row
        .try_get("is_completed")
        .map_err(|e| AppError::database("Missing is_completed", e))?;
    let volume: Option<i64> = row
        .try_get("volume")
        .map_err(|e| AppError::database("Invalid volume", e))?;
    let added_date_ms: i64 = row
        .try_get("added_date")
        .map_err(|e| AppError::database("Missing added_date", e))?;
    let last_played_ms: Option<i64> = row
        .try_get("last_played")
        .map_err(|e| AppError::database("Invalid last_played", e))?;

    Ok(Audiobook {
        id,
        title,
        author: row.try_get("author").ok().flatten(),
        source_files: Vec::new(),
        chapters: Vec::new(),
        total_duration_seconds,
        current_source_file_index: get_index(&row, "current_source_file_index")?,
        current_chapter_index: get_index(&row, "current_chapter_index")?,
        current_time_ms: get_millis(&row, "current_time_ms")?,
        progress_percent,
        is_completed,
        playback_speed: row.try_get("playback_speed").ok().flatten(),
        volume: volume.map(|v| v.clamp(0, 100) as u8),
        added_date: Timestamp::from_millis(added_date_ms),
        last_played: last_played_ms.map(Timestamp::from_millis),
    })
}

fn row_to_source_file(row: SqliteRow) -> Result<SourceFile, AppError> {
    let path: String = row
        .try_get("path")
        .map_err(|e| AppError::database("Missing source file path", e))?;
    let duration_seconds: f64 = row
        .try_get("duration_seconds")
        .map_err(|e| AppError::database("Missing source file duration", e))?;

    Ok(SourceFile {
        index: get_index(&row, "file_index")?,
        path: PathBuf::from(path),
        duration_seconds,
    })
}

fn row_to_chapter(row: SqliteRow) -> Result<Chapter, AppError> {
    let title: String = row
        .try_get("title")
        .map_err(|e| AppError::database("Missing chapter title", e))?;

    Ok(Chapter {
        index: get_index(&row, "chapter_index")?,
        parent_source_file_index: get_index(&row, "parent_source_file_index")?,
        start_ms: get_millis(&row, "start_ms")?,
        end_ms: get_millis(&row, "end_ms")?,
        title,
    })
}
