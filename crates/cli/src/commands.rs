// FILE: crates/cli/src/commands.rs

use crate::manifest::Manifest;
use crate::player::{self, PlayOptions};
use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use console::style;
use std::path::Path;
use std::sync::Arc;
use storystream_config::{Config, ConfigManager};
use storystream_core::{Audiobook, AudiobookId, BookmarkId, Duration as CoreDuration};
use storystream_database::{queries, DbPool, SqliteRepository};
use storystream_playback::timeline::{absolute_to_local, local_to_absolute, resolve_chapter};
use storystream_playback::BookmarkManager;

/// Create the database and the default config file
pub fn init(manager: &ConfigManager, db_path: &Path) -> Result<()> {
    let created = manager
        .initialize()
        .context("Failed to write default config")?;

    println!(
        "{} Database ready at {}",
        style("✓").green().bold(),
        db_path.display()
    );
    if created {
        println!("  Wrote default config to {}", manager.config_path().display());
    } else {
        println!("  Using config at {}", manager.config_path().display());
    }

    Ok(())
}

/// Import an audiobook from a JSON manifest
pub async fn import_audiobook(pool: &DbPool, matches: &ArgMatches) -> Result<()> {
    let manifest_path = Path::new(
        matches
            .get_one::<String>("manifest")
            .ok_or_else(|| anyhow!("Manifest path is required"))?,
    );

    let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    let book = Manifest::from_file(manifest_path)?.into_audiobook(base_dir)?;

    for file in &book.source_files {
        if !file.path.is_file() {
            println!(
                "{} Source file not found: {}",
                style("!").yellow().bold(),
                file.path.display()
            );
        }
    }

    queries::upsert_audiobook(pool, &book)
        .await
        .context("Failed to store audiobook")?;

    println!("{} Audiobook imported!", style("✓").green().bold());
    println!("  ID: {}", book.id);
    println!("  Title: {}", book.title);
    if let Some(author) = &book.author {
        println!("  Author: {}", author);
    }
    println!(
        "  {} files, {} chapters, {}",
        book.source_files.len(),
        book.chapters.len(),
        CoreDuration::from_millis(book.total_duration_ms())
    );

    Ok(())
}

/// List all audiobooks
pub async fn list_audiobooks(pool: &DbPool) -> Result<()> {
    let books = queries::list_audiobooks(pool)
        .await
        .context("Failed to list audiobooks")?;

    if books.is_empty() {
        println!("No audiobooks yet. Use 'import' to add one from a manifest.");
        return Ok(());
    }

    println!("\n{} Audiobooks", style(books.len()).bold().cyan());
    println!("{}", "=".repeat(80));

    for book in &books {
        print_audiobook_summary(book);
    }

    Ok(())
}

/// Show files, chapters and the saved position of an audiobook
pub async fn show_audiobook_info(pool: &DbPool, matches: &ArgMatches) -> Result<()> {
    let book = load_audiobook(pool, matches).await?;

    println!("\n{}", style("Audiobook Information").bold().cyan());
    println!("{}", "=".repeat(80));
    println!("ID: {}", book.id);
    println!("Title: {}", style(&book.title).bold());
    if let Some(author) = &book.author {
        println!("Author: {}", author);
    }
    println!(
        "Duration: {}",
        CoreDuration::from_millis(book.total_duration_ms())
    );

    println!("\nSource Files:");
    for file in &book.source_files {
        println!(
            "  [{}] {} ({})",
            file.index,
            file.path.display(),
            CoreDuration::from_millis(file.duration_ms())
        );
    }

    println!("\nChapters:");
    if book.chapters.is_empty() {
        println!("  {}", style("none").dim());
    }
    for chapter in &book.chapters {
        let marker = if chapter.index == book.current_chapter_index {
            style("▶").green().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{} [{}] {} (file {}, {} - {})",
            marker,
            chapter.index,
            chapter.title,
            chapter.parent_source_file_index,
            CoreDuration::from_millis(chapter.start_ms),
            CoreDuration::from_millis(chapter.end_ms)
        );
    }

    println!("\nPlayback:");
    println!(
        "  Position: {} ({}) in file {}",
        CoreDuration::from_millis(book.current_time_ms),
        format_progress(&book),
        book.current_source_file_index
    );
    if let (Some(speed), Some(volume)) = (book.playback_speed, book.volume) {
        println!("  Speed: {:.2}x  Volume: {}", speed, volume);
    }
    if let Some(last_played) = book.last_played {
        println!("  Last Played: {}", format_timestamp(last_played.as_millis()));
    }

    Ok(())
}

/// Map an absolute position to its file, local offset and chapter
pub async fn locate_position(pool: &DbPool, matches: &ArgMatches) -> Result<()> {
    let book = load_audiobook(pool, matches).await?;
    let position = parse_position(matches)?;

    let local = absolute_to_local(&book, i64::try_from(position).unwrap_or(i64::MAX));
    let absolute = local_to_absolute(&book, local.file_index, local.local_ms);

    println!("\n{}", style(&book.title).bold());
    if absolute != position {
        println!(
            "  {} {}ms is outside the book, clamped to {}ms",
            style("!").yellow().bold(),
            position,
            absolute
        );
    }

    let file = book
        .source_file(local.file_index)
        .ok_or_else(|| anyhow!("'{}' has no source files", book.title))?;
    println!("  Absolute: {}ms ({})", absolute, CoreDuration::from_millis(absolute));
    println!("  File: [{}] {}", file.index, file.path.display());
    println!("  Local: {}ms ({})", local.local_ms, CoreDuration::from_millis(local.local_ms));

    match resolve_chapter(&book, local.file_index, local.local_ms) {
        Some(chapter) => println!("  Chapter: [{}] {}", chapter.index, chapter.title),
        None => println!("  Chapter: {}", style("none").dim()),
    }

    Ok(())
}

/// List bookmarks in position order
pub async fn list_bookmarks(pool: &DbPool, matches: &ArgMatches) -> Result<()> {
    let book = load_audiobook(pool, matches).await?;
    let bookmarks = bookmark_manager(pool)
        .list(book.id)
        .await
        .context("Failed to list bookmarks")?;

    if bookmarks.is_empty() {
        println!("No bookmarks for '{}'.", book.title);
        return Ok(());
    }

    println!(
        "\n{} Bookmarks in {}",
        style(bookmarks.len()).bold().cyan(),
        style(&book.title).bold()
    );
    println!("{}", "=".repeat(80));
    for bookmark in &bookmarks {
        println!(
            "  {}  {}  {}",
            style(bookmark.position()).bold(),
            bookmark.note,
            style(bookmark.id).dim()
        );
    }

    Ok(())
}

/// Add a bookmark at an absolute position
pub async fn add_bookmark(pool: &DbPool, matches: &ArgMatches) -> Result<()> {
    let book = load_audiobook(pool, matches).await?;
    let position = parse_position(matches)?;

    let total = book.total_duration_ms();
    if position > total {
        bail!(
            "Position {} is past the end of '{}' ({})",
            CoreDuration::from_millis(position),
            book.title,
            CoreDuration::from_millis(total)
        );
    }

    let note = matches.get_one::<String>("note").map(String::as_str);
    let bookmark = bookmark_manager(pool)
        .add(book.id, position, note)
        .await
        .context("Failed to add bookmark")?;

    println!("{} Bookmark added", style("✓").green().bold());
    println!("  ID: {}", bookmark.id);
    println!("  At: {}", bookmark.position());
    println!("  Note: {}", bookmark.note);

    Ok(())
}

/// Delete a bookmark; one that is already gone counts as deleted
pub async fn delete_bookmark(pool: &DbPool, matches: &ArgMatches) -> Result<()> {
    let id_str = matches
        .get_one::<String>("id")
        .ok_or_else(|| anyhow!("Bookmark ID is required"))?;
    let id = BookmarkId::from_string(id_str).context("Invalid bookmark ID format")?;

    bookmark_manager(pool)
        .delete(id)
        .await
        .context("Failed to delete bookmark")?;

    println!("{} Bookmark deleted", style("✓").green().bold());
    Ok(())
}

/// Run a simulated playback session
pub async fn play_audiobook(pool: &DbPool, config: &Config, matches: &ArgMatches) -> Result<()> {
    let book = load_audiobook(pool, matches).await?;

    let from = match matches.get_one::<String>("from") {
        Some(value) => Some(parse_position_value(value)?),
        None => None,
    };
    let options = PlayOptions {
        seconds: matches.get_one::<u64>("seconds").copied().unwrap_or(10),
        from,
        speed: matches.get_one::<f32>("speed").copied(),
        time_scale: matches.get_one::<f64>("time-scale").copied().unwrap_or(1.0),
    };

    println!("\n{} {}", style("▶").green().bold(), style(&book.title).bold());
    if let Some(author) = &book.author {
        println!("by {}", author);
    }

    player::run(pool, config, book, options).await
}

/// Delete an audiobook together with its bookmarks
pub async fn delete_audiobook(pool: &DbPool, matches: &ArgMatches) -> Result<()> {
    let book = load_audiobook(pool, matches).await?;

    if !matches.get_flag("force") {
        println!("Are you sure you want to delete '{}'? (y/N)", book.title);
        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .context("Failed to read input")?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    queries::delete_audiobook(pool, book.id)
        .await
        .context("Failed to delete audiobook")?;

    println!("{} Audiobook deleted: {}", style("✓").green().bold(), book.title);

    Ok(())
}

async fn load_audiobook(pool: &DbPool, matches: &ArgMatches) -> Result<Audiobook> {
    let id_str = matches
        .get_one::<String>("id")
        .ok_or_else(|| anyhow!("Audiobook ID is required"))?;
    let id = AudiobookId::from_string(id_str).context("Invalid audiobook ID format")?;

    queries::get_audiobook(pool, id)
        .await
        .context("Failed to get audiobook")
}

fn bookmark_manager(pool: &DbPool) -> BookmarkManager {
    BookmarkManager::new(Arc::new(SqliteRepository::new(pool.clone())))
}

fn parse_position(matches: &ArgMatches) -> Result<u64> {
    let value = matches
        .get_one::<String>("position")
        .ok_or_else(|| anyhow!("Position is required"))?;
    parse_position_value(value)
}

fn parse_position_value(value: &str) -> Result<u64> {
    value
        .parse::<CoreDuration>()
        .map(|d| d.as_millis())
        .map_err(|e| anyhow!("Invalid position '{}': {}", value, e))
}

fn print_audiobook_summary(book: &Audiobook) {
    println!("\n{}", style(&book.title).bold());
    if let Some(author) = &book.author {
        println!("  by {}", author);
    }
    println!(
        "  ID: {} | {} / {} | {}",
        book.id,
        CoreDuration::from_millis(book.current_time_ms),
        CoreDuration::from_millis(book.total_duration_ms()),
        format_progress(book)
    );
    if book.is_completed {
        println!("  {}", style("✓ Finished").green());
    }
}

fn format_progress(book: &Audiobook) -> String {
    format!("{:.1}%", book.progress_percent)
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|utc| {
            utc.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| millis.to_string())
}
