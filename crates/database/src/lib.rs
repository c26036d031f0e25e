//! StoryStream Database Layer
//!
//! SQLite storage for audiobooks, their source files and chapters, and
//! bookmarks. Query functions take a `&DbPool`; [`SqliteRepository`] wraps
//! them behind the `AudiobookRepository` trait the playback session writes to.

pub mod connection;
pub mod migrations;
pub mod queries;
pub mod repository;

pub use connection::{connect, DatabaseConfig, DbPool};
pub use migrations::{current_version, optimize, run_migrations, verify_integrity};
pub use repository::SqliteRepository;

/// Connects to the database file and brings its schema up to date
pub async fn open(path: impl Into<std::path::PathBuf>) -> Result<DbPool, storystream_core::AppError> {
    let pool = connect(DatabaseConfig::new(path)).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
