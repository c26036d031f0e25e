pub mod error;
pub mod repository;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, ErrorSeverity, RecoveryAction, Result};
pub use repository::AudiobookRepository;
pub use types::{
    Audiobook, AudiobookId, Bookmark, BookmarkId, Chapter, Duration, SourceFile, Timestamp,
    Validator, COMPLETION_THRESHOLD_PERCENT,
};
