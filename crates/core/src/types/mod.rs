//! Domain types for StoryStream
//!
//! - `audiobook`: the audiobook aggregate with its source files and chapters
//! - `bookmark`: user bookmarks at absolute positions
//! - `common`: shared time types and the `Validator` trait

mod audiobook;
mod bookmark;
mod common;

pub use audiobook::{
    Audiobook, AudiobookId, Chapter, SourceFile, COMPLETION_THRESHOLD_PERCENT,
};
pub use bookmark::{Bookmark, BookmarkId};
pub use common::{Duration, Timestamp, Validator};
