//! Database query operations organized by entity

pub mod audiobooks;
pub mod bookmarks;

pub use audiobooks::{
    delete_audiobook, get_audiobook, list_audiobooks, update_progress, upsert_audiobook,
};
pub use bookmarks::{delete_bookmark, get_bookmark, get_bookmarks_by_audiobook, upsert_bookmark};
