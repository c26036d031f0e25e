//! Bookmark domain model

use crate::types::{AudiobookId, Duration, Timestamp, Validator};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a bookmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookmarkId(Uuid);

impl BookmarkId {
    /// Creates a new random BookmarkId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a BookmarkId from a UUID string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Returns the BookmarkId as a string
    pub fn as_string(&self) -> String {
        self.0.to_string()
    }
}

impl Default for BookmarkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A marker at an absolute position in one audiobook. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub audiobook_id: AudiobookId,
    pub note: String,
    /// Absolute position across all source files
    pub position_ms: u64,
    pub created_at: Timestamp,
}

impl Bookmark {
    pub fn new(audiobook_id: AudiobookId, position_ms: u64, note: impl Into<String>) -> Self {
        Self {
            id: BookmarkId::new(),
            audiobook_id,
            note: note.into(),
            position_ms,
            created_at: Timestamp::now(),
        }
    }

    pub fn position(&self) -> Duration {
        Duration::from_millis(self.position_ms)
    }

    /// Key that sorted bookmark views are ordered by
    pub fn sort_key(&self) -> u64 {
        self.position_ms
    }
}

impl Validator for Bookmark {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.note.trim().is_empty() {
            errors.push("Bookmark note cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
