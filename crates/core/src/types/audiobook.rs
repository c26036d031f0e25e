//! Audiobook aggregate: ordered source files, per-file chapters and the playback cursor

use crate::types::{Duration, Timestamp, Validator};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Progress at or above this percentage marks a book as completed
pub const COMPLETION_THRESHOLD_PERCENT: f64 = 99.9;

/// Unique identifier for an audiobook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudiobookId(Uuid);

impl AudiobookId {
    /// Creates a new random AudiobookId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an AudiobookId from a UUID string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Returns the AudiobookId as a string
    pub fn as_string(&self) -> String {
        self.0.to_string()
    }
}

impl Default for AudiobookId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AudiobookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One physical audio file of an audiobook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Position in the book's file sequence (0-based, contiguous)
    pub index: usize,
    pub path: PathBuf,
    pub duration_seconds: f64,
}

impl SourceFile {
    pub fn new(index: usize, path: impl Into<PathBuf>, duration_seconds: f64) -> Self {
        Self {
            index,
            path: path.into(),
            duration_seconds,
        }
    }

    /// Duration in whole milliseconds, rounded
    pub fn duration_ms(&self) -> u64 {
        Duration::from_seconds_f64(self.duration_seconds).as_millis()
    }
}

/// A named range on one source file's local timeline
///
/// `start_ms`/`end_ms` are local to the parent file, not absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Global chapter order across the whole book
    pub index: usize,
    pub parent_source_file_index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub title: String,
}

impl Chapter {
    pub fn new(
        index: usize,
        parent_source_file_index: usize,
        start_ms: u64,
        end_ms: u64,
        title: impl Into<String>,
    ) -> Self {
        Self {
            index,
            parent_source_file_index,
            start_ms,
            end_ms,
            title: title.into(),
        }
    }

    /// Returns true if `local_ms` falls in `[start_ms, end_ms)`
    pub fn contains(&self, local_ms: u64) -> bool {
        local_ms >= self.start_ms && local_ms < self.end_ms
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.end_ms.saturating_sub(self.start_ms))
    }
}

/// A logical audiobook spanning one or more source files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audiobook {
    pub id: AudiobookId,
    pub title: String,
    pub author: Option<String>,
    pub source_files: Vec<SourceFile>,
    pub chapters: Vec<Chapter>,
    pub total_duration_seconds: f64,

    // Playback cursor. `current_time_ms` is authoritative; the two indexes
    // are always derived from it.
    pub current_source_file_index: usize,
    pub current_chapter_index: usize,
    pub current_time_ms: u64,

    pub progress_percent: f64,
    pub is_completed: bool,

    /// `None` until the book has been played with an explicit speed
    pub playback_speed: Option<f32>,
    /// 0-100, `None` until the book has been played
    pub volume: Option<u8>,

    pub added_date: Timestamp,
    pub last_played: Option<Timestamp>,
}

impl Audiobook {
    /// Creates a freshly imported audiobook positioned at the very beginning
    pub fn new(title: impl Into<String>, source_files: Vec<SourceFile>, chapters: Vec<Chapter>) -> Self {
        let total_duration_seconds = source_files.iter().map(|f| f.duration_seconds).sum();
        Self {
            id: AudiobookId::new(),
            title: title.into(),
            author: None,
            source_files,
            chapters,
            total_duration_seconds,
            current_source_file_index: 0,
            current_chapter_index: 0,
            current_time_ms: 0,
            progress_percent: 0.0,
            is_completed: false,
            playback_speed: None,
            volume: None,
            added_date: Timestamp::now(),
            last_played: None,
        }
    }

    /// Sum of all source file durations in milliseconds
    pub fn total_duration_ms(&self) -> u64 {
        self.source_files.iter().map(SourceFile::duration_ms).sum()
    }

    pub fn source_file(&self, index: usize) -> Option<&SourceFile> {
        self.source_files.get(index)
    }

    pub fn current_source_file(&self) -> Option<&SourceFile> {
        self.source_file(self.current_source_file_index)
    }

    pub fn is_last_source_file(&self, index: usize) -> bool {
        index + 1 >= self.source_files.len()
    }

    pub fn chapter(&self, index: usize) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.index == index)
    }

    pub fn current_chapter(&self) -> Option<&Chapter> {
        self.chapter(self.current_chapter_index)
    }

    /// Chapters whose parent is the given file, in global order
    pub fn chapters_in_file(&self, file_index: usize) -> impl Iterator<Item = &Chapter> {
        self.chapters
            .iter()
            .filter(move |c| c.parent_source_file_index == file_index)
    }

    /// True once the book has been opened and played at least once
    pub fn has_been_played(&self) -> bool {
        self.last_played.is_some()
    }

    pub fn mark_played(&mut self) {
        self.last_played = Some(Timestamp::now());
    }

    /// Recomputes `progress_percent` and `is_completed` from `current_time_ms`
    pub fn update_progress(&mut self, completion_threshold_percent: f64) {
        let total = self.total_duration_ms();
        self.progress_percent = if total == 0 {
            0.0
        } else {
            (self.current_time_ms as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
        };
        self.is_completed = self.progress_percent >= completion_threshold_percent;
    }
}

impl Validator for Audiobook {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push("Title cannot be empty".to_string());
        }

        if self.source_files.is_empty() {
            errors.push("Audiobook must have at least one source file".to_string());
        }

        for (position, file) in self.source_files.iter().enumerate() {
            if file.index != position {
                errors.push(format!(
                    "Source file at position {} has index {}",
                    position, file.index
                ));
            }
            if !file.duration_seconds.is_finite() || file.duration_seconds <= 0.0 {
                errors.push(format!(
                    "Source file {} must have a positive duration",
                    file.index
                ));
            }
            if file.path.as_os_str().is_empty() {
                errors.push(format!("Source file {} has an empty path", file.index));
            }
        }

        let file_sum: f64 = self.source_files.iter().map(|f| f.duration_seconds).sum();
        if (file_sum - self.total_duration_seconds).abs() > 0.001 {
            errors.push(format!(
                "Total duration {}s does not match sum of file durations {}s",
                self.total_duration_seconds, file_sum
            ));
        }

        let mut previous: Option<&Chapter> = None;
        for (position, chapter) in self.chapters.iter().enumerate() {
            if chapter.index != position {
                errors.push(format!(
                    "Chapter at position {} has index {}",
                    position, chapter.index
                ));
            }
            if chapter.start_ms >= chapter.end_ms {
                errors.push(format!(
                    "Chapter {} must start before it ends",
                    chapter.index
                ));
            }
            if chapter.parent_source_file_index >= self.source_files.len() {
                errors.push(format!(
                    "Chapter {} references missing source file {}",
                    chapter.index, chapter.parent_source_file_index
                ));
            }
            if chapter.title.trim().is_empty() {
                errors.push(format!("Chapter {} has an empty title", chapter.index));
            }
            if let Some(prev) = previous {
                if (chapter.parent_source_file_index, chapter.start_ms)
                    < (prev.parent_source_file_index, prev.start_ms)
                {
                    errors.push(format!(
                        "Chapter {} is out of order relative to chapter {}",
                        chapter.index, prev.index
                    ));
                }
            }
            previous = Some(chapter);
        }

        if self.current_time_ms > self.total_duration_ms() {
            errors.push("Current position is past the end of the book".to_string());
        }

        if let Some(volume) = self.volume {
            if volume > 100 {
                errors.push("Volume must be between 0 and 100".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
