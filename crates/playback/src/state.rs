//! Observable session state and user-facing notifications

use storystream_core::{AppError, AudiobookId};

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// No book loaded
    #[default]
    Idle,
    /// A source has been handed to the engine and is not ready yet
    Opening,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Opening => write!(f, "opening"),
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Everything a UI needs to render the player, published after every change
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub now_playing: Option<AudiobookId>,
    pub title: Option<String>,
    pub state: PlaybackState,
    /// True while moving between source files
    pub is_switching: bool,
    pub current_position_ms: u64,
    pub total_duration_ms: u64,
    pub current_source_file_index: usize,
    pub current_chapter_index: usize,
    pub current_chapter_title: Option<String>,
    pub progress_percent: f64,
    pub is_completed: bool,
    pub playback_speed: f32,
    pub volume: u8,
    pub is_player_full_screen: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    MissingSourceFile,
    NoChaptersLoaded,
    MediaEngineFailure,
}

/// A message the UI should show the listener
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    /// Builds a notification for user-visible errors; other errors yield `None`
    pub fn from_error(error: &AppError) -> Option<Self> {
        let kind = match error {
            AppError::MissingSourceFile { .. } => NotificationKind::MissingSourceFile,
            AppError::NoChaptersLoaded { .. } => NotificationKind::NoChaptersLoaded,
            AppError::MediaEngineFailure { .. } => NotificationKind::MediaEngineFailure,
            _ => return None,
        };

        Some(Self {
            kind,
            message: error.user_message(),
        })
    }
}
