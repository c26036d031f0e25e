//! Playback - position tracking and session control for StoryStream
//!
//! A session plays one audiobook at a time over an [`AudioEngine`]. It maps the
//! book's single timeline onto its source files, keeps the chapter cursor in
//! sync, writes progress back through an [`AudiobookRepository`] at a bounded
//! rate and manages bookmarks.
//!
//! [`AudiobookRepository`]: storystream_core::AudiobookRepository

pub(crate) mod actor;
mod bookmarks;
mod engine;
mod handle;
mod session;
mod settings;
mod simulated;
mod state;
mod throttle;
pub mod timeline;

pub use bookmarks::{insert_sorted, note_or_timestamp, BookmarkManager, DEFAULT_NOTE_FORMAT};
pub use engine::{
    AudioEngine, EngineError, EngineEvent, EngineEventSender, EngineResult, EngineStatus,
};
pub use handle::SessionHandle;
pub use session::PREVIOUS_CHAPTER_RESTART_MS;
pub use settings::SessionSettings;
pub use simulated::{SimulatedEngine, SimulationOptions};
pub use state::{Notification, NotificationKind, PlaybackState, SessionSnapshot};
pub use throttle::PersistenceThrottler;
pub use timeline::LocalPosition;
