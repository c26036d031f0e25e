//! Boundary to the audio decode/render engine
//!
//! The session drives an engine through [`AudioEngine`] and receives its
//! callbacks as [`EngineEvent`]s posted through an [`EngineEventSender`]. Events
//! land in the same queue as user commands, so they are processed one at a time.

use crate::actor::SessionMessage;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Cannot open source: {0}")]
    OpenError(String),

    #[error("Seek error: {0}")]
    SeekError(String),

    #[error("Invalid playback rate: {0}")]
    InvalidRate(f32),

    #[error("Engine stopped")]
    Stopped,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Transport state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Playing,
    Paused,
}

/// Asynchronous notifications from the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The source handed to `set_source` is ready for seek/play
    Opened,
    /// Playback reached the end of the current source
    Ended,
    /// The source could not be opened or decoded
    Failed(String),
    /// Current local position in milliseconds
    PositionChanged(u64),
    StateChanged(EngineStatus),
}

/// Commands the session issues to the engine
///
/// Implementations must return quickly; readiness after `set_source` is
/// reported later through [`EngineEvent::Opened`].
pub trait AudioEngine: Send {
    fn play(&mut self) -> EngineResult<()>;

    fn pause(&mut self) -> EngineResult<()>;

    fn set_source(&mut self, path: &Path) -> EngineResult<()>;

    /// Seeks within the current source
    fn seek(&mut self, local_ms: u64) -> EngineResult<()>;

    fn set_playback_rate(&mut self, rate: f32) -> EngineResult<()>;

    /// Volume 0-100
    fn set_volume(&mut self, volume: u8) -> EngineResult<()>;

    /// Current local position in the open source
    fn position_ms(&self) -> u64;
}

/// Posts engine events into a session's queue. Cheap to clone and usable from
/// any thread.
#[derive(Debug, Clone)]
pub struct EngineEventSender {
    tx: UnboundedSender<SessionMessage>,
}

impl EngineEventSender {
    pub(crate) fn new(tx: UnboundedSender<SessionMessage>) -> Self {
        Self { tx }
    }

    /// Returns false once the session has shut down
    pub fn send(&self, event: EngineEvent) -> bool {
        self.tx.send(SessionMessage::Engine(event)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
