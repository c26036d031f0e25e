//! Debounced write-back of playback progress
//!
//! [`PersistenceThrottler`] decides *whether* a save should happen; it never
//! performs I/O. The session asks it before every write and reports failed
//! writes back so the next trigger retries.

use std::time::Duration;
use tokio::time::Instant;

/// Dirty flag plus write timestamps for the now-playing book
///
/// The interval gate runs from the last write that was started. A failed
/// write rolls that back to the last successful one, so the next trigger
/// retries instead of waiting out another interval.
#[derive(Debug, Clone)]
pub struct PersistenceThrottler {
    interval: Duration,
    dirty: bool,
    last_attempt: Option<Instant>,
    last_success: Option<Instant>,
}

impl PersistenceThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            dirty: false,
            last_attempt: None,
            last_success: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Starts a tick-driven write if the position is dirty and the interval has passed
    ///
    /// Returns true when the caller should write now. The dirty flag is cleared
    /// and the attempt time recorded before the write starts.
    pub fn try_persist(&mut self, now: Instant) -> bool {
        if !self.dirty {
            return false;
        }

        let due = match self.last_attempt {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        };

        if due {
            self.begin(now);
        }
        due
    }

    /// Starts a write for an explicit user action, ignoring the interval
    pub fn try_persist_forced(&mut self, now: Instant) -> bool {
        if !self.dirty {
            return false;
        }
        self.begin(now);
        true
    }

    /// Records a write started at `started` as stored
    pub fn persist_succeeded(&mut self, started: Instant) {
        if self.last_success.is_none_or(|last| last < started) {
            self.last_success = Some(started);
        }
    }

    /// Restores the dirty flag after a failed write and reopens the interval gate
    pub fn persist_failed(&mut self) {
        self.dirty = true;
        self.last_attempt = self.last_success;
    }

    /// Time the last successful write was started
    pub fn last_success(&self) -> Option<Instant> {
        self.last_success
    }

    /// Forgets all state; used when a different book becomes now playing
    pub fn reset(&mut self) {
        self.dirty = false;
        self.last_attempt = None;
        self.last_success = None;
    }

    fn begin(&mut self, now: Instant) {
        self.dirty = false;
        self.last_attempt = Some(now);
    }
}

/// Lets through at most one event per interval
#[derive(Debug, Clone)]
pub(crate) struct RateGate {
    interval: Duration,
    last: Option<Instant>,
}

impl RateGate {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub(crate) fn admit(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        self.last = None;
    }
}
