//! Playback session controller
//!
//! The controller owns the now-playing audiobook and the engine. It is a plain
//! synchronous state machine: every engine event and user command is applied
//! to it one at a time by the session actor, and any I/O it wants done (a
//! progress write, a notification) is queued as an [`Effect`] for the actor to
//! carry out.
//!
//! `current_time_ms` on the book is the single source of truth for position;
//! the file and chapter indexes are always derived from it.
//!
//! Every change of now-playing book bumps `generation`. Persistence results
//! tagged with an older generation belong to a book that is no longer playing
//! and are dropped.

use crate::engine::{AudioEngine, EngineEvent, EngineStatus};
use crate::settings::SessionSettings;
use crate::state::{Notification, PlaybackState, SessionSnapshot};
use crate::throttle::{PersistenceThrottler, RateGate};
use crate::timeline::{
    absolute_to_local, chapter_for_local, chapter_start_ms, file_start_ms, local_to_absolute,
    resolve_chapter,
};
use storystream_core::{AppError, Audiobook, AudiobookId, Result};
use std::time::Duration;
use tokio::time::Instant;

/// Being further than this into a chapter makes "previous" restart it
pub const PREVIOUS_CHAPTER_RESTART_MS: u64 = 3_000;

const MIN_PLAYBACK_SPEED: f32 = 0.5;
const MAX_PLAYBACK_SPEED: f32 = 3.0;

/// How long after a seek ticks far from the target are treated as stale
const SEEK_SETTLE: Duration = Duration::from_secs(1);
/// Distance from the seek target a settled tick may have
const SEEK_TOLERANCE_MS: u64 = 5_000;

/// Local target of the last in-file seek
#[derive(Debug, Clone, Copy)]
struct PendingSeek {
    local_ms: u64,
    at: Instant,
}

/// Work the controller asks its owner to perform
#[derive(Debug)]
pub(crate) enum Effect {
    Persist {
        generation: u64,
        started: Instant,
        book: Audiobook,
    },
    Notify(Notification),
}

pub(crate) struct SessionController {
    engine: Box<dyn AudioEngine>,
    settings: SessionSettings,
    throttler: PersistenceThrottler,
    tick_gate: RateGate,
    book: Option<Audiobook>,
    state: PlaybackState,
    /// Set while moving between source files; ticks and end-of-media are ignored
    switching: bool,
    pending_auto_play: bool,
    full_screen: bool,
    pending_seek: Option<PendingSeek>,
    generation: u64,
    effects: Vec<Effect>,
}

impl SessionController {
    pub(crate) fn new(engine: Box<dyn AudioEngine>, settings: SessionSettings) -> Self {
        Self {
            engine,
            throttler: PersistenceThrottler::new(settings.persist_interval),
            tick_gate: RateGate::new(settings.tick_interval),
            settings,
            book: None,
            state: PlaybackState::Idle,
            switching: false,
            pending_auto_play: false,
            full_screen: false,
            pending_seek: None,
            generation: 0,
            effects: Vec::new(),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn now_playing(&self) -> Option<&Audiobook> {
        self.book.as_ref()
    }

    pub(crate) fn is_now_playing(&self, id: AudiobookId) -> bool {
        self.book.as_ref().is_some_and(|book| book.id == id)
    }

    pub(crate) fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot {
            state: self.state,
            is_switching: self.switching,
            is_player_full_screen: self.full_screen,
            playback_speed: self.settings.default_speed,
            volume: self.settings.default_volume,
            ..Default::default()
        };

        if let Some(book) = &self.book {
            snapshot.now_playing = Some(book.id);
            snapshot.title = Some(book.title.clone());
            snapshot.current_position_ms = book.current_time_ms;
            snapshot.total_duration_ms = book.total_duration_ms();
            snapshot.current_source_file_index = book.current_source_file_index;
            snapshot.current_chapter_index = book.current_chapter_index;
            snapshot.current_chapter_title = book.current_chapter().map(|c| c.title.clone());
            snapshot.progress_percent = book.progress_percent;
            snapshot.is_completed = book.is_completed;
            snapshot.playback_speed = book.playback_speed.unwrap_or(self.settings.default_speed);
            snapshot.volume = book.volume.unwrap_or(self.settings.default_volume);
        }

        snapshot
    }

    // ===== Opening a book =====

    /// Pauses the engine and flushes the outgoing book before another book is verified
    pub(crate) fn prepare_switch(&mut self) {
        if self.book.is_none() {
            return;
        }

        if let Err(e) = self.engine.pause() {
            log::warn!("Failed to pause engine before switching books: {}", e);
        }
        self.pending_auto_play = false;
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
        self.flush(true);
    }

    /// Makes `book` the now-playing book and hands its current file to the engine
    ///
    /// The caller has already verified that every source file exists.
    pub(crate) fn install(&mut self, mut book: Audiobook) -> Result<()> {
        if book.source_files.is_empty() {
            return Err(AppError::InvalidArgument {
                argument: "audiobook".to_string(),
                reason: "has no source files".to_string(),
            });
        }

        let (speed, volume) = if book.has_been_played() {
            (
                book.playback_speed.unwrap_or(self.settings.default_speed),
                book.volume.unwrap_or(self.settings.default_volume),
            )
        } else {
            (self.settings.default_speed, self.settings.default_volume)
        };
        book.playback_speed = Some(speed);
        book.volume = Some(volume);

        let total = book.total_duration_ms();
        book.current_time_ms = book.current_time_ms.min(total);
        let local = absolute_to_local(&book, book.current_time_ms as i64);
        book.current_source_file_index = local.file_index;
        if let Some(chapter) = resolve_chapter(&book, local.file_index, local.local_ms) {
            book.current_chapter_index = chapter.index;
        }
        book.update_progress(self.settings.completion_threshold_percent);

        let path = book.source_files[local.file_index].path.clone();
        log::info!(
            "Opening '{}' at {}ms (file {})",
            book.title,
            book.current_time_ms,
            local.file_index
        );

        self.generation += 1;
        self.book = Some(book);
        self.throttler.reset();
        self.tick_gate.reset();
        self.pending_seek = None;
        self.switching = false;
        self.pending_auto_play = self.settings.auto_play_on_open;
        self.state = PlaybackState::Opening;

        if let Err(e) = self.engine.set_playback_rate(speed) {
            log::warn!("Engine rejected playback rate {}: {}", speed, e);
        }
        if let Err(e) = self.engine.set_volume(volume) {
            log::warn!("Engine rejected volume {}: {}", volume, e);
        }

        self.engine
            .set_source(&path)
            .map_err(|e| self.fail_media(e.to_string()))
    }

    /// Surfaces an error to the listener
    pub(crate) fn report(&mut self, error: &AppError) {
        match Notification::from_error(error) {
            Some(notification) => self.effects.push(Effect::Notify(notification)),
            None => log::debug!("Not notifying for error: {}", error),
        }
    }

    // ===== Engine events =====

    pub(crate) fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Opened => self.on_media_opened(),
            EngineEvent::Ended => self.on_media_ended(),
            EngineEvent::Failed(message) => {
                if self.book.is_some() {
                    self.fail_media(message);
                }
            }
            EngineEvent::PositionChanged(local_ms) => self.on_position_tick(local_ms),
            EngineEvent::StateChanged(status) => self.on_state_changed(status),
        }
    }

    fn on_media_opened(&mut self) {
        if self.state != PlaybackState::Opening {
            log::debug!("Ignoring opened event in state {}", self.state);
            return;
        }
        let Some(book) = self.book.as_ref() else {
            return;
        };

        if book.chapters.is_empty() {
            let error = AppError::NoChaptersLoaded {
                audiobook: book.title.clone(),
            };
            log::error!("{}", error);
            if let Err(e) = self.engine.pause() {
                log::warn!("Failed to pause engine: {}", e);
            }
            self.clear_now_playing();
            self.report(&error);
            return;
        }

        let local = absolute_to_local(book, book.current_time_ms as i64);
        let speed = book.playback_speed.unwrap_or(self.settings.default_speed);

        if let Err(e) = self.engine.seek(local.local_ms) {
            log::warn!("Seek to {}ms after open failed: {}", local.local_ms, e);
        }
        // Opening a source resets the engine's rate
        if let Err(e) = self.engine.set_playback_rate(speed) {
            log::warn!("Engine rejected playback rate {}: {}", speed, e);
        }

        self.switching = false;
        self.state = PlaybackState::Paused;
        self.tick_gate.reset();
        self.pending_seek = None;

        if self.pending_auto_play {
            self.pending_auto_play = false;
            self.start_engine();
        }
    }

    fn on_media_ended(&mut self) {
        if self.switching {
            log::debug!("Ignoring end of media while switching files");
            return;
        }
        let Some(book) = self.book.as_ref() else {
            return;
        };

        let current = book.current_source_file_index;
        if book.is_last_source_file(current) {
            log::info!("Reached the end of '{}'", book.title);
            return;
        }

        let next = current + 1;
        let Some(chapter_index) = book.chapters_in_file(next).next().map(|c| c.index) else {
            log::warn!(
                "'{}' has no chapter in source file {}, not advancing",
                book.title,
                next
            );
            return;
        };
        let next_start = file_start_ms(book, next);

        self.switching = true;
        self.pending_auto_play = true;
        if let Some(book) = self.book.as_mut() {
            book.current_time_ms = next_start;
        }

        if let Err(e) = self.open_source_file(next, chapter_index, Some(next_start)) {
            log::warn!("Failed to advance to source file {}: {}", next, e);
        }
    }

    fn on_position_tick(&mut self, local_ms: u64) {
        if self.switching || self.state == PlaybackState::Opening {
            return;
        }
        let now = Instant::now();
        if let Some(seek) = self.pending_seek {
            let settling = now.saturating_duration_since(seek.at) < SEEK_SETTLE;
            if settling && local_ms.abs_diff(seek.local_ms) > SEEK_TOLERANCE_MS {
                log::debug!("Ignoring tick at {}ms from before the last seek", local_ms);
                return;
            }
            self.pending_seek = None;
        }
        if self.book.is_none() || !self.tick_gate.admit(now) {
            return;
        }

        let threshold = self.settings.completion_threshold_percent;
        if let Some(book) = self.book.as_mut() {
            let file = book.current_source_file_index;
            let file_duration = book.source_file(file).map_or(0, |f| f.duration_ms());
            let local_ms = local_ms.min(file_duration);

            book.current_time_ms = local_to_absolute(book, file, local_ms);

            let entered = chapter_for_local(book, file, local_ms)
                .map(|chapter| chapter.index)
                .filter(|index| *index != book.current_chapter_index);
            if let Some(index) = entered {
                book.current_chapter_index = index;
                log::debug!("Entered chapter {}", index);
            }

            book.update_progress(threshold);
        }

        self.throttler.mark_dirty();
        self.flush(false);
    }

    fn on_state_changed(&mut self, status: EngineStatus) {
        if self.book.is_none() || self.switching || self.state == PlaybackState::Opening {
            return;
        }
        self.state = match status {
            EngineStatus::Playing => PlaybackState::Playing,
            EngineStatus::Paused => PlaybackState::Paused,
        };
    }

    // ===== Commands =====

    /// Moves playback to an absolute position, switching files if needed
    pub(crate) fn jump_to_position(&mut self, absolute_ms: u64) -> Result<()> {
        let book = self.book.as_ref().ok_or(AppError::NoActiveSession)?;

        let local = absolute_to_local(book, i64::try_from(absolute_ms).unwrap_or(i64::MAX));
        let target = local_to_absolute(book, local.file_index, local.local_ms);
        let chapter = resolve_chapter(book, local.file_index, local.local_ms).map(|c| c.index);

        if local.file_index != book.current_source_file_index {
            let chapter = chapter.ok_or_else(|| AppError::InvalidArgument {
                argument: "position".to_string(),
                reason: format!("no chapter covers source file {}", local.file_index),
            })?;
            if let Some(book) = self.book.as_mut() {
                book.current_time_ms = target;
            }
            return self.open_source_file(local.file_index, chapter, Some(target));
        }

        let threshold = self.settings.completion_threshold_percent;
        if let Some(book) = self.book.as_mut() {
            book.current_time_ms = target;
            if let Some(index) = chapter {
                book.current_chapter_index = index;
            }
            book.update_progress(threshold);
        }

        // While a file is opening the engine seeks on `Opened` instead
        if !self.switching && self.state != PlaybackState::Opening {
            match self.engine.seek(local.local_ms) {
                Ok(()) => {
                    self.pending_seek = Some(PendingSeek {
                        local_ms: local.local_ms,
                        at: Instant::now(),
                    });
                }
                Err(e) => log::warn!("Seek to {}ms failed: {}", local.local_ms, e),
            }
        }

        self.tick_gate.reset();
        self.throttler.mark_dirty();
        self.flush(true);
        Ok(())
    }

    /// Hands another source file of the current book to the engine
    ///
    /// Without `target_ms` playback starts at the chapter's beginning. A target
    /// outside the file is clamped to it.
    pub(crate) fn open_source_file(
        &mut self,
        file_index: usize,
        chapter_index: usize,
        target_ms: Option<u64>,
    ) -> Result<()> {
        let book = self.book.as_ref().ok_or(AppError::NoActiveSession)?;
        if file_index == book.current_source_file_index {
            return Ok(());
        }

        let file = book
            .source_file(file_index)
            .ok_or_else(|| AppError::InvalidArgument {
                argument: "file_index".to_string(),
                reason: format!("'{}' has no source file {}", book.title, file_index),
            })?;
        let chapter = book
            .chapter(chapter_index)
            .filter(|c| c.parent_source_file_index == file_index)
            .ok_or_else(|| AppError::InvalidArgument {
                argument: "chapter_index".to_string(),
                reason: format!(
                    "chapter {} does not belong to source file {}",
                    chapter_index, file_index
                ),
            })?;

        let file_start = file_start_ms(book, file_index);
        let file_end = file_start + file.duration_ms();
        let position = target_ms
            .unwrap_or_else(|| chapter_start_ms(book, chapter))
            .clamp(file_start, file_end);
        let path = file.path.clone();

        // Must be set before the cursor moves so no tick sees a half-updated pair
        self.switching = true;
        if self.state == PlaybackState::Playing {
            self.pending_auto_play = true;
        }
        self.state = PlaybackState::Opening;

        let threshold = self.settings.completion_threshold_percent;
        if let Some(book) = self.book.as_mut() {
            book.current_time_ms = position;
            book.current_source_file_index = file_index;
            book.current_chapter_index = chapter_index;
            book.update_progress(threshold);
        }

        self.tick_gate.reset();
        self.pending_seek = None;
        self.throttler.mark_dirty();
        self.flush(true);

        log::debug!("Switching to source file {} at {}ms", file_index, position);
        self.engine
            .set_source(&path)
            .map_err(|e| self.fail_media(e.to_string()))
    }

    pub(crate) fn play(&mut self) -> Result<()> {
        let book = self.book.as_mut().ok_or(AppError::NoActiveSession)?;
        book.mark_played();
        self.throttler.mark_dirty();

        if self.switching || self.state == PlaybackState::Opening {
            self.pending_auto_play = true;
            return Ok(());
        }

        self.engine
            .play()
            .map_err(|e| AppError::MediaEngineFailure {
                message: e.to_string(),
            })?;
        self.state = PlaybackState::Playing;
        Ok(())
    }

    pub(crate) fn pause(&mut self) -> Result<()> {
        if self.book.is_none() {
            return Err(AppError::NoActiveSession);
        }
        self.pending_auto_play = false;

        if matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            self.engine
                .pause()
                .map_err(|e| AppError::MediaEngineFailure {
                    message: e.to_string(),
                })?;
            self.state = PlaybackState::Paused;
        }

        self.flush(true);
        Ok(())
    }

    pub(crate) fn next_chapter(&mut self) -> Result<()> {
        let book = self.book.as_ref().ok_or(AppError::NoActiveSession)?;
        match book.chapter(book.current_chapter_index + 1) {
            Some(next) => {
                let start = chapter_start_ms(book, next);
                self.jump_to_position(start)
            }
            None => Ok(()),
        }
    }

    /// Restarts the current chapter, or goes to the previous one near its start
    pub(crate) fn previous_chapter(&mut self) -> Result<()> {
        let position = self.live_position_ms()?;
        let book = self.book.as_ref().ok_or(AppError::NoActiveSession)?;
        let Some(current) = book.current_chapter() else {
            return Ok(());
        };

        let current_start = chapter_start_ms(book, current);
        let target = if position.saturating_sub(current_start) > PREVIOUS_CHAPTER_RESTART_MS {
            current_start
        } else {
            current
                .index
                .checked_sub(1)
                .and_then(|index| book.chapter(index))
                .map_or(current_start, |previous| chapter_start_ms(book, previous))
        };

        self.jump_to_position(target)
    }

    pub(crate) fn jump_to_chapter(&mut self, chapter_index: usize) -> Result<()> {
        let book = self.book.as_ref().ok_or(AppError::NoActiveSession)?;
        let chapter = book
            .chapter(chapter_index)
            .ok_or_else(|| AppError::InvalidArgument {
                argument: "chapter_index".to_string(),
                reason: format!("'{}' has no chapter {}", book.title, chapter_index),
            })?;
        let start = chapter_start_ms(book, chapter);
        self.jump_to_position(start)
    }

    pub(crate) fn set_playback_speed(&mut self, speed: f32) -> Result<()> {
        if !(MIN_PLAYBACK_SPEED..=MAX_PLAYBACK_SPEED).contains(&speed) {
            return Err(AppError::InvalidArgument {
                argument: "speed".to_string(),
                reason: format!(
                    "must be between {} and {}",
                    MIN_PLAYBACK_SPEED, MAX_PLAYBACK_SPEED
                ),
            });
        }
        if self.book.is_none() {
            return Err(AppError::NoActiveSession);
        }

        self.engine
            .set_playback_rate(speed)
            .map_err(|e| AppError::MediaEngineFailure {
                message: e.to_string(),
            })?;
        if let Some(book) = self.book.as_mut() {
            book.playback_speed = Some(speed);
        }
        self.throttler.mark_dirty();
        self.flush(true);
        Ok(())
    }

    pub(crate) fn set_volume(&mut self, volume: u8) -> Result<()> {
        if volume > 100 {
            return Err(AppError::InvalidArgument {
                argument: "volume".to_string(),
                reason: "must be between 0 and 100".to_string(),
            });
        }
        if self.book.is_none() {
            return Err(AppError::NoActiveSession);
        }

        self.engine
            .set_volume(volume)
            .map_err(|e| AppError::MediaEngineFailure {
                message: e.to_string(),
            })?;
        if let Some(book) = self.book.as_mut() {
            book.volume = Some(volume);
        }
        self.throttler.mark_dirty();
        self.flush(true);
        Ok(())
    }

    pub(crate) fn set_full_screen(&mut self, full_screen: bool) {
        self.full_screen = full_screen;
    }

    /// Book and absolute position a new bookmark should point at
    pub(crate) fn bookmark_anchor(&self) -> Result<(AudiobookId, u64)> {
        let position = self.live_position_ms()?;
        let book = self.book.as_ref().ok_or(AppError::NoActiveSession)?;
        Ok((book.id, position))
    }

    /// Records the outcome of a progress write started by this controller
    pub(crate) fn persist_finished(
        &mut self,
        generation: u64,
        started: Instant,
        outcome: Result<Option<Audiobook>>,
    ) {
        if generation != self.generation {
            match outcome {
                Ok(_) => log::debug!("Saved progress of a book that is no longer playing"),
                Err(e) => log::debug!("Dropping stale persistence failure: {}", e),
            }
            return;
        }

        match outcome {
            Ok(Some(_)) => {
                log::trace!("Progress saved");
                self.throttler.persist_succeeded(started);
            }
            Ok(None) => {
                // Removed by another path; nothing left to retry
                log::debug!("Progress not saved: the audiobook is no longer stored");
                self.throttler.persist_succeeded(started);
            }
            Err(e) if e.is_benign() => {
                log::debug!("Progress not saved: {}", e);
                self.throttler.persist_succeeded(started);
            }
            Err(e) => {
                log::warn!("Failed to save progress, will retry: {}", e);
                self.throttler.persist_failed();
            }
        }
    }

    /// Pauses and flushes before the session goes away
    pub(crate) fn shutdown(&mut self) {
        if self.book.is_none() {
            return;
        }
        if let Err(e) = self.engine.pause() {
            log::debug!("Failed to pause engine on shutdown: {}", e);
        }
        self.state = PlaybackState::Paused;
        self.flush(true);
    }

    // ===== Internals =====

    /// Absolute position including engine progress since the last processed tick
    fn live_position_ms(&self) -> Result<u64> {
        let book = self.book.as_ref().ok_or(AppError::NoActiveSession)?;
        if self.switching || !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            return Ok(book.current_time_ms);
        }

        let file = book.current_source_file_index;
        let file_duration = book.source_file(file).map_or(0, |f| f.duration_ms());
        let local_ms = self.engine.position_ms().min(file_duration);
        Ok(local_to_absolute(book, file, local_ms))
    }

    fn start_engine(&mut self) {
        match self.engine.play() {
            Ok(()) => {
                self.state = PlaybackState::Playing;
                if let Some(book) = self.book.as_mut() {
                    book.mark_played();
                }
                self.throttler.mark_dirty();
            }
            Err(e) => log::warn!("Auto-play failed: {}", e),
        }
    }

    /// Queues a write if the throttler allows one
    fn flush(&mut self, forced: bool) {
        let now = Instant::now();
        let due = if forced {
            self.throttler.try_persist_forced(now)
        } else {
            self.throttler.try_persist(now)
        };

        if let (true, Some(book)) = (due, self.book.as_ref()) {
            self.effects.push(Effect::Persist {
                generation: self.generation,
                started: now,
                book: book.clone(),
            });
        }
    }

    fn clear_now_playing(&mut self) {
        self.flush(true);
        if let Some(book) = self.book.take() {
            log::info!("'{}' is no longer playing", book.title);
        }
        self.generation += 1;
        self.state = PlaybackState::Idle;
        self.switching = false;
        self.pending_auto_play = false;
        self.throttler.reset();
    }

    /// Drops the now-playing book after an engine failure and notifies
    fn fail_media(&mut self, message: String) -> AppError {
        let error = AppError::MediaEngineFailure { message };
        log::error!("{}", error);
        self.clear_now_playing();
        self.report(&error);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineResult;
    use crate::state::NotificationKind;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use storystream_core::{Chapter, SourceFile};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Play,
        Pause,
        SetSource(PathBuf),
        Seek(u64),
        Rate(f32),
        Volume(u8),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
        position: Arc<Mutex<u64>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<Call> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    struct FakeEngine(Recorder);

    impl AudioEngine for FakeEngine {
        fn play(&mut self) -> EngineResult<()> {
            self.0.calls.lock().unwrap().push(Call::Play);
            Ok(())
        }

        fn pause(&mut self) -> EngineResult<()> {
            self.0.calls.lock().unwrap().push(Call::Pause);
            Ok(())
        }

        fn set_source(&mut self, path: &Path) -> EngineResult<()> {
            self.0.calls.lock().unwrap().push(Call::SetSource(path.to_path_buf()));
            Ok(())
        }

        fn seek(&mut self, local_ms: u64) -> EngineResult<()> {
            *self.0.position.lock().unwrap() = local_ms;
            self.0.calls.lock().unwrap().push(Call::Seek(local_ms));
            Ok(())
        }

        fn set_playback_rate(&mut self, rate: f32) -> EngineResult<()> {
            self.0.calls.lock().unwrap().push(Call::Rate(rate));
            Ok(())
        }

        fn set_volume(&mut self, volume: u8) -> EngineResult<()> {
            self.0.calls.lock().unwrap().push(Call::Volume(volume));
            Ok(())
        }

        fn position_ms(&self) -> u64 {
            *self.0.position.lock().unwrap()
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            tick_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    /// 600s + 300s, three chapters
    fn two_file_book() -> Audiobook {
        Audiobook::new(
            "The Long Road",
            vec![
                SourceFile::new(0, "/books/road/part1.mp3", 600.0),
                SourceFile::new(1, "/books/road/part2.mp3", 300.0),
            ],
            vec![
                Chapter::new(0, 0, 0, 300_000, "Departure"),
                Chapter::new(1, 0, 300_000, 600_000, "Crossing"),
                Chapter::new(2, 1, 0, 300_000, "Finale"),
            ],
        )
    }

    fn controller() -> (SessionController, Recorder) {
        let recorder = Recorder::default();
        let controller =
            SessionController::new(Box::new(FakeEngine(recorder.clone())), settings());
        (controller, recorder)
    }

    fn opened(book: Audiobook) -> (SessionController, Recorder) {
        let (mut controller, recorder) = controller();
        controller.install(book).unwrap();
        controller.handle_engine_event(EngineEvent::Opened);
        recorder.take();
        controller.take_effects();
        (controller, recorder)
    }

    fn persisted(effects: &[Effect]) -> Vec<u64> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Persist { book, .. } => Some(book.current_time_ms),
                Effect::Notify(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_install_resumes_saved_position() {
        let mut book = two_file_book();
        book.current_time_ms = 650_000;
        let (mut controller, recorder) = controller();

        controller.install(book).unwrap();
        assert_eq!(controller.snapshot().state, PlaybackState::Opening);
        assert!(recorder
            .take()
            .contains(&Call::SetSource(PathBuf::from("/books/road/part2.mp3"))));

        controller.handle_engine_event(EngineEvent::Opened);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Paused);
        assert_eq!(snapshot.current_source_file_index, 1);
        assert_eq!(snapshot.current_chapter_title.as_deref(), Some("Finale"));
        assert!(recorder.take().contains(&Call::Seek(50_000)));
    }

    #[test]
    fn test_unplayed_book_gets_defaults() {
        let mut book = two_file_book();
        book.playback_speed = Some(2.0);
        let (controller, _) = opened(book);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.playback_speed, 1.0);
        assert_eq!(snapshot.volume, 70);
    }

    #[test]
    fn test_played_book_restores_its_settings() {
        let mut book = two_file_book();
        book.mark_played();
        book.playback_speed = Some(1.5);
        book.volume = Some(40);
        let (controller, _) = opened(book);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.playback_speed, 1.5);
        assert_eq!(snapshot.volume, 40);
    }

    #[test]
    fn test_tick_updates_position_and_chapter() {
        let (mut controller, _) = opened(two_file_book());

        controller.handle_engine_event(EngineEvent::PositionChanged(310_000));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.current_position_ms, 310_000);
        assert_eq!(snapshot.current_chapter_index, 1);
        // First tick after opening is always due
        assert_eq!(persisted(&controller.take_effects()), vec![310_000]);
    }

    #[test]
    fn test_tick_past_file_end_is_clamped() {
        let (mut controller, _) = opened(two_file_book());

        controller.handle_engine_event(EngineEvent::PositionChanged(700_000));

        assert_eq!(controller.snapshot().current_position_ms, 600_000);
    }

    #[test]
    fn test_media_ended_advances_to_next_file() {
        let (mut controller, recorder) = opened(two_file_book());

        controller.handle_engine_event(EngineEvent::Ended);
        let snapshot = controller.snapshot();
        assert!(snapshot.is_switching);
        assert_eq!(snapshot.current_position_ms, 600_000);
        assert_eq!(snapshot.current_chapter_index, 2);
        assert!(recorder
            .take()
            .contains(&Call::SetSource(PathBuf::from("/books/road/part2.mp3"))));

        // Stale ticks from the old file are ignored
        controller.handle_engine_event(EngineEvent::PositionChanged(599_000));
        assert_eq!(controller.snapshot().current_position_ms, 600_000);

        controller.handle_engine_event(EngineEvent::Opened);
        let snapshot = controller.snapshot();
        assert!(!snapshot.is_switching);
        assert_eq!(snapshot.state, PlaybackState::Playing);

        let calls = recorder.take();
        assert!(calls.contains(&Call::Seek(0)));
        assert!(calls.contains(&Call::Play));
    }

    #[test]
    fn test_media_ended_on_last_file_is_noop() {
        let mut book = two_file_book();
        book.current_time_ms = 899_000;
        let (mut controller, recorder) = opened(book);
        let before = controller.snapshot();

        controller.handle_engine_event(EngineEvent::Ended);

        assert_eq!(controller.snapshot(), before);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_media_ended_while_switching_is_ignored() {
        let (mut controller, recorder) = opened(two_file_book());
        controller.handle_engine_event(EngineEvent::Ended);
        recorder.take();

        controller.handle_engine_event(EngineEvent::Ended);

        assert!(recorder.take().is_empty());
        assert_eq!(controller.snapshot().current_source_file_index, 1);
    }

    #[test]
    fn test_jump_within_file_seeks() {
        let (mut controller, recorder) = opened(two_file_book());

        controller.jump_to_position(450_000).unwrap();

        assert_eq!(recorder.take(), vec![Call::Seek(450_000)]);
        assert_eq!(controller.snapshot().current_chapter_index, 1);
        assert_eq!(persisted(&controller.take_effects()), vec![450_000]);
    }

    #[test]
    fn test_jump_across_files_opens_target_file() {
        let (mut controller, recorder) = opened(two_file_book());

        controller.jump_to_position(650_000).unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.current_source_file_index, 1);
        assert_eq!(snapshot.current_position_ms, 650_000);
        assert_eq!(snapshot.current_chapter_title.as_deref(), Some("Finale"));

        recorder.take();
        controller.handle_engine_event(EngineEvent::Opened);
        assert!(recorder.take().contains(&Call::Seek(50_000)));
    }

    #[test]
    fn test_jump_is_idempotent() {
        let (mut controller, _) = opened(two_file_book());

        controller.jump_to_position(650_000).unwrap();
        controller.handle_engine_event(EngineEvent::Opened);
        let first = controller.snapshot();
        controller.jump_to_position(650_000).unwrap();

        assert_eq!(controller.snapshot(), first);
    }

    #[test]
    fn test_jump_clamps_past_the_end() {
        let (mut controller, _) = opened(two_file_book());

        controller.jump_to_position(10_000_000).unwrap();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.current_position_ms, 900_000);
        assert!(snapshot.is_completed);
    }

    #[test]
    fn test_open_source_file_same_file_is_noop() {
        let (mut controller, recorder) = opened(two_file_book());

        controller.open_source_file(0, 1, None).unwrap();

        assert!(recorder.take().is_empty());
        assert_eq!(controller.snapshot().current_chapter_index, 0);
    }

    #[test]
    fn test_open_source_file_rejects_foreign_chapter() {
        let (mut controller, _) = opened(two_file_book());

        let result = controller.open_source_file(1, 0, None);

        assert!(matches!(result, Err(AppError::InvalidArgument { .. })));
        assert!(!controller.snapshot().is_switching);
    }

    #[test]
    fn test_play_while_opening_is_deferred() {
        let (mut controller, recorder) = controller();
        controller.install(two_file_book()).unwrap();
        recorder.take();

        controller.play().unwrap();
        assert!(!recorder.take().contains(&Call::Play));

        controller.handle_engine_event(EngineEvent::Opened);
        assert!(recorder.take().contains(&Call::Play));
        assert_eq!(controller.snapshot().state, PlaybackState::Playing);
    }

    #[test]
    fn test_next_and_previous_chapter() {
        let (mut controller, _) = opened(two_file_book());

        controller.next_chapter().unwrap();
        assert_eq!(controller.snapshot().current_position_ms, 300_000);

        // Near the start of a chapter, previous goes back one
        controller.previous_chapter().unwrap();
        assert_eq!(controller.snapshot().current_chapter_index, 0);

        // Further in, previous restarts the chapter
        controller.jump_to_position(320_000).unwrap();
        controller.previous_chapter().unwrap();
        assert_eq!(controller.snapshot().current_position_ms, 300_000);
    }

    #[test]
    fn test_next_chapter_on_last_chapter_is_noop() {
        let mut book = two_file_book();
        book.current_time_ms = 700_000;
        let (mut controller, _) = opened(book);

        controller.next_chapter().unwrap();

        assert_eq!(controller.snapshot().current_position_ms, 700_000);
    }

    #[test]
    fn test_no_chapters_clears_now_playing() {
        let book = Audiobook::new(
            "Untitled",
            vec![SourceFile::new(0, "/books/untitled.mp3", 60.0)],
            Vec::new(),
        );
        let (mut controller, _) = controller();
        controller.install(book).unwrap();
        let generation = controller.generation();

        controller.handle_engine_event(EngineEvent::Opened);

        assert!(controller.now_playing().is_none());
        assert_eq!(controller.snapshot().state, PlaybackState::Idle);
        assert!(controller.generation() > generation);
        assert!(controller.take_effects().iter().any(|effect| matches!(
            effect,
            Effect::Notify(n) if n.kind == NotificationKind::NoChaptersLoaded
        )));
    }

    #[test]
    fn test_engine_failure_clears_now_playing() {
        let (mut controller, _) = opened(two_file_book());

        controller.handle_engine_event(EngineEvent::Failed("decoder crashed".to_string()));

        assert!(controller.now_playing().is_none());
        assert!(controller.take_effects().iter().any(|effect| matches!(
            effect,
            Effect::Notify(n) if n.kind == NotificationKind::MediaEngineFailure
        )));
    }

    #[test]
    fn test_failed_persist_marks_dirty_again() {
        let (mut controller, _) = opened(two_file_book());
        controller.jump_to_position(100_000).unwrap();
        assert!(!controller.throttler.is_dirty());

        let error = AppError::PersistenceFailure {
            message: "locked".to_string(),
            source: None,
        };
        controller.persist_finished(controller.generation(), Instant::now(), Err(error));

        assert!(controller.throttler.is_dirty());
    }

    #[test]
    fn test_write_for_deleted_book_is_not_retried() {
        let (mut controller, _) = opened(two_file_book());
        controller.jump_to_position(100_000).unwrap();
        controller.take_effects();

        controller.persist_finished(controller.generation(), Instant::now(), Ok(None));
        assert!(!controller.throttler.is_dirty());

        controller.pause().unwrap();
        assert!(persisted(&controller.take_effects()).is_empty());
    }

    #[test]
    fn test_concurrent_delete_outcome_is_not_retried() {
        let (mut controller, _) = opened(two_file_book());
        controller.jump_to_position(100_000).unwrap();

        let error = AppError::ConcurrentDeleteConflict {
            entity: "Audiobook".to_string(),
            identifier: "gone".to_string(),
        };
        controller.persist_finished(controller.generation(), Instant::now(), Err(error));

        assert!(!controller.throttler.is_dirty());
    }

    #[test]
    fn test_tick_from_before_seek_is_ignored() {
        let (mut controller, _) = opened(two_file_book());
        controller.play().unwrap();
        controller.handle_engine_event(EngineEvent::PositionChanged(10_000));

        controller.jump_to_position(450_000).unwrap();
        controller.take_effects();
        controller.handle_engine_event(EngineEvent::PositionChanged(10_500));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.current_position_ms, 450_000);
        assert_eq!(snapshot.current_chapter_index, 1);
        assert!(controller.take_effects().is_empty());

        controller.handle_engine_event(EngineEvent::PositionChanged(450_500));
        assert_eq!(controller.snapshot().current_position_ms, 450_500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_far_from_seek_are_accepted_after_settling() {
        let (mut controller, _) = opened(two_file_book());
        controller.play().unwrap();
        controller.jump_to_position(450_000).unwrap();

        tokio::time::advance(SEEK_SETTLE).await;
        controller.handle_engine_event(EngineEvent::PositionChanged(20_000));

        assert_eq!(controller.snapshot().current_position_ms, 20_000);
        assert_eq!(controller.snapshot().current_chapter_index, 0);
    }

    #[test]
    fn test_stale_persist_result_is_dropped() {
        let (mut controller, _) = opened(two_file_book());
        let stale = controller.generation();
        controller.install(two_file_book()).unwrap();

        let error = AppError::PersistenceFailure {
            message: "locked".to_string(),
            source: None,
        };
        controller.persist_finished(stale, Instant::now(), Err(error));

        assert!(!controller.throttler.is_dirty());
    }

    #[test]
    fn test_speed_is_validated() {
        let (mut controller, _) = opened(two_file_book());

        assert!(controller.set_playback_speed(4.0).is_err());
        controller.set_playback_speed(1.25).unwrap();

        assert_eq!(controller.snapshot().playback_speed, 1.25);
    }

    #[test]
    fn test_commands_without_book_fail() {
        let (mut controller, _) = controller();

        assert!(matches!(controller.play(), Err(AppError::NoActiveSession)));
        assert!(matches!(
            controller.jump_to_position(0),
            Err(AppError::NoActiveSession)
        ));
        assert!(controller.bookmark_anchor().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_persist_at_most_once_per_interval() {
        let (mut controller, _) = opened(two_file_book());
        controller.play().unwrap();
        controller.take_effects();

        let mut writes = 0;
        for second in 1..=50u64 {
            tokio::time::advance(Duration::from_secs(1)).await;
            controller.handle_engine_event(EngineEvent::PositionChanged(second * 1_000));
            writes += persisted(&controller.take_effects()).len();
        }

        assert_eq!(writes, 5);
    }
}
