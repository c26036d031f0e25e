//! Public entry point to a running playback session

use crate::actor::{Command, Reply, SessionActor, SessionMessage};
use crate::bookmarks::{insert_sorted, BookmarkManager};
use crate::engine::{AudioEngine, EngineEventSender};
use crate::session::SessionController;
use crate::settings::SessionSettings;
use crate::state::{Notification, SessionSnapshot};
use std::sync::Arc;
use storystream_core::{AppError, Audiobook, AudiobookRepository, Bookmark, BookmarkId, Result};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

const NOTIFICATION_CAPACITY: usize = 32;

/// Cloneable handle to a playback session
///
/// Every method is processed by the session in call order. The session stops
/// after [`close`](Self::close) or once the last handle is dropped; in both
/// cases the current position is flushed first.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

struct Shared {
    tx: mpsc::UnboundedSender<SessionMessage>,
    snapshot: watch::Receiver<SessionSnapshot>,
    notifications: broadcast::Sender<Notification>,
    bookmarks: BookmarkManager,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let _ = self.tx.send(SessionMessage::Command(Command::Close(None)));
    }
}

impl SessionHandle {
    /// Starts a session on the current tokio runtime
    ///
    /// `make_engine` receives the sender the engine must report its events to.
    pub fn spawn<E, F>(
        settings: SessionSettings,
        repository: Arc<dyn AudiobookRepository>,
        make_engine: F,
    ) -> Self
    where
        E: AudioEngine + 'static,
        F: FnOnce(EngineEventSender) -> E,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = make_engine(EngineEventSender::new(tx.clone()));
        let controller = SessionController::new(Box::new(engine), settings);

        let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        let actor = SessionActor::new(
            controller,
            repository.clone(),
            rx,
            tx.clone(),
            snapshot_tx,
            notifications.clone(),
        );
        tokio::spawn(actor.run());

        Self {
            shared: Arc::new(Shared {
                tx,
                snapshot: snapshot_rx,
                notifications,
                bookmarks: BookmarkManager::new(repository),
            }),
        }
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot.clone()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.shared.notifications.subscribe()
    }

    /// State after every earlier call has been processed
    pub async fn state(&self) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await.map_err(|_| AppError::SessionClosed)
    }

    /// Makes `book` the now-playing book, resuming at its saved position
    ///
    /// Resolves once every source file has been found and the first one handed
    /// to the engine. Fails with `MissingSourceFile` if any file is absent, in
    /// which case the previous book stays loaded. A later open supersedes this
    /// one with `Cancelled`.
    pub async fn open_audiobook(&self, book: Audiobook) -> Result<()> {
        self.request(|reply| Command::OpenAudiobook {
            book: Box::new(book),
            reply,
        })
        .await
    }

    /// Absolute position; values outside the book are clamped
    pub async fn jump_to_position(&self, position_ms: u64) -> Result<()> {
        self.request(|reply| Command::JumpToPosition { position_ms, reply })
            .await
    }

    pub async fn open_source_file(
        &self,
        file_index: usize,
        chapter_index: usize,
        target_ms: Option<u64>,
    ) -> Result<()> {
        self.request(|reply| Command::OpenSourceFile {
            file_index,
            chapter_index,
            target_ms,
            reply,
        })
        .await
    }

    pub async fn play(&self) -> Result<()> {
        self.request(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Command::Pause).await
    }

    pub async fn next_chapter(&self) -> Result<()> {
        self.request(Command::NextChapter).await
    }

    pub async fn previous_chapter(&self) -> Result<()> {
        self.request(Command::PreviousChapter).await
    }

    pub async fn jump_to_chapter(&self, chapter_index: usize) -> Result<()> {
        self.request(|reply| Command::JumpToChapter {
            chapter_index,
            reply,
        })
        .await
    }

    pub async fn set_playback_speed(&self, speed: f32) -> Result<()> {
        self.request(|reply| Command::SetPlaybackSpeed { speed, reply })
            .await
    }

    pub async fn set_volume(&self, volume: u8) -> Result<()> {
        self.request(|reply| Command::SetVolume { volume, reply })
            .await
    }

    pub async fn set_full_screen(&self, full_screen: bool) -> Result<()> {
        self.request(|reply| Command::SetFullScreen { full_screen, reply })
            .await
    }

    /// Bookmarks the current position of the now-playing book
    pub async fn add_bookmark(&self, note: Option<&str>) -> Result<Bookmark> {
        let (audiobook_id, position_ms) = self.request(Command::BookmarkAnchor).await?;
        self.shared
            .bookmarks
            .add(audiobook_id, position_ms, note)
            .await
    }

    /// Like [`add_bookmark`](Self::add_bookmark), also inserting into a sorted view
    pub async fn add_bookmark_into(
        &self,
        note: Option<&str>,
        view: &mut Vec<Bookmark>,
    ) -> Result<Bookmark> {
        let bookmark = self.add_bookmark(note).await?;
        insert_sorted(view, bookmark.clone());
        Ok(bookmark)
    }

    pub async fn delete_bookmark(&self, id: BookmarkId) -> Result<()> {
        self.shared.bookmarks.delete(id).await
    }

    /// Jumps to a bookmark of the now-playing book
    pub async fn navigate_to_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        let audiobook_id = bookmark.audiobook_id;
        let position_ms = bookmark.position_ms;
        self.request(|reply| Command::NavigateToBookmark {
            audiobook_id,
            position_ms,
            reply,
        })
        .await
    }

    /// Bookmarks of the now-playing book in position order
    pub async fn bookmarks(&self) -> Result<Vec<Bookmark>> {
        let audiobook_id = self
            .state()
            .await?
            .now_playing
            .ok_or(AppError::NoActiveSession)?;
        self.shared.bookmarks.list(audiobook_id).await
    }

    pub fn bookmark_manager(&self) -> &BookmarkManager {
        &self.shared.bookmarks
    }

    /// Flushes the current position and stops the session
    ///
    /// Waits for the final write. Closing an already closed session is a no-op.
    pub async fn close(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        if self.send(Command::Close(Some(done))).is_err() {
            return Ok(());
        }
        // The actor exits without answering if it was already shutting down
        let _ = rx.await;
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.shared
            .tx
            .send(SessionMessage::Command(command))
            .map_err(|_| AppError::SessionClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| AppError::SessionClosed)?
    }
}
