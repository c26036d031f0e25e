//! Session actor
//!
//! One task owns the [`SessionController`] and drains a single queue that
//! carries user commands, engine events and the results of background work.
//! Progress writes go through a dedicated writer task that processes them in
//! order, so an older snapshot of a book can never land after a newer one.

use crate::engine::EngineEvent;
use crate::session::{Effect, SessionController};
use crate::state::{Notification, SessionSnapshot};
use std::path::PathBuf;
use std::sync::Arc;
use storystream_core::{AppError, Audiobook, AudiobookId, AudiobookRepository, Result, Validator};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

/// Everything the actor reacts to
pub(crate) enum SessionMessage {
    Command(Command),
    Engine(EngineEvent),
    PersistFinished {
        generation: u64,
        started: Instant,
        outcome: Result<Option<Audiobook>>,
    },
    SourcesVerified {
        request: u64,
        outcome: Result<()>,
    },
}

pub(crate) enum Command {
    OpenAudiobook {
        book: Box<Audiobook>,
        reply: Reply<()>,
    },
    JumpToPosition {
        position_ms: u64,
        reply: Reply<()>,
    },
    OpenSourceFile {
        file_index: usize,
        chapter_index: usize,
        target_ms: Option<u64>,
        reply: Reply<()>,
    },
    Play(Reply<()>),
    Pause(Reply<()>),
    NextChapter(Reply<()>),
    PreviousChapter(Reply<()>),
    JumpToChapter {
        chapter_index: usize,
        reply: Reply<()>,
    },
    SetPlaybackSpeed {
        speed: f32,
        reply: Reply<()>,
    },
    SetVolume {
        volume: u8,
        reply: Reply<()>,
    },
    SetFullScreen {
        full_screen: bool,
        reply: Reply<()>,
    },
    NavigateToBookmark {
        audiobook_id: AudiobookId,
        position_ms: u64,
        reply: Reply<()>,
    },
    BookmarkAnchor(Reply<(AudiobookId, u64)>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    /// Flush and stop; `None` when the last handle was dropped
    Close(Option<oneshot::Sender<()>>),
}

enum PersistJob {
    Write {
        generation: u64,
        started: Instant,
        book: Audiobook,
    },
    /// Answered once every earlier write has finished
    Barrier(oneshot::Sender<()>),
}

struct PendingOpen {
    request: u64,
    book: Audiobook,
    reply: Reply<()>,
}

pub(crate) struct SessionActor {
    controller: SessionController,
    rx: mpsc::UnboundedReceiver<SessionMessage>,
    tx: mpsc::UnboundedSender<SessionMessage>,
    writer: mpsc::UnboundedSender<PersistJob>,
    snapshot: watch::Sender<SessionSnapshot>,
    notifications: broadcast::Sender<Notification>,
    pending_open: Option<PendingOpen>,
    open_requests: u64,
}

impl SessionActor {
    pub(crate) fn new(
        controller: SessionController,
        repository: Arc<dyn AudiobookRepository>,
        rx: mpsc::UnboundedReceiver<SessionMessage>,
        tx: mpsc::UnboundedSender<SessionMessage>,
        snapshot: watch::Sender<SessionSnapshot>,
        notifications: broadcast::Sender<Notification>,
    ) -> Self {
        let writer = spawn_writer(repository, tx.clone());
        Self {
            controller,
            rx,
            tx,
            writer,
            snapshot,
            notifications,
            pending_open: None,
            open_requests: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        log::debug!("Playback session started");

        while let Some(message) = self.rx.recv().await {
            if let SessionMessage::Command(Command::Close(reply)) = message {
                self.shutdown().await;
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                break;
            }

            self.handle(message);
            self.apply_effects();
            self.publish();
        }

        log::debug!("Playback session stopped");
    }

    fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Command(command) => self.handle_command(command),
            SessionMessage::Engine(event) => self.controller.handle_engine_event(event),
            SessionMessage::PersistFinished {
                generation,
                started,
                outcome,
            } => self.controller.persist_finished(generation, started, outcome),
            SessionMessage::SourcesVerified { request, outcome } => {
                self.sources_verified(request, outcome)
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::OpenAudiobook { book, reply } => self.open_audiobook(*book, reply),
            Command::JumpToPosition { position_ms, reply } => {
                let _ = reply.send(self.controller.jump_to_position(position_ms));
            }
            Command::OpenSourceFile {
                file_index,
                chapter_index,
                target_ms,
                reply,
            } => {
                let result = self
                    .controller
                    .open_source_file(file_index, chapter_index, target_ms);
                let _ = reply.send(result);
            }
            Command::Play(reply) => {
                let _ = reply.send(self.controller.play());
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.controller.pause());
            }
            Command::NextChapter(reply) => {
                let _ = reply.send(self.controller.next_chapter());
            }
            Command::PreviousChapter(reply) => {
                let _ = reply.send(self.controller.previous_chapter());
            }
            Command::JumpToChapter {
                chapter_index,
                reply,
            } => {
                let _ = reply.send(self.controller.jump_to_chapter(chapter_index));
            }
            Command::SetPlaybackSpeed { speed, reply } => {
                let _ = reply.send(self.controller.set_playback_speed(speed));
            }
            Command::SetVolume { volume, reply } => {
                let _ = reply.send(self.controller.set_volume(volume));
            }
            Command::SetFullScreen { full_screen, reply } => {
                self.controller.set_full_screen(full_screen);
                let _ = reply.send(Ok(()));
            }
            Command::NavigateToBookmark {
                audiobook_id,
                position_ms,
                reply,
            } => {
                let result = if self.controller.is_now_playing(audiobook_id) {
                    self.controller.jump_to_position(position_ms)
                } else {
                    Err(AppError::InvalidArgument {
                        argument: "bookmark".to_string(),
                        reason: "belongs to an audiobook that is not playing".to_string(),
                    })
                };
                let _ = reply.send(result);
            }
            Command::BookmarkAnchor(reply) => {
                let _ = reply.send(self.controller.bookmark_anchor());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.controller.snapshot());
            }
            Command::Close(_) => {}
        }
    }

    /// Starts switching to `book`; the reply is sent once its files are checked
    fn open_audiobook(&mut self, book: Audiobook, reply: Reply<()>) {
        if let Some(previous) = self.pending_open.take() {
            log::debug!("Superseding open of '{}'", previous.book.title);
            let _ = previous.reply.send(Err(AppError::Cancelled {
                operation: format!("open '{}'", previous.book.title),
            }));
        }

        if self.controller.is_now_playing(book.id) {
            let _ = reply.send(Ok(()));
            return;
        }

        if let Err(errors) = book.validate() {
            let _ = reply.send(Err(AppError::InvalidArgument {
                argument: "audiobook".to_string(),
                reason: errors.join("; "),
            }));
            return;
        }

        self.controller.prepare_switch();

        self.open_requests += 1;
        let request = self.open_requests;
        let paths: Vec<PathBuf> = book.source_files.iter().map(|f| f.path.clone()).collect();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let outcome = match tokio::task::spawn_blocking(move || find_missing(&paths)).await {
                Ok(None) => Ok(()),
                Ok(Some(path)) => Err(AppError::MissingSourceFile { path }),
                Err(e) => Err(AppError::InternalError {
                    message: format!("source file check panicked: {}", e),
                }),
            };
            let _ = tx.send(SessionMessage::SourcesVerified { request, outcome });
        });

        self.pending_open = Some(PendingOpen {
            request,
            book,
            reply,
        });
    }

    fn sources_verified(&mut self, request: u64, outcome: Result<()>) {
        let Some(pending) = self.pending_open.take_if(|p| p.request == request) else {
            log::debug!("Ignoring file check for superseded open request {}", request);
            return;
        };

        let result = match outcome {
            Ok(()) => self.controller.install(pending.book),
            Err(error) => {
                log::warn!("Not opening '{}': {}", pending.book.title, error);
                self.controller.report(&error);
                Err(error)
            }
        };
        let _ = pending.reply.send(result);
    }

    fn apply_effects(&mut self) {
        for effect in self.controller.take_effects() {
            match effect {
                Effect::Persist {
                    generation,
                    started,
                    book,
                } => {
                    let job = PersistJob::Write {
                        generation,
                        started,
                        book,
                    };
                    if self.writer.send(job).is_err() {
                        log::warn!("Progress writer has stopped; dropping write");
                    }
                }
                Effect::Notify(notification) => {
                    // No subscribers is fine
                    let _ = self.notifications.send(notification);
                }
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.controller.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    /// Final flush, awaited before the actor exits
    async fn shutdown(&mut self) {
        if let Some(pending) = self.pending_open.take() {
            let _ = pending.reply.send(Err(AppError::SessionClosed));
        }

        self.controller.shutdown();
        self.apply_effects();
        self.publish();

        let (done, wait) = oneshot::channel();
        if self.writer.send(PersistJob::Barrier(done)).is_ok() && wait.await.is_err() {
            log::warn!("Progress writer stopped before the final flush completed");
        }
    }
}

fn spawn_writer(
    repository: Arc<dyn AudiobookRepository>,
    session: mpsc::UnboundedSender<SessionMessage>,
) -> mpsc::UnboundedSender<PersistJob> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match job {
                PersistJob::Write {
                    generation,
                    started,
                    book,
                } => {
                    let outcome = repository.upsert_audiobook(&book).await;
                    if let Err(e) = &outcome {
                        log::debug!("Progress write for '{}' failed: {}", book.title, e);
                    }
                    // The session may already be gone after its final flush
                    let _ = session.send(SessionMessage::PersistFinished {
                        generation,
                        started,
                        outcome,
                    });
                }
                PersistJob::Barrier(done) => {
                    let _ = done.send(());
                }
            }
        }
    });

    tx
}

fn find_missing(paths: &[PathBuf]) -> Option<PathBuf> {
    paths.iter().find(|path| !path.is_file()).cloned()
}
