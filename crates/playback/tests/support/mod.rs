#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storystream_core::{
    AppError, Audiobook, AudiobookId, AudiobookRepository, Bookmark, BookmarkId, Chapter, Result,
    SourceFile,
};
use storystream_playback::{
    AudioEngine, EngineEvent, EngineEventSender, EngineResult, SessionHandle, SessionSettings,
};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Play,
    Pause,
    SetSource(PathBuf),
    Seek(u64),
    Rate(f32),
    Volume(u8),
}

#[derive(Default)]
struct ProbeState {
    events: Option<EngineEventSender>,
    calls: Vec<Call>,
    position: u64,
}

/// Records what the session asks of the engine and lets tests emit engine events
#[derive(Clone, Default)]
pub struct Probe {
    inner: Arc<Mutex<ProbeState>>,
}

impl Probe {
    pub fn engine(&self, events: EngineEventSender) -> FakeEngine {
        self.inner.lock().unwrap().events = Some(events);
        FakeEngine {
            probe: self.clone(),
        }
    }

    pub fn emit(&self, event: EngineEvent) {
        let sender = self.inner.lock().unwrap().events.clone().unwrap();
        assert!(sender.send(event), "session has stopped");
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: Call) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

/// Engine that opens every source instantly
pub struct FakeEngine {
    probe: Probe,
}

impl AudioEngine for FakeEngine {
    fn play(&mut self) -> EngineResult<()> {
        self.probe.record(Call::Play);
        Ok(())
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.probe.record(Call::Pause);
        Ok(())
    }

    fn set_source(&mut self, path: &Path) -> EngineResult<()> {
        self.probe.record(Call::SetSource(path.to_path_buf()));
        self.probe.inner.lock().unwrap().position = 0;
        self.probe.emit(EngineEvent::Opened);
        Ok(())
    }

    fn seek(&mut self, local_ms: u64) -> EngineResult<()> {
        self.probe.record(Call::Seek(local_ms));
        self.probe.inner.lock().unwrap().position = local_ms;
        Ok(())
    }

    fn set_playback_rate(&mut self, rate: f32) -> EngineResult<()> {
        self.probe.record(Call::Rate(rate));
        Ok(())
    }

    fn set_volume(&mut self, volume: u8) -> EngineResult<()> {
        self.probe.record(Call::Volume(volume));
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        self.probe.inner.lock().unwrap().position
    }
}

/// Repository kept in memory, with injectable write failures
#[derive(Default)]
pub struct MemoryRepository {
    books: Mutex<HashMap<AudiobookId, Audiobook>>,
    bookmarks: Mutex<Vec<Bookmark>>,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl MemoryRepository {
    pub fn insert(&self, book: &Audiobook) {
        self.books.lock().unwrap().insert(book.id, book.clone());
    }

    pub fn book(&self, id: AudiobookId) -> Option<Audiobook> {
        self.books.lock().unwrap().get(&id).cloned()
    }

    /// Progress writes attempted so far, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudiobookRepository for MemoryRepository {
    async fn upsert_audiobook(&self, book: &Audiobook) -> Result<Option<Audiobook>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::DatabaseError {
                message: "database is locked".to_string(),
                source: None,
            });
        }

        let mut books = self.books.lock().unwrap();
        match books.get_mut(&book.id) {
            Some(stored) => {
                *stored = book.clone();
                Ok(Some(book.clone()))
            }
            None => Ok(None),
        }
    }

    async fn get_bookmarks_by_audiobook(&self, id: AudiobookId) -> Result<Vec<Bookmark>> {
        let mut bookmarks: Vec<Bookmark> = self
            .bookmarks
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.audiobook_id == id)
            .cloned()
            .collect();
        bookmarks.sort_by_key(|b| b.position_ms);
        Ok(bookmarks)
    }

    async fn upsert_bookmark(&self, bookmark: &Bookmark) -> Result<Option<Bookmark>> {
        if !self.books.lock().unwrap().contains_key(&bookmark.audiobook_id) {
            return Ok(None);
        }
        let mut bookmarks = self.bookmarks.lock().unwrap();
        bookmarks.retain(|b| b.id != bookmark.id);
        bookmarks.push(bookmark.clone());
        Ok(Some(bookmark.clone()))
    }

    async fn delete_bookmark(&self, id: BookmarkId) -> Result<()> {
        let mut bookmarks = self.bookmarks.lock().unwrap();
        let before = bookmarks.len();
        bookmarks.retain(|b| b.id != id);
        if bookmarks.len() == before {
            return Err(AppError::ConcurrentDeleteConflict {
                entity: "Bookmark".to_string(),
                identifier: id.to_string(),
            });
        }
        Ok(())
    }
}

/// An audiobook whose source files exist in a temporary directory
pub struct Fixture {
    pub dir: TempDir,
    pub book: Audiobook,
}

impl Fixture {
    /// 600s + 300s; chapters "Departure", "Crossing", "Finale"
    pub fn two_files() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            source_file(&dir, 0, "part1.mp3", 600.0),
            source_file(&dir, 1, "part2.mp3", 300.0),
        ];
        let chapters = vec![
            Chapter::new(0, 0, 0, 300_000, "Departure"),
            Chapter::new(1, 0, 300_000, 600_000, "Crossing"),
            Chapter::new(2, 1, 0, 300_000, "Finale"),
        ];
        let book = Audiobook::new("The Long Road", files, chapters);
        Self { dir, book }
    }

    pub fn without_chapters() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![source_file(&dir, 0, "untitled.mp3", 60.0)];
        let book = Audiobook::new("Untitled", files, Vec::new());
        Self { dir, book }
    }

    pub fn path(&self, file_index: usize) -> PathBuf {
        self.book.source_files[file_index].path.clone()
    }
}

fn source_file(dir: &TempDir, index: usize, name: &str, seconds: f64) -> SourceFile {
    let path = dir.path().join(name);
    std::fs::write(&path, b"ID3").unwrap();
    SourceFile::new(index, path, seconds)
}

/// Settings that process every tick
pub fn settings() -> SessionSettings {
    SessionSettings {
        tick_interval: Duration::ZERO,
        ..Default::default()
    }
}

pub fn spawn(repository: &Arc<MemoryRepository>) -> (SessionHandle, Probe) {
    let probe = Probe::default();
    let repository: Arc<dyn AudiobookRepository> = repository.clone();
    let session = SessionHandle::spawn(settings(), repository, |events| probe.engine(events));
    (session, probe)
}
