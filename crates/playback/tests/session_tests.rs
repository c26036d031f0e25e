mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use storystream_core::{AppError, AudiobookRepository};
use storystream_playback::{
    EngineEvent, NotificationKind, PlaybackState, SessionHandle, SimulatedEngine,
    SimulationOptions,
};
use support::{Call, Fixture, MemoryRepository};

#[tokio::test]
async fn test_open_resumes_at_saved_position() {
    let repository = Arc::new(MemoryRepository::default());
    let mut fixture = Fixture::two_files();
    fixture.book.current_time_ms = 650_000;
    repository.insert(&fixture.book);
    let (session, probe) = support::spawn(&repository);

    session.open_audiobook(fixture.book.clone()).await.unwrap();
    let state = session.state().await.unwrap();

    assert_eq!(state.now_playing, Some(fixture.book.id));
    assert_eq!(state.state, PlaybackState::Paused);
    assert_eq!(state.current_source_file_index, 1);
    assert_eq!(state.current_chapter_title.as_deref(), Some("Finale"));
    assert!(probe.calls().contains(&Call::SetSource(fixture.path(1))));
    assert!(probe.calls().contains(&Call::Seek(50_000)));
}

#[tokio::test]
async fn test_reopening_now_playing_book_is_noop() {
    let repository = Arc::new(MemoryRepository::default());
    let fixture = Fixture::two_files();
    repository.insert(&fixture.book);
    let (session, probe) = support::spawn(&repository);

    session.open_audiobook(fixture.book.clone()).await.unwrap();
    session.open_audiobook(fixture.book.clone()).await.unwrap();
    session.state().await.unwrap();

    assert_eq!(probe.count(&Call::SetSource(fixture.path(0))), 1);
}

#[tokio::test]
async fn test_missing_source_file_keeps_previous_book() {
    let repository = Arc::new(MemoryRepository::default());
    let playing = Fixture::two_files();
    let broken = Fixture::two_files();
    std::fs::remove_file(broken.path(1)).unwrap();
    repository.insert(&playing.book);
    repository.insert(&broken.book);

    let (session, _probe) = support::spawn(&repository);
    let mut notifications = session.subscribe_notifications();
    session.open_audiobook(playing.book.clone()).await.unwrap();

    let result = session.open_audiobook(broken.book.clone()).await;

    assert!(matches!(result, Err(AppError::MissingSourceFile { .. })));
    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.kind, NotificationKind::MissingSourceFile);
    assert!(notification.message.contains("part2.mp3"));
    assert_eq!(session.state().await.unwrap().now_playing, Some(playing.book.id));
}

#[tokio::test]
async fn test_book_without_chapters_is_unloaded() {
    let repository = Arc::new(MemoryRepository::default());
    let fixture = Fixture::without_chapters();
    repository.insert(&fixture.book);
    let (session, _probe) = support::spawn(&repository);
    let mut notifications = session.subscribe_notifications();

    session.open_audiobook(fixture.book.clone()).await.unwrap();
    let state = session.state().await.unwrap();

    assert!(state.now_playing.is_none());
    assert_eq!(state.state, PlaybackState::Idle);
    assert_eq!(
        notifications.recv().await.unwrap().kind,
        NotificationKind::NoChaptersLoaded
    );
}

#[tokio::test]
async fn test_later_open_supersedes_earlier() {
    let repository = Arc::new(MemoryRepository::default());
    let first = Fixture::two_files();
    let second = Fixture::two_files();
    repository.insert(&first.book);
    repository.insert(&second.book);
    let (session, _probe) = support::spawn(&repository);

    let (a, b) = tokio::join!(
        session.open_audiobook(first.book.clone()),
        session.open_audiobook(second.book.clone())
    );

    assert!(matches!(a, Err(AppError::Cancelled { .. })));
    b.unwrap();
    assert_eq!(session.state().await.unwrap().now_playing, Some(second.book.id));
}

#[tokio::test]
async fn test_end_of_file_continues_into_next_file() {
    let repository = Arc::new(MemoryRepository::default());
    let fixture = Fixture::two_files();
    repository.insert(&fixture.book);
    let (session, probe) = support::spawn(&repository);

    session.open_audiobook(fixture.book.clone()).await.unwrap();
    session.play().await.unwrap();
    probe.emit(EngineEvent::PositionChanged(600_000));
    probe.emit(EngineEvent::Ended);
    // Handling `Ended` queues the engine's `Opened` behind this query
    assert!(session.state().await.unwrap().is_switching);
    let state = session.state().await.unwrap();

    assert_eq!(state.state, PlaybackState::Playing);
    assert_eq!(state.current_source_file_index, 1);
    assert_eq!(state.current_position_ms, 600_000);
    assert_eq!(state.current_chapter_title.as_deref(), Some("Finale"));
    assert!(!state.is_switching);
    assert_eq!(probe.count(&Call::Play), 2);
}

#[tokio::test]
async fn test_end_of_last_file_stays_put() {
    let repository = Arc::new(MemoryRepository::default());
    let mut fixture = Fixture::two_files();
    fixture.book.current_time_ms = 899_000;
    repository.insert(&fixture.book);
    let (session, probe) = support::spawn(&repository);

    session.open_audiobook(fixture.book.clone()).await.unwrap();
    let before = session.state().await.unwrap();
    let calls = probe.calls().len();

    probe.emit(EngineEvent::Ended);

    assert_eq!(session.state().await.unwrap(), before);
    assert_eq!(probe.calls().len(), calls);
}

#[tokio::test]
async fn test_jump_across_files_is_idempotent() {
    let repository = Arc::new(MemoryRepository::default());
    let fixture = Fixture::two_files();
    repository.insert(&fixture.book);
    let (session, _probe) = support::spawn(&repository);
    session.open_audiobook(fixture.book.clone()).await.unwrap();

    session.jump_to_position(650_000).await.unwrap();
    let first = session.state().await.unwrap();
    session.jump_to_position(650_000).await.unwrap();
    let second = session.state().await.unwrap();

    assert_eq!(first.current_source_file_index, 1);
    assert_eq!(first.current_position_ms, 650_000);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_close_flushes_latest_position() {
    let repository = Arc::new(MemoryRepository::default());
    let fixture = Fixture::two_files();
    repository.insert(&fixture.book);
    let (session, probe) = support::spawn(&repository);
    session.open_audiobook(fixture.book.clone()).await.unwrap();
    session.play().await.unwrap();

    // The first tick writes; the second falls inside the interval
    probe.emit(EngineEvent::PositionChanged(5_000));
    probe.emit(EngineEvent::PositionChanged(6_000));
    session.state().await.unwrap();
    session.close().await.unwrap();

    let stored = repository.book(fixture.book.id).unwrap();
    assert_eq!(stored.current_time_ms, 6_000);
    assert!(stored.last_played.is_some());
    assert!(matches!(session.play().await, Err(AppError::SessionClosed)));
}

#[tokio::test]
async fn test_switching_books_flushes_outgoing_position() {
    let repository = Arc::new(MemoryRepository::default());
    let first = Fixture::two_files();
    let second = Fixture::two_files();
    repository.insert(&first.book);
    repository.insert(&second.book);
    let (session, probe) = support::spawn(&repository);
    session.open_audiobook(first.book.clone()).await.unwrap();
    session.play().await.unwrap();

    // The second tick lands inside the interval and is only marked dirty
    probe.emit(EngineEvent::PositionChanged(5_000));
    probe.emit(EngineEvent::PositionChanged(8_000));
    session.open_audiobook(second.book.clone()).await.unwrap();
    assert_eq!(
        session.state().await.unwrap().now_playing,
        Some(second.book.id)
    );
    session.close().await.unwrap();

    let stored = repository.book(first.book.id).unwrap();
    assert_eq!(stored.current_time_ms, 8_000);
    assert_eq!(repository.book(second.book.id).unwrap().current_time_ms, 0);
}

#[tokio::test]
async fn test_failed_write_is_retried() {
    let repository = Arc::new(MemoryRepository::default());
    let fixture = Fixture::two_files();
    repository.insert(&fixture.book);
    let (session, _probe) = support::spawn(&repository);
    session.open_audiobook(fixture.book.clone()).await.unwrap();

    repository.fail_next_writes(1);
    session.jump_to_position(100_000).await.unwrap();
    while repository.attempts() < 1 {
        tokio::task::yield_now().await;
    }
    session.state().await.unwrap();
    assert_eq!(repository.book(fixture.book.id).unwrap().current_time_ms, 0);

    session.close().await.unwrap();

    assert_eq!(repository.attempts(), 2);
    assert_eq!(
        repository.book(fixture.book.id).unwrap().current_time_ms,
        100_000
    );
}

#[tokio::test]
async fn test_bookmarks_are_listed_in_position_order() {
    let repository = Arc::new(MemoryRepository::default());
    let fixture = Fixture::two_files();
    repository.insert(&fixture.book);
    let (session, _probe) = support::spawn(&repository);
    session.open_audiobook(fixture.book.clone()).await.unwrap();

    session.jump_to_position(700_000).await.unwrap();
    session.add_bookmark(Some("late")).await.unwrap();
    session.jump_to_position(10_000).await.unwrap();
    session.add_bookmark(Some("  early  ")).await.unwrap();

    let mut view = session.bookmarks().await.unwrap();
    session.jump_to_position(300_000).await.unwrap();
    let middle = session.add_bookmark_into(None, &mut view).await.unwrap();

    let positions: Vec<_> = view.iter().map(|b| b.position_ms).collect();
    assert_eq!(positions, vec![10_000, 300_000, 700_000]);
    assert_eq!(view[0].note, "early");
    assert!(!middle.note.is_empty());
    assert_eq!(session.bookmarks().await.unwrap(), view);
}

#[tokio::test]
async fn test_navigate_and_delete_bookmark() {
    let repository = Arc::new(MemoryRepository::default());
    let fixture = Fixture::two_files();
    repository.insert(&fixture.book);
    let (session, _probe) = support::spawn(&repository);
    session.open_audiobook(fixture.book.clone()).await.unwrap();

    session.jump_to_position(650_000).await.unwrap();
    let bookmark = session.add_bookmark(Some("Finale")).await.unwrap();
    session.jump_to_position(0).await.unwrap();

    session.navigate_to_bookmark(&bookmark).await.unwrap();
    assert_eq!(session.state().await.unwrap().current_position_ms, 650_000);

    session.delete_bookmark(bookmark.id).await.unwrap();
    // A second delete races with nothing and still succeeds
    session.delete_bookmark(bookmark.id).await.unwrap();
    assert!(session.bookmarks().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_commands_need_a_book() {
    let repository = Arc::new(MemoryRepository::default());
    let (session, _probe) = support::spawn(&repository);

    assert!(matches!(session.play().await, Err(AppError::NoActiveSession)));
    assert!(matches!(
        session.add_bookmark(None).await,
        Err(AppError::NoActiveSession)
    ));
    assert!(matches!(
        session.bookmarks().await,
        Err(AppError::NoActiveSession)
    ));
    session.set_full_screen(true).await.unwrap();
    assert!(session.state().await.unwrap().is_player_full_screen);
}

#[tokio::test]
async fn test_simulated_engine_plays_through_files() {
    let repository = Arc::new(MemoryRepository::default());
    let mut fixture = Fixture::two_files();
    fixture.book.current_time_ms = 599_000;
    repository.insert(&fixture.book);

    let book = fixture.book.clone();
    let options = SimulationOptions {
        tick: Duration::from_millis(5),
        time_scale: 200.0,
    };
    let store: Arc<dyn AudiobookRepository> = repository.clone();
    let session = SessionHandle::spawn(support::settings(), store, |events| {
        SimulatedEngine::for_audiobook(&book, events, options)
    });
    let mut snapshots = session.subscribe_snapshot();

    session.open_audiobook(fixture.book.clone()).await.unwrap();
    session.play().await.unwrap();

    let reached = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot.current_source_file_index == 1
                && snapshot.current_position_ms > 600_000
            {
                return snapshot;
            }
            snapshots.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    assert_eq!(reached.state, PlaybackState::Playing);
    assert_eq!(reached.current_chapter_title.as_deref(), Some("Finale"));
    session.close().await.unwrap();
    assert!(repository.book(fixture.book.id).unwrap().current_time_ms > 600_000);
}

#[tokio::test]
async fn test_simulated_engine_unknown_file_fails() {
    let repository = Arc::new(MemoryRepository::default());
    let fixture = Fixture::two_files();
    repository.insert(&fixture.book);

    let store: Arc<dyn AudiobookRepository> = repository.clone();
    let session = SessionHandle::spawn(support::settings(), store, |events| {
        SimulatedEngine::new(events, HashMap::new(), SimulationOptions::default())
    });
    let mut notifications = session.subscribe_notifications();

    session.open_audiobook(fixture.book.clone()).await.unwrap();

    assert_eq!(
        notifications.recv().await.unwrap().kind,
        NotificationKind::MediaEngineFailure
    );
    assert!(session.state().await.unwrap().now_playing.is_none());
}
