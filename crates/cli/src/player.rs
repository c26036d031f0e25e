use anyhow::{Context, Result};
use console::{style, Term};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use storystream_config::Config;
use storystream_core::{Audiobook, AudiobookRepository, Duration as CoreDuration};
use storystream_database::{DbPool, SqliteRepository};
use storystream_playback::{
    PlaybackState, SessionHandle, SessionSettings, SessionSnapshot, SimulatedEngine,
    SimulationOptions,
};
use tokio::sync::broadcast::error::RecvError;

const MIN_ENGINE_TICK: StdDuration = StdDuration::from_millis(10);

#[derive(Debug, Clone, PartialEq)]
pub struct PlayOptions {
    /// Wall-clock run time
    pub seconds: u64,
    /// Absolute start position in milliseconds
    pub from: Option<u64>,
    pub speed: Option<f32>,
    pub time_scale: f64,
}

pub async fn run(pool: &DbPool, config: &Config, book: Audiobook, options: PlayOptions) -> Result<()> {
    let repository: Arc<dyn AudiobookRepository> = Arc::new(SqliteRepository::new(pool.clone()));
    let settings = SessionSettings::from(&config.player);
    let simulation = SimulationOptions {
        tick: settings.tick_interval.max(MIN_ENGINE_TICK),
        time_scale: options.time_scale,
    };

    let engine_book = book.clone();
    let session = SessionHandle::spawn(settings, repository, |events| {
        SimulatedEngine::for_audiobook(&engine_book, events, simulation)
    });
    let mut snapshots = session.subscribe_snapshot();
    let mut notifications = session.subscribe_notifications();

    session
        .open_audiobook(book)
        .await
        .context("Failed to open audiobook")?;
    if let Some(position) = options.from {
        session
            .jump_to_position(position)
            .await
            .context("Failed to jump to start position")?;
    }
    if let Some(speed) = options.speed {
        session
            .set_playback_speed(speed)
            .await
            .context("Failed to set playback speed")?;
    }
    session.play().await.context("Failed to start playback")?;

    let term = Term::stdout();
    let mut last = snapshots.borrow_and_update().clone();
    print_header(&term, &last)?;

    let deadline = tokio::time::sleep(StdDuration::from_secs(options.seconds));
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = &mut ctrl_c => {
                term.write_line("")?;
                term.write_line("Interrupted")?;
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.now_playing.is_none() {
                    break;
                }
                if snapshot.current_chapter_index != last.current_chapter_index
                    || snapshot.current_source_file_index != last.current_source_file_index
                {
                    term.write_line("")?;
                    print_header(&term, &snapshot)?;
                }
                term.clear_line()?;
                term.write_str(&status_line(&snapshot))?;
                last = snapshot;
            }
            notification = notifications.recv() => match notification {
                Ok(notification) => {
                    term.write_line("")?;
                    term.write_line(&format!("{} {}", style("!").yellow().bold(), notification.message))?;
                }
                Err(RecvError::Lagged(skipped)) => log::debug!("Skipped {} notifications", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let final_state = session.state().await.context("Session stopped unexpectedly")?;
    session.close().await.context("Failed to save progress")?;

    term.write_line("")?;
    match final_state.now_playing {
        Some(_) => println!(
            "{} Saved at {} of {} ({:.1}%)",
            style("✓").green().bold(),
            CoreDuration::from_millis(final_state.current_position_ms),
            CoreDuration::from_millis(final_state.total_duration_ms),
            final_state.progress_percent
        ),
        None => println!("{} Playback stopped", style("■").red().bold()),
    }

    Ok(())
}

fn print_header(term: &Term, snapshot: &SessionSnapshot) -> Result<()> {
    let chapter = snapshot.current_chapter_title.as_deref().unwrap_or("-");
    term.write_line(&format!(
        "{} {} (file {})",
        style("Chapter:").bold(),
        chapter,
        snapshot.current_source_file_index
    ))?;
    Ok(())
}

fn status_line(snapshot: &SessionSnapshot) -> String {
    let symbol = match snapshot.state {
        PlaybackState::Playing => style("▶").green(),
        PlaybackState::Paused => style("⏸").yellow(),
        PlaybackState::Opening => style("…").dim(),
        PlaybackState::Idle => style("■").red(),
    };
    format!(
        "{} {} / {}  {:.1}%  {:.2}x",
        symbol,
        CoreDuration::from_millis(snapshot.current_position_ms),
        CoreDuration::from_millis(snapshot.total_duration_ms),
        snapshot.progress_percent,
        snapshot.playback_speed
    )
}
