//! An engine that plays nothing and advances a clock
//!
//! [`SimulatedEngine`] runs its own thread that moves the position forward in
//! real time (optionally scaled), reports ticks and end-of-media, and answers
//! transport commands. The CLI uses it to drive a session without an audio
//! device; tests use it for end-to-end runs.

use crate::engine::{AudioEngine, EngineError, EngineEvent, EngineEventSender, EngineResult, EngineStatus};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use storystream_core::Audiobook;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationOptions {
    /// Interval between position reports
    pub tick: Duration,
    /// Milliseconds of audio per millisecond of wall time
    pub time_scale: f64,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(250),
            time_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
enum SimCommand {
    Open {
        path: PathBuf,
        duration_ms: Option<u64>,
    },
    Play,
    Pause,
    Seek(u64),
    SetRate(f32),
    Stop,
}

pub struct SimulatedEngine {
    handle: Option<thread::JoinHandle<()>>,
    command_tx: Sender<SimCommand>,
    position: Arc<AtomicU64>,
    durations: HashMap<PathBuf, u64>,
}

impl SimulatedEngine {
    /// `durations` maps every playable path to its length in milliseconds
    pub fn new(
        events: EngineEventSender,
        durations: HashMap<PathBuf, u64>,
        options: SimulationOptions,
    ) -> Self {
        let position = Arc::new(AtomicU64::new(0));
        let (command_tx, command_rx) = bounded(10);

        let position_clone = Arc::clone(&position);
        let handle = thread::spawn(move || {
            simulation_loop(command_rx, events, position_clone, options);
        });

        Self {
            handle: Some(handle),
            command_tx,
            position,
            durations,
        }
    }

    /// Engine that knows the durations of every file of `book`
    pub fn for_audiobook(
        book: &Audiobook,
        events: EngineEventSender,
        options: SimulationOptions,
    ) -> Self {
        let durations = book
            .source_files
            .iter()
            .map(|file| (file.path.clone(), file.duration_ms()))
            .collect();
        Self::new(events, durations, options)
    }

    fn send_command(&self, command: SimCommand) -> EngineResult<()> {
        self.command_tx
            .send(command)
            .map_err(|_| EngineError::Stopped)
    }

    pub fn stop(&mut self) {
        let _ = self.command_tx.send(SimCommand::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl AudioEngine for SimulatedEngine {
    fn play(&mut self) -> EngineResult<()> {
        self.send_command(SimCommand::Play)
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.send_command(SimCommand::Pause)
    }

    fn set_source(&mut self, path: &Path) -> EngineResult<()> {
        self.position.store(0, Ordering::Relaxed);
        self.send_command(SimCommand::Open {
            path: path.to_path_buf(),
            duration_ms: self.durations.get(path).copied(),
        })
    }

    fn seek(&mut self, local_ms: u64) -> EngineResult<()> {
        self.position.store(local_ms, Ordering::Relaxed);
        self.send_command(SimCommand::Seek(local_ms))
    }

    fn set_playback_rate(&mut self, rate: f32) -> EngineResult<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(EngineError::InvalidRate(rate));
        }
        self.send_command(SimCommand::SetRate(rate))
    }

    fn set_volume(&mut self, volume: u8) -> EngineResult<()> {
        log::trace!("Simulated volume set to {}", volume);
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }
}

fn simulation_loop(
    command_rx: Receiver<SimCommand>,
    events: EngineEventSender,
    position: Arc<AtomicU64>,
    options: SimulationOptions,
) {
    let mut source: Option<u64> = None;
    let mut playing = false;
    let mut rate = 1.0_f64;
    let mut current = 0.0_f64;
    let mut last = Instant::now();
    let mut since_report = Duration::ZERO;

    loop {
        let delivered = match command_rx.recv_timeout(options.tick) {
            Ok(SimCommand::Open { path, duration_ms }) => {
                playing = false;
                current = 0.0;
                position.store(0, Ordering::Relaxed);
                match duration_ms {
                    Some(duration) if path.is_file() => {
                        source = Some(duration);
                        events.send(EngineEvent::Opened)
                    }
                    _ => {
                        source = None;
                        events.send(EngineEvent::Failed(format!(
                            "cannot open {}",
                            path.display()
                        )))
                    }
                }
            }
            Ok(SimCommand::Play) if source.is_some() && !playing => {
                playing = true;
                last = Instant::now();
                events.send(EngineEvent::StateChanged(EngineStatus::Playing))
            }
            Ok(SimCommand::Pause) if playing => {
                playing = false;
                events.send(EngineEvent::StateChanged(EngineStatus::Paused))
            }
            Ok(SimCommand::Seek(local_ms)) => {
                current = source.map_or(local_ms, |d| local_ms.min(d)) as f64;
                position.store(current as u64, Ordering::Relaxed);
                true
            }
            Ok(SimCommand::SetRate(new_rate)) => {
                rate = f64::from(new_rate);
                true
            }
            Ok(SimCommand::Play) | Ok(SimCommand::Pause) | Err(RecvTimeoutError::Timeout) => true,
            Ok(SimCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        };

        if !delivered {
            log::debug!("Session is gone, stopping simulated engine");
            break;
        }

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(last);
        last = now;

        let Some(duration) = source.filter(|_| playing) else {
            since_report = Duration::ZERO;
            continue;
        };

        current += elapsed.as_secs_f64() * 1000.0 * rate * options.time_scale;
        since_report += elapsed;

        if current >= duration as f64 {
            current = duration as f64;
            playing = false;
            position.store(duration, Ordering::Relaxed);
            events.send(EngineEvent::PositionChanged(duration));
            if !events.send(EngineEvent::Ended) {
                break;
            }
            continue;
        }

        position.store(current as u64, Ordering::Relaxed);
        if since_report >= options.tick {
            since_report = Duration::ZERO;
            if !events.send(EngineEvent::PositionChanged(current as u64)) {
                break;
            }
        }
    }
}
