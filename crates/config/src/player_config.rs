//! Player configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};

/// Playback defaults and progress-saving behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Volume for books that have never been played (0-100)
    pub default_volume: u8,

    /// Speed for books that have never been played (0.5 - 3.0)
    pub default_speed: f32,

    /// Minimum seconds between tick-driven progress writes
    pub persist_interval_secs: u64,

    /// Minimum milliseconds between processed position ticks
    pub position_tick_ms: u64,

    /// Progress percentage at which a book counts as finished
    pub completion_threshold_percent: f64,

    /// Start playing as soon as a book finishes opening
    pub auto_play_on_open: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: 70,
            default_speed: 1.0,
            persist_interval_secs: 10,
            position_tick_ms: 500,
            completion_threshold_percent: 99.9,
            auto_play_on_open: false,
        }
    }
}

impl ConfigSection for PlayerConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::new()
            .range("player.default_volume", self.default_volume, 0..=100)
            .range("player.default_speed", self.default_speed, 0.5..=3.0)
            .range(
                "player.persist_interval_secs",
                self.persist_interval_secs,
                1..=300,
            )
            .range("player.position_tick_ms", self.position_tick_ms, 50..=5000)
            .range(
                "player.completion_threshold_percent",
                self.completion_threshold_percent,
                90.0..=100.0,
            )
            .finish()
    }

    fn merge(&mut self, other: Self) {
        self.default_volume = other.default_volume;
        self.default_speed = other.default_speed;
        self.persist_interval_secs = other.persist_interval_secs;
        self.position_tick_ms = other.position_tick_ms;
        self.completion_threshold_percent = other.completion_threshold_percent;
        self.auto_play_on_open = other.auto_play_on_open;
    }

    fn section_name(&self) -> &'static str {
        "player"
    }
}
