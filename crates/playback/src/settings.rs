//! Runtime tunables for a playback session

use std::time::Duration;
use storystream_config::PlayerConfig;
use storystream_core::COMPLETION_THRESHOLD_PERCENT;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Minimum time between tick-driven progress writes
    pub persist_interval: Duration,
    /// Minimum time between processed position ticks
    pub tick_interval: Duration,
    pub completion_threshold_percent: f64,
    /// Used for books that have never been played
    pub default_speed: f32,
    /// Used for books that have never been played
    pub default_volume: u8,
    /// Start playback as soon as a newly opened book is ready
    pub auto_play_on_open: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            persist_interval: Duration::from_secs(10),
            tick_interval: Duration::from_millis(500),
            completion_threshold_percent: COMPLETION_THRESHOLD_PERCENT,
            default_speed: 1.0,
            default_volume: 70,
            auto_play_on_open: false,
        }
    }
}

impl From<&PlayerConfig> for SessionSettings {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            persist_interval: Duration::from_secs(config.persist_interval_secs),
            tick_interval: Duration::from_millis(config.position_tick_ms),
            completion_threshold_percent: config.completion_threshold_percent,
            default_speed: config.default_speed,
            default_volume: config.default_volume,
            auto_play_on_open: config.auto_play_on_open,
        }
    }
}
