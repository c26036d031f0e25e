//! Time types and validation shared across domain models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp in milliseconds since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp for the current moment
    ///
    /// Falls back to the epoch if the system clock reports a time before it.
    pub fn now() -> Self {
        Self(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_else(|_| std::time::Duration::from_secs(0))
                .as_millis() as i64,
        )
    }

    /// Creates a timestamp from milliseconds since Unix epoch
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since Unix epoch
    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A span of audio time in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Duration(u64);

impl Duration {
    pub const ZERO: Self = Self(0);

    /// Creates a duration from milliseconds
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Creates a duration from seconds
    pub fn from_seconds(seconds: u64) -> Self {
        Self(seconds * 1000)
    }

    /// Creates a duration from fractional seconds, rounded to the nearest millisecond.
    /// Negative and non-finite inputs become zero.
    pub fn from_seconds_f64(seconds: f64) -> Self {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Self::ZERO;
        }
        Self((seconds * 1000.0).round() as u64)
    }

    /// Returns the duration in milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns the duration in whole seconds
    pub fn as_seconds(&self) -> u64 {
        self.0 / 1000
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Formats as H:MM:SS (always shows hours)
    pub fn as_hms(&self) -> String {
        let total_seconds = self.as_seconds();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hms())
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Self(d.as_millis() as u64)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(d: Duration) -> Self {
        std::time::Duration::from_millis(d.0)
    }
}

/// Parses either a plain millisecond count (`650000`) or a clock string
/// (`H:MM:SS`, `MM:SS`, optionally with `.mmm`).
impl FromStr for Duration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty position".to_string());
        }

        if !s.contains(':') {
            return s
                .parse::<u64>()
                .map(Self)
                .map_err(|e| format!("invalid millisecond value '{}': {}", s, e));
        }

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() > 3 {
            return Err(format!("too many ':' separators in '{}'", s));
        }

        let (whole_seconds, fraction) = match parts[parts.len() - 1].split_once('.') {
            Some((secs, frac)) => (secs, Some(frac)),
            None => (parts[parts.len() - 1], None),
        };

        let mut total_seconds = 0u64;
        for unit in parts[..parts.len() - 1].iter().chain(std::iter::once(&whole_seconds)) {
            let value = unit
                .parse::<u64>()
                .map_err(|e| format!("invalid time component '{}': {}", unit, e))?;
            total_seconds = total_seconds * 60 + value;
        }

        let millis = match fraction {
            Some(frac) if !frac.is_empty() && frac.len() <= 3 => {
                let padded = format!("{:0<3}", frac);
                padded
                    .parse::<u64>()
                    .map_err(|e| format!("invalid fraction '{}': {}", frac, e))?
            }
            Some(frac) if !frac.is_empty() => {
                return Err(format!("fraction '{}' has more than 3 digits", frac));
            }
            _ => 0,
        };

        Ok(Self(total_seconds * 1000 + millis))
    }
}

/// Trait for types that can validate themselves
pub trait Validator {
    /// Validates the instance and returns errors if invalid
    fn validate(&self) -> Result<(), Vec<String>>;

    /// Returns true if the instance is valid
    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
