//! Field checks shared by the config sections

use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::Path;

pub use crate::error::ValidationError;

/// A named section of the config file that validates and merges itself
pub trait ConfigSection: Default {
    /// Returns every invalid field, not just the first
    fn validate(&self) -> Result<(), Vec<ValidationError>>;

    /// Merges another section into this one; values from `other` win
    fn merge(&mut self, other: Self);

    fn section_name(&self) -> &'static str;
}

/// Collects field errors for one section
///
/// ```
/// use storystream_config::Validator;
///
/// let result = Validator::new()
///     .range("player.default_volume", 120u8, 0..=100)
///     .finish();
/// assert_eq!(result.unwrap_err().len(), 1);
/// ```
#[derive(Debug, Default)]
#[must_use]
pub struct Validator {
    errors: Vec<ValidationError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `value` to lie within the inclusive `bounds`
    pub fn range<T>(mut self, field: &str, value: T, bounds: RangeInclusive<T>) -> Self
    where
        T: PartialOrd + Display,
    {
        if !bounds.contains(&value) {
            self.errors.push(ValidationError::new(
                field,
                format!(
                    "must be between {} and {}, got {}",
                    bounds.start(),
                    bounds.end(),
                    value
                ),
            ));
        }
        self
    }

    /// Requires a non-blank path
    pub fn path(mut self, field: &str, value: &Path) -> Self {
        if value.as_os_str().to_string_lossy().trim().is_empty() {
            self.errors.push(ValidationError::new(field, "must not be empty"));
        }
        self
    }

    pub fn finish(self) -> Result<(), Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}
