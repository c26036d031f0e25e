//! Error types and recovery strategies for StoryStream
//!
//! Every error carries a severity tier and a recommended recovery action:
//! - **Recoverable**: retried automatically on the next trigger (a failed progress write)
//! - **Degraded**: the current book cannot play but the app continues (missing file)
//! - **Fatal**: requires user intervention before anything else works (corrupted database)

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Recovery actions that can be taken when an error occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry the operation immediately
    RetryImmediate,
    /// Retry on a later trigger (next tick, next flush)
    RetryWithBackoff,
    /// Nothing to do; the caller treats the outcome as success
    Ignore,
    /// Perform a safe shutdown and require user restart
    SafeShutdown,
    /// No automatic recovery - user intervention required
    UserIntervention,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryImmediate => write!(f, "Retrying immediately"),
            Self::RetryWithBackoff => write!(f, "Retrying with backoff"),
            Self::Ignore => write!(f, "Ignoring"),
            Self::SafeShutdown => write!(f, "Performing safe shutdown"),
            Self::UserIntervention => write!(f, "User intervention required"),
        }
    }
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Error can be automatically recovered from
    Recoverable,
    /// Feature degraded but app can continue
    Degraded,
    /// Critical error requiring restart or user action
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recoverable => write!(f, "Recoverable"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Fatal => write!(f, "Fatal"),
        }
    }
}

/// Main error type for StoryStream
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Playback Errors =====
    /// One or more physical files of a book are absent
    #[error("Missing source file: {path}")]
    MissingSourceFile { path: PathBuf },

    /// A book was opened that has no chapter table
    #[error("No chapters loaded for audiobook '{audiobook}'")]
    NoChaptersLoaded { audiobook: String },

    /// The audio engine could not open or decode a source
    #[error("Media engine failure: {message}")]
    MediaEngineFailure { message: String },

    /// Seek target outside the book
    #[error("Invalid audio position: {position}ms (book duration: {duration}ms)")]
    InvalidPosition { position: u64, duration: u64 },

    /// An operation that needs a now-playing book was called without one
    #[error("No audiobook is currently playing")]
    NoActiveSession,

    /// The session actor has shut down
    #[error("Playback session closed")]
    SessionClosed,

    // ===== Persistence Errors =====
    /// A progress or bookmark write failed; retried on the next trigger
    #[error("Persistence failure: {message}")]
    PersistenceFailure {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The row was already removed by another path
    #[error("{entity} {identifier} was already deleted")]
    ConcurrentDeleteConflict { entity: String, identifier: String },

    /// Database operation failed
    #[error("Database error: {message}")]
    DatabaseError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database is corrupted and needs repair
    #[error("Database corrupted: {details}")]
    DatabaseCorrupted { details: String },

    /// Record not found in database
    #[error("Record not found: {entity} with {identifier}")]
    RecordNotFound { entity: String, identifier: String },

    // ===== File System Errors =====
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// General I/O error
    #[error("I/O error: {message}")]
    IoError {
        message: String,
        #[source]
        source: io::Error,
    },

    // ===== Generic Errors =====
    /// Generic internal error
    #[error("Internal error: {message}")]
    InternalError { message: String },

    /// Operation superseded or cancelled
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// Invalid argument provided
    #[error("Invalid argument: {argument} - {reason}")]
    InvalidArgument { argument: String, reason: String },
}

impl AppError {
    /// Returns the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::PersistenceFailure { .. }
            | Self::ConcurrentDeleteConflict { .. }
            | Self::Cancelled { .. } => ErrorSeverity::Recoverable,

            Self::DatabaseCorrupted { .. } | Self::SessionClosed => ErrorSeverity::Fatal,

            _ => ErrorSeverity::Degraded,
        }
    }

    /// Returns the recommended recovery action for this error
    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            Self::PersistenceFailure { .. } | Self::DatabaseError { .. } => {
                RecoveryAction::RetryWithBackoff
            }

            Self::ConcurrentDeleteConflict { .. } | Self::Cancelled { .. } => {
                RecoveryAction::Ignore
            }

            Self::SessionClosed => RecoveryAction::SafeShutdown,

            _ => RecoveryAction::UserIntervention,
        }
    }

    /// Returns a user-friendly error message suitable for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingSourceFile { path } => format!(
                "Part of this audiobook could not be found ({}). It may have been moved or deleted.",
                path.display()
            ),
            Self::NoChaptersLoaded { audiobook } => {
                format!("Could not load chapters for '{}'.", audiobook)
            }
            Self::MediaEngineFailure { .. } => {
                "Cannot play this audio file. It may be corrupted or in an unsupported format."
                    .to_string()
            }
            Self::InvalidPosition { .. } => {
                "Cannot seek to that position in the audiobook.".to_string()
            }
            Self::NoActiveSession => "Nothing is playing right now.".to_string(),
            Self::SessionClosed => "The player has stopped. Please restart.".to_string(),

            Self::PersistenceFailure { .. } => {
                "Your listening progress could not be saved yet. It will be retried.".to_string()
            }
            Self::ConcurrentDeleteConflict { .. } => "The item was already removed.".to_string(),
            Self::DatabaseError { .. } => {
                "Database is temporarily unavailable. Please try again.".to_string()
            }
            Self::DatabaseCorrupted { .. } => {
                "The app's database is damaged and needs repair.".to_string()
            }
            Self::RecordNotFound { .. } => "The requested item was not found.".to_string(),

            Self::FileNotFound { .. } => {
                "The file was not found. It may have been moved or deleted.".to_string()
            }
            Self::IoError { .. } => "A file operation failed. Please try again.".to_string(),

            Self::InternalError { .. } => {
                "An unexpected error occurred. Please try again.".to_string()
            }
            Self::Cancelled { .. } => "Operation was cancelled.".to_string(),
            Self::InvalidArgument { .. } => "Invalid input provided.".to_string(),
        }
    }

    /// Returns true if this error should be logged at ERROR level
    pub fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }

    /// Returns true if this error can be automatically retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.recovery_action(),
            RecoveryAction::RetryImmediate | RecoveryAction::RetryWithBackoff
        )
    }

    /// Returns true for outcomes that callers should treat as success
    pub fn is_benign(&self) -> bool {
        self.recovery_action() == RecoveryAction::Ignore
    }

    /// Helper to create a database error from any error type
    pub fn database<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wraps any error as a retryable persistence failure
    pub fn persistence(message: impl Into<String>, source: AppError) -> Self {
        Self::PersistenceFailure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Convenience type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::FileNotFound {
                path: PathBuf::from("unknown"),
            },
            _ => Self::IoError {
                message: err.to_string(),
                source: err,
            },
        }
    }
}
