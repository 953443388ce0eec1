use thiserror::Error;

use crate::types::AlarmId;

/// Errors that can occur within the alarm scheduling subsystem.
#[derive(Debug, Error)]
pub enum AlarmError {
    /// The host refused exact-time registration. The alarm has been disabled.
    #[error("Exact alarm capability denied for alarm {id}")]
    CapabilityDenied { id: AlarmId },

    /// No alarm with the given ID exists in the store.
    #[error("Alarm not found: {id}")]
    NotFound { id: AlarmId },

    /// Underlying SQLite / rusqlite error. Not retried.
    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Invalid time of day: {hour:02}:{minute:02}")]
    InvalidTime { hour: u8, minute: u8 },

    #[error("Invalid weekday set: {0}")]
    InvalidWeekdays(String),

    /// The host timer rejected a registration for a reason other than capability.
    #[error("Timer error: {0}")]
    Timer(String),

    /// A background worker panicked or was cancelled before returning.
    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Database schema version {db_version} is newer than supported version {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl AlarmError {
    /// Short error code string for callers that surface failures to users.
    pub fn code(&self) -> &'static str {
        match self {
            AlarmError::CapabilityDenied { .. } => "CAPABILITY_DENIED",
            AlarmError::NotFound { .. } => "NOT_FOUND",
            AlarmError::Store(_) => "STORE_FAILURE",
            AlarmError::InvalidTime { .. } => "INVALID_TIME",
            AlarmError::InvalidWeekdays(_) => "INVALID_WEEKDAYS",
            AlarmError::Timer(_) => "TIMER_ERROR",
            AlarmError::Worker(_) => "WORKER_ERROR",
            AlarmError::UnsupportedSchemaVersion { .. } => "UNSUPPORTED_SCHEMA",
        }
    }
}

pub type Result<T> = std::result::Result<T, AlarmError>;
