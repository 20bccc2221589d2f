//! Error types for calbridge.

use thiserror::Error;

/// Errors that can occur in calbridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Malformed timestamp '{0}'. Use YYYY-MM-DD or RFC3339/ISO-8601 format")]
    MalformedTimestamp(String),

    #[error("Unknown time zone '{0}'")]
    UnknownTimeZone(String),

    #[error("Inconsistent timing: {0}")]
    InconsistentTiming(String),

    #[error("Event ends before it starts ({start} > {end})")]
    InvalidTimeRange { start: String, end: String },

    #[error("Malformed calendar container: {0}")]
    MalformedContainer(String),

    #[error("Reminder offset must not be negative (got {0} minutes)")]
    InvalidReminderOffset(i64),

    #[error("Invalid reminder anchor '{0}'. Expected START or END")]
    InvalidAnchor(String),

    #[error("Original event could not be decoded: {source}")]
    EventNotDecodable {
        #[source]
        source: Box<BridgeError>,
    },

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for calbridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
