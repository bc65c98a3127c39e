//! Storage Layer
//!
//! SQLite persistence for sessions, the append-only event log and the
//! settings row, plus the JSON calibration profile file.

mod profile;
mod repository;
mod settings;

pub use profile::ProfileStore;
pub use repository::{EventCounts, Repository, SessionRecord};
pub use settings::Settings;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            other => StorageError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

/// Timestamp layout of every TEXT time column (local time, microseconds)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp, accepting any fractional-second precision
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, StorageError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| StorageError::SerializationError(format!("bad timestamp {s:?}: {e}")))
}
