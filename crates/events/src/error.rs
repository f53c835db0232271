//! Event store errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event id {0} does not fit the storage integer type")]
    IdOutOfRange(u64),

    #[error("Event timestamp cannot be stored: {0}")]
    InvalidTimestamp(String),

    #[error("Unreadable stored event {id}: {reason}")]
    InvalidRow { id: i64, reason: String },

    #[error("Invalid event file {path} at line {line}: {reason}")]
    InvalidFile {
        path: String,
        line: usize,
        reason: String,
    },
}
