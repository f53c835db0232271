//! Ledger errors

use crate::store::Checkpoint;
use thiserror::Error;

/// Errors raised by an [`EventStore`](crate::EventStore) implementation
#[derive(Error, Debug)]
pub enum StoreError {
    /// The tail moved between the engine's read and the commit
    #[error("Chain tail moved: expected {expected:?}, found {actual:?}")]
    Conflict {
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("Event store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap any backend error
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the hash-chain engine
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Write conflict: chain tail kept moving after {attempts} attempts")]
    WriteConflict { attempts: u32 },

    #[error("Event store error: {0}")]
    Store(#[from] StoreError),

    #[error("Verification cancelled after {events_checked} events")]
    Cancelled {
        events_checked: u64,
        resume_from: Option<Checkpoint>,
    },

    #[error("Checkpoint {0} is beyond the chain head")]
    CheckpointAhead(u64),

    #[error("Invalid event filter: {0}")]
    InvalidFilter(String),

    #[error("Timestamp outside the storable range (years 0-9999): {0}")]
    InvalidTimestamp(String),

    #[error("Event id space exhausted")]
    SequenceExhausted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    /// Recoverable conditions the caller may retry at the business level
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, LedgerError::WriteConflict { .. })
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
