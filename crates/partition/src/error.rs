//! Partition errors

use crate::grant::{CredentialPool, Operation, Partition};
use thiserror::Error;
use trustcore_access::AccessError;
use trustcore_events::EventError;
use trustcore_ledger::LedgerError;

#[derive(Debug, Error)]
pub enum PartitionError {
    /// The pool's grant profile rejected a data operation inside SQLite
    #[error("Permission denied: {pool} pool may not {operation} {partition} data")]
    PermissionDenied {
        pool: CredentialPool,
        partition: Partition,
        operation: Operation,
    },

    /// Schema changes, ATTACH, PRAGMA and anything else outside the data grants
    #[error("Permission denied: {pool} pool may not run {action}")]
    StatementDenied { pool: CredentialPool, action: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Audit store error: {0}")]
    Events(#[from] EventError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unreadable record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PartitionError {
    /// Rejected by a grant profile, as opposed to failing for any other reason
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            PartitionError::PermissionDenied { .. } | PartitionError::StatementDenied { .. }
        )
    }

    /// A statement that had to touch a row found none
    pub fn is_missing_row(&self) -> bool {
        matches!(self, PartitionError::Database(rusqlite::Error::QueryReturnedNoRows))
    }
}

/// Result type for partition operations
pub type PartitionResult<T> = Result<T, PartitionError>;
