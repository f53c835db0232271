//! Service-layer errors

use thiserror::Error;
use trustcore_access::{AccessError, ScopeError};
use trustcore_core::{CoreError, Role};
use trustcore_events::EventError;
use trustcore_ledger::LedgerError;
use trustcore_partition::PartitionError;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Core(#[from] CoreError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Event store error: {0}")]
    Events(#[from] EventError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("Role {role} may not {action}")]
    Forbidden { role: Role, action: &'static str },

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ContextError {
    /// Rejected by a grant profile or a role check
    pub fn is_permission_denied(&self) -> bool {
        match self {
            ContextError::Partition(e) => e.is_permission_denied(),
            ContextError::Forbidden { .. } => true,
            _ => false,
        }
    }

    pub fn is_masking_failure(&self) -> bool {
        matches!(self, ContextError::Access(e) if e.is_masking_failure())
    }
}

/// Result type for service operations
pub type ContextResult<T> = Result<T, ContextError>;
