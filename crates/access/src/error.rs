//! Access errors

use crate::resource::Resource;
use thiserror::Error;

/// Role could not be turned into a scope
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    /// Configuration error: the identity layer sent a role this build does not know
    #[error("Role has no data scope mapping: {0}")]
    UnmappedRole(String),
}

/// Errors from scoped reads and response masking
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Unknown column {column} on {resource}")]
    UnknownColumn { resource: Resource, column: String },

    #[error("Invalid query on {resource}: {reason}")]
    InvalidQuery { resource: Resource, reason: String },

    #[error("Masking failed for {resource}.{field}: {reason}")]
    MaskingFailure {
        resource: Resource,
        field: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Scope(#[from] ScopeError),
}

impl AccessError {
    pub fn is_masking_failure(&self) -> bool {
        matches!(self, AccessError::MaskingFailure { .. })
    }
}

/// Result type for access operations
pub type AccessResult<T> = Result<T, AccessError>;
