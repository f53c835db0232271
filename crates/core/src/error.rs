//! Core errors

use thiserror::Error;

/// Errors from core value construction and configuration loading
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown role claim: '{0}'")]
    UnknownRole(String),

    #[error("Identity field '{0}' cannot be empty")]
    EmptyIdentityField(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
