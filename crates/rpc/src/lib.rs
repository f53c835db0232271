//! TrustCore RPC - Service wiring and CLI
//!
//! This crate wires the ledger, access and partition crates into services and
//! provides the `trustcore` binary.

pub mod commands;
pub mod context;
pub mod error;
pub mod service;

pub use context::AppContext;
pub use error::{ContextError, ContextResult};
pub use service::{ComplianceService, LendingService, Service};
