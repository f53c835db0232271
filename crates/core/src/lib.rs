//! TrustCore Core - Domain types
//!
//! This crate contains the value types shared by every TrustCore crate:
//! - `Role`: Closed set of lending-platform roles
//! - `Identity`: Per-request identity snapshot handed over by the identity layer
//! - `TrustConfig`: Storage paths, retry bounds and page sizes

pub mod config;
pub mod error;
pub mod identity;
pub mod role;

pub use config::TrustConfig;
pub use error::{CoreError, CoreResult};
pub use identity::Identity;
pub use role::Role;
