//! TrustCore Access - Who may see which rows, and in what form
//!
//! ```text
//! Identity ──resolve──► DataScope ──apply_scope──► ScopedQuery (SQL + params)
//!                           │
//!                           └──────mask──────────► response records
//! ```
//!
//! ## Key Components
//!
//! - [`scope::resolve`] - Role to [`DataScope`], exhaustive over [`Role`](trustcore_core::Role)
//! - [`query::apply_scope`] - Scope predicate composed into the SQL itself
//! - [`mask::mask`] - Fail-closed PII masking of response records

pub mod error;
pub mod mask;
pub mod query;
pub mod resource;
pub mod scope;

pub use error::{AccessError, AccessResult, ScopeError};
pub use mask::{mask, mask_all, MaskPattern, Record};
pub use query::{apply_scope, Order, QueryValue, ResourceQuery, ScopedQuery};
pub use resource::Resource;
pub use scope::{resolve, resolve_claims, DataScope};
