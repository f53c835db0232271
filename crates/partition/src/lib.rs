//! # TrustCore Partition
//!
//! Schema/credential routing between the general and regulated partitions.
//!
//! ## Layout
//! - `main` database: lending tables (general) and `audit_events` (audit)
//! - `regulated` database (separate file, attached): `demographics`
//!
//! ## Pools
//! - [`Primary`]: lending services; reads regulated data, never writes it
//! - [`Compliance`]: regulated-data services; reads general data, never writes it
//!
//! Grants are enforced inside SQLite by an authorizer on every pool
//! connection. See [`grant`] for the full table.

pub mod database;
pub mod demographics;
pub mod error;
pub mod grant;
pub mod lending;
pub mod schema;

pub use database::Database;
pub use demographics::{insert_demographics, CollectionMethod, Demographics, NewDemographics};
pub use error::{PartitionError, PartitionResult};
pub use grant::{classify, Compliance, CredentialPool, Operation, Partition, PoolKind, Primary};
pub use lending::{
    insert_application, insert_borrower_link, update_assignment, NewApplication, NewDocument, NewFinancial,
    NewRateLock,
};
pub use schema::Schema;
