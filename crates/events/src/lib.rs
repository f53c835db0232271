//! TrustCore Events - Durable storage for the audit chain
//!
//! - [`SqliteEventStore`]: the append-only `audit_events` relation
//! - [`EventReader`]: JSON Lines evidence files produced by `HashChain::export_jsonl`

pub mod error;
pub mod reader;
pub mod store;

pub use error::EventError;
pub use reader::EventReader;
pub use store::{
    init_schema, insert_event, open_connection, read_tail, SqliteEventStore, AUDIT_EVENTS_TABLE,
};
