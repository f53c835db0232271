//! TrustCore Ledger - Tamper-evident audit chain
//!
//! Every security-relevant action is recorded as an [`AuditEvent`] whose hash
//! covers its own fields and the hash of the event before it. Retroactive edits
//! anywhere in the ledger are caught by [`HashChain::verify`].
//!
//! # Key Types
//! - `EventDraft`: What a caller wants recorded
//! - `AuditEvent`: A committed, sealed event
//! - `EventStore`: Ordered append/read-only storage (memory impl here, SQLite in `trustcore-events`)
//! - `HashChain`: Append with bounded retry, snapshot queries, verification

pub mod chain;
pub mod error;
pub mod event;
pub mod hash;
pub mod store;
pub mod verify;

pub use chain::{EventPage, HashChain};
pub use error::{LedgerError, LedgerResult, StoreError, StoreResult};
pub use event::{check_timestamp, event_types, AuditEvent, EventDraft};
pub use hash::{calculate_event_hash, GENESIS_HASH};
pub use store::{Checkpoint, EventFilter, EventStore, MemoryEventStore};
pub use verify::{BreakKind, CancelToken, ChainStatus, VerifyRange, VerifyReport};
