//! Event store abstraction
//!
//! The chain is an id-addressed sequence: "previous event" is a lookup by
//! `id - 1`, never a reference. Stores only append and read; there is no
//! update or delete operation on this trait.

use crate::error::{StoreError, StoreResult};
use crate::event::AuditEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// `(id, hash)` of a chain position: the tail, or where a verification stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: u64,
    pub hash: String,
}

impl Checkpoint {
    pub fn of(event: &AuditEvent) -> Self {
        Self {
            id: event.id,
            hash: event.hash.clone(),
        }
    }
}

/// Selection criteria for [`HashChain::query`](crate::HashChain::query)
///
/// All set criteria must match. `from` is inclusive, `to` exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub session_id: Option<String>,
    pub subject_application_id: Option<String>,
    pub subject_decision_id: Option<String>,
    pub event_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Pagination cursor: only events with a greater id
    pub after_id: Option<u64>,
    /// Snapshot bound: only events up to and including this id
    pub through_id: Option<u64>,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn application(mut self, application_id: impl Into<String>) -> Self {
        self.subject_application_id = Some(application_id.into());
        self
    }

    pub fn decision(mut self, decision_id: impl Into<String>) -> Self {
        self.subject_decision_id = Some(decision_id.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn after(mut self, id: u64) -> Self {
        self.after_id = Some(id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an event satisfies every content criterion (ignores paging)
    pub fn matches(&self, event: &AuditEvent) -> bool {
        fn eq(want: &Option<String>, have: &Option<String>) -> bool {
            want.as_ref().map_or(true, |w| have.as_ref() == Some(w))
        }

        eq(&self.session_id, &event.session_id)
            && eq(&self.subject_application_id, &event.subject_application_id)
            && eq(&self.subject_decision_id, &event.subject_decision_id)
            && self
                .event_type
                .as_ref()
                .map_or(true, |t| *t == event.event_type)
            && self.from.map_or(true, |from| event.timestamp >= from)
            && self.to.map_or(true, |to| event.timestamp < to)
    }
}

/// Durable, ordered storage of immutable audit events
///
/// Implementations must be safe to share across threads. Reads never block
/// appends for longer than a single statement.
pub trait EventStore: Send + Sync {
    /// Last committed event, `None` when the chain is empty
    fn tail(&self) -> StoreResult<Option<Checkpoint>>;

    /// Commit `event` iff the current tail id equals `expected_tail`.
    ///
    /// Returns [`StoreError::Conflict`] without writing anything when the tail
    /// has moved. Must be atomic: either the whole event is stored or nothing.
    fn append(&self, expected_tail: Option<u64>, event: &AuditEvent) -> StoreResult<()>;

    /// Events with `after_id < id <= through_id`, ascending, at most `limit`
    fn scan(&self, after_id: Option<u64>, through_id: u64, limit: usize)
        -> StoreResult<Vec<AuditEvent>>;

    /// Events matching `filter` with `id <= through_id`, ascending, at most `limit`.
    ///
    /// `filter.after_id` applies; `filter.limit` and `filter.through_id` are
    /// resolved by the caller into the explicit arguments.
    fn query(&self, filter: &EventFilter, through_id: u64, limit: usize)
        -> StoreResult<Vec<AuditEvent>>;
}

/// In-process event store backed by a vector in id order
#[derive(Default)]
pub struct MemoryEventStore {
    pub(crate) events: RwLock<Vec<AuditEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load events verbatim, e.g. from an exported evidence file.
    ///
    /// No linkage or ordering checks happen here; run a verification over the
    /// result to find out whether the events form an intact chain.
    pub fn from_events(events: Vec<AuditEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    /// Number of stored events
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<AuditEvent>> {
        // Writers never leave the vector half-updated, so a poisoned lock is still consistent
        self.events.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventStore for MemoryEventStore {
    fn tail(&self) -> StoreResult<Option<Checkpoint>> {
        Ok(self.read().last().map(Checkpoint::of))
    }

    fn append(&self, expected_tail: Option<u64>, event: &AuditEvent) -> StoreResult<()> {
        let mut events = self
            .events
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let actual = events.last().map(|e| e.id);
        if actual != expected_tail {
            return Err(StoreError::Conflict {
                expected: expected_tail,
                actual,
            });
        }

        events.push(event.clone());
        Ok(())
    }

    fn scan(
        &self,
        after_id: Option<u64>,
        through_id: u64,
        limit: usize,
    ) -> StoreResult<Vec<AuditEvent>> {
        Ok(self
            .read()
            .iter()
            .filter(|e| in_window(e, after_id, through_id))
            .take(limit)
            .cloned()
            .collect())
    }

    fn query(
        &self,
        filter: &EventFilter,
        through_id: u64,
        limit: usize,
    ) -> StoreResult<Vec<AuditEvent>> {
        Ok(self
            .read()
            .iter()
            .filter(|e| in_window(e, filter.after_id, through_id) && filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }
}

// Ids, not positions: a loaded evidence file may have holes
fn in_window(event: &AuditEvent, after_id: Option<u64>, through_id: u64) -> bool {
    after_id.map_or(true, |after| event.id > after) && event.id <= through_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventDraft;
    use crate::GENESIS_HASH;

    fn sealed(id: u64, prev: &str, session: &str) -> AuditEvent {
        let draft = EventDraft::new("u-1", "admin", "test").session(session);
        AuditEvent::seal(id, prev.to_string(), &draft)
    }

    #[test]
    fn test_append_checks_expected_tail() {
        let store = MemoryEventStore::new();
        let first = sealed(0, GENESIS_HASH, "s");

        store.append(None, &first).unwrap();
        assert_eq!(store.tail().unwrap(), Some(Checkpoint::of(&first)));

        // Stale expectation: the engine read an empty chain
        let stale = sealed(0, GENESIS_HASH, "s");
        let err = store.append(None, &stale).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: None,
                actual: Some(0)
            }
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_scan_bounds() {
        let store = MemoryEventStore::new();
        let mut prev = GENESIS_HASH.to_string();
        for id in 0..10 {
            let event = sealed(id, &prev, "s");
            prev = event.hash.clone();
            store.append(id.checked_sub(1), &event).unwrap();
        }

        let page = store.scan(Some(2), 6, 100).unwrap();
        assert_eq!(page.iter().map(|e| e.id).collect::<Vec<_>>(), vec![3, 4, 5, 6]);

        let page = store.scan(None, 9, 3).unwrap();
        assert_eq!(page.iter().map(|e| e.id).collect::<Vec<_>>(), vec![0, 1, 2]);

        assert!(store.scan(Some(9), 9, 10).unwrap().is_empty());
        assert!(store.scan(Some(20), 30, 10).unwrap().is_empty());
    }

    #[test]
    fn test_query_filters_and_snapshot_bound() {
        let store = MemoryEventStore::new();
        let mut prev = GENESIS_HASH.to_string();
        for id in 0..6 {
            let session = if id % 2 == 0 { "even" } else { "odd" };
            let event = sealed(id, &prev, session);
            prev = event.hash.clone();
            store.append(id.checked_sub(1), &event).unwrap();
        }

        let filter = EventFilter::new().session("even");
        let ids: Vec<u64> = store
            .query(&filter, 3, 100)
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![0, 2]);

        let filter = EventFilter::new().session("odd").after(1);
        let ids: Vec<u64> = store
            .query(&filter, 5, 100)
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![3, 5]);
    }

    #[test]
    fn test_filter_matches_time_range() {
        let event = sealed(0, GENESIS_HASH, "s");
        let ts = event.timestamp;

        let inside = EventFilter::new().between(ts, ts + chrono::Duration::seconds(1));
        assert!(inside.matches(&event));

        // `to` is exclusive
        let before = EventFilter::new().between(ts - chrono::Duration::seconds(1), ts);
        assert!(!before.matches(&event));
    }
}
