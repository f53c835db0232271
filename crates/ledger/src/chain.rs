//! Hash-chain engine
//!
//! Flow for every append: Read tail → Seal → Compare-and-append → (retry)
//!
//! Appends through one engine are serialized by an ordering lock. Engines in
//! other processes writing the same store are kept linear by the store's
//! compare-and-append; losing that race re-reads the tail and tries again, up
//! to `max_append_retries` attempts.

use crate::error::{LedgerError, LedgerResult, StoreError};
use crate::event::{check_timestamp, AuditEvent, EventDraft};
use crate::store::{Checkpoint, EventFilter, EventStore};
use crate::verify::{self, CancelToken, VerifyRange, VerifyReport};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use trustcore_core::TrustConfig;

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<AuditEvent>,
    /// Pass as `after_id` to fetch the next page; `None` when exhausted
    pub next_cursor: Option<u64>,
    /// Head id the page was read against; pass as `through_id` to keep paging
    /// over the same snapshot
    pub snapshot_id: Option<u64>,
}

/// The audit chain: append, query, verify
pub struct HashChain {
    store: Arc<dyn EventStore>,
    config: TrustConfig,
    append_lock: Mutex<()>,
}

impl HashChain {
    pub fn new(store: Arc<dyn EventStore>, config: &TrustConfig) -> Self {
        Self {
            store,
            config: TrustConfig {
                max_append_retries: config.max_append_retries.max(1),
                verify_page_size: config.verify_page_size.max(1),
                max_page_size: config.max_page_size.max(1),
                ..config.clone()
            },
            append_lock: Mutex::new(()),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Seal `draft` at the end of the chain and commit it.
    ///
    /// Fails with [`LedgerError::WriteConflict`] once the retry bound is spent;
    /// nothing is committed in that case.
    pub fn append(&self, draft: EventDraft) -> LedgerResult<AuditEvent> {
        check_timestamp(&draft.timestamp)?;

        // The guarded value is (), so a poisoned lock carries no broken state
        let _ordering = self
            .append_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let attempts = self.config.max_append_retries;
        for attempt in 1..=attempts {
            let tail = self.store.tail()?;
            let event = AuditEvent::after(tail.as_ref(), &draft)?;
            match self.store.append(tail.as_ref().map(|cp| cp.id), &event) {
                Ok(()) => {
                    debug!(
                        id = event.id,
                        event_type = %event.event_type,
                        actor_id = %event.actor_id,
                        "audit event appended"
                    );
                    return Ok(event);
                }
                Err(StoreError::Conflict { expected, actual }) => {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        ?expected,
                        ?actual,
                        "audit chain tail moved, retrying append"
                    );
                    if attempt < attempts {
                        std::thread::sleep(self.config.append_backoff(attempt));
                    }
                }
                Err(other) => return Err(other.into()),
            }
        }

        error!(attempts, "audit append gave up after repeated write conflicts");
        Err(LedgerError::WriteConflict { attempts })
    }

    /// Events matching `filter`, in id order, over a snapshot taken now
    pub fn query(&self, filter: &EventFilter) -> LedgerResult<EventPage> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from >= to {
                return Err(LedgerError::InvalidFilter(format!(
                    "empty time range: {} >= {}",
                    from, to
                )));
            }
        }
        if filter.limit == Some(0) {
            return Err(LedgerError::InvalidFilter("limit must be positive".to_string()));
        }

        let Some(head) = self.store.tail()? else {
            return Ok(EventPage::default());
        };
        let snapshot = filter.through_id.map_or(head.id, |t| t.min(head.id));
        let limit = filter
            .limit
            .unwrap_or(self.config.max_page_size)
            .min(self.config.max_page_size);

        // One extra row tells us whether another page exists
        let mut events = self.store.query(filter, snapshot, limit + 1)?;
        let has_more = events.len() > limit;
        events.truncate(limit);

        Ok(EventPage {
            next_cursor: if has_more {
                events.last().map(|e| e.id)
            } else {
                None
            },
            events,
            snapshot_id: Some(snapshot),
        })
    }

    /// Verify linkage and hashes over `range`
    pub fn verify(&self, range: &VerifyRange, cancel: &CancelToken) -> LedgerResult<VerifyReport> {
        let report = verify::scan(
            self.store.as_ref(),
            range,
            self.config.verify_page_size,
            cancel,
        )?;

        if report.is_ok() {
            info!(
                events_checked = report.events_checked,
                head = ?report.checkpoint.as_ref().map(|cp| cp.id),
                "audit chain verified"
            );
        } else {
            error!(
                events_checked = report.events_checked,
                first_break_id = ?report.first_break_id,
                break_kind = ?report.break_kind,
                "audit chain integrity broken"
            );
        }
        Ok(report)
    }

    /// Current tail of the chain
    pub fn head(&self) -> LedgerResult<Option<Checkpoint>> {
        Ok(self.store.tail()?)
    }

    /// Number of committed events
    pub fn len(&self) -> LedgerResult<u64> {
        Ok(self.head()?.map_or(0, |cp| cp.id + 1))
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.head()?.is_none())
    }

    /// Write every event matching `filter` as JSON Lines, one event per line.
    ///
    /// Pages over a single snapshot; returns the number of lines written.
    pub fn export_jsonl<W: Write>(&self, filter: &EventFilter, writer: &mut W) -> LedgerResult<usize> {
        let mut filter = filter.clone();
        filter.limit = None;
        let mut written = 0;

        loop {
            let page = self.query(&filter)?;
            for event in &page.events {
                serde_json::to_writer(&mut *writer, event)?;
                writer.write_all(b"\n")?;
                written += 1;
            }
            match page.next_cursor {
                Some(cursor) => {
                    filter.after_id = Some(cursor);
                    filter.through_id = page.snapshot_id;
                }
                None => break,
            }
        }

        writer.flush()?;
        Ok(written)
    }
}
