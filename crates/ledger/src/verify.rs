//! Chain verification
//!
//! Full and incremental runs share [`scan`]: the only difference is where the
//! walk starts and which hash the first event must link to.

use crate::error::{LedgerError, LedgerResult};
use crate::event::AuditEvent;
use crate::hash::{calculate_event_hash, GENESIS_HASH};
use crate::store::{Checkpoint, EventStore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation signal for long-running scans
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a new non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Which part of the chain a verification covers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRange {
    /// Start after this trusted position; `None` starts at genesis
    pub after: Option<Checkpoint>,
    /// Stop after this id; `None` stops at the head captured at start
    pub through: Option<u64>,
}

impl VerifyRange {
    /// Whole chain, genesis to head
    pub fn full() -> Self {
        Self::default()
    }

    /// Only events after a checkpoint from an earlier run
    pub fn after(checkpoint: Checkpoint) -> Self {
        Self {
            after: Some(checkpoint),
            through: None,
        }
    }

    pub fn through(mut self, id: u64) -> Self {
        self.through = Some(id);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Ok,
    Broken,
}

/// What was wrong at the first break
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakKind {
    /// The slot held a different id (missing or renumbered event)
    IdGap { found: u64 },
    /// `prev_hash` does not equal the previous event's stored hash
    BrokenLink { expected: String, actual: String },
    /// Stored hash does not match the recomputed one
    HashMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub status: ChainStatus,
    /// Events scanned, including the broken one
    pub events_checked: u64,
    pub first_break_id: Option<u64>,
    pub break_kind: Option<BreakKind>,
    /// Last event that verified; resume point for the next incremental run
    pub checkpoint: Option<Checkpoint>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.status == ChainStatus::Ok
    }
}

/// Check one event against the position it should occupy
pub fn check_event(event: &AuditEvent, expected_id: u64, prev_hash: &str) -> Option<BreakKind> {
    if event.id != expected_id {
        return Some(BreakKind::IdGap { found: event.id });
    }
    if event.prev_hash != prev_hash {
        return Some(BreakKind::BrokenLink {
            expected: prev_hash.to_string(),
            actual: event.prev_hash.clone(),
        });
    }
    let calculated = calculate_event_hash(event);
    if event.hash != calculated {
        return Some(BreakKind::HashMismatch {
            expected: calculated,
            actual: event.hash.clone(),
        });
    }
    None
}

/// Walk `range` page by page up to the head captured at call time.
///
/// Read-only; checks `cancel` between pages.
pub fn scan(
    store: &dyn EventStore,
    range: &VerifyRange,
    page_size: usize,
    cancel: &CancelToken,
) -> LedgerResult<VerifyReport> {
    let head = store.tail()?;

    let (mut expected_id, mut prev_hash) = match &range.after {
        Some(cp) => {
            if head.as_ref().map_or(true, |h| cp.id > h.id) {
                return Err(LedgerError::CheckpointAhead(cp.id));
            }
            (cp.id + 1, cp.hash.clone())
        }
        None => (0, GENESIS_HASH.to_string()),
    };
    let mut checkpoint = range.after.clone();
    let mut events_checked = 0u64;

    let Some(head) = head else {
        return Ok(ok_report(0, None));
    };
    let through = range.through.map_or(head.id, |t| t.min(head.id));
    let mut after = range.after.as_ref().map(|cp| cp.id);

    while expected_id <= through {
        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled {
                events_checked,
                resume_from: checkpoint,
            });
        }

        let page = store.scan(after, through, page_size.max(1))?;
        let Some(last) = page.last() else {
            // Head said the slot exists but nothing came back
            return Ok(VerifyReport {
                status: ChainStatus::Broken,
                events_checked,
                first_break_id: Some(expected_id),
                break_kind: Some(BreakKind::IdGap { found: through }),
                checkpoint,
            });
        };
        after = Some(last.id);

        for event in &page {
            events_checked += 1;
            if let Some(kind) = check_event(event, expected_id, &prev_hash) {
                return Ok(VerifyReport {
                    status: ChainStatus::Broken,
                    events_checked,
                    first_break_id: Some(expected_id),
                    break_kind: Some(kind),
                    checkpoint,
                });
            }
            prev_hash = event.hash.clone();
            expected_id += 1;
            checkpoint = Some(Checkpoint::of(event));
        }
    }

    Ok(ok_report(events_checked, checkpoint))
}

fn ok_report(events_checked: u64, checkpoint: Option<Checkpoint>) -> VerifyReport {
    VerifyReport {
        status: ChainStatus::Ok,
        events_checked,
        first_break_id: None,
        break_kind: None,
        checkpoint,
    }
}
