//! Audit events
//!
//! An [`EventDraft`] is what a business operation hands to the chain. The chain
//! seals it into an [`AuditEvent`] by assigning `id`, `prev_hash` and `hash`.
//! Sealed events are never mutated.

use crate::error::{LedgerError, LedgerResult};
use crate::hash::{calculate_event_hash, GENESIS_HASH};
use crate::store::Checkpoint;
use chrono::{DateTime, Datelike, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trustcore_core::Identity;

/// Well-known `event_type` tags written by TrustCore itself.
///
/// `event_type` is an open string; callers are free to use their own tags.
pub mod event_types {
    /// A statement was rejected by a credential pool's grant profile
    pub const PERMISSION_DENIED: &str = "permission_denied";
    /// A masked response could not be produced
    pub const MASKING_FAILURE: &str = "masking_failure";
    /// Demographic data was written to the regulated partition
    pub const DEMOGRAPHICS_RECORDED: &str = "demographics_recorded";
    /// Demographic data was read from the regulated partition
    pub const DEMOGRAPHICS_ACCESSED: &str = "demographics_accessed";
    /// A chain verification run reported a break
    pub const CHAIN_BROKEN: &str = "chain_broken";
    pub const APPLICATION_CREATED: &str = "application_created";
    pub const BORROWER_LINKED: &str = "borrower_linked";
    pub const APPLICATION_ASSIGNED: &str = "application_assigned";
}

/// A committed audit event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the chain, starting at 0, gapless
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    /// Hash of event `id - 1`, or [`GENESIS_HASH`](crate::GENESIS_HASH) for id 0
    pub prev_hash: String,
    /// SHA-256 (hex) over every other field, see [`crate::hash`]
    pub hash: String,
    pub actor_id: String,
    pub actor_role: String,
    pub event_type: String,
    pub subject_application_id: Option<String>,
    pub subject_decision_id: Option<String>,
    pub session_id: Option<String>,
    /// Opaque to the ledger
    pub payload: Value,
}

impl AuditEvent {
    /// Seal a draft at a chain position
    pub(crate) fn seal(id: u64, prev_hash: String, draft: &EventDraft) -> Self {
        let mut event = AuditEvent {
            id,
            timestamp: draft.timestamp,
            prev_hash,
            hash: String::new(),
            actor_id: draft.actor_id.clone(),
            actor_role: draft.actor_role.clone(),
            event_type: draft.event_type.clone(),
            subject_application_id: draft.subject_application_id.clone(),
            subject_decision_id: draft.subject_decision_id.clone(),
            session_id: draft.session_id.clone(),
            payload: draft.payload.clone(),
        };
        event.hash = calculate_event_hash(&event);
        event
    }

    /// Seal a draft as the successor of `tail` (`None` for an empty chain)
    pub fn after(tail: Option<&Checkpoint>, draft: &EventDraft) -> LedgerResult<Self> {
        check_timestamp(&draft.timestamp)?;
        let (id, prev_hash) = match tail {
            Some(cp) => (
                cp.id.checked_add(1).ok_or(LedgerError::SequenceExhausted)?,
                cp.hash.clone(),
            ),
            None => (0, GENESIS_HASH.to_string()),
        };
        Ok(Self::seal(id, prev_hash, draft))
    }

    /// Whether the stored hash matches the stored fields
    pub fn hash_is_valid(&self) -> bool {
        calculate_event_hash(self) == self.hash
    }
}

/// Timestamps must render as four-digit-year RFC 3339, or the stored row
/// could never be parsed back and verified.
pub fn check_timestamp(ts: &DateTime<Utc>) -> LedgerResult<()> {
    if (0..=9999).contains(&ts.year()) {
        Ok(())
    } else {
        Err(LedgerError::InvalidTimestamp(ts.to_string()))
    }
}

/// Everything about an event except its chain position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub actor_role: String,
    pub event_type: String,
    pub subject_application_id: Option<String>,
    pub subject_decision_id: Option<String>,
    pub session_id: Option<String>,
    pub payload: Value,
}

impl EventDraft {
    /// New draft stamped with the current time
    pub fn new(
        actor_id: impl Into<String>,
        actor_role: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now().trunc_subsecs(6),
            actor_id: actor_id.into(),
            actor_role: actor_role.into(),
            event_type: event_type.into(),
            subject_application_id: None,
            subject_decision_id: None,
            session_id: None,
            payload: Value::Null,
        }
    }

    /// Draft attributed to a request identity
    pub fn by(identity: &Identity, event_type: impl Into<String>) -> Self {
        Self::new(identity.user_id(), identity.role().as_str(), event_type)
    }

    /// Override the timestamp. Precision beyond microseconds is dropped.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(6);
        self
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

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GENESIS_HASH;
    use chrono::TimeZone;
    use serde_json::json;
    use trustcore_core::Role;

    #[test]
    fn test_draft_builder() {
        let draft = EventDraft::new("u-1", "underwriter", "decision_made")
            .session("sess-1")
            .application("app-9")
            .decision("dec-3")
            .payload(json!({ "outcome": "approved" }));

        assert_eq!(draft.session_id.as_deref(), Some("sess-1"));
        assert_eq!(draft.subject_application_id.as_deref(), Some("app-9"));
        assert_eq!(draft.subject_decision_id.as_deref(), Some("dec-3"));
        assert_eq!(draft.payload["outcome"], "approved");
    }

    #[test]
    fn test_draft_by_identity() {
        let identity = Identity::new("lo-4", Role::LoanOfficer, "lo@example.com", "Lo").unwrap();
        let draft = EventDraft::by(&identity, "application_viewed");
        assert_eq!(draft.actor_id, "lo-4");
        assert_eq!(draft.actor_role, "loan_officer");
    }

    #[test]
    fn test_timestamp_truncated_to_micros() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let draft = EventDraft::new("u", "admin", "x").at(ts);
        assert_eq!(draft.timestamp.timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn test_seal_computes_valid_hash() {
        let draft = EventDraft::new("u-1", "admin", "config_changed");
        let event = AuditEvent::seal(0, GENESIS_HASH.to_string(), &draft);

        assert_eq!(event.id, 0);
        assert_eq!(event.hash.len(), 64);
        assert!(event.hash_is_valid());

        let mut tampered = event.clone();
        tampered.actor_id = "u-2".to_string();
        assert!(!tampered.hash_is_valid());
    }

    #[test]
    fn test_after_links_to_tail() {
        let draft = EventDraft::new("u-1", "admin", "x");
        let first = AuditEvent::after(None, &draft).unwrap();
        assert_eq!(first.id, 0);
        assert_eq!(first.prev_hash, GENESIS_HASH);

        let second = AuditEvent::after(Some(&Checkpoint::of(&first)), &draft).unwrap();
        assert_eq!(second.id, 1);
        assert_eq!(second.prev_hash, first.hash);
    }

    #[test]
    fn test_out_of_range_year_rejected() {
        for year in [-1, 10_000] {
            let ts = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap();
            let draft = EventDraft::new("u", "admin", "x").at(ts);
            assert!(matches!(
                AuditEvent::after(None, &draft),
                Err(LedgerError::InvalidTimestamp(_))
            ));
        }

        let edge = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        assert!(check_timestamp(&edge).is_ok());
    }

    #[test]
    fn test_event_serde_roundtrip() {
        let draft = EventDraft::new("u-1", "admin", "x").payload(json!([1, 2, 3]));
        let event = AuditEvent::seal(5, "ab".repeat(32), &draft);

        let json = serde_json::to_string(&event).unwrap();
        let parsed: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
        assert!(parsed.hash_is_valid());
    }
}
