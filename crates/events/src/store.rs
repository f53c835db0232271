//! SQLite storage for the audit chain
//!
//! One row per event in `audit_events`, keyed by the chain id. The relation is
//! append-only three times over: the grant profiles of both credential pools
//! deny UPDATE/DELETE, triggers abort them for any other connection, and this
//! type exposes no way to issue them.

use crate::error::EventError;
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use trustcore_ledger::hash::{canonical_json, canonical_timestamp};
use trustcore_ledger::{
    check_timestamp, AuditEvent, Checkpoint, EventFilter, EventStore, StoreError, StoreResult,
};

/// Name of the audit relation in the `main` database
pub const AUDIT_EVENTS_TABLE: &str = "audit_events";

const AUDIT_EVENTS_DDL: &str = "
    CREATE TABLE IF NOT EXISTS audit_events (
        id INTEGER PRIMARY KEY,
        timestamp TEXT NOT NULL,
        prev_hash TEXT NOT NULL,
        hash TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        actor_role TEXT NOT NULL,
        event_type TEXT NOT NULL,
        subject_application_id TEXT,
        subject_decision_id TEXT,
        session_id TEXT,
        payload TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_events_session
        ON audit_events(session_id);

    CREATE INDEX IF NOT EXISTS idx_audit_events_application
        ON audit_events(subject_application_id);

    CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp
        ON audit_events(timestamp);

    CREATE TRIGGER IF NOT EXISTS audit_events_no_update
    BEFORE UPDATE ON audit_events
    BEGIN
        SELECT RAISE(ABORT, 'audit_events is append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS audit_events_no_delete
    BEFORE DELETE ON audit_events
    BEGIN
        SELECT RAISE(ABORT, 'audit_events is append-only');
    END;
";

const SELECT_COLUMNS: &str = "id, timestamp, prev_hash, hash, actor_id, actor_role, event_type, \
     subject_application_id, subject_decision_id, session_id, payload";

/// Create the audit relation. Needs a connection allowed to run DDL.
pub fn init_schema(conn: &Connection) -> Result<(), EventError> {
    conn.execute_batch(AUDIT_EVENTS_DDL)?;
    Ok(())
}

/// SQLite-backed [`EventStore`]
///
/// Appends go through the writer connection inside `BEGIN IMMEDIATE`; reads use
/// a second connection so, in WAL mode, scans and queries never wait on an
/// append in progress.
pub struct SqliteEventStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Open (and create if needed) a standalone audit database
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, EventError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = open_connection(path, busy_timeout)?;
        init_schema(&writer)?;
        let reader = open_connection(path, busy_timeout)?;
        debug!(path = %path.display(), "audit store opened");

        Ok(Self::from_connections(writer, reader))
    }

    /// Wrap connections prepared elsewhere, e.g. bound to a credential pool.
    ///
    /// The schema must already exist.
    pub fn from_connections(writer: Connection, reader: Connection) -> Self {
        Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        }
    }

    fn reader(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite itself consistent
        self.reader.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fetch(&self, sql: &str, args: Vec<SqlValue>) -> Result<Vec<AuditEvent>, EventError> {
        let conn = self.reader();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), StoredRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(StoredRow::into_event).collect()
    }
}

/// Last stored event's `(id, hash)`.
///
/// Selects named columns on purpose: an aggregate such as `MAX(id)` reaches a
/// connection's authorizer as a whole-table read with no database name.
pub fn read_tail(conn: &Connection) -> Result<Option<Checkpoint>, EventError> {
    let tail = conn
        .query_row(
            "SELECT id, hash FROM audit_events ORDER BY id DESC LIMIT 1",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    Ok(tail.map(|(id, hash)| Checkpoint {
        id: id as u64,
        hash,
    }))
}

/// Insert a sealed event on `conn`, typically inside a caller's transaction.
///
/// No tail check happens here; callers hold the write lock and sealed the
/// event against a tail read in the same transaction.
pub fn insert_event(conn: &Connection, event: &AuditEvent) -> Result<(), EventError> {
    check_timestamp(&event.timestamp).map_err(|e| EventError::InvalidTimestamp(e.to_string()))?;
    let id = to_sql_id(event.id)?;

    conn.execute(
        "INSERT INTO audit_events
         (id, timestamp, prev_hash, hash, actor_id, actor_role, event_type,
          subject_application_id, subject_decision_id, session_id, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            canonical_timestamp(&event.timestamp),
            event.prev_hash,
            event.hash,
            event.actor_id,
            event.actor_role,
            event.event_type,
            event.subject_application_id,
            event.subject_decision_id,
            event.session_id,
            canonical_json(&event.payload),
        ],
    )?;
    Ok(())
}

/// Open a file connection in WAL mode with a busy timeout
pub fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection, EventError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    Ok(conn)
}

impl EventStore for SqliteEventStore {
    fn tail(&self) -> StoreResult<Option<Checkpoint>> {
        read_tail(&self.reader()).map_err(backend)
    }

    fn append(&self, expected_tail: Option<u64>, event: &AuditEvent) -> StoreResult<()> {
        let mut conn = self.writer();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(backend)?;

        let actual = read_tail(&tx).map_err(backend)?.map(|cp| cp.id);
        if actual != expected_tail {
            // Dropping `tx` rolls back
            return Err(StoreError::Conflict {
                expected: expected_tail,
                actual,
            });
        }

        match insert_event(&tx, event) {
            Ok(()) => tx.commit().map_err(backend),
            Err(EventError::Database(rusqlite::Error::SqliteFailure(err, _)))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict {
                    expected: expected_tail,
                    actual: Some(event.id),
                })
            }
            Err(other) => Err(backend(other)),
        }
    }

    fn scan(
        &self,
        after_id: Option<u64>,
        through_id: u64,
        limit: usize,
    ) -> StoreResult<Vec<AuditEvent>> {
        let after = match after_id {
            Some(id) => to_sql_id(id).map_err(backend)?,
            None => -1,
        };
        let through = to_sql_id(through_id).map_err(backend)?;

        self.fetch(
            &format!(
                "SELECT {} FROM audit_events WHERE id > ? AND id <= ? ORDER BY id ASC LIMIT ?",
                SELECT_COLUMNS
            ),
            vec![
                SqlValue::Integer(after),
                SqlValue::Integer(through),
                SqlValue::Integer(limit as i64),
            ],
        )
        .map_err(backend)
    }

    fn query(
        &self,
        filter: &EventFilter,
        through_id: u64,
        limit: usize,
    ) -> StoreResult<Vec<AuditEvent>> {
        let mut sql = format!("SELECT {} FROM audit_events WHERE id <= ?", SELECT_COLUMNS);
        let mut args = vec![SqlValue::Integer(to_sql_id(through_id).map_err(backend)?)];

        if let Some(after) = filter.after_id {
            sql.push_str(" AND id > ?");
            args.push(SqlValue::Integer(to_sql_id(after).map_err(backend)?));
        }

        let text_filters = [
            ("session_id", &filter.session_id),
            ("subject_application_id", &filter.subject_application_id),
            ("subject_decision_id", &filter.subject_decision_id),
            ("event_type", &filter.event_type),
        ];
        for (column, value) in text_filters {
            if let Some(value) = value {
                sql.push_str(&format!(" AND {} = ?", column));
                args.push(SqlValue::Text(value.clone()));
            }
        }

        // Stored timestamps are fixed-width UTC text, so text order is time order
        if let Some(from) = filter.from {
            sql.push_str(" AND timestamp >= ?");
            args.push(SqlValue::Text(canonical_timestamp(&ceil_micros(from))));
        }
        if let Some(to) = filter.to {
            sql.push_str(" AND timestamp < ?");
            args.push(SqlValue::Text(canonical_timestamp(&ceil_micros(to))));
        }

        sql.push_str(" ORDER BY id ASC LIMIT ?");
        args.push(SqlValue::Integer(limit.min(i64::MAX as usize) as i64));

        self.fetch(&sql, args).map_err(backend)
    }
}

/// Raw column values of one stored event
struct StoredRow {
    id: i64,
    timestamp: String,
    prev_hash: String,
    hash: String,
    actor_id: String,
    actor_role: String,
    event_type: String,
    subject_application_id: Option<String>,
    subject_decision_id: Option<String>,
    session_id: Option<String>,
    payload: String,
}

impl StoredRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            prev_hash: row.get(2)?,
            hash: row.get(3)?,
            actor_id: row.get(4)?,
            actor_role: row.get(5)?,
            event_type: row.get(6)?,
            subject_application_id: row.get(7)?,
            subject_decision_id: row.get(8)?,
            session_id: row.get(9)?,
            payload: row.get(10)?,
        })
    }

    fn into_event(self) -> Result<AuditEvent, EventError> {
        let id = self.id;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| EventError::InvalidRow {
                id,
                reason: format!("timestamp: {}", e),
            })?
            .with_timezone(&Utc);
        let payload = serde_json::from_str(&self.payload).map_err(|e| EventError::InvalidRow {
            id,
            reason: format!("payload: {}", e),
        })?;
        if id < 0 {
            return Err(EventError::InvalidRow {
                id,
                reason: "negative id".to_string(),
            });
        }

        Ok(AuditEvent {
            id: id as u64,
            timestamp,
            prev_hash: self.prev_hash,
            hash: self.hash,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            event_type: self.event_type,
            subject_application_id: self.subject_application_id,
            subject_decision_id: self.subject_decision_id,
            session_id: self.session_id,
            payload,
        })
    }
}

fn to_sql_id(id: u64) -> Result<i64, EventError> {
    i64::try_from(id).map_err(|_| EventError::IdOutOfRange(id))
}

/// Smallest microsecond instant not before `ts`
fn ceil_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = ts.trunc_subsecs(6);
    if truncated < ts {
        truncated + chrono::Duration::microseconds(1)
    } else {
        truncated
    }
}

fn backend<E: Into<EventError>>(err: E) -> StoreError {
    StoreError::backend(err.into())
}
