//! Pool-bound database handle
//!
//! `Database<Primary>` and `Database<Compliance>` are different types: a
//! service holds exactly one of them and has no way to reach the other pool's
//! grants at runtime.

use crate::error::{PartitionError, PartitionResult};
use crate::grant::{install, CredentialPool, Denial, DenialSlot, PoolKind};
use crate::schema::open_attached;
use rusqlite::types::{Type, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, Params, TransactionBehavior};
use serde_json::{Number, Value};
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use trustcore_access::{apply_scope, DataScope, QueryValue, Record, ResourceQuery};
use trustcore_core::TrustConfig;
use trustcore_events::{insert_event, read_tail, EventError, SqliteEventStore};
use trustcore_ledger::{AuditEvent, EventDraft};

pub struct Database<P: PoolKind> {
    config: TrustConfig,
    conn: Mutex<Connection>,
    denials: DenialSlot,
    _pool: PhantomData<P>,
}

impl<P: PoolKind> Database<P> {
    /// Open a connection bound to pool `P`. The schema must already exist.
    pub fn open(config: &TrustConfig) -> PartitionResult<Self> {
        let (conn, denials) = connect::<P>(config)?;
        debug!(pool = %P::POOL, "pool connection opened");

        Ok(Self {
            config: config.clone(),
            conn: Mutex::new(conn),
            denials,
            _pool: PhantomData,
        })
    }

    pub fn pool(&self) -> CredentialPool {
        P::POOL
    }

    /// Audit store whose connections carry this pool's grants
    pub fn audit_store(&self) -> PartitionResult<SqliteEventStore> {
        let (writer, _) = connect::<P>(&self.config)?;
        let (reader, _) = connect::<P>(&self.config)?;
        Ok(SqliteEventStore::from_connections(writer, reader))
    }

    /// Run `f` on the pool connection; grant rejections become
    /// [`PartitionError::PermissionDenied`]
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> PartitionResult<T> {
        let conn = self.lock();
        self.denials.take();
        f(&conn).map_err(|e| self.map_error(e))
    }

    /// Run `write`, then append the audit event `describe` builds from its
    /// result, in one transaction.
    ///
    /// The event is sealed against the tail read inside the same `IMMEDIATE`
    /// transaction, so it cannot lose a race to another writer. If the write,
    /// the seal or the insert fails, neither the data change nor the event is
    /// kept.
    pub fn write_audited<T>(
        &self,
        write: impl FnOnce(&Connection) -> rusqlite::Result<T>,
        describe: impl FnOnce(&T) -> EventDraft,
    ) -> PartitionResult<(T, AuditEvent)> {
        let mut conn = self.lock();
        self.denials.take();

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| self.map_error(e))?;
        let value = write(&tx).map_err(|e| self.map_error(e))?;

        let tail = read_tail(&tx).map_err(|e| self.map_event_error(e))?;
        let event = AuditEvent::after(tail.as_ref(), &describe(&value))?;
        insert_event(&tx, &event).map_err(|e| self.map_event_error(e))?;
        tx.commit().map_err(|e| self.map_error(e))?;

        debug!(
            pool = %P::POOL,
            id = event.id,
            event_type = %event.event_type,
            "write committed with audit event"
        );
        Ok((value, event))
    }

    /// Execute one statement under this pool's grants
    pub fn execute(&self, sql: &str, params: impl Params) -> PartitionResult<usize> {
        self.with_conn(|conn| conn.execute(sql, params))
    }

    /// Rows of `query.resource` visible under `scope`, unmasked
    pub fn fetch(&self, scope: &DataScope, query: &ResourceQuery) -> PartitionResult<Vec<Record>> {
        let scoped = apply_scope(scope, query)?;
        let params: Vec<SqlValue> = scoped.params.iter().map(to_sql_value).collect();

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&scoped.sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
                to_record(row, scoped.columns)
            })?;
            rows.collect()
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn map_error(&self, err: rusqlite::Error) -> PartitionError {
        if err.sqlite_error_code() != Some(ErrorCode::AuthorizationForStatementDenied) {
            return PartitionError::Database(err);
        }

        let pool = P::POOL;
        let denied = match self.denials.take() {
            Some(Denial::Data {
                partition,
                operation,
            }) => PartitionError::PermissionDenied {
                pool,
                partition,
                operation,
            },
            Some(Denial::Statement(action)) => PartitionError::StatementDenied { pool, action },
            None => PartitionError::StatementDenied {
                pool,
                action: err.to_string(),
            },
        };

        warn!(target: "security", %pool, error = %denied, "statement rejected by grant profile");
        denied
    }

    fn map_event_error(&self, err: EventError) -> PartitionError {
        match err {
            EventError::Database(e) => self.map_error(e),
            other => PartitionError::Events(other),
        }
    }
}

fn connect<P: PoolKind>(config: &TrustConfig) -> PartitionResult<(Connection, DenialSlot)> {
    let conn = open_attached(config)?;
    let slot = install(&conn, P::POOL);
    Ok((conn, slot))
}

fn to_sql_value(value: &QueryValue) -> SqlValue {
    match value {
        QueryValue::Text(s) => SqlValue::Text(s.clone()),
        QueryValue::Integer(i) => SqlValue::Integer(*i),
    }
}

fn to_record(row: &rusqlite::Row<'_>, columns: &[&str]) -> rusqlite::Result<Record> {
    let mut record = Record::new();
    for (idx, column) in columns.iter().enumerate() {
        let value = match row.get_ref(idx)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::from(i),
            ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(_) => {
                return Err(rusqlite::Error::InvalidColumnType(
                    idx,
                    column.to_string(),
                    Type::Blob,
                ))
            }
        };
        record.insert(column.to_string(), value);
    }
    Ok(record)
}
