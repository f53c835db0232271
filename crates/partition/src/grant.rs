//! Credential pools and their grant profiles
//!
//! | pool | general | audit | regulated |
//! |---|---|---|---|
//! | primary | read, insert, update, delete | read, insert | read |
//! | compliance | read | read, insert | read, insert, update, delete |
//!
//! Profiles are enforced by an SQLite authorizer installed on every pool
//! connection, so a denied statement never reaches the table regardless of
//! what the calling code checked. Anything the table does not name (DDL,
//! ATTACH, PRAGMA, unknown databases, `sqlite_*` tables) is denied.

use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use trustcore_events::AUDIT_EVENTS_TABLE;

/// Attached database name of the regulated partition
pub const REGULATED_DB: &str = "regulated";

/// Database name SQLite uses for the primary file
pub const MAIN_DB: &str = "main";

/// Tables created in the regulated database
pub const REGULATED_TABLES: &[&str] = &["demographics"];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Lending data in `main`
    General,
    /// `main.audit_events`
    Audit,
    /// Everything in the attached `regulated` database
    Regulated,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Insert,
    Update,
    Delete,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CredentialPool {
    /// Lending services
    Primary,
    /// Regulated-data services
    Compliance,
}

impl CredentialPool {
    /// Grant profile lookup
    pub fn allows(&self, partition: Partition, operation: Operation) -> bool {
        use Operation::*;
        use Partition::*;

        match (self, partition, operation) {
            // Audit is append-only for everyone
            (_, Audit, Read | Insert) => true,
            (_, Audit, Update | Delete) => false,

            (CredentialPool::Primary, General, _) => true,
            (CredentialPool::Primary, Regulated, Read) => true,
            (CredentialPool::Primary, Regulated, _) => false,

            (CredentialPool::Compliance, Regulated, _) => true,
            (CredentialPool::Compliance, General, Read) => true,
            (CredentialPool::Compliance, General, _) => false,
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Type-level credential pool, fixed when a service is constructed
pub trait PoolKind: sealed::Sealed + Send + Sync + 'static {
    const POOL: CredentialPool;
}

/// Pool for lending services
#[derive(Debug, Clone, Copy)]
pub struct Primary;

/// Pool for regulated-data services
#[derive(Debug, Clone, Copy)]
pub struct Compliance;

impl sealed::Sealed for Primary {}
impl sealed::Sealed for Compliance {}

impl PoolKind for Primary {
    const POOL: CredentialPool = CredentialPool::Primary;
}

impl PoolKind for Compliance {
    const POOL: CredentialPool = CredentialPool::Compliance;
}

/// Partition a table belongs to; `None` for anything unrecognised
pub fn classify(database: Option<&str>, table: &str) -> Option<Partition> {
    if table.starts_with("sqlite_") {
        return None;
    }
    match database {
        Some(REGULATED_DB) => Some(Partition::Regulated),
        Some(MAIN_DB) if table == AUDIT_EVENTS_TABLE => Some(Partition::Audit),
        Some(MAIN_DB) => Some(Partition::General),
        _ => None,
    }
}

/// Partition of a table SQLite named without its database.
///
/// Whole-table reads (`MAX(id)`, `count(*)`, rowid-only scans) reach the
/// authorizer with an empty column and no database name. Pools cannot create
/// tables, so the name alone identifies the partition.
pub fn classify_unqualified(table: &str) -> Option<Partition> {
    if table.starts_with("sqlite_") {
        None
    } else if table == AUDIT_EVENTS_TABLE {
        Some(Partition::Audit)
    } else if REGULATED_TABLES.contains(&table) {
        Some(Partition::Regulated)
    } else {
        Some(Partition::General)
    }
}

/// What the authorizer refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    Data {
        partition: Partition,
        operation: Operation,
    },
    Statement(String),
}

/// Grant decision for one authorizer callback
pub fn decide(pool: CredentialPool, action: &AuthAction<'_>, database: Option<&str>) -> Result<(), Denial> {
    let (table, operation) = match action {
        AuthAction::Read { table_name, .. } => (*table_name, Operation::Read),
        AuthAction::Insert { table_name } => (*table_name, Operation::Insert),
        AuthAction::Update { table_name, .. } => (*table_name, Operation::Update),
        AuthAction::Delete { table_name } => (*table_name, Operation::Delete),
        AuthAction::Select
        | AuthAction::Transaction { .. }
        | AuthAction::Savepoint { .. }
        | AuthAction::Function { .. }
        | AuthAction::Recursive => return Ok(()),
        other => return Err(Denial::Statement(format!("{:?}", other))),
    };

    let partition = match (database, action) {
        (None, AuthAction::Read { column_name: "", .. }) => classify_unqualified(table),
        _ => classify(database, table),
    };
    let Some(partition) = partition else {
        return Err(Denial::Statement(format!(
            "{} on {}.{}",
            operation,
            database.unwrap_or("?"),
            table
        )));
    };

    if pool.allows(partition, operation) {
        Ok(())
    } else {
        Err(Denial::Data {
            partition,
            operation,
        })
    }
}

/// First denial on one connection since the slot was last taken
#[derive(Debug, Clone, Default)]
pub struct DenialSlot(Arc<Mutex<Option<Denial>>>);

impl DenialSlot {
    fn record(&self, denial: Denial) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_or_insert(denial);
    }

    pub fn take(&self) -> Option<Denial> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

/// Bind `conn` to `pool`'s grant profile. Irreversible for this connection
/// short of installing another authorizer, which pool code never does.
pub fn install(conn: &Connection, pool: CredentialPool) -> DenialSlot {
    let slot = DenialSlot::default();
    let recorder = slot.clone();

    conn.authorizer(Some(move |ctx: AuthContext<'_>| {
        match decide(pool, &ctx.action, ctx.database_name) {
            Ok(()) => Authorization::Allow,
            Err(denial) => {
                recorder.record(denial);
                Authorization::Deny
            }
        }
    }));

    slot
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_grant_table() {
        use Operation::*;
        use Partition::*;

        let (primary, compliance) = (CredentialPool::Primary, CredentialPool::Compliance);
        let expected = [
            (primary, General, vec![Read, Insert, Update, Delete]),
            (primary, Audit, vec![Read, Insert]),
            (primary, Regulated, vec![Read]),
            (compliance, General, vec![Read]),
            (compliance, Audit, vec![Read, Insert]),
            (compliance, Regulated, vec![Read, Insert, Update, Delete]),
        ];

        for (pool, partition, granted) in expected {
            for op in Operation::iter() {
                assert_eq!(
                    pool.allows(partition, op),
                    granted.contains(&op),
                    "{} {} {}",
                    pool,
                    op,
                    partition
                );
            }
        }
    }

    #[test]
    fn test_no_pool_may_rewrite_audit() {
        for pool in CredentialPool::iter() {
            assert!(!pool.allows(Partition::Audit, Operation::Update));
            assert!(!pool.allows(Partition::Audit, Operation::Delete));
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(Some("main"), "applications"), Some(Partition::General));
        assert_eq!(classify(Some("main"), "audit_events"), Some(Partition::Audit));
        assert_eq!(classify(Some("regulated"), "demographics"), Some(Partition::Regulated));
        assert_eq!(classify(Some("temp"), "scratch"), None);
        assert_eq!(classify(None, "applications"), None);
        assert_eq!(classify(Some("main"), "sqlite_master"), None);
    }

    #[test]
    fn test_whole_table_reads_follow_the_grant_table() {
        let whole_table = |table_name| AuthAction::Read {
            table_name,
            column_name: "",
        };

        for pool in CredentialPool::iter() {
            assert_eq!(decide(pool, &whole_table("audit_events"), None), Ok(()));
            assert_eq!(decide(pool, &whole_table("applications"), None), Ok(()));
            assert_eq!(decide(pool, &whole_table("demographics"), None), Ok(()));
            assert!(matches!(
                decide(pool, &whole_table("sqlite_master"), None),
                Err(Denial::Statement(_))
            ));
        }

        // A named column without a database is still refused
        let named = AuthAction::Read {
            table_name: "audit_events",
            column_name: "hash",
        };
        assert!(decide(CredentialPool::Primary, &named, None).is_err());

        assert_eq!(classify_unqualified("demographics"), Some(Partition::Regulated));
        assert_eq!(classify_unqualified("audit_events"), Some(Partition::Audit));
    }

    #[test]
    fn test_audit_writes_denied_to_both_pools() {
        let update = AuthAction::Update {
            table_name: "audit_events",
            column_name: "payload",
        };
        for pool in CredentialPool::iter() {
            assert_eq!(
                decide(pool, &update, Some(MAIN_DB)),
                Err(Denial::Data {
                    partition: Partition::Audit,
                    operation: Operation::Update,
                })
            );
        }
    }

    #[test]
    fn test_pool_markers() {
        assert_eq!(<Primary as PoolKind>::POOL, CredentialPool::Primary);
        assert_eq!(<Compliance as PoolKind>::POOL, CredentialPool::Compliance);
    }
}
