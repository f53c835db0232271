//! Schema creation and connection layout
//!
//! Pool connections cannot run DDL, so tables are created once through an
//! owner connection with no authorizer. Every connection, owner or pool, sees
//! the same layout: the general partition and the audit relation in `main`,
//! the regulated partition attached as `regulated`.

use crate::error::PartitionResult;
use crate::grant::REGULATED_DB;
use rusqlite::{Connection, DatabaseName};
use std::path::Path;
use tracing::info;
use trustcore_core::TrustConfig;
use trustcore_events::{init_schema, open_connection};

const GENERAL_DDL: &str = "
    CREATE TABLE IF NOT EXISTS applications (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        loan_amount INTEGER,
        property_address TEXT,
        assigned_to TEXT,
        ssn TEXT,
        date_of_birth TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_applications_assigned_to
        ON applications(assigned_to);

    CREATE TABLE IF NOT EXISTS application_borrowers (
        application_id TEXT NOT NULL,
        borrower_user_id TEXT NOT NULL,
        PRIMARY KEY (application_id, borrower_user_id)
    );

    CREATE INDEX IF NOT EXISTS idx_application_borrowers_user
        ON application_borrowers(borrower_user_id);

    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        application_id TEXT NOT NULL,
        doc_type TEXT NOT NULL,
        file_name TEXT,
        status TEXT NOT NULL,
        uploaded_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS financials (
        id TEXT PRIMARY KEY,
        application_id TEXT NOT NULL,
        institution TEXT NOT NULL,
        account_type TEXT NOT NULL,
        account_number TEXT NOT NULL,
        balance INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS conditions (
        id TEXT PRIMARY KEY,
        application_id TEXT NOT NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL,
        cleared_at TEXT
    );

    CREATE TABLE IF NOT EXISTS rate_locks (
        id TEXT PRIMARY KEY,
        application_id TEXT NOT NULL,
        rate REAL NOT NULL,
        locked_at TEXT NOT NULL,
        expires_at TEXT NOT NULL
    );
";

const REGULATED_DDL: &str = "
    CREATE TABLE IF NOT EXISTS regulated.demographics (
        id TEXT PRIMARY KEY,
        application_id TEXT NOT NULL,
        race TEXT,
        ethnicity TEXT,
        sex TEXT,
        collection_method TEXT NOT NULL,
        recorded_by TEXT NOT NULL,
        recorded_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS regulated.idx_demographics_application
        ON demographics(application_id);
";

/// Owner-level schema management
pub struct Schema;

impl Schema {
    /// Create every table the pools use. Idempotent.
    pub fn migrate(config: &TrustConfig) -> PartitionResult<()> {
        let conn = open_attached(config)?;
        conn.execute_batch(GENERAL_DDL)?;
        init_schema(&conn)?;
        conn.execute_batch(REGULATED_DDL)?;

        info!(
            main = %config.database_path.display(),
            regulated = %config.regulated_database_path.display(),
            "schema migrated"
        );
        Ok(())
    }
}

/// Open `main` and attach the regulated database, both in WAL mode
pub(crate) fn open_attached(config: &TrustConfig) -> PartitionResult<Connection> {
    ensure_parent(&config.database_path)?;
    ensure_parent(&config.regulated_database_path)?;

    let conn = open_connection(&config.database_path, config.busy_timeout())?;
    conn.execute(
        "ATTACH DATABASE ?1 AS regulated",
        [config.regulated_database_path.to_string_lossy().into_owned()],
    )?;
    conn.pragma_update_and_check(
        Some(DatabaseName::Attached(REGULATED_DB)),
        "journal_mode",
        "WAL",
        |row| row.get::<_, String>(0),
    )?;
    Ok(conn)
}

fn ensure_parent(path: &Path) -> PartitionResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tables(conn: &Connection, db: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT name FROM {}.sqlite_master WHERE type = 'table' ORDER BY name",
                db
            ))
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_migrate_creates_both_partitions() {
        let dir = tempdir().unwrap();
        let config = TrustConfig::in_dir(dir.path());
        Schema::migrate(&config).unwrap();
        // Second run is a no-op
        Schema::migrate(&config).unwrap();

        let conn = open_attached(&config).unwrap();
        let main = tables(&conn, "main");
        for table in ["applications", "application_borrowers", "audit_events", "documents", "financials"] {
            assert!(main.contains(&table.to_string()), "{}", table);
        }
        assert!(!main.contains(&"demographics".to_string()));
        assert_eq!(tables(&conn, "regulated"), vec!["demographics".to_string()]);
        assert!(config.regulated_database_path.exists());
    }
}
