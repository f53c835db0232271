//! General-partition repository: applications and their child records
//!
//! Writes run under the caller's pool; only the primary pool's grants permit
//! them. Reads go through [`Database::fetch`] with a scope.

use crate::database::Database;
use crate::error::PartitionResult;
use crate::grant::PoolKind;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub id: String,
    pub status: String,
    pub loan_amount: Option<i64>,
    pub property_address: Option<String>,
    pub assigned_to: Option<String>,
    pub ssn: Option<String>,
    pub date_of_birth: Option<String>,
}

impl NewApplication {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: "draft".to_string(),
            loan_amount: None,
            property_address: None,
            assigned_to: None,
            ssn: None,
            date_of_birth: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub application_id: String,
    pub doc_type: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFinancial {
    pub application_id: String,
    pub institution: String,
    pub account_type: String,
    pub account_number: String,
    /// Minor units
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRateLock {
    pub application_id: String,
    pub rate: f64,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Insert one application row
pub fn insert_application(conn: &Connection, app: &NewApplication) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO applications
         (id, status, loan_amount, property_address, assigned_to, ssn, date_of_birth, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            app.id,
            app.status,
            app.loan_amount,
            app.property_address,
            app.assigned_to,
            app.ssn,
            app.date_of_birth,
            stamp(Utc::now()),
        ],
    )?;
    Ok(())
}

/// Make `borrower_user_id` an owner of the application
pub fn insert_borrower_link(conn: &Connection, application_id: &str, borrower_user_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO application_borrowers (application_id, borrower_user_id)
         VALUES (?1, ?2)",
        params![application_id, borrower_user_id],
    )?;
    Ok(())
}

/// Hand the application to a loan officer.
///
/// Fails with `QueryReturnedNoRows` when the application does not exist, so an
/// enclosing transaction rolls back.
pub fn update_assignment(conn: &Connection, application_id: &str, officer_id: &str) -> rusqlite::Result<()> {
    let updated = conn.execute(
        "UPDATE applications SET assigned_to = ?1 WHERE id = ?2",
        params![officer_id, application_id],
    )?;
    if updated == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }
    Ok(())
}

impl<P: PoolKind> Database<P> {
    pub fn create_application(&self, app: &NewApplication) -> PartitionResult<()> {
        self.with_conn(|conn| insert_application(conn, app))
    }

    pub fn link_borrower(&self, application_id: &str, borrower_user_id: &str) -> PartitionResult<()> {
        self.with_conn(|conn| insert_borrower_link(conn, application_id, borrower_user_id))
    }

    /// Returns whether the application existed
    pub fn assign_application(&self, application_id: &str, officer_id: &str) -> PartitionResult<bool> {
        match self.with_conn(|conn| update_assignment(conn, application_id, officer_id)) {
            Ok(()) => Ok(true),
            Err(err) if err.is_missing_row() => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn add_document(&self, doc: &NewDocument) -> PartitionResult<String> {
        let id = new_id();
        self.execute(
            "INSERT INTO documents (id, application_id, doc_type, file_name, status, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            params![id, doc.application_id, doc.doc_type, doc.file_name, stamp(Utc::now())],
        )?;
        Ok(id)
    }

    pub fn add_financial(&self, fin: &NewFinancial) -> PartitionResult<String> {
        let id = new_id();
        self.execute(
            "INSERT INTO financials (id, application_id, institution, account_type, account_number, balance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, fin.application_id, fin.institution, fin.account_type, fin.account_number, fin.balance],
        )?;
        Ok(id)
    }

    pub fn add_condition(&self, application_id: &str, description: &str) -> PartitionResult<String> {
        let id = new_id();
        self.execute(
            "INSERT INTO conditions (id, application_id, description, status)
             VALUES (?1, ?2, ?3, 'open')",
            params![id, application_id, description],
        )?;
        Ok(id)
    }

    /// Returns whether an open condition was cleared
    pub fn clear_condition(&self, condition_id: &str) -> PartitionResult<bool> {
        let updated = self.execute(
            "UPDATE conditions SET status = 'cleared', cleared_at = ?1
             WHERE id = ?2 AND status = 'open'",
            params![stamp(Utc::now()), condition_id],
        )?;
        Ok(updated > 0)
    }

    pub fn lock_rate(&self, lock: &NewRateLock) -> PartitionResult<String> {
        let id = new_id();
        self.execute(
            "INSERT INTO rate_locks (id, application_id, rate, locked_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                lock.application_id,
                lock.rate,
                stamp(lock.locked_at),
                stamp(lock.expires_at),
            ],
        )?;
        Ok(id)
    }
}

pub(crate) fn stamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
