//! Regulated-partition repository: applicant demographics
//!
//! Demographic data must stay out of lending decisions, so it lives in its own
//! database file that only the compliance pool can write.

use crate::database::Database;
use crate::error::{PartitionError, PartitionResult};
use crate::grant::PoolKind;
use crate::lending::{new_id, stamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// How the demographic answers were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CollectionMethod {
    SelfReported,
    VisualObservation,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDemographics {
    pub application_id: String,
    pub race: Option<String>,
    pub ethnicity: Option<String>,
    pub sex: Option<String>,
    pub collection_method: CollectionMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    pub id: String,
    pub application_id: String,
    pub race: Option<String>,
    pub ethnicity: Option<String>,
    pub sex: Option<String>,
    pub collection_method: CollectionMethod,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

/// Insert one demographics submission; returns its id
pub fn insert_demographics(conn: &Connection, data: &NewDemographics, recorded_by: &str) -> rusqlite::Result<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO regulated.demographics
         (id, application_id, race, ethnicity, sex, collection_method, recorded_by, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            data.application_id,
            data.race,
            data.ethnicity,
            data.sex,
            data.collection_method.to_string(),
            recorded_by,
            stamp(Utc::now()),
        ],
    )?;
    Ok(id)
}

impl<P: PoolKind> Database<P> {
    /// Store one demographics submission; returns its id
    pub fn record_demographics(&self, data: &NewDemographics, recorded_by: &str) -> PartitionResult<String> {
        self.with_conn(|conn| insert_demographics(conn, data, recorded_by))
    }

    /// All submissions for an application, oldest first
    pub fn demographics_for_application(&self, application_id: &str) -> PartitionResult<Vec<Demographics>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, application_id, race, ethnicity, sex, collection_method, recorded_by, recorded_at
                 FROM regulated.demographics
                 WHERE application_id = ?1
                 ORDER BY recorded_at ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![application_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;

        rows.into_iter()
            .map(|(id, application_id, race, ethnicity, sex, method, recorded_by, recorded_at)| {
                let collection_method = method
                    .parse()
                    .map_err(|_| PartitionError::InvalidRecord(format!("demographics {}: method {}", id, method)))?;
                let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
                    .map_err(|e| PartitionError::InvalidRecord(format!("demographics {}: {}", id, e)))?
                    .with_timezone(&Utc);
                Ok(Demographics {
                    id,
                    application_id,
                    race,
                    ethnicity,
                    sex,
                    collection_method,
                    recorded_by,
                    recorded_at,
                })
            })
            .collect()
    }
}
