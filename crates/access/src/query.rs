//! Scope enforcement for reads
//!
//! The scope predicate is written into the statement itself, so a caller can
//! only narrow what the scope allows. Caller-supplied identifiers are checked
//! against the resource whitelist; caller-supplied values are always bound
//! parameters.

use crate::error::{AccessError, AccessResult};
use crate::resource::Resource;
use crate::scope::DataScope;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Bound parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Text(String),
    Integer(i64),
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        QueryValue::Text(v.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(v: String) -> Self {
        QueryValue::Text(v)
    }
}

impl From<i64> for QueryValue {
    fn from(v: i64) -> Self {
        QueryValue::Integer(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    Asc,
    Desc,
}

/// Unscoped read request against one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceQuery {
    pub resource: Resource,
    /// Equality filters, ANDed
    pub filters: Vec<(String, QueryValue)>,
    pub order_by: Option<(String, Order)>,
    pub limit: Option<usize>,
}

impl ResourceQuery {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by = Some((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// SQL with the scope predicate applied, ready to prepare
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedQuery {
    pub resource: Resource,
    pub sql: String,
    pub params: Vec<QueryValue>,
    /// Result columns, in select order
    pub columns: &'static [&'static str],
}

/// Compose `scope` into `query`
pub fn apply_scope(scope: &DataScope, query: &ResourceQuery) -> AccessResult<ScopedQuery> {
    let resource = query.resource;
    let columns = resource.columns();
    let mut params = Vec::new();

    let mut sql = format!(
        "SELECT {} FROM {} WHERE {}",
        columns.join(", "),
        resource.table(),
        scope_predicate(scope, resource, &mut params)
    );

    for (column, value) in &query.filters {
        let column = checked_column(resource, column)?;
        // Infallible for String
        let _ = write!(sql, " AND {} = ?", column);
        params.push(value.clone());
    }

    match &query.order_by {
        Some((column, order)) => {
            let column = checked_column(resource, column)?;
            let direction = match order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            let _ = write!(sql, " ORDER BY {} {}", column, direction);
        }
        None => sql.push_str(" ORDER BY id ASC"),
    }

    if let Some(limit) = query.limit {
        if limit == 0 {
            return Err(AccessError::InvalidQuery {
                resource,
                reason: "limit must be positive".to_string(),
            });
        }
        sql.push_str(" LIMIT ?");
        params.push(QueryValue::Integer(limit.min(i64::MAX as usize) as i64));
    }

    Ok(ScopedQuery {
        resource,
        sql,
        params,
        columns,
    })
}

fn scope_predicate(scope: &DataScope, resource: Resource, params: &mut Vec<QueryValue>) -> String {
    let key = resource.application_key();

    if scope.own_data_only() {
        return match scope.scoped_user_id() {
            Some(user_id) => {
                params.push(user_id.into());
                format!(
                    "{} IN (SELECT application_id FROM application_borrowers WHERE borrower_user_id = ?)",
                    key
                )
            }
            None => "0 = 1".to_string(),
        };
    }

    if let Some(officer) = scope.assigned_to() {
        params.push(officer.into());
        return match resource {
            Resource::Applications => "assigned_to = ?".to_string(),
            _ => format!("{} IN (SELECT id FROM applications WHERE assigned_to = ?)", key),
        };
    }

    if scope.full_pipeline() {
        "1 = 1".to_string()
    } else {
        "0 = 1".to_string()
    }
}

fn checked_column(resource: Resource, column: &str) -> AccessResult<&'static str> {
    resource
        .columns()
        .iter()
        .copied()
        .find(|c| *c == column)
        .ok_or_else(|| AccessError::UnknownColumn {
            resource,
            column: column.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{resolve, resolve_claims};
    use rusqlite::{params_from_iter, Connection};
    use trustcore_core::{Identity, Role};

    fn scope(role: Role, user_id: &str) -> DataScope {
        resolve(&Identity::new(user_id, role, "x@example.com", "X").unwrap())
    }

    /// Three applications: app-1 (alice, lo-1), app-2 (bob, lo-2), app-3 (alice + bob, lo-1)
    fn fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE applications (id TEXT PRIMARY KEY, status TEXT, loan_amount INTEGER,
                 property_address TEXT, assigned_to TEXT, ssn TEXT, date_of_birth TEXT, created_at TEXT);
             CREATE TABLE application_borrowers (application_id TEXT, borrower_user_id TEXT);
             CREATE TABLE documents (id TEXT PRIMARY KEY, application_id TEXT, doc_type TEXT,
                 file_name TEXT, status TEXT, uploaded_at TEXT);
             INSERT INTO applications (id, status, assigned_to) VALUES
                 ('app-1', 'open', 'lo-1'), ('app-2', 'open', 'lo-2'), ('app-3', 'closed', 'lo-1');
             INSERT INTO application_borrowers VALUES
                 ('app-1', 'alice'), ('app-2', 'bob'), ('app-3', 'alice'), ('app-3', 'bob');
             INSERT INTO documents (id, application_id, doc_type, status) VALUES
                 ('d-1', 'app-1', 'w2', 'pending'), ('d-2', 'app-2', 'w2', 'pending'),
                 ('d-3', 'app-3', 'paystub', 'accepted');",
        )
        .unwrap();
        conn
    }

    fn ids(conn: &Connection, scoped: &ScopedQuery) -> Vec<String> {
        let params: Vec<rusqlite::types::Value> = scoped
            .params
            .iter()
            .map(|p| match p {
                QueryValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
                QueryValue::Integer(i) => rusqlite::types::Value::Integer(*i),
            })
            .collect();
        let mut stmt = conn.prepare(&scoped.sql).unwrap();
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))
            .unwrap();
        rows.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_borrower_sees_only_linked_applications() {
        let conn = fixture();
        let query = ResourceQuery::new(Resource::Applications);

        let alice = apply_scope(&scope(Role::Borrower, "alice"), &query).unwrap();
        assert_eq!(ids(&conn, &alice), vec!["app-1", "app-3"]);

        let bob = apply_scope(&scope(Role::Borrower, "bob"), &query).unwrap();
        assert_eq!(ids(&conn, &bob), vec!["app-2", "app-3"]);

        let stranger = apply_scope(&scope(Role::Borrower, "mallory"), &query).unwrap();
        assert!(ids(&conn, &stranger).is_empty());
    }

    #[test]
    fn test_borrower_scope_reaches_child_resources() {
        let conn = fixture();
        let query = ResourceQuery::new(Resource::Documents).filter("doc_type", "w2");
        let scoped = apply_scope(&scope(Role::Borrower, "bob"), &query).unwrap();
        assert_eq!(ids(&conn, &scoped), vec!["d-2"]);
    }

    #[test]
    fn test_prospect_gets_empty_set() {
        let conn = fixture();
        let scoped = apply_scope(&scope(Role::Prospect, "p-1"), &ResourceQuery::new(Resource::Applications)).unwrap();
        assert!(scoped.sql.contains("0 = 1"));
        assert!(ids(&conn, &scoped).is_empty());
    }

    #[test]
    fn test_loan_officer_sees_assigned_pipeline() {
        let conn = fixture();
        let scoped = apply_scope(&scope(Role::LoanOfficer, "lo-1"), &ResourceQuery::new(Resource::Applications)).unwrap();
        assert_eq!(ids(&conn, &scoped), vec!["app-1", "app-3"]);

        let docs = apply_scope(&scope(Role::LoanOfficer, "lo-2"), &ResourceQuery::new(Resource::Documents)).unwrap();
        assert_eq!(ids(&conn, &docs), vec!["d-2"]);
    }

    #[test]
    fn test_full_pipeline_roles_see_everything() {
        let conn = fixture();
        for role in [Role::Underwriter, Role::Admin, Role::Ceo] {
            let scoped = apply_scope(&scope(role, "any"), &ResourceQuery::new(Resource::Applications)).unwrap();
            assert_eq!(ids(&conn, &scoped), vec!["app-1", "app-2", "app-3"]);
        }
    }

    #[test]
    fn test_filters_only_narrow() {
        let conn = fixture();
        // A filter naming someone else's application cannot widen the borrower scope
        let query = ResourceQuery::new(Resource::Applications).filter("id", "app-2");
        let scoped = apply_scope(&scope(Role::Borrower, "alice"), &query).unwrap();
        assert!(ids(&conn, &scoped).is_empty());
    }

    #[test]
    fn test_order_and_limit() {
        let conn = fixture();
        let query = ResourceQuery::new(Resource::Applications)
            .order_by("id", Order::Desc)
            .limit(2);
        let scoped = apply_scope(&resolve_claims("admin", "a").unwrap(), &query).unwrap();
        assert_eq!(ids(&conn, &scoped), vec!["app-3", "app-2"]);
    }

    #[test]
    fn test_unknown_column_rejected() {
        let admin = resolve_claims("admin", "a").unwrap();
        let query = ResourceQuery::new(Resource::Applications).filter("id = id OR 1", "x");
        let err = apply_scope(&admin, &query).unwrap_err();
        assert!(matches!(err, AccessError::UnknownColumn { .. }));

        let query = ResourceQuery::new(Resource::Documents).order_by("ssn", Order::Asc);
        assert!(matches!(
            apply_scope(&admin, &query),
            Err(AccessError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let admin = resolve_claims("admin", "a").unwrap();
        let query = ResourceQuery::new(Resource::Conditions).limit(0);
        assert!(matches!(
            apply_scope(&admin, &query),
            Err(AccessError::InvalidQuery { .. })
        ));
    }
}
