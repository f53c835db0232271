//! Pool-bound services
//!
//! Each service owns one `Database<P>`; the pool is part of the service's type.
//! Data writes commit in the same transaction as their audit event. Every
//! grant rejection and every masking failure is appended to the audit chain
//! before the error is handed back to the caller.

use crate::error::{ContextError, ContextResult};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use trustcore_access::{mask_all, resolve, DataScope, Record, ResourceQuery};
use trustcore_core::{Identity, Role};
use trustcore_ledger::{event_types, AuditEvent, EventDraft, HashChain};
use trustcore_partition::{
    insert_application, insert_borrower_link, insert_demographics, update_assignment, Compliance, CredentialPool,
    Database, Demographics, NewApplication, NewDemographics, PartitionResult, PoolKind, Primary,
};

pub struct Service<P: PoolKind> {
    db: Database<P>,
    chain: Arc<HashChain>,
}

/// Lending data, primary pool
pub type LendingService = Service<Primary>;

/// Regulated demographics, compliance pool
pub type ComplianceService = Service<Compliance>;

impl<P: PoolKind> Service<P> {
    pub fn new(db: Database<P>, chain: Arc<HashChain>) -> Self {
        Self { db, chain }
    }

    pub fn pool(&self) -> CredentialPool {
        P::POOL
    }

    pub fn database(&self) -> &Database<P> {
        &self.db
    }

    /// Run a partition operation; grant rejections are audited, then returned
    pub fn guarded<T>(
        &self,
        identity: &Identity,
        action: &'static str,
        op: impl FnOnce(&Database<P>) -> PartitionResult<T>,
    ) -> ContextResult<T> {
        match op(&self.db) {
            Ok(value) => Ok(value),
            Err(err) if err.is_permission_denied() => {
                self.audit_denial(identity, action, &err.to_string())?;
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Scoped read of one resource, masked for the caller's scope.
    ///
    /// Fails as a whole if any row cannot be masked.
    pub fn read(&self, identity: &Identity, query: &ResourceQuery) -> ContextResult<Vec<Record>> {
        let scope = resolve(identity);
        let rows = self.guarded(identity, "read", |db| db.fetch(&scope, query))?;

        match mask_all(&scope, query.resource, rows) {
            Ok(rows) => Ok(rows),
            Err(err) => {
                self.chain.append(
                    EventDraft::by(identity, event_types::MASKING_FAILURE).payload(json!({
                        "resource": query.resource.to_string(),
                        "reason": err.to_string(),
                    })),
                )?;
                Err(err.into())
            }
        }
    }

    fn audit_denial(&self, identity: &Identity, action: &str, reason: &str) -> ContextResult<AuditEvent> {
        warn!(
            target: "security",
            pool = %P::POOL,
            actor_id = identity.user_id(),
            action,
            reason,
            "access denied"
        );
        let event = self.chain.append(
            EventDraft::by(identity, event_types::PERMISSION_DENIED).payload(json!({
                "pool": P::POOL.to_string(),
                "action": action,
                "reason": reason,
            })),
        )?;
        Ok(event)
    }

    /// Role check outside the grant layer; denials are audited the same way
    fn require(&self, identity: &Identity, action: &'static str, allowed: bool) -> ContextResult<()> {
        if allowed {
            return Ok(());
        }
        let err = ContextError::Forbidden {
            role: identity.role(),
            action,
        };
        self.audit_denial(identity, action, &err.to_string())?;
        Err(err)
    }
}

fn manages_pipeline(scope: &DataScope) -> bool {
    scope.full_pipeline() && !scope.pii_mask()
}

impl Service<Primary> {
    pub fn create_application(&self, identity: &Identity, app: &NewApplication) -> ContextResult<AuditEvent> {
        self.require(identity, "create application", manages_pipeline(&resolve(identity)))?;
        let ((), event) = self.guarded(identity, "create application", |db| {
            db.write_audited(
                |conn| insert_application(conn, app),
                |_| {
                    EventDraft::by(identity, event_types::APPLICATION_CREATED)
                        .application(&app.id)
                        .payload(json!({ "status": app.status }))
                },
            )
        })?;
        Ok(event)
    }

    pub fn link_borrower(
        &self,
        identity: &Identity,
        application_id: &str,
        borrower_user_id: &str,
    ) -> ContextResult<AuditEvent> {
        self.require(identity, "link borrower", manages_pipeline(&resolve(identity)))?;
        let ((), event) = self.guarded(identity, "link borrower", |db| {
            db.write_audited(
                |conn| insert_borrower_link(conn, application_id, borrower_user_id),
                |_| {
                    EventDraft::by(identity, event_types::BORROWER_LINKED)
                        .application(application_id)
                        .payload(json!({ "borrower_user_id": borrower_user_id }))
                },
            )
        })?;
        Ok(event)
    }

    /// Returns `false` when the application does not exist; nothing is audited then
    pub fn assign_application(
        &self,
        identity: &Identity,
        application_id: &str,
        officer_id: &str,
    ) -> ContextResult<bool> {
        self.require(identity, "assign application", manages_pipeline(&resolve(identity)))?;
        self.guarded(identity, "assign application", |db| {
            let assigned = db.write_audited(
                |conn| update_assignment(conn, application_id, officer_id),
                |_| {
                    EventDraft::by(identity, event_types::APPLICATION_ASSIGNED)
                        .application(application_id)
                        .payload(json!({ "assigned_to": officer_id }))
                },
            );
            match assigned {
                Ok(_) => Ok(true),
                Err(err) if err.is_missing_row() => Ok(false),
                Err(err) => Err(err),
            }
        })
    }
}

impl Service<Compliance> {
    /// Store a demographics submission. The audit event carries no demographic values.
    pub fn record_demographics(&self, identity: &Identity, data: &NewDemographics) -> ContextResult<String> {
        self.require(
            identity,
            "record demographics",
            identity.role() != Role::Prospect,
        )?;
        let (id, _) = self.guarded(identity, "record demographics", |db| {
            db.write_audited(
                |conn| insert_demographics(conn, data, identity.user_id()),
                |id| {
                    EventDraft::by(identity, event_types::DEMOGRAPHICS_RECORDED)
                        .application(&data.application_id)
                        .payload(json!({
                            "record_id": id,
                            "collection_method": data.collection_method.to_string(),
                        }))
                },
            )
        })?;
        Ok(id)
    }

    /// Demographics for one application; administrators only
    pub fn demographics_for_application(
        &self,
        identity: &Identity,
        application_id: &str,
    ) -> ContextResult<Vec<Demographics>> {
        self.require(identity, "read demographics", identity.role() == Role::Admin)?;
        let rows = self.guarded(identity, "read demographics", |db| {
            db.demographics_for_application(application_id)
        })?;

        self.chain.append(
            EventDraft::by(identity, event_types::DEMOGRAPHICS_ACCESSED)
                .application(application_id)
                .payload(json!({ "records": rows.len() })),
        )?;
        Ok(rows)
    }
}
