//! Application context - wires everything together

use crate::error::{ContextError, ContextResult};
use crate::service::{ComplianceService, LendingService};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use trustcore_core::TrustConfig;
use trustcore_ledger::{
    AuditEvent, CancelToken, EventDraft, EventFilter, EventPage, HashChain, LedgerResult, VerifyRange,
    VerifyReport,
};
use trustcore_partition::{Compliance, Database, Primary, Schema};

/// Application context - one chain engine, one service per credential pool
pub struct AppContext {
    config: TrustConfig,
    chain: Arc<HashChain>,
    lending: LendingService,
    compliance: ComplianceService,
}

impl AppContext {
    /// Migrate the schema and open both pools
    pub fn open(config: TrustConfig) -> ContextResult<Self> {
        config.validate()?;
        Schema::migrate(&config)?;

        let lending_db = Database::<Primary>::open(&config)?;
        let compliance_db = Database::<Compliance>::open(&config)?;

        // Audit appends from both services share one engine and its ordering lock
        let chain = Arc::new(HashChain::new(Arc::new(lending_db.audit_store()?), &config));

        info!(
            database = %config.database_path.display(),
            head = ?chain.head()?.map(|cp| cp.id),
            "trustcore context ready"
        );

        Ok(Self {
            lending: LendingService::new(lending_db, chain.clone()),
            compliance: ComplianceService::new(compliance_db, chain.clone()),
            chain,
            config,
        })
    }

    /// Default layout under a data directory
    pub fn in_dir(dir: impl AsRef<Path>) -> ContextResult<Self> {
        Self::open(TrustConfig::in_dir(dir))
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<HashChain> {
        &self.chain
    }

    pub fn lending(&self) -> &LendingService {
        &self.lending
    }

    pub fn compliance(&self) -> &ComplianceService {
        &self.compliance
    }

    pub fn append(&self, draft: EventDraft) -> ContextResult<AuditEvent> {
        Ok(self.chain.append(draft)?)
    }

    pub fn query(&self, filter: &EventFilter) -> ContextResult<EventPage> {
        Ok(self.chain.query(filter)?)
    }

    pub fn verify(&self, range: &VerifyRange) -> ContextResult<VerifyReport> {
        Ok(self.chain.verify(range, &CancelToken::new())?)
    }

    /// Run a verification on the blocking pool.
    ///
    /// Cancel through the returned token; the task then resolves to
    /// `LedgerError::Cancelled` carrying the resume checkpoint. Must be called
    /// from within a tokio runtime.
    pub fn spawn_verify(&self, range: VerifyRange) -> (JoinHandle<LedgerResult<VerifyReport>>, CancelToken) {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let chain = self.chain.clone();

        let handle = tokio::task::spawn_blocking(move || chain.verify(&range, &token));
        (handle, cancel)
    }

    /// Await a spawned verification
    pub async fn join_verify(handle: JoinHandle<LedgerResult<VerifyReport>>) -> ContextResult<VerifyReport> {
        let report = handle
            .await
            .map_err(|e| ContextError::Task(e.to_string()))??;
        Ok(report)
    }
}
