//! Shared application state

use std::sync::Arc;

use crate::database::Database;
use crate::ledger::LedgerGateway;
use crate::lifecycle::LifecycleManager;
use crate::monitor::LedgerMonitor;
use crate::relay::VoteRelay;
use crate::results::ResultPipeline;
use crate::signing::VoteSigner;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: LifecycleManager,
    pub relay: VoteRelay,
    pub results: ResultPipeline,
    pub monitor: LedgerMonitor,
    /// Admin routes answer 401 while this is unset
    pub admin_token: Option<Arc<str>>,
    pub db_path: Arc<str>,
}

impl AppState {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        db: Database,
        signer: Option<Arc<VoteSigner>>,
        admin_token: Option<String>,
        db_path: &str,
    ) -> Self {
        let signer_address = signer.as_ref().map(|s| s.address());
        Self {
            lifecycle: LifecycleManager::new(ledger.clone(), db.clone()),
            relay: VoteRelay::new(ledger.clone(), db.clone(), signer),
            results: ResultPipeline::new(ledger.clone(), db),
            monitor: LedgerMonitor::new(ledger, signer_address),
            admin_token: admin_token.map(Arc::from),
            db_path: Arc::from(db_path),
        }
    }
}
