//! Auto-close reconciler.
//!
//! Manual elections stay open on the ledger until someone closes them. This
//! loop closes every open manual election whose end time has passed. It is
//! single-flight: a tick that finds the previous one still running does
//! nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::ledger::{ElectionMode, LedgerError, LedgerGateway};
use crate::metrics;
use crate::utils::now_unix;

pub const DEFAULT_INTERVAL_MS: u64 = 10_000;
pub const MIN_INTERVAL_MS: u64 = 2_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub scanned: u64,
    pub closed: Vec<u64>,
    pub failed: Vec<(u64, String)>,
    /// Another tick held the flag
    pub skipped: bool,
}

pub struct AutoCloseReconciler {
    ledger: Arc<dyn LedgerGateway>,
    running: AtomicBool,
}

/// Releases the running flag on every exit path, including panics.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AutoCloseReconciler {
    pub fn new(ledger: Arc<dyn LedgerGateway>) -> Self {
        Self {
            ledger,
            running: AtomicBool::new(false),
        }
    }

    /// One scan over every election. Per-election close failures are
    /// recorded in the report; a failed read aborts the scan.
    pub async fn tick(&self, now: u64) -> Result<TickReport, LedgerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Auto-close tick skipped, previous tick still running");
            return Ok(TickReport {
                skipped: true,
                ..Default::default()
            });
        }
        let _guard = RunningGuard(&self.running);

        let count = self.ledger.election_count().await?;
        let mut report = TickReport {
            scanned: count,
            ..Default::default()
        };

        for election_id in 1..=count {
            let election = self.ledger.election(election_id).await?;
            if !election.is_open || election.mode != ElectionMode::Manual || election.end_time == 0
            {
                continue;
            }
            if election.end_time >= now {
                continue;
            }

            match self.ledger.close_election(election_id).await {
                Ok(tx_hash) => {
                    info!(
                        "Auto-closed election {} (ended {}) in {}",
                        election_id, election.end_time, tx_hash
                    );
                    report.closed.push(election_id);
                }
                Err(e) => {
                    warn!("Auto-close of election {} failed: {}", election_id, e);
                    report.failed.push((election_id, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Tick every `interval` until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let interval = interval.max(Duration::from_millis(MIN_INTERVAL_MS));
        info!("Auto-close reconciler running every {:?}", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            match self.tick(now_unix()).await {
                Ok(report) => {
                    if !report.closed.is_empty() || !report.failed.is_empty() {
                        info!(
                            "Auto-close tick: scanned={} closed={:?} failed={}",
                            report.scanned,
                            report.closed,
                            report.failed.len()
                        );
                    }
                    metrics::record_tick(&report);
                }
                Err(e) => {
                    warn!("Auto-close tick aborted: {}", e);
                    metrics::record_tick_aborted();
                }
            }
        }

        info!("Auto-close reconciler stopped");
    }
}
