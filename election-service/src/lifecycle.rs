//! Election lock and administrative lifecycle.
//!
//! An election becomes locked the first time it is opened, or whenever the
//! ledger reports it as scheduled. Once locked, its candidate list and
//! candidate profiles are frozen. The `opened_once` flag lives locally and is
//! never cleared, so closing an election does not unlock it.

use std::sync::Arc;

use alloy::primitives::TxHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::database::models::{CandidateProfileRecord, ElectionLockRecord};
use crate::database::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::{ElectionInfo, ElectionMode, LedgerGateway};
use crate::utils::{db_id, require_text};

#[derive(Debug, Clone, Serialize)]
pub struct CreatedElection {
    pub election_id: u64,
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElectionState {
    pub election_id: u64,
    pub opened_once: bool,
    pub opened_at: Option<DateTime<Utc>>,
    pub locked: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub tagline: Option<String>,
    pub about: Option<String>,
    pub vision: Option<String>,
    pub mission: Option<String>,
    pub programme: Option<String>,
    /// Left unchanged when absent
    pub photo_url: Option<String>,
}

#[derive(Clone)]
pub struct LifecycleManager {
    ledger: Arc<dyn LedgerGateway>,
    db: Database,
}

impl LifecycleManager {
    pub fn new(ledger: Arc<dyn LedgerGateway>, db: Database) -> Self {
        Self { ledger, db }
    }

    /// Locked if the election was ever opened, or the ledger reports it as
    /// scheduled. A failed ledger read counts as not scheduled.
    pub async fn is_locked(&self, election_id: u64) -> ServiceResult<bool> {
        let lock = ElectionLockRecord::get(self.db.pool(), db_id(election_id)?).await?;
        if lock.map(|l| l.opened_once).unwrap_or(false) {
            return Ok(true);
        }

        match self.ledger.election(election_id).await {
            Ok(election) => Ok(election.mode == ElectionMode::Scheduled),
            Err(e) => {
                warn!(
                    "Lock check for election {} could not read ledger mode, treating as unscheduled: {}",
                    election_id, e
                );
                Ok(false)
            }
        }
    }

    pub async fn mark_opened(&self, election_id: u64) -> ServiceResult<()> {
        ElectionLockRecord::mark_opened(self.db.pool(), db_id(election_id)?, Utc::now()).await?;
        Ok(())
    }

    pub async fn create_election(&self, title: &str) -> ServiceResult<CreatedElection> {
        let title = require_text("title", title)?;
        let (election_id, tx_hash) = self
            .ledger
            .create_election(&title)
            .await
            .map_err(ServiceError::from_write)?;
        info!("Created election {} '{}' in {}", election_id, title, tx_hash);
        Ok(CreatedElection {
            election_id,
            tx_hash,
        })
    }

    pub async fn open_election(&self, election_id: u64) -> ServiceResult<TxHash> {
        self.resolve(election_id).await?;
        let tx_hash = self
            .ledger
            .open_election(election_id)
            .await
            .map_err(ServiceError::from_write)?;
        self.mark_opened(election_id).await?;
        info!("Opened election {} in {}", election_id, tx_hash);
        Ok(tx_hash)
    }

    pub async fn close_election(&self, election_id: u64) -> ServiceResult<TxHash> {
        self.resolve(election_id).await?;
        let tx_hash = self
            .ledger
            .close_election(election_id)
            .await
            .map_err(ServiceError::from_write)?;
        info!("Closed election {} in {}", election_id, tx_hash);
        Ok(tx_hash)
    }

    /// Scheduled: write the window, then switch the mode. Manual: only an
    /// end time is meaningful, and is written so the reconciler can close
    /// the election; the mode is left as is.
    pub async fn set_schedule(
        &self,
        election_id: u64,
        mode: ElectionMode,
        start: Option<u64>,
        end: Option<u64>,
    ) -> ServiceResult<Vec<TxHash>> {
        let (start, end) = match (mode, start, end) {
            (ElectionMode::Scheduled, Some(start), Some(end)) if start < end => (start, end),
            (ElectionMode::Scheduled, Some(_), Some(_)) => {
                return Err(ServiceError::Validation(
                    "start time must be before end time".into(),
                ))
            }
            (ElectionMode::Scheduled, _, _) => {
                return Err(ServiceError::Validation(
                    "scheduled mode requires start and end times".into(),
                ))
            }
            (ElectionMode::Manual, _, None) => return Ok(Vec::new()),
            (ElectionMode::Manual, start, Some(end)) => (start.unwrap_or(0), end),
        };
        self.resolve(election_id).await?;

        let mut tx_hashes = vec![self
            .ledger
            .set_schedule(election_id, start, end)
            .await
            .map_err(ServiceError::from_write)?];
        if mode == ElectionMode::Scheduled {
            tx_hashes.push(
                self.ledger
                    .set_mode(election_id, ElectionMode::Scheduled)
                    .await
                    .map_err(ServiceError::from_write)?,
            );
        }

        info!(
            "Election {} schedule set to {:?} [{}, {}]",
            election_id, mode, start, end
        );
        Ok(tx_hashes)
    }

    pub async fn add_candidate(&self, election_id: u64, name: &str) -> ServiceResult<TxHash> {
        let name = require_text("name", name)?;
        self.resolve(election_id).await?;
        self.ensure_unlocked(election_id).await?;
        let tx_hash = self
            .ledger
            .add_candidate(election_id, &name)
            .await
            .map_err(ServiceError::from_write)?;
        info!("Added candidate '{}' to election {}", name, election_id);
        Ok(tx_hash)
    }

    pub async fn rename_candidate(
        &self,
        election_id: u64,
        candidate_id: u64,
        name: &str,
    ) -> ServiceResult<TxHash> {
        let name = require_text("name", name)?;
        self.resolve_candidate(election_id, candidate_id).await?;
        self.ensure_unlocked(election_id).await?;
        let tx_hash = self
            .ledger
            .rename_candidate(election_id, candidate_id, &name)
            .await
            .map_err(ServiceError::from_write)?;
        info!(
            "Renamed candidate {} of election {} to '{}'",
            candidate_id, election_id, name
        );
        Ok(tx_hash)
    }

    pub async fn hide_candidate(&self, election_id: u64, candidate_id: u64) -> ServiceResult<TxHash> {
        self.resolve_candidate(election_id, candidate_id).await?;
        self.ensure_unlocked(election_id).await?;
        let tx_hash = self
            .ledger
            .hide_candidate(election_id, candidate_id)
            .await
            .map_err(ServiceError::from_write)?;
        info!("Hid candidate {} of election {}", candidate_id, election_id);
        Ok(tx_hash)
    }

    pub async fn election_state(&self, election_id: u64) -> ServiceResult<ElectionState> {
        let lock = ElectionLockRecord::get(self.db.pool(), db_id(election_id)?).await?;
        let locked = self.is_locked(election_id).await?;
        Ok(ElectionState {
            election_id,
            opened_once: lock.as_ref().map(|l| l.opened_once).unwrap_or(false),
            opened_at: lock.and_then(|l| l.opened_at),
            locked,
        })
    }

    pub async fn candidate_profile(
        &self,
        election_id: u64,
        candidate_id: u64,
    ) -> ServiceResult<CandidateProfileRecord> {
        CandidateProfileRecord::get(self.db.pool(), db_id(election_id)?, db_id(candidate_id)?)
            .await?
            .ok_or(ServiceError::NotFound("candidate profile"))
    }

    pub async fn save_candidate_profile(
        &self,
        election_id: u64,
        candidate_id: u64,
        update: ProfileUpdate,
    ) -> ServiceResult<CandidateProfileRecord> {
        self.resolve_candidate(election_id, candidate_id).await?;
        self.ensure_unlocked(election_id).await?;

        let record = CandidateProfileRecord {
            election_id: db_id(election_id)?,
            candidate_id: db_id(candidate_id)?,
            tagline: update.tagline,
            about: update.about,
            vision: update.vision,
            mission: update.mission,
            programme: update.programme,
            photo_url: update.photo_url,
            updated_at: Some(Utc::now()),
        };
        record.upsert(self.db.pool()).await?;
        info!(
            "Saved profile of candidate {} in election {}",
            candidate_id, election_id
        );
        self.candidate_profile(election_id, candidate_id).await
    }

    async fn ensure_unlocked(&self, election_id: u64) -> ServiceResult<()> {
        if self.is_locked(election_id).await? {
            info!("Rejected candidate change on locked election {}", election_id);
            return Err(ServiceError::Locked);
        }
        Ok(())
    }

    async fn resolve(&self, election_id: u64) -> ServiceResult<ElectionInfo> {
        resolve_election(self.ledger.as_ref(), election_id).await
    }

    async fn resolve_candidate(&self, election_id: u64, candidate_id: u64) -> ServiceResult<()> {
        let election = self.resolve(election_id).await?;
        if candidate_id == 0 || candidate_id > election.candidate_count {
            return Err(ServiceError::CandidateNotFound);
        }
        Ok(())
    }
}

/// Look up an election, mapping ids outside `1..=count` to `ElectionNotFound`.
pub async fn resolve_election(
    ledger: &dyn LedgerGateway,
    election_id: u64,
) -> ServiceResult<ElectionInfo> {
    let count = ledger.election_count().await.map_err(ServiceError::from_read)?;
    if election_id == 0 || election_id > count {
        return Err(ServiceError::ElectionNotFound);
    }
    ledger
        .election(election_id)
        .await
        .map_err(ServiceError::from_read)
}
