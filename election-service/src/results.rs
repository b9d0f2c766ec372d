//! Result snapshots: finalize freezes the live ledger tally locally, publish
//! makes it public. Published snapshots are never rewritten, so later ledger
//! changes cannot alter a published result.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::types::Json;
use tracing::info;

use crate::database::models::ResultSnapshotRecord;
use crate::database::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::{read_tally, CandidateInfo, ElectionMode, ElectionTally, LedgerGateway};
use crate::utils::db_id;

/// Snapshot as served to readers
#[derive(Debug, Clone, Serialize)]
pub struct ElectionResult {
    pub election_id: u64,
    pub title: String,
    pub total_votes: u64,
    pub candidates: Vec<CandidateInfo>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub snapshot_at: DateTime<Utc>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
}

impl From<ResultSnapshotRecord> for ElectionResult {
    fn from(record: ResultSnapshotRecord) -> Self {
        let tally = record.results.0;
        Self {
            election_id: tally.election_id,
            title: record.title,
            total_votes: tally.total_votes,
            candidates: tally.candidates,
            start_time: record.start_time,
            end_time: record.end_time,
            snapshot_at: record.snapshot_at,
            published: record.published,
            published_at: record.published_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateProgress {
    pub id: u64,
    pub vote_count: u64,
}

/// Public turnout of a scheduled election inside its voting window
#[derive(Debug, Clone, Serialize)]
pub struct ElectionProgress {
    pub election_id: u64,
    pub title: String,
    pub start_time: u64,
    pub end_time: u64,
    pub total_votes: u64,
    /// Active candidates only; names stay off the public view
    pub candidates: Vec<CandidateProgress>,
}

#[derive(Clone)]
pub struct ResultPipeline {
    ledger: Arc<dyn LedgerGateway>,
    db: Database,
}

impl ResultPipeline {
    pub fn new(ledger: Arc<dyn LedgerGateway>, db: Database) -> Self {
        Self { ledger, db }
    }

    /// Read the live tally and store it as an unpublished snapshot.
    /// Repeatable until the result is published.
    pub async fn finalize(&self, election_id: u64) -> ServiceResult<ElectionResult> {
        let key = db_id(election_id)?;
        if let Some(existing) = ResultSnapshotRecord::get(self.db.pool(), key).await? {
            if existing.published {
                return Err(ServiceError::AlreadyPublished);
            }
        }

        let tally = self.live_tally(election_id).await?;
        let record = ResultSnapshotRecord {
            election_id: key,
            title: tally.title.clone(),
            total_votes: i64::try_from(tally.total_votes)
                .map_err(|_| ServiceError::Internal("vote total overflow".into()))?,
            start_time: unix_to_datetime(tally.start_time),
            end_time: unix_to_datetime(tally.end_time),
            results: Json(tally),
            snapshot_at: Utc::now(),
            published: false,
            published_at: None,
        };

        // Publish may have landed while the ledger was being read
        if !record.upsert_unpublished(self.db.pool()).await? {
            return Err(ServiceError::AlreadyPublished);
        }
        info!(
            "Finalized election {} with {} votes",
            election_id, record.total_votes
        );
        Ok(record.into())
    }

    /// Flip the published latch. Publishing twice is a no-op.
    pub async fn publish(&self, election_id: u64) -> ServiceResult<ElectionResult> {
        let key = db_id(election_id)?;
        let flipped = ResultSnapshotRecord::publish(self.db.pool(), key, Utc::now()).await?;
        let record = ResultSnapshotRecord::get(self.db.pool(), key)
            .await?
            .ok_or(ServiceError::NotFinalized)?;
        if flipped {
            info!("Published result of election {}", election_id);
        }
        Ok(record.into())
    }

    pub async fn get_published_result(&self, election_id: u64) -> ServiceResult<ElectionResult> {
        ResultSnapshotRecord::get_published(self.db.pool(), db_id(election_id)?)
            .await?
            .map(ElectionResult::from)
            .ok_or(ServiceError::NotFound("published result"))
    }

    pub async fn list_published_results(&self) -> ServiceResult<Vec<ElectionResult>> {
        Ok(ResultSnapshotRecord::list_published(self.db.pool())
            .await?
            .into_iter()
            .map(ElectionResult::from)
            .collect())
    }

    /// Admin view of the snapshot, published or not.
    pub async fn get_result(&self, election_id: u64) -> ServiceResult<ElectionResult> {
        ResultSnapshotRecord::get(self.db.pool(), db_id(election_id)?)
            .await?
            .map(ElectionResult::from)
            .ok_or(ServiceError::NotFinalized)
    }

    /// Live counts for elections that are open, scheduled and within their
    /// window at `now`. Read from the ledger, never from snapshots.
    pub async fn live_progress(&self, now: u64) -> ServiceResult<Vec<ElectionProgress>> {
        let count = self
            .ledger
            .election_count()
            .await
            .map_err(ServiceError::from_read)?;

        let mut items = Vec::new();
        for election_id in 1..=count {
            let election = self
                .ledger
                .election(election_id)
                .await
                .map_err(ServiceError::from_read)?;
            if !election.is_open
                || election.mode != ElectionMode::Scheduled
                || !election.accepting_votes(now)
            {
                continue;
            }

            let tally = read_tally(self.ledger.as_ref(), election_id)
                .await
                .map_err(ServiceError::from_read)?;
            items.push(ElectionProgress {
                election_id,
                title: tally.title,
                start_time: tally.start_time,
                end_time: tally.end_time,
                total_votes: tally.total_votes,
                candidates: tally
                    .candidates
                    .into_iter()
                    .filter(|c| c.is_active)
                    .map(|c| CandidateProgress {
                        id: c.id,
                        vote_count: c.vote_count,
                    })
                    .collect(),
            });
        }
        Ok(items)
    }

    pub async fn live_tally(&self, election_id: u64) -> ServiceResult<ElectionTally> {
        let count = self
            .ledger
            .election_count()
            .await
            .map_err(ServiceError::from_read)?;
        if election_id == 0 || election_id > count {
            return Err(ServiceError::ElectionNotFound);
        }
        read_tally(self.ledger.as_ref(), election_id)
            .await
            .map_err(ServiceError::from_read)
    }
}

fn unix_to_datetime(secs: u64) -> Option<DateTime<Utc>> {
    if secs == 0 {
        return None;
    }
    i64::try_from(secs)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryLedger;
    use alloy::primitives::{Address, B256};

    async fn setup() -> (Arc<InMemoryLedger>, ResultPipeline, u64) {
        let ledger = Arc::new(InMemoryLedger::new(Address::ZERO, None));
        let pipeline = ResultPipeline::new(ledger.clone(), Database::in_memory().await.unwrap());
        let (id, _) = ledger.create_election("BEM 2026").await.unwrap();
        ledger.add_candidate(id, "Alya").await.unwrap();
        ledger.add_candidate(id, "Bima").await.unwrap();
        ledger.set_schedule(id, 0, 1_800_000_000).await.unwrap();
        ledger.open_election(id).await.unwrap();
        ledger.submit_vote(id, 1, B256::repeat_byte(1)).await.unwrap();
        ledger.submit_vote(id, 1, B256::repeat_byte(2)).await.unwrap();
        ledger.submit_vote(id, 2, B256::repeat_byte(3)).await.unwrap();
        (ledger, pipeline, id)
    }

    #[tokio::test]
    async fn finalize_snapshots_the_live_tally() {
        let (_ledger, pipeline, id) = setup().await;
        let result = pipeline.finalize(id).await.unwrap();

        assert_eq!(result.total_votes, 3);
        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.candidates[0].vote_count, 2);
        assert!(!result.published);
        assert!(result.start_time.is_none());
        assert_eq!(result.end_time.unwrap().timestamp(), 1_800_000_000);

        // Not public until published
        assert!(matches!(
            pipeline.get_published_result(id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(pipeline.list_published_results().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refinalize_refreshes_until_published() {
        let (ledger, pipeline, id) = setup().await;
        pipeline.finalize(id).await.unwrap();
        ledger.submit_vote(id, 2, B256::repeat_byte(4)).await.unwrap();

        let result = pipeline.finalize(id).await.unwrap();
        assert_eq!(result.total_votes, 4);
        assert_eq!(pipeline.get_result(id).await.unwrap().total_votes, 4);
    }

    #[tokio::test]
    async fn publish_requires_a_snapshot() {
        let (_ledger, pipeline, id) = setup().await;
        assert!(matches!(
            pipeline.publish(id).await,
            Err(ServiceError::NotFinalized)
        ));
    }

    #[tokio::test]
    async fn published_results_are_frozen() {
        let (ledger, pipeline, id) = setup().await;
        pipeline.finalize(id).await.unwrap();
        let first = pipeline.publish(id).await.unwrap();
        assert!(first.published);

        ledger.credit_vote_unchecked(id, 2);
        let reads = ledger.write_attempts();
        assert!(matches!(
            pipeline.finalize(id).await,
            Err(ServiceError::AlreadyPublished)
        ));
        assert_eq!(ledger.write_attempts(), reads);

        let again = pipeline.publish(id).await.unwrap();
        assert_eq!(again.published_at, first.published_at);

        let public = pipeline.get_published_result(id).await.unwrap();
        assert_eq!(public.total_votes, 3);
        assert_eq!(pipeline.list_published_results().await.unwrap().len(), 1);
        assert_eq!(pipeline.live_tally(id).await.unwrap().total_votes, 4);
    }

    #[tokio::test]
    async fn finalize_surfaces_ledger_outages() {
        let (ledger, pipeline, id) = setup().await;
        ledger.fail_reads(true);
        assert!(matches!(
            pipeline.finalize(id).await,
            Err(ServiceError::LedgerUnavailable(_))
        ));
        ledger.fail_reads(false);
        assert!(matches!(
            pipeline.finalize(id + 1).await,
            Err(ServiceError::ElectionNotFound)
        ));
    }

    #[tokio::test]
    async fn progress_lists_only_live_scheduled_elections() {
        let (ledger, pipeline, manual) = setup().await;

        let (scheduled, _) = ledger.create_election("DPM 2026").await.unwrap();
        ledger.add_candidate(scheduled, "Citra").await.unwrap();
        ledger.add_candidate(scheduled, "Dimas").await.unwrap();
        ledger.set_schedule(scheduled, 1_000, 2_000).await.unwrap();
        ledger.set_mode(scheduled, ElectionMode::Scheduled).await.unwrap();
        ledger.open_election(scheduled).await.unwrap();
        ledger.set_now(1_500);
        ledger.submit_vote(scheduled, 2, B256::repeat_byte(9)).await.unwrap();
        ledger.hide_candidate(scheduled, 1).await.unwrap();

        let items = pipeline.live_progress(1_500).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_ne!(items[0].election_id, manual);
        assert_eq!(items[0].election_id, scheduled);
        assert_eq!(items[0].total_votes, 1);
        assert_eq!(items[0].candidates.len(), 1);
        assert_eq!(items[0].candidates[0].id, 2);
        assert_eq!(items[0].candidates[0].vote_count, 1);

        // Outside the window nothing is public
        assert!(pipeline.live_progress(2_001).await.unwrap().is_empty());
        assert!(pipeline.live_progress(999).await.unwrap().is_empty());
    }
}
