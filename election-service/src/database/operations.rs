//! Upserts and lookups against the local store. Every write is keyed on a
//! unique constraint, so concurrent workers converge without extra locking.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use super::models::*;

/// Database operations for election locks
impl ElectionLockRecord {
    /// Set the opened flag. `opened_at` keeps the first opening's timestamp.
    pub async fn mark_opened(
        pool: &SqlitePool,
        election_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        debug!("Marking election {} as opened", election_id);

        sqlx::query(
            "INSERT INTO election_locks (election_id, opened_once, opened_at)
             VALUES (?, 1, ?)
             ON CONFLICT(election_id) DO UPDATE SET
                 opened_once = 1,
                 opened_at = COALESCE(election_locks.opened_at, excluded.opened_at)",
        )
        .bind(election_id)
        .bind(at)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get(
        pool: &SqlitePool,
        election_id: i64,
    ) -> Result<Option<ElectionLockRecord>, sqlx::Error> {
        sqlx::query_as::<_, ElectionLockRecord>(
            "SELECT election_id, opened_once, opened_at FROM election_locks WHERE election_id = ?",
        )
        .bind(election_id)
        .fetch_optional(pool)
        .await
    }
}

/// Database operations for vote receipts
impl VoteReceiptRecord {
    /// Insert, or overwrite candidate/tx/mode of the existing (voter, election) row.
    pub async fn upsert(&self, pool: &SqlitePool) -> Result<(), sqlx::Error> {
        debug!(
            "Upserting receipt voter={} election={} tx={}",
            self.voter_id, self.election_id, self.tx_hash
        );

        sqlx::query(
            "INSERT INTO vote_receipts
             (voter_id, election_id, candidate_id, tx_hash, mode, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(voter_id, election_id) DO UPDATE SET
                 candidate_id = excluded.candidate_id,
                 tx_hash = excluded.tx_hash,
                 mode = excluded.mode",
        )
        .bind(&self.voter_id)
        .bind(self.election_id)
        .bind(self.candidate_id)
        .bind(&self.tx_hash)
        .bind(self.mode)
        .bind(self.created_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// A voter's receipts, newest first
    pub async fn list_by_voter(
        pool: &SqlitePool,
        voter_id: &str,
    ) -> Result<Vec<VoteReceiptRecord>, sqlx::Error> {
        sqlx::query_as::<_, VoteReceiptRecord>(
            "SELECT * FROM vote_receipts WHERE voter_id = ? ORDER BY created_at DESC, election_id DESC",
        )
        .bind(voter_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_voters(
        pool: &SqlitePool,
        election_id: i64,
    ) -> Result<Vec<VoterSummary>, sqlx::Error> {
        sqlx::query_as::<_, VoterSummary>(
            "SELECT voter_id, created_at AS voted_at FROM vote_receipts
             WHERE election_id = ? ORDER BY created_at DESC, voter_id",
        )
        .bind(election_id)
        .fetch_all(pool)
        .await
    }
}

/// Database operations for result snapshots
impl ResultSnapshotRecord {
    /// Insert or refresh an unpublished snapshot. Returns `false` when the
    /// row is already published, in which case nothing was written.
    pub async fn upsert_unpublished(&self, pool: &SqlitePool) -> Result<bool, sqlx::Error> {
        debug!(
            "Upserting snapshot for election {} ({} votes)",
            self.election_id, self.total_votes
        );

        let result = sqlx::query(
            "INSERT INTO result_snapshots
             (election_id, title, total_votes, results, snapshot_at, published, published_at, start_time, end_time)
             VALUES (?, ?, ?, ?, ?, 0, NULL, ?, ?)
             ON CONFLICT(election_id) DO UPDATE SET
                 title = excluded.title,
                 total_votes = excluded.total_votes,
                 results = excluded.results,
                 snapshot_at = excluded.snapshot_at,
                 start_time = excluded.start_time,
                 end_time = excluded.end_time
             WHERE result_snapshots.published = 0",
        )
        .bind(self.election_id)
        .bind(&self.title)
        .bind(self.total_votes)
        .bind(&self.results)
        .bind(self.snapshot_at)
        .bind(self.start_time)
        .bind(self.end_time)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Flip the published latch. Returns `false` if there was no unpublished row.
    pub async fn publish(
        pool: &SqlitePool,
        election_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE result_snapshots SET published = 1, published_at = ?
             WHERE election_id = ? AND published = 0",
        )
        .bind(at)
        .bind(election_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(
        pool: &SqlitePool,
        election_id: i64,
    ) -> Result<Option<ResultSnapshotRecord>, sqlx::Error> {
        sqlx::query_as::<_, ResultSnapshotRecord>(
            "SELECT * FROM result_snapshots WHERE election_id = ?",
        )
        .bind(election_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn get_published(
        pool: &SqlitePool,
        election_id: i64,
    ) -> Result<Option<ResultSnapshotRecord>, sqlx::Error> {
        sqlx::query_as::<_, ResultSnapshotRecord>(
            "SELECT * FROM result_snapshots WHERE election_id = ? AND published = 1",
        )
        .bind(election_id)
        .fetch_optional(pool)
        .await
    }

    /// Published results, most recently published first
    pub async fn list_published(pool: &SqlitePool) -> Result<Vec<ResultSnapshotRecord>, sqlx::Error> {
        sqlx::query_as::<_, ResultSnapshotRecord>(
            "SELECT * FROM result_snapshots WHERE published = 1
             ORDER BY published_at DESC, election_id DESC",
        )
        .fetch_all(pool)
        .await
    }
}

/// Database operations for candidate profiles
impl CandidateProfileRecord {
    pub async fn upsert(&self, pool: &SqlitePool) -> Result<(), sqlx::Error> {
        debug!(
            "Upserting profile for candidate {} of election {}",
            self.candidate_id, self.election_id
        );

        sqlx::query(
            "INSERT INTO candidate_profiles
             (election_id, candidate_id, tagline, about, vision, mission, programme, photo_url, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(election_id, candidate_id) DO UPDATE SET
                 tagline = excluded.tagline,
                 about = excluded.about,
                 vision = excluded.vision,
                 mission = excluded.mission,
                 programme = excluded.programme,
                 photo_url = COALESCE(excluded.photo_url, candidate_profiles.photo_url),
                 updated_at = excluded.updated_at",
        )
        .bind(self.election_id)
        .bind(self.candidate_id)
        .bind(&self.tagline)
        .bind(&self.about)
        .bind(&self.vision)
        .bind(&self.mission)
        .bind(&self.programme)
        .bind(&self.photo_url)
        .bind(self.updated_at.unwrap_or_else(Utc::now))
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get(
        pool: &SqlitePool,
        election_id: i64,
        candidate_id: i64,
    ) -> Result<Option<CandidateProfileRecord>, sqlx::Error> {
        sqlx::query_as::<_, CandidateProfileRecord>(
            "SELECT * FROM candidate_profiles WHERE election_id = ? AND candidate_id = ?",
        )
        .bind(election_id)
        .bind(candidate_id)
        .fetch_optional(pool)
        .await
    }
}
