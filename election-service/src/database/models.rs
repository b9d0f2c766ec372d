use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::ledger::ElectionTally;

/// One row per election that has been opened at least once.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ElectionLockRecord {
    pub election_id: i64,
    pub opened_once: bool,
    pub opened_at: Option<DateTime<Utc>>,
}

/// How a vote reached the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ReceiptMode {
    /// Voter submitted `voteBySignature` with an authorization we issued
    SignedRelay,
    /// Service submitted `voteByRelayer` on the voter's behalf
    ServerRelay,
}

/// Local cache of "what did this voter do", keyed by (voter, election)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VoteReceiptRecord {
    pub voter_id: String,
    pub election_id: i64,
    pub candidate_id: i64,
    pub tx_hash: String,
    pub mode: ReceiptMode,
    pub created_at: DateTime<Utc>,
}

/// Frozen tally of an election. Immutable once `published` is set.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResultSnapshotRecord {
    pub election_id: i64,
    pub title: String,
    pub total_votes: i64,
    pub results: Json<ElectionTally>,
    pub snapshot_at: DateTime<Utc>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Off-ledger presentation data for a candidate
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct CandidateProfileRecord {
    pub election_id: i64,
    pub candidate_id: i64,
    pub tagline: Option<String>,
    pub about: Option<String>,
    pub vision: Option<String>,
    pub mission: Option<String>,
    pub programme: Option<String>,
    pub photo_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Voter listing row for the admin view of an election
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VoterSummary {
    pub voter_id: String,
    pub voted_at: DateTime<Utc>,
}
