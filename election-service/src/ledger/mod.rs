//! Gateway to the voting contract, the authoritative store for elections,
//! candidates, tallies and per-voter vote status.

pub mod evm;
pub mod memory;

use std::time::Duration;

use alloy::primitives::{Address, TxHash, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// keccak256 of a voter's durable identifier; the ledger-facing voting key
pub type IdentityHash = B256;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),
    #[error("transaction sent but not confirmed: {0}")]
    Unconfirmed(String),
    #[error("ledger rejected the call: {0}")]
    Rejected(String),
    #[error("ledger transport failed: {0}")]
    Transport(String),
    #[error("unexpected ledger response: {0}")]
    Malformed(String),
    #[error("ledger writes are not configured")]
    ReadOnly,
}

impl LedgerError {
    /// For writes: the transaction may or may not have landed.
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, LedgerError::Timeout(_) | LedgerError::Unconfirmed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionMode {
    Manual,
    Scheduled,
}

impl ElectionMode {
    pub fn from_u8(raw: u8) -> Result<Self, LedgerError> {
        match raw {
            0 => Ok(ElectionMode::Manual),
            1 => Ok(ElectionMode::Scheduled),
            other => Err(LedgerError::Malformed(format!("unknown election mode {}", other))),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ElectionMode::Manual => 0,
            ElectionMode::Scheduled => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionInfo {
    pub id: u64,
    pub title: String,
    pub is_open: bool,
    pub mode: ElectionMode,
    /// Unix seconds, 0 when unset
    pub start_time: u64,
    /// Unix seconds, 0 when unset
    pub end_time: u64,
    pub candidate_count: u64,
    pub active_candidate_count: u64,
}

impl ElectionInfo {
    /// Whether the contract would accept a ballot at `now`.
    pub fn accepting_votes(&self, now: u64) -> bool {
        match self.mode {
            ElectionMode::Manual => self.is_open,
            ElectionMode::Scheduled => {
                self.start_time != 0
                    && self.end_time != 0
                    && self.start_time <= now
                    && now <= self.end_time
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInfo {
    pub id: u64,
    pub name: String,
    pub vote_count: u64,
    pub is_active: bool,
}

/// Full live read of one election, as stored in result snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionTally {
    pub election_id: u64,
    pub title: String,
    pub is_open: bool,
    pub mode: ElectionMode,
    pub start_time: u64,
    pub end_time: u64,
    pub candidates: Vec<CandidateInfo>,
    pub total_votes: u64,
}

/// Node connectivity as reported by the RPC endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainStatus {
    pub chain_id: u64,
    pub block_number: u64,
}

#[async_trait]
pub trait LedgerGateway: Send + Sync {
    fn contract_address(&self) -> Address;

    async fn chain_status(&self) -> Result<ChainStatus, LedgerError>;

    /// Native balance of `account`, in wei.
    async fn balance(&self, account: Address) -> Result<U256, LedgerError>;

    async fn election_count(&self) -> Result<u64, LedgerError>;

    async fn election(&self, election_id: u64) -> Result<ElectionInfo, LedgerError>;

    async fn candidate(&self, election_id: u64, candidate_id: u64)
        -> Result<CandidateInfo, LedgerError>;

    async fn has_voted(&self, election_id: u64, identity: IdentityHash)
        -> Result<bool, LedgerError>;

    /// Returns the id of the new election together with the transaction.
    async fn create_election(&self, title: &str) -> Result<(u64, TxHash), LedgerError>;

    async fn add_candidate(&self, election_id: u64, name: &str) -> Result<TxHash, LedgerError>;

    async fn rename_candidate(
        &self,
        election_id: u64,
        candidate_id: u64,
        name: &str,
    ) -> Result<TxHash, LedgerError>;

    async fn hide_candidate(&self, election_id: u64, candidate_id: u64)
        -> Result<TxHash, LedgerError>;

    async fn open_election(&self, election_id: u64) -> Result<TxHash, LedgerError>;

    async fn close_election(&self, election_id: u64) -> Result<TxHash, LedgerError>;

    async fn set_schedule(&self, election_id: u64, start: u64, end: u64)
        -> Result<TxHash, LedgerError>;

    async fn set_mode(&self, election_id: u64, mode: ElectionMode) -> Result<TxHash, LedgerError>;

    /// `voteByRelayer`: the service pays for the voter's ballot.
    async fn submit_vote(
        &self,
        election_id: u64,
        candidate_id: u64,
        identity: IdentityHash,
    ) -> Result<TxHash, LedgerError>;
}

/// Read the election and every candidate, summing the tallies.
pub async fn read_tally(
    ledger: &dyn LedgerGateway,
    election_id: u64,
) -> Result<ElectionTally, LedgerError> {
    let election = ledger.election(election_id).await?;
    let mut candidates = Vec::with_capacity(election.candidate_count as usize);
    let mut total_votes = 0u64;
    for candidate_id in 1..=election.candidate_count {
        let candidate = ledger.candidate(election_id, candidate_id).await?;
        total_votes = total_votes.saturating_add(candidate.vote_count);
        candidates.push(candidate);
    }

    Ok(ElectionTally {
        election_id,
        title: election.title,
        is_open: election.is_open,
        mode: election.mode,
        start_time: election.start_time,
        end_time: election.end_time,
        candidates,
        total_votes,
    })
}
