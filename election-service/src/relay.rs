//! Vote relay coordination.
//!
//! Two ways for a ballot to reach the ledger:
//!
//! * signed relay: the service signs an authorization and the voter submits
//!   `voteBySignature` from their own wallet, then reports the transaction;
//! * server relay: the service submits `voteByRelayer` and pays for it.
//!
//! The ledger's `hasVotedNim` flag is the only double-vote authority. Local
//! receipts are a cache written strictly after the ledger confirms.

use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::database::models::{ReceiptMode, VoteReceiptRecord, VoterSummary};
use crate::database::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::{ElectionInfo, IdentityHash, LedgerGateway};
use crate::lifecycle::resolve_election;
use crate::signing::{identity_hash, VoteAuthorization, VoteSigner};
use crate::utils::{db_id, now_unix, require_text};

#[derive(Clone)]
pub struct VoteRelay {
    ledger: Arc<dyn LedgerGateway>,
    db: Database,
    signer: Option<Arc<VoteSigner>>,
}

impl VoteRelay {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        db: Database,
        signer: Option<Arc<VoteSigner>>,
    ) -> Self {
        Self { ledger, db, signer }
    }

    /// Sign an authorization the voter redeems with `voteBySignature`.
    /// Nothing is written locally.
    pub async fn issue_signed_vote_authorization(
        &self,
        voter_id: &str,
        election_id: u64,
        voter_address: Address,
    ) -> ServiceResult<VoteAuthorization> {
        let signer = self.signer.as_ref().ok_or(ServiceError::SignerUnavailable)?;
        let identity = voter_identity(voter_id)?;
        self.precheck(election_id, identity).await?;

        let authorization = signer
            .authorize(election_id, voter_address, identity, now_unix())
            .map_err(|e| ServiceError::Internal(format!("signing failed: {}", e)))?;
        info!(
            "Issued vote authorization for election {} to {} (deadline {})",
            election_id, voter_address, authorization.deadline
        );
        Ok(authorization)
    }

    /// Record a `voteBySignature` transaction the voter reports as confirmed.
    /// The receipt is only written once the ledger shows the vote.
    pub async fn record_signed_relay_vote(
        &self,
        voter_id: &str,
        election_id: u64,
        candidate_id: u64,
        tx_hash: &str,
    ) -> ServiceResult<VoteReceiptRecord> {
        let identity = voter_identity(voter_id)?;
        if candidate_id == 0 {
            return Err(ServiceError::CandidateNotFound);
        }
        let tx_hash: TxHash = tx_hash
            .trim()
            .parse()
            .map_err(|_| ServiceError::Validation(format!("malformed transaction hash {}", tx_hash)))?;

        let voted = self
            .ledger
            .has_voted(election_id, identity)
            .await
            .map_err(ServiceError::from_read)?;
        if !voted {
            warn!(
                "Reported vote {} for election {} is not on the ledger",
                tx_hash, election_id
            );
            return Err(ServiceError::VoteNotConfirmed);
        }

        self.write_receipt(voter_id, election_id, candidate_id, tx_hash, ReceiptMode::SignedRelay)
            .await
    }

    /// Submit `voteByRelayer` on the voter's behalf and wait for the receipt.
    pub async fn submit_server_relayed_vote(
        &self,
        voter_id: &str,
        election_id: u64,
        candidate_id: u64,
    ) -> ServiceResult<VoteReceiptRecord> {
        let identity = voter_identity(voter_id)?;
        let election = self.precheck(election_id, identity).await?;
        if candidate_id == 0 || candidate_id > election.candidate_count {
            return Err(ServiceError::CandidateNotFound);
        }

        let tx_hash = match self
            .ledger
            .submit_vote(election_id, candidate_id, identity)
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                warn!(
                    "Relayed vote for election {} candidate {} failed: {}",
                    election_id, candidate_id, e
                );
                return Err(ServiceError::from_write(e));
            }
        };
        info!(
            "Relayed vote for election {} candidate {} in {}",
            election_id, candidate_id, tx_hash
        );

        self.write_receipt(voter_id, election_id, candidate_id, tx_hash, ReceiptMode::ServerRelay)
            .await
    }

    pub async fn has_voted(&self, voter_id: &str, election_id: u64) -> ServiceResult<bool> {
        let identity = voter_identity(voter_id)?;
        self.ledger
            .has_voted(election_id, identity)
            .await
            .map_err(ServiceError::from_read)
    }

    pub async fn vote_history(&self, voter_id: &str) -> ServiceResult<Vec<VoteReceiptRecord>> {
        let voter_id = require_text("voter id", voter_id)?;
        Ok(VoteReceiptRecord::list_by_voter(self.db.pool(), &voter_id).await?)
    }

    pub async fn voters(&self, election_id: u64) -> ServiceResult<Vec<VoterSummary>> {
        Ok(VoteReceiptRecord::list_voters(self.db.pool(), db_id(election_id)?).await?)
    }

    /// Double-vote guard, then the election must exist and accept votes.
    async fn precheck(
        &self,
        election_id: u64,
        identity: IdentityHash,
    ) -> ServiceResult<ElectionInfo> {
        let voted = self
            .ledger
            .has_voted(election_id, identity)
            .await
            .map_err(ServiceError::from_read)?;
        if voted {
            info!("Voter {} already voted in election {}", identity, election_id);
            return Err(ServiceError::AlreadyVoted);
        }

        let election = resolve_election(self.ledger.as_ref(), election_id).await?;
        if !election.accepting_votes(now_unix()) {
            return Err(ServiceError::ElectionClosed);
        }
        Ok(election)
    }

    async fn write_receipt(
        &self,
        voter_id: &str,
        election_id: u64,
        candidate_id: u64,
        tx_hash: TxHash,
        mode: ReceiptMode,
    ) -> ServiceResult<VoteReceiptRecord> {
        let record = VoteReceiptRecord {
            voter_id: voter_id.trim().to_string(),
            election_id: db_id(election_id)?,
            candidate_id: db_id(candidate_id)?,
            tx_hash: tx_hash.to_string(),
            mode,
            created_at: Utc::now(),
        };
        if let Err(e) = record.upsert(self.db.pool()).await {
            // The vote stands on the ledger; only the local cache is missing.
            error!(
                "Vote {} for election {} landed but its receipt was not stored: {}",
                tx_hash, election_id, e
            );
            return Err(e.into());
        }
        Ok(record)
    }
}

fn voter_identity(voter_id: &str) -> ServiceResult<IdentityHash> {
    Ok(identity_hash(&require_text("voter id", voter_id)?))
}
