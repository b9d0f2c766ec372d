//! In-process model of the voting contract.
//!
//! Used with `LEDGER_MODE=memory` for local development and by the test
//! suites. It enforces the same acceptance rules as the deployed contract,
//! including `voteBySignature`, so signed authorizations can be redeemed
//! against it. With the `test-util` feature, fault switches let tests
//! simulate an unavailable or rejecting ledger.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::{keccak256, Address, Signature, TxHash, U256};
use async_trait::async_trait;

use super::{
    CandidateInfo, ChainStatus, ElectionInfo, ElectionMode, IdentityHash, LedgerError,
    LedgerGateway,
};
use crate::signing::authorization_digest;

/// Chain id reported in memory mode (the local anvil/hardhat default)
pub const MEMORY_CHAIN_ID: u64 = 31_337;

#[derive(Debug, Clone)]
struct StoredCandidate {
    name: String,
    vote_count: u64,
    is_active: bool,
}

#[derive(Debug, Clone)]
struct StoredElection {
    title: String,
    is_open: bool,
    mode: ElectionMode,
    start_time: u64,
    end_time: u64,
    candidates: Vec<StoredCandidate>,
}

#[derive(Default)]
struct LedgerState {
    elections: Vec<StoredElection>,
    voted: HashSet<(u64, IdentityHash)>,
    /// Fixed block time; wall clock when unset
    now: Option<u64>,
}

#[derive(Default)]
struct Faults {
    fail_reads: bool,
    time_out_writes: bool,
    reject_close: HashSet<u64>,
}

pub struct InMemoryLedger {
    contract_address: Address,
    /// Account whose signatures `vote_by_signature` accepts
    authorizer: Option<Address>,
    state: Mutex<LedgerState>,
    faults: Mutex<Faults>,
    tx_counter: AtomicU64,
    writes: AtomicU64,
    write_log: Mutex<HashMap<&'static str, u64>>,
}

impl InMemoryLedger {
    pub fn new(contract_address: Address, authorizer: Option<Address>) -> Self {
        Self {
            contract_address,
            authorizer,
            state: Mutex::new(LedgerState::default()),
            faults: Mutex::new(Faults::default()),
            tx_counter: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            write_log: Mutex::new(HashMap::new()),
        }
    }

    /// Pin the ledger's block time.
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_now(&self, now: u64) {
        self.lock_state().now = Some(now);
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_reads(&self, enabled: bool) {
        self.lock_faults().fail_reads = enabled;
    }

    /// Writes are applied but the caller only sees a timeout.
    #[cfg(any(test, feature = "test-util"))]
    pub fn time_out_writes(&self, enabled: bool) {
        self.lock_faults().time_out_writes = enabled;
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn reject_close_for(&self, election_id: u64) {
        self.lock_faults().reject_close.insert(election_id);
    }

    /// Number of write calls attempted, accepted or not.
    #[cfg(any(test, feature = "test-util"))]
    pub fn write_attempts(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn write_attempts_of(&self, call: &'static str) -> u64 {
        self.write_log
            .lock()
            .map(|log| log.get(call).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Credit a vote bypassing every acceptance rule. Models a ledger that
    /// keeps changing after results were frozen.
    #[cfg(any(test, feature = "test-util"))]
    pub fn credit_vote_unchecked(&self, election_id: u64, candidate_id: u64) {
        let mut state = self.lock_state();
        if let Some(candidate) = election_index(election_id)
            .and_then(|e| state.elections.get_mut(e))
            .and_then(|e| candidate_index(candidate_id).and_then(|c| e.candidates.get_mut(c)))
        {
            candidate.vote_count += 1;
        }
    }

    /// `voteBySignature` acceptance rule: the authorization digest must be
    /// signed (EIP-191) by the authorizer, the deadline must not have passed
    /// and the sender must be the voter address bound into the digest.
    pub fn vote_by_signature(
        &self,
        sender: Address,
        election_id: u64,
        candidate_id: u64,
        identity: IdentityHash,
        deadline: u64,
        signature: &Signature,
    ) -> Result<TxHash, LedgerError> {
        self.begin_write("voteBySignature")?;
        let authorizer = self
            .authorizer
            .ok_or_else(|| LedgerError::Rejected("no authorizer configured".into()))?;
        let digest = authorization_digest(
            self.contract_address,
            election_id,
            sender,
            identity,
            deadline,
        );
        let recovered = signature
            .recover_address_from_msg(digest.as_slice())
            .map_err(|e| LedgerError::Rejected(format!("bad signature: {}", e)))?;
        if recovered != authorizer {
            return Err(LedgerError::Rejected("invalid signature".into()));
        }

        let mut state = self.lock_state();
        let now = state.now.unwrap_or_else(wall_clock);
        if now > deadline {
            return Err(LedgerError::Rejected("signature expired".into()));
        }
        cast(&mut state, election_id, candidate_id, identity)?;
        drop(state);
        Ok(self.next_tx_hash())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_read(&self) -> Result<(), LedgerError> {
        if self.lock_faults().fail_reads {
            return Err(LedgerError::Transport("connection refused".into()));
        }
        Ok(())
    }

    fn begin_write(&self, call: &'static str) -> Result<(), LedgerError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.write_log.lock() {
            *log.entry(call).or_insert(0) += 1;
        }
        Ok(())
    }

    /// Apply `apply` to the state and hand back a transaction hash, or a
    /// timeout when writes are configured to time out.
    fn commit<T>(
        &self,
        apply: impl FnOnce(&mut LedgerState) -> Result<T, LedgerError>,
    ) -> Result<(T, TxHash), LedgerError> {
        let value = {
            let mut state = self.lock_state();
            apply(&mut state)?
        };
        if self.lock_faults().time_out_writes {
            return Err(LedgerError::Timeout(Duration::from_secs(15)));
        }
        Ok((value, self.next_tx_hash()))
    }

    fn next_tx_hash(&self) -> TxHash {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        keccak256(n.to_be_bytes())
    }
}

fn wall_clock() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

fn election_index(election_id: u64) -> Option<usize> {
    election_id.checked_sub(1).map(|i| i as usize)
}

fn candidate_index(candidate_id: u64) -> Option<usize> {
    candidate_id.checked_sub(1).map(|i| i as usize)
}

fn election_mut(state: &mut LedgerState, election_id: u64) -> Result<&mut StoredElection, LedgerError> {
    election_index(election_id)
        .and_then(|i| state.elections.get_mut(i))
        .ok_or_else(|| LedgerError::Rejected(format!("election {} not found", election_id)))
}

fn candidate_mut(
    election: &mut StoredElection,
    candidate_id: u64,
) -> Result<&mut StoredCandidate, LedgerError> {
    candidate_index(candidate_id)
        .and_then(|i| election.candidates.get_mut(i))
        .ok_or_else(|| LedgerError::Rejected(format!("candidate {} not found", candidate_id)))
}

fn cast(
    state: &mut LedgerState,
    election_id: u64,
    candidate_id: u64,
    identity: IdentityHash,
) -> Result<(), LedgerError> {
    let now = state.now.unwrap_or_else(wall_clock);
    if state.voted.contains(&(election_id, identity)) {
        return Err(LedgerError::Rejected("already voted".into()));
    }
    let election = election_mut(state, election_id)?;
    let info = snapshot(election_id, election);
    if !info.accepting_votes(now) {
        return Err(LedgerError::Rejected("election is not open".into()));
    }
    let candidate = candidate_mut(election, candidate_id)?;
    if !candidate.is_active {
        return Err(LedgerError::Rejected("candidate is hidden".into()));
    }
    candidate.vote_count += 1;
    state.voted.insert((election_id, identity));
    Ok(())
}

fn snapshot(election_id: u64, e: &StoredElection) -> ElectionInfo {
    ElectionInfo {
        id: election_id,
        title: e.title.clone(),
        is_open: e.is_open,
        mode: e.mode,
        start_time: e.start_time,
        end_time: e.end_time,
        candidate_count: e.candidates.len() as u64,
        active_candidate_count: e.candidates.iter().filter(|c| c.is_active).count() as u64,
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    fn contract_address(&self) -> Address {
        self.contract_address
    }

    /// Every committed write counts as one block.
    async fn chain_status(&self) -> Result<ChainStatus, LedgerError> {
        self.check_read()?;
        Ok(ChainStatus {
            chain_id: MEMORY_CHAIN_ID,
            block_number: self.tx_counter.load(Ordering::SeqCst),
        })
    }

    /// Accounts hold no native funds in memory mode.
    async fn balance(&self, _account: Address) -> Result<U256, LedgerError> {
        self.check_read()?;
        Ok(U256::ZERO)
    }

    async fn election_count(&self) -> Result<u64, LedgerError> {
        self.check_read()?;
        Ok(self.lock_state().elections.len() as u64)
    }

    async fn election(&self, election_id: u64) -> Result<ElectionInfo, LedgerError> {
        self.check_read()?;
        let mut state = self.lock_state();
        let election = election_mut(&mut state, election_id)?;
        Ok(snapshot(election_id, election))
    }

    async fn candidate(
        &self,
        election_id: u64,
        candidate_id: u64,
    ) -> Result<CandidateInfo, LedgerError> {
        self.check_read()?;
        let mut state = self.lock_state();
        let election = election_mut(&mut state, election_id)?;
        let c = candidate_mut(election, candidate_id)?;
        Ok(CandidateInfo {
            id: candidate_id,
            name: c.name.clone(),
            vote_count: c.vote_count,
            is_active: c.is_active,
        })
    }

    async fn has_voted(
        &self,
        election_id: u64,
        identity: IdentityHash,
    ) -> Result<bool, LedgerError> {
        self.check_read()?;
        Ok(self.lock_state().voted.contains(&(election_id, identity)))
    }

    async fn create_election(&self, title: &str) -> Result<(u64, TxHash), LedgerError> {
        self.begin_write("createElection")?;
        let title = title.to_string();
        self.commit(|state| {
            state.elections.push(StoredElection {
                title,
                is_open: false,
                mode: ElectionMode::Manual,
                start_time: 0,
                end_time: 0,
                candidates: Vec::new(),
            });
            Ok(state.elections.len() as u64)
        })
    }

    async fn add_candidate(&self, election_id: u64, name: &str) -> Result<TxHash, LedgerError> {
        self.begin_write("addCandidate")?;
        let name = name.to_string();
        self.commit(|state| {
            election_mut(state, election_id)?.candidates.push(StoredCandidate {
                name,
                vote_count: 0,
                is_active: true,
            });
            Ok(())
        })
        .map(|(_, tx)| tx)
    }

    async fn rename_candidate(
        &self,
        election_id: u64,
        candidate_id: u64,
        name: &str,
    ) -> Result<TxHash, LedgerError> {
        self.begin_write("updateCandidate")?;
        let name = name.to_string();
        self.commit(|state| {
            candidate_mut(election_mut(state, election_id)?, candidate_id)?.name = name;
            Ok(())
        })
        .map(|(_, tx)| tx)
    }

    async fn hide_candidate(
        &self,
        election_id: u64,
        candidate_id: u64,
    ) -> Result<TxHash, LedgerError> {
        self.begin_write("hideCandidate")?;
        self.commit(|state| {
            candidate_mut(election_mut(state, election_id)?, candidate_id)?.is_active = false;
            Ok(())
        })
        .map(|(_, tx)| tx)
    }

    async fn open_election(&self, election_id: u64) -> Result<TxHash, LedgerError> {
        self.begin_write("openElection")?;
        self.commit(|state| {
            let election = election_mut(state, election_id)?;
            if election.is_open {
                return Err(LedgerError::Rejected("election already open".into()));
            }
            election.is_open = true;
            Ok(())
        })
        .map(|(_, tx)| tx)
    }

    async fn close_election(&self, election_id: u64) -> Result<TxHash, LedgerError> {
        self.begin_write("closeElection")?;
        if self.lock_faults().reject_close.contains(&election_id) {
            return Err(LedgerError::Rejected(format!(
                "close of election {} reverted",
                election_id
            )));
        }
        self.commit(|state| {
            let election = election_mut(state, election_id)?;
            if !election.is_open {
                return Err(LedgerError::Rejected("election not open".into()));
            }
            election.is_open = false;
            Ok(())
        })
        .map(|(_, tx)| tx)
    }

    async fn set_schedule(
        &self,
        election_id: u64,
        start: u64,
        end: u64,
    ) -> Result<TxHash, LedgerError> {
        self.begin_write("setElectionSchedule")?;
        self.commit(|state| {
            let election = election_mut(state, election_id)?;
            election.start_time = start;
            election.end_time = end;
            Ok(())
        })
        .map(|(_, tx)| tx)
    }

    async fn set_mode(&self, election_id: u64, mode: ElectionMode) -> Result<TxHash, LedgerError> {
        self.begin_write("setElectionMode")?;
        self.commit(|state| {
            election_mut(state, election_id)?.mode = mode;
            Ok(())
        })
        .map(|(_, tx)| tx)
    }

    async fn submit_vote(
        &self,
        election_id: u64,
        candidate_id: u64,
        identity: IdentityHash,
    ) -> Result<TxHash, LedgerError> {
        self.begin_write("voteByRelayer")?;
        self.commit(|state| cast(state, election_id, candidate_id, identity))
            .map(|(_, tx)| tx)
    }
}
