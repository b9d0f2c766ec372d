//! JSON-RPC implementation of the ledger gateway

use std::future::IntoFuture;
use std::time::Duration;

use alloy::network::{Ethereum, EthereumWallet};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use alloy::transports::TransportResult;
use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    CandidateInfo, ChainStatus, ElectionInfo, ElectionMode, IdentityHash, LedgerError,
    LedgerGateway,
};

sol! {
    #[sol(rpc)]
    contract Voting {
        function electionsCount() external view returns (uint256);
        function getElection(uint256 electionId) external view returns (
            string title,
            bool isOpen,
            uint8 mode,
            uint64 startTime,
            uint64 endTime,
            uint256 candidatesCount,
            uint256 activeCandidatesCount
        );
        function getCandidate(uint256 electionId, uint256 candidateId) external view returns (
            uint256 id,
            string name,
            uint256 voteCount,
            bool isActive
        );
        function hasVotedNim(uint256 electionId, bytes32 voterHash) external view returns (bool);

        function createElection(string title) external;
        function addCandidate(uint256 electionId, string name) external;
        function updateCandidate(uint256 electionId, uint256 candidateId, string name) external;
        function hideCandidate(uint256 electionId, uint256 candidateId) external;
        function openElection(uint256 electionId) external;
        function closeElection(uint256 electionId) external;
        function setElectionSchedule(uint256 electionId, uint64 startTime, uint64 endTime) external;
        function setElectionMode(uint256 electionId, uint8 mode) external;
        function voteByRelayer(uint256 electionId, uint256 candidateId, bytes32 voterHash) external;
    }
}

pub struct EvmLedger {
    contract: Voting::VotingInstance<DynProvider>,
    timeout: Duration,
    writable: bool,
}

impl EvmLedger {
    /// Connect to the contract. Without a signer the gateway is read-only and
    /// every write fails with [`LedgerError::ReadOnly`].
    pub fn connect(
        rpc_url: &str,
        contract_address: Address,
        signer: Option<PrivateKeySigner>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let url: Url = rpc_url.parse()?;
        let writable = signer.is_some();
        let provider = match signer {
            Some(signer) => {
                info!("Ledger relayer account: {}", signer.address());
                ProviderBuilder::new()
                    .wallet(EthereumWallet::from(signer))
                    .connect_http(url)
                    .erased()
            }
            None => ProviderBuilder::new().connect_http(url).erased(),
        };

        info!(
            "Ledger gateway bound to contract {} via {} (timeout {:?})",
            contract_address, rpc_url, timeout
        );
        Ok(Self {
            contract: Voting::new(contract_address, provider),
            timeout,
            writable,
        })
    }

    async fn bounded<F, T>(&self, call: F) -> Result<T, LedgerError>
    where
        F: IntoFuture<Output = Result<T, alloy::contract::Error>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(LedgerError::Timeout(self.timeout)),
        }
    }

    /// Plain node RPC, outside the contract bindings.
    async fn bounded_rpc<F, T>(&self, call: F) -> Result<T, LedgerError>
    where
        F: IntoFuture<Output = TransportResult<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| LedgerError::Transport(e.to_string())),
            Err(_) => Err(LedgerError::Timeout(self.timeout)),
        }
    }

    fn ensure_writable(&self) -> Result<(), LedgerError> {
        if self.writable {
            Ok(())
        } else {
            Err(LedgerError::ReadOnly)
        }
    }

    /// Wait for the receipt; a reverted transaction is a rejection.
    async fn confirm(
        &self,
        pending: PendingTransactionBuilder<Ethereum>,
    ) -> Result<TxHash, LedgerError> {
        let tx_hash = *pending.tx_hash();
        debug!("Waiting for receipt of {}", tx_hash);
        let receipt = match tokio::time::timeout(self.timeout, pending.get_receipt()).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => return Err(LedgerError::Unconfirmed(format!("{}: {}", tx_hash, e))),
            Err(_) => return Err(LedgerError::Timeout(self.timeout)),
        };
        if !receipt.status() {
            return Err(LedgerError::Rejected(format!("transaction {} reverted", tx_hash)));
        }
        Ok(receipt.transaction_hash)
    }
}

fn classify(err: alloy::contract::Error) -> LedgerError {
    match &err {
        alloy::contract::Error::TransportError(inner) if inner.as_error_resp().is_some() => {
            LedgerError::Rejected(err.to_string())
        }
        alloy::contract::Error::TransportError(_) => LedgerError::Transport(err.to_string()),
        _ => LedgerError::Malformed(err.to_string()),
    }
}

fn to_u64(value: U256, field: &str) -> Result<u64, LedgerError> {
    u64::try_from(value)
        .map_err(|_| LedgerError::Malformed(format!("{} does not fit in u64: {}", field, value)))
}

#[async_trait]
impl LedgerGateway for EvmLedger {
    fn contract_address(&self) -> Address {
        *self.contract.address()
    }

    async fn chain_status(&self) -> Result<ChainStatus, LedgerError> {
        let provider = self.contract.provider();
        let (chain_id, block_number) = tokio::try_join!(
            self.bounded_rpc(provider.get_chain_id()),
            self.bounded_rpc(provider.get_block_number()),
        )?;
        Ok(ChainStatus {
            chain_id,
            block_number,
        })
    }

    async fn balance(&self, account: Address) -> Result<U256, LedgerError> {
        self.bounded_rpc(self.contract.provider().get_balance(account)).await
    }

    async fn election_count(&self) -> Result<u64, LedgerError> {
        let count = self.bounded(self.contract.electionsCount().call()).await?;
        to_u64(count, "electionsCount")
    }

    async fn election(&self, election_id: u64) -> Result<ElectionInfo, LedgerError> {
        let e = self
            .bounded(self.contract.getElection(U256::from(election_id)).call())
            .await?;
        Ok(ElectionInfo {
            id: election_id,
            title: e.title,
            is_open: e.isOpen,
            mode: ElectionMode::from_u8(e.mode)?,
            start_time: e.startTime,
            end_time: e.endTime,
            candidate_count: to_u64(e.candidatesCount, "candidatesCount")?,
            active_candidate_count: to_u64(e.activeCandidatesCount, "activeCandidatesCount")?,
        })
    }

    async fn candidate(
        &self,
        election_id: u64,
        candidate_id: u64,
    ) -> Result<CandidateInfo, LedgerError> {
        let c = self
            .bounded(
                self.contract
                    .getCandidate(U256::from(election_id), U256::from(candidate_id))
                    .call(),
            )
            .await?;
        Ok(CandidateInfo {
            id: to_u64(c.id, "candidate id")?,
            name: c.name,
            vote_count: to_u64(c.voteCount, "voteCount")?,
            is_active: c.isActive,
        })
    }

    async fn has_voted(
        &self,
        election_id: u64,
        identity: IdentityHash,
    ) -> Result<bool, LedgerError> {
        self.bounded(
            self.contract
                .hasVotedNim(U256::from(election_id), identity)
                .call(),
        )
        .await
    }

    async fn create_election(&self, title: &str) -> Result<(u64, TxHash), LedgerError> {
        self.ensure_writable()?;
        let pending = self
            .bounded(self.contract.createElection(title.to_string()).send())
            .await?;
        let tx_hash = self.confirm(pending).await?;
        // Ids are sequential; the newest election is the current count.
        let election_id = self.election_count().await?;
        Ok((election_id, tx_hash))
    }

    async fn add_candidate(&self, election_id: u64, name: &str) -> Result<TxHash, LedgerError> {
        self.ensure_writable()?;
        let pending = self
            .bounded(
                self.contract
                    .addCandidate(U256::from(election_id), name.to_string())
                    .send(),
            )
            .await?;
        self.confirm(pending).await
    }

    async fn rename_candidate(
        &self,
        election_id: u64,
        candidate_id: u64,
        name: &str,
    ) -> Result<TxHash, LedgerError> {
        self.ensure_writable()?;
        let pending = self
            .bounded(
                self.contract
                    .updateCandidate(
                        U256::from(election_id),
                        U256::from(candidate_id),
                        name.to_string(),
                    )
                    .send(),
            )
            .await?;
        self.confirm(pending).await
    }

    async fn hide_candidate(
        &self,
        election_id: u64,
        candidate_id: u64,
    ) -> Result<TxHash, LedgerError> {
        self.ensure_writable()?;
        let pending = self
            .bounded(
                self.contract
                    .hideCandidate(U256::from(election_id), U256::from(candidate_id))
                    .send(),
            )
            .await?;
        self.confirm(pending).await
    }

    async fn open_election(&self, election_id: u64) -> Result<TxHash, LedgerError> {
        self.ensure_writable()?;
        let pending = self
            .bounded(self.contract.openElection(U256::from(election_id)).send())
            .await?;
        self.confirm(pending).await
    }

    async fn close_election(&self, election_id: u64) -> Result<TxHash, LedgerError> {
        self.ensure_writable()?;
        let pending = self
            .bounded(self.contract.closeElection(U256::from(election_id)).send())
            .await?;
        self.confirm(pending).await
    }

    async fn set_schedule(
        &self,
        election_id: u64,
        start: u64,
        end: u64,
    ) -> Result<TxHash, LedgerError> {
        self.ensure_writable()?;
        let pending = self
            .bounded(
                self.contract
                    .setElectionSchedule(U256::from(election_id), start, end)
                    .send(),
            )
            .await?;
        self.confirm(pending).await
    }

    async fn set_mode(&self, election_id: u64, mode: ElectionMode) -> Result<TxHash, LedgerError> {
        self.ensure_writable()?;
        let pending = self
            .bounded(
                self.contract
                    .setElectionMode(U256::from(election_id), mode.as_u8())
                    .send(),
            )
            .await?;
        self.confirm(pending).await
    }

    async fn submit_vote(
        &self,
        election_id: u64,
        candidate_id: u64,
        identity: IdentityHash,
    ) -> Result<TxHash, LedgerError> {
        self.ensure_writable()?;
        let pending = self
            .bounded(
                self.contract
                    .voteByRelayer(U256::from(election_id), U256::from(candidate_id), identity)
                    .send(),
            )
            .await?;
        self.confirm(pending).await
    }
}
