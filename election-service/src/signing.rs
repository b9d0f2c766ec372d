//! Voter identity hashing and signed vote authorizations.
//!
//! The digest layout must match the contract's `voteBySignature` check
//! byte for byte:
//!
//! ```text
//! keccak256(abi.encodePacked(address contract, uint256 electionId,
//!                            address voter, bytes32 voterHash, uint256 deadline))
//! ```
//!
//! and is signed as an EIP-191 personal message over the 32 digest bytes.

use alloy::primitives::{keccak256, Address, Signature, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol_types::SolValue;
use serde::Serialize;
use thiserror::Error;

use crate::ledger::IdentityHash;

/// Derive the ledger-facing voting key from a voter's durable identifier.
pub fn identity_hash(voter_id: &str) -> IdentityHash {
    keccak256(voter_id.as_bytes())
}

pub fn authorization_digest(
    contract: Address,
    election_id: u64,
    voter: Address,
    identity: IdentityHash,
    deadline: u64,
) -> B256 {
    let packed = (
        contract,
        U256::from(election_id),
        voter,
        identity,
        U256::from(deadline),
    )
        .abi_encode_packed();
    keccak256(packed)
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("authorization deadline overflows: issued at {issued_at} with ttl {ttl_secs}s")]
    DeadlineOverflow { issued_at: u64, ttl_secs: u64 },
    #[error(transparent)]
    Signer(#[from] alloy::signers::Error),
}

/// Authorization handed to a voter who submits `voteBySignature` themselves.
/// Redeemable for any candidate of the election until `deadline`.
#[derive(Debug, Clone, Serialize)]
pub struct VoteAuthorization {
    pub identity_hash: IdentityHash,
    pub deadline: u64,
    #[serde(serialize_with = "serialize_signature")]
    pub signature: Signature,
}

fn serialize_signature<S: serde::Serializer>(sig: &Signature, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("0x{}", hex::encode(sig.as_bytes())))
}

/// Service-held key that issues vote authorizations
pub struct VoteSigner {
    signer: PrivateKeySigner,
    contract: Address,
    ttl_secs: u64,
}

impl VoteSigner {
    pub fn new(signer: PrivateKeySigner, contract: Address, ttl_secs: u64) -> Self {
        Self {
            signer,
            contract,
            ttl_secs,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn authorize(
        &self,
        election_id: u64,
        voter: Address,
        identity: IdentityHash,
        issued_at: u64,
    ) -> Result<VoteAuthorization, SigningError> {
        let deadline = issued_at
            .checked_add(self.ttl_secs)
            .ok_or(SigningError::DeadlineOverflow {
                issued_at,
                ttl_secs: self.ttl_secs,
            })?;
        let digest = authorization_digest(self.contract, election_id, voter, identity, deadline);
        let signature = self.signer.sign_message_sync(digest.as_slice())?;
        Ok(VoteAuthorization {
            identity_hash: identity,
            deadline,
            signature,
        })
    }
}
