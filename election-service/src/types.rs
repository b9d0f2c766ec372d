//! Types for HTTP requests and responses

use alloy::primitives::Address;
use axum::extract::{FromRequest, FromRequestParts};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::ledger::ElectionMode;

/// JSON body whose rejections use the service error format
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServiceError))]
pub struct ApiJson<T>(pub T);

/// Path parameters whose rejections use the service error format
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ServiceError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, Deserialize)]
pub struct SignatureRequest {
    pub election_id: u64,
    pub voter_address: Address,
}

#[derive(Debug, Deserialize)]
pub struct RelayVoteRequest {
    pub election_id: u64,
    pub candidate_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct RecordReceiptRequest {
    pub election_id: u64,
    pub candidate_id: u64,
    pub tx_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct VoteStatusRequest {
    pub election_id: u64,
}

#[derive(Debug, Serialize)]
pub struct VoteStatusResponse {
    pub election_id: u64,
    pub has_voted: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateElectionRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub mode: ElectionMode,
    /// Unix seconds
    pub start_time: Option<u64>,
    /// Unix seconds
    pub end_time: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateNameRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TxResponse {
    pub ok: bool,
    pub tx_hashes: Vec<String>,
}

impl TxResponse {
    pub fn new(tx_hashes: impl IntoIterator<Item = alloy::primitives::TxHash>) -> Self {
        Self {
            ok: true,
            tx_hashes: tx_hashes.into_iter().map(|h| h.to_string()).collect(),
        }
    }
}
