//! Service error taxonomy and its HTTP mapping

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("election is locked; candidate changes are not allowed")]
    Locked,
    #[error("result is already published")]
    AlreadyPublished,
    #[error("result is not yet finalized")]
    NotFinalized,
    #[error("voter has already voted in this election")]
    AlreadyVoted,
    #[error("election not found")]
    ElectionNotFound,
    #[error("candidate not found")]
    CandidateNotFound,
    #[error("election is closed")]
    ElectionClosed,
    #[error("vote is not recorded on the ledger")]
    VoteNotConfirmed,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(LedgerError),
    #[error("ledger rejected the transaction: {0}")]
    LedgerRejected(String),
    #[error("ledger outcome unknown; check vote status before retrying")]
    LedgerOutcomeUnknown,
    #[error("vote signer is not configured")]
    SignerUnavailable,
    #[error("unauthorized")]
    Unauthorized,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Map a failed ledger read. Reads never have an unknown outcome.
    pub fn from_read(err: LedgerError) -> Self {
        ServiceError::LedgerUnavailable(err)
    }

    /// Map a failed ledger write, keeping "maybe applied" distinct from "rejected".
    pub fn from_write(err: LedgerError) -> Self {
        match err {
            e if e.is_unknown_outcome() => ServiceError::LedgerOutcomeUnknown,
            LedgerError::Rejected(reason) => ServiceError::LedgerRejected(reason),
            other => ServiceError::LedgerUnavailable(other),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::CandidateNotFound => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Locked => StatusCode::LOCKED,
            ServiceError::AlreadyPublished
            | ServiceError::NotFinalized
            | ServiceError::AlreadyVoted
            | ServiceError::VoteNotConfirmed => StatusCode::CONFLICT,
            ServiceError::ElectionNotFound | ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ElectionClosed => StatusCode::FORBIDDEN,
            ServiceError::LedgerUnavailable(_) | ServiceError::SignerUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::LedgerRejected(_) => StatusCode::BAD_GATEWAY,
            ServiceError::LedgerOutcomeUnknown => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Database(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ServiceError {
    fn from(rejection: PathRejection) -> Self {
        ServiceError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the log
        let reason = match &self {
            ServiceError::Database(e) => {
                error!("database failure: {}", e);
                "internal error".to_string()
            }
            ServiceError::Internal(e) => {
                error!("internal failure: {}", e);
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "ok": false, "reason": reason }))).into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
