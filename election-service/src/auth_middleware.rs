//! Authentication plumbing. Sessions are issued upstream; this service only
//! checks the admin bearer token and reads the voter id the proxy injects.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::info;

use crate::error::ServiceError;
use crate::state::AppState;

pub const VOTER_ID_HEADER: &str = "x-voter-id";

/// Middleware guarding the admin routes.
pub async fn admin_auth(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let Some(expected) = app_state.admin_token.as_deref() else {
        info!("Admin request rejected: ADMIN_API_TOKEN is not configured");
        return Err(ServiceError::Unauthorized);
    };

    let token = extract_bearer_token(&headers)?;
    if !constant_time_eq(token, expected) {
        info!("Admin request rejected: invalid token for {}", request.uri().path());
        return Err(ServiceError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Extract Bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ServiceError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(ServiceError::Unauthorized)?
        .to_str()
        .map_err(|_| ServiceError::Unauthorized)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ServiceError::Unauthorized)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// The authenticated voter's durable identifier (student number)
#[derive(Debug, Clone)]
pub struct VoterId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for VoterId {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(VOTER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| VoterId(v.to_string()))
            .ok_or(ServiceError::Unauthorized)
    }
}
