//! Shared utility functions for the election service

use chrono::Utc;

use crate::error::{ServiceError, ServiceResult};

/// Parse an environment variable into a type implementing FromStr, with a default fallback
pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Current wall-clock time as unix seconds
pub fn now_unix() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Ledger ids are u64; SQLite stores them as i64.
pub fn db_id(id: u64) -> ServiceResult<i64> {
    i64::try_from(id).map_err(|_| ServiceError::Validation(format!("id {} is out of range", id)))
}

/// Trimmed, non-empty text field
pub fn require_text(field: &str, value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}
