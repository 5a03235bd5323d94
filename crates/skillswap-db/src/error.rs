//! Database-specific error types and conversions.
//!
//! Guarded transaction scripts signal violations through `THROW`n tags
//! (`insufficient_funds`, `invalid_state`, …); [`thrown_guard`] maps
//! those back out of the SurrealDB error so repositories can surface
//! typed `SwapError`s.

use skillswap_core::error::SwapError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid state for {entity} {id}: {reason}")]
    InvalidState {
        entity: String,
        id: String,
        reason: String,
    },
}

impl From<DbError> for SwapError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => SwapError::NotFound { entity, id },
            DbError::InvalidState { entity, reason, .. } => {
                SwapError::InvalidState { entity, reason }
            }
            other => SwapError::Database(other.to_string()),
        }
    }
}

/// Guard tags a transaction script can `THROW`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Guard {
    AccountNotFound,
    SessionNotFound,
    DisputeNotFound,
    InsufficientFunds,
    InvalidState,
}

/// Classify a SurrealDB error by the guard tag thrown inside a
/// transaction script, if any.
pub(crate) fn thrown_guard(err: &surrealdb::Error) -> Option<Guard> {
    let msg = err.to_string();
    if msg.contains("insufficient_funds") {
        Some(Guard::InsufficientFunds)
    } else if msg.contains("invalid_state") {
        Some(Guard::InvalidState)
    } else if msg.contains("account_not_found") {
        Some(Guard::AccountNotFound)
    } else if msg.contains("session_not_found") {
        Some(Guard::SessionNotFound)
    } else if msg.contains("dispute_not_found") {
        Some(Guard::DisputeNotFound)
    } else {
        None
    }
}
