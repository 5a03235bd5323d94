//! Error types for the SkillSwap system.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid state for {entity}: {reason}")]
    InvalidState { entity: String, reason: String },

    #[error("Not authorized: {reason}")]
    NotAuthorized { reason: String },

    #[error("Insufficient credits: account {account_id} needs {required} but has {available}")]
    InsufficientFunds {
        account_id: Uuid,
        required: u32,
        available: u32,
    },

    #[error("Session has not started yet (scheduled for {starts_at})")]
    NotYetStarted { starts_at: DateTime<Utc> },

    #[error("Meeting link provisioning failed: {0}")]
    ProvisioningFailed(String),

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),
}

pub type SwapResult<T> = Result<T, SwapError>;
