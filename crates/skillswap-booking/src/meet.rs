//! Meeting-link provisioning.
//!
//! The provider is expected to treat the request id as an idempotency
//! key: creating a link twice for the same id returns the same URL.
//! At-most-once exposure of a link on a session is enforced by the
//! store's claim, not here.

use serde::{Deserialize, Serialize};
use skillswap_core::SwapError;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider response carried no meeting link")]
    MissingLink,
}

impl From<ProvisionError> for SwapError {
    fn from(err: ProvisionError) -> Self {
        SwapError::ProvisioningFailed(err.to_string())
    }
}

/// External meeting-link provider.
pub trait MeetingProvisioner: Send + Sync {
    /// Create a link keyed by `request_id`.
    fn create_link(
        &self,
        request_id: Uuid,
    ) -> impl Future<Output = Result<String, ProvisionError>> + Send;

    /// Release the room minted for `request_id`. The provider dedups
    /// by request id, so this tears down the one room that key maps
    /// to: call it only once no participant will ever receive the
    /// link. Best effort.
    fn delete_link(&self, request_id: Uuid)
    -> impl Future<Output = Result<(), ProvisionError>> + Send;
}

#[derive(Serialize)]
struct CreateLinkRequest {
    request_id: Uuid,
}

#[derive(Deserialize)]
struct CreateLinkResponse {
    url: String,
}

/// HTTP client for the meeting-link provider.
pub struct HttpMeetProvisioner {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMeetProvisioner {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, ProvisionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProvisionError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl MeetingProvisioner for HttpMeetProvisioner {
    async fn create_link(&self, request_id: Uuid) -> Result<String, ProvisionError> {
        let response = self
            .client
            .post(format!("{}/links", self.endpoint))
            .json(&CreateLinkRequest { request_id })
            .send()
            .await
            .map_err(|e| ProvisionError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProvisionError::Transport(e.to_string()))?;

        let body: CreateLinkResponse = response
            .json()
            .await
            .map_err(|_| ProvisionError::MissingLink)?;
        if body.url.is_empty() {
            return Err(ProvisionError::MissingLink);
        }
        Ok(body.url)
    }

    async fn delete_link(&self, request_id: Uuid) -> Result<(), ProvisionError> {
        self.client
            .delete(format!("{}/links/{request_id}", self.endpoint))
            .send()
            .await
            .map_err(|e| ProvisionError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProvisionError::Transport(e.to_string()))?;
        Ok(())
    }
}
