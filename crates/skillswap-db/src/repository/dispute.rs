//! SurrealDB implementation of [`DisputeRepository`].

use chrono::{DateTime, Utc};
use skillswap_core::error::{SwapError, SwapResult};
use skillswap_core::models::dispute::{CreateDispute, Dispute, DisputeStatus};
use skillswap_core::repository::DisputeRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, Guard, thrown_guard};

#[derive(Debug, SurrealValue)]
struct DisputeRow {
    session_id: String,
    raised_by: String,
    reason: String,
    status: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, SurrealValue)]
struct DisputeRowWithId {
    record_id: String,
    session_id: String,
    raised_by: String,
    reason: String,
    status: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

fn parse_status(value: &str) -> Result<DisputeStatus, DbError> {
    match value {
        "Open" => Ok(DisputeStatus::Open),
        "Resolved" => Ok(DisputeStatus::Resolved),
        "Rejected" => Ok(DisputeStatus::Rejected),
        other => Err(DbError::Migration(format!(
            "unknown dispute status: {other}"
        ))),
    }
}

fn status_to_string(status: DisputeStatus) -> &'static str {
    match status {
        DisputeStatus::Open => "Open",
        DisputeStatus::Resolved => "Resolved",
        DisputeStatus::Rejected => "Rejected",
    }
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Migration(format!("bad {field} uuid: {e}")))
}

impl DisputeRow {
    fn into_dispute(self, id: Uuid) -> Result<Dispute, DbError> {
        Ok(Dispute {
            id,
            session_id: parse_uuid(&self.session_id, "session_id")?,
            raised_by: parse_uuid(&self.raised_by, "raised_by")?,
            reason: self.reason,
            status: parse_status(&self.status)?,
            created_at: self.created_at,
            resolved_at: self.resolved_at,
        })
    }
}

impl DisputeRowWithId {
    fn into_dispute(self) -> Result<Dispute, DbError> {
        let id = parse_uuid(&self.record_id, "record_id")?;
        DisputeRow {
            session_id: self.session_id,
            raised_by: self.raised_by,
            reason: self.reason,
            status: self.status,
            created_at: self.created_at,
            resolved_at: self.resolved_at,
        }
        .into_dispute(id)
    }
}

/// Dispute store backed by SurrealDB.
pub struct SurrealDisputeRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealDisputeRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> DisputeRepository for SurrealDisputeRepository<C> {
    async fn create(&self, input: CreateDispute) -> SwapResult<Dispute> {
        let id = Uuid::new_v4();

        let result = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 LET $sess = (SELECT * FROM ONLY type::record('session', $session_id)); \
                 IF $sess == NONE { THROW 'session_not_found' }; \
                 CREATE type::record('dispute', $id) SET \
                 session_id = $session_id, raised_by = $raised_by, \
                 reason = $reason, status = 'Open', resolved_at = NONE; \
                 UPDATE type::record('session', $session_id) SET \
                 dispute_raised = true, updated_at = time::now(); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .bind(("session_id", input.session_id.to_string()))
            .bind(("raised_by", input.raised_by.to_string()))
            .bind(("reason", input.reason))
            .await
            .and_then(|response| response.check());

        match result {
            Ok(_) => {
                debug!(dispute_id = %id, session_id = %input.session_id, "dispute opened");
                self.get_by_id(id).await
            }
            Err(err) => Err(match thrown_guard(&err) {
                Some(Guard::SessionNotFound) => SwapError::NotFound {
                    entity: "session".to_string(),
                    id: input.session_id.to_string(),
                },
                _ => DbError::from(err).into(),
            }),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> SwapResult<Dispute> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('dispute', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DisputeRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "dispute".to_string(),
            id: id.to_string(),
        })?;

        Ok(row.into_dispute(id)?)
    }

    async fn list_for_session(&self, session_id: Uuid) -> SwapResult<Vec<Dispute>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM dispute \
                 WHERE session_id = $session_id \
                 ORDER BY created_at ASC",
            )
            .bind(("session_id", session_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DisputeRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| row.into_dispute().map_err(SwapError::from))
            .collect()
    }

    async fn close(&self, id: Uuid, status: DisputeStatus) -> SwapResult<Dispute> {
        let result = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 LET $disp = (SELECT * FROM ONLY type::record('dispute', $id)); \
                 IF $disp == NONE { THROW 'dispute_not_found' }; \
                 IF $disp.status != 'Open' { THROW 'invalid_state' }; \
                 UPDATE type::record('dispute', $id) SET \
                 status = $status, resolved_at = time::now(); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .bind(("status", status_to_string(status).to_string()))
            .await
            .and_then(|response| response.check());

        match result {
            Ok(_) => {
                debug!(dispute_id = %id, status = status_to_string(status), "dispute closed");
                self.get_by_id(id).await
            }
            Err(err) => Err(match thrown_guard(&err) {
                Some(Guard::DisputeNotFound) => SwapError::NotFound {
                    entity: "dispute".to_string(),
                    id: id.to_string(),
                },
                Some(Guard::InvalidState) => SwapError::InvalidState {
                    entity: "dispute".to_string(),
                    reason: "dispute is already closed".to_string(),
                },
                _ => DbError::from(err).into(),
            }),
        }
    }
}
