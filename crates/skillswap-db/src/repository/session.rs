//! SurrealDB implementation of [`SessionRepository`].

use chrono::{DateTime, Utc};
use skillswap_core::error::{SwapError, SwapResult};
use skillswap_core::models::session::{CreateSession, Session, SessionStatus};
use skillswap_core::repository::{LedgerEffect, PaginatedResult, Pagination, SessionRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{effect_account, effect_parts, effect_sql, insufficient_funds};
use crate::error::{DbError, Guard, thrown_guard};

#[derive(Debug, SurrealValue)]
struct SessionRow {
    teacher_id: String,
    learner_id: String,
    skill: String,
    scheduled_at: DateTime<Utc>,
    duration_hours: u32,
    credits_transferred: u32,
    status: String,
    meeting_link: Option<String>,
    feedback: Option<String>,
    rating: Option<u32>,
    dispute_raised: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct SessionRowWithId {
    record_id: String,
    teacher_id: String,
    learner_id: String,
    skill: String,
    scheduled_at: DateTime<Utc>,
    duration_hours: u32,
    credits_transferred: u32,
    status: String,
    meeting_link: Option<String>,
    feedback: Option<String>,
    rating: Option<u32>,
    dispute_raised: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_status(value: &str) -> Result<SessionStatus, DbError> {
    match value {
        "Requested" => Ok(SessionStatus::Requested),
        "Scheduled" => Ok(SessionStatus::Scheduled),
        "Ongoing" => Ok(SessionStatus::Ongoing),
        "Completed" => Ok(SessionStatus::Completed),
        "Cancelled" => Ok(SessionStatus::Cancelled),
        other => Err(DbError::Migration(format!(
            "unknown session status: {other}"
        ))),
    }
}

fn status_to_string(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Requested => "Requested",
        SessionStatus::Scheduled => "Scheduled",
        SessionStatus::Ongoing => "Ongoing",
        SessionStatus::Completed => "Completed",
        SessionStatus::Cancelled => "Cancelled",
    }
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Migration(format!("bad {field} uuid: {e}")))
}

fn parse_rating(value: Option<u32>) -> Result<Option<u8>, DbError> {
    value
        .map(|r| u8::try_from(r).map_err(|_| DbError::Migration(format!("rating out of range: {r}"))))
        .transpose()
}

impl SessionRow {
    fn into_session(self, id: Uuid) -> Result<Session, DbError> {
        Ok(Session {
            id,
            teacher_id: parse_uuid(&self.teacher_id, "teacher_id")?,
            learner_id: parse_uuid(&self.learner_id, "learner_id")?,
            skill: self.skill,
            scheduled_at: self.scheduled_at,
            duration_hours: self.duration_hours,
            credits_transferred: self.credits_transferred,
            status: parse_status(&self.status)?,
            meeting_link: self.meeting_link,
            feedback: self.feedback,
            rating: parse_rating(self.rating)?,
            dispute_raised: self.dispute_raised,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl SessionRowWithId {
    fn into_session(self) -> Result<Session, DbError> {
        let id = parse_uuid(&self.record_id, "record_id")?;
        SessionRow {
            teacher_id: self.teacher_id,
            learner_id: self.learner_id,
            skill: self.skill,
            scheduled_at: self.scheduled_at,
            duration_hours: self.duration_hours,
            credits_transferred: self.credits_transferred,
            status: self.status,
            meeting_link: self.meeting_link,
            feedback: self.feedback,
            rating: self.rating,
            dispute_raised: self.dispute_raised,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_session(id)
    }
}

const CREATE_SESSION_SQL: &str = "\
 CREATE type::record('session', $id) SET \
 teacher_id = $teacher_id, learner_id = $learner_id, skill = $skill, \
 scheduled_at = $scheduled_at, duration_hours = $duration_hours, \
 credits_transferred = $credits_transferred, status = 'Requested', \
 meeting_link = NONE, feedback = NONE, rating = NONE, \
 dispute_raised = false";

/// Session store backed by SurrealDB.
pub struct SurrealSessionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSessionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SessionRepository for SurrealSessionRepository<C> {
    async fn create(
        &self,
        input: CreateSession,
        reserve: Option<LedgerEffect>,
    ) -> SwapResult<Session> {
        let id = Uuid::new_v4();

        let mut query = match &reserve {
            Some(effect) => {
                let sql = format!(
                    "BEGIN TRANSACTION; {} {CREATE_SESSION_SQL}; COMMIT TRANSACTION;",
                    effect_sql(effect)
                );
                let (account, amount) = effect_parts(effect);
                self.db
                    .query(sql)
                    .bind(("effect_account", account))
                    .bind(("effect_amount", amount))
            }
            None => self.db.query(CREATE_SESSION_SQL),
        };
        query = query
            .bind(("id", id.to_string()))
            .bind(("teacher_id", input.teacher_id.to_string()))
            .bind(("learner_id", input.learner_id.to_string()))
            .bind(("skill", input.skill))
            .bind(("scheduled_at", input.scheduled_at))
            .bind(("duration_hours", input.duration_hours))
            .bind(("credits_transferred", input.credits_transferred));

        let result = query.await.and_then(|response| response.check());
        match result {
            Ok(_) => {
                debug!(session_id = %id, "session created");
                self.get_by_id(id).await
            }
            Err(err) => Err(match (thrown_guard(&err), &reserve) {
                (Some(Guard::InsufficientFunds), Some(effect)) => {
                    let (_, amount) = effect_parts(effect);
                    insufficient_funds(&self.db, effect_account(effect), amount).await
                }
                (Some(Guard::AccountNotFound), Some(effect)) => {
                    let (account, _) = effect_parts(effect);
                    SwapError::NotFound {
                        entity: "account".to_string(),
                        id: account,
                    }
                }
                _ => DbError::from(err).into(),
            }),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> SwapResult<Session> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('session', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".to_string(),
            id: id.to_string(),
        })?;

        Ok(row.into_session(id)?)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
        effect: Option<LedgerEffect>,
    ) -> SwapResult<Session> {
        let from_strs: Vec<String> = from
            .iter()
            .map(|s| status_to_string(*s).to_string())
            .collect();

        let mut sql = String::from(
            "BEGIN TRANSACTION; \
             LET $sess = (SELECT * FROM ONLY type::record('session', $id)); \
             IF $sess == NONE { THROW 'session_not_found' }; \
             IF $sess.status NOT IN $from { THROW 'invalid_state' }; ",
        );
        if let Some(effect) = &effect {
            sql.push_str(effect_sql(effect));
        }
        sql.push_str(
            "UPDATE type::record('session', $id) SET \
             status = $to, updated_at = time::now(); \
             COMMIT TRANSACTION;",
        );

        let mut query = self
            .db
            .query(sql)
            .bind(("id", id.to_string()))
            .bind(("from", from_strs.clone()))
            .bind(("to", status_to_string(to).to_string()));
        if let Some(effect) = &effect {
            let (account, amount) = effect_parts(effect);
            query = query
                .bind(("effect_account", account))
                .bind(("effect_amount", amount));
        }

        let result = query.await.and_then(|response| response.check());
        match result {
            Ok(_) => {
                debug!(session_id = %id, to = status_to_string(to), "session transitioned");
                self.get_by_id(id).await
            }
            Err(err) => Err(match (thrown_guard(&err), &effect) {
                (Some(Guard::SessionNotFound), _) => SwapError::NotFound {
                    entity: "session".to_string(),
                    id: id.to_string(),
                },
                (Some(Guard::InvalidState), _) => SwapError::InvalidState {
                    entity: "session".to_string(),
                    reason: format!(
                        "transition to {} requires status in {from_strs:?}",
                        status_to_string(to)
                    ),
                },
                (Some(Guard::InsufficientFunds), Some(effect)) => {
                    let (_, amount) = effect_parts(effect);
                    insufficient_funds(&self.db, effect_account(effect), amount).await
                }
                (Some(Guard::AccountNotFound), Some(effect)) => {
                    let (account, _) = effect_parts(effect);
                    SwapError::NotFound {
                        entity: "account".to_string(),
                        id: account,
                    }
                }
                _ => DbError::from(err).into(),
            }),
        }
    }

    async fn claim_meeting_link(&self, id: Uuid, url: &str) -> SwapResult<Session> {
        // The status guard keeps a racing cancel from ending up with a
        // link attached to a dead session.
        let result = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 LET $sess = (SELECT * FROM ONLY type::record('session', $id)); \
                 IF $sess == NONE { THROW 'session_not_found' }; \
                 IF $sess.status != 'Scheduled' { THROW 'invalid_state' }; \
                 UPDATE type::record('session', $id) SET \
                 meeting_link = $url, updated_at = time::now() \
                 WHERE meeting_link = NONE; \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .bind(("url", url.to_string()))
            .await
            .and_then(|response| response.check());

        match result {
            // The re-read returns whichever link won the claim.
            Ok(_) => self.get_by_id(id).await,
            Err(err) => Err(match thrown_guard(&err) {
                Some(Guard::SessionNotFound) => SwapError::NotFound {
                    entity: "session".to_string(),
                    id: id.to_string(),
                },
                Some(Guard::InvalidState) => SwapError::InvalidState {
                    entity: "session".to_string(),
                    reason: "meeting links attach only to scheduled sessions".to_string(),
                },
                _ => DbError::from(err).into(),
            }),
        }
    }

    async fn set_feedback(&self, id: Uuid, rating: u8, feedback: &str) -> SwapResult<Session> {
        let result = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 LET $sess = (SELECT * FROM ONLY type::record('session', $id)); \
                 IF $sess == NONE { THROW 'session_not_found' }; \
                 IF $sess.status != 'Completed' { THROW 'invalid_state' }; \
                 IF $sess.rating != NONE { THROW 'invalid_state' }; \
                 UPDATE type::record('session', $id) SET \
                 rating = $rating, feedback = $feedback, updated_at = time::now(); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .bind(("rating", u32::from(rating)))
            .bind(("feedback", feedback.to_string()))
            .await
            .and_then(|response| response.check());

        match result {
            Ok(_) => self.get_by_id(id).await,
            Err(err) => Err(match thrown_guard(&err) {
                Some(Guard::SessionNotFound) => SwapError::NotFound {
                    entity: "session".to_string(),
                    id: id.to_string(),
                },
                Some(Guard::InvalidState) => SwapError::InvalidState {
                    entity: "session".to_string(),
                    reason: "feedback requires a completed, unrated session".to_string(),
                },
                _ => DbError::from(err).into(),
            }),
        }
    }

    async fn list_for_account(
        &self,
        account_id: Uuid,
        pagination: Pagination,
    ) -> SwapResult<PaginatedResult<Session>> {
        let account = account_id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM session \
                 WHERE teacher_id = $account OR learner_id = $account \
                 GROUP ALL",
            )
            .query(
                "SELECT meta::id(id) AS record_id, * FROM session \
                 WHERE teacher_id = $account OR learner_id = $account \
                 ORDER BY scheduled_at DESC \
                 LIMIT $limit START $offset",
            )
            .bind(("account", account))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let counts: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = counts.first().map(|c| c.total).unwrap_or(0);

        let rows: Vec<SessionRowWithId> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.into_session().map_err(SwapError::from))
            .collect::<SwapResult<Vec<_>>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
