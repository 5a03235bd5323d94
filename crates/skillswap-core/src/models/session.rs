//! Session domain model — one scheduled teaching engagement between two
//! accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Requested,
    Scheduled,
    Ongoing,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Terminal sessions are retained for history and credit audit;
    /// no further transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub learner_id: Uuid,
    pub skill: String,
    /// Agreed session start (UTC).
    pub scheduled_at: DateTime<Utc>,
    pub duration_hours: u32,
    /// Credits reserved from the learner at booking time and paid to
    /// the teacher on completion.
    pub credits_transferred: u32,
    pub status: SessionStatus,
    /// Present iff a meeting link has been provisioned. Once set,
    /// immutable.
    pub meeting_link: Option<String>,
    pub feedback: Option<String>,
    pub rating: Option<u8>,
    pub dispute_raised: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_participant(&self, account_id: Uuid) -> bool {
        self.teacher_id == account_id || self.learner_id == account_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSession {
    pub teacher_id: Uuid,
    pub learner_id: Uuid,
    pub skill: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_hours: u32,
    pub credits_transferred: u32,
}
