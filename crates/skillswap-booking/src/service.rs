//! The booking service: every session lifecycle operation goes through
//! here. Legality and settlement planning live in the core state
//! machine; this layer loads state, executes plans against the store,
//! drives link provisioning and fires notifications.

use chrono::Utc;
use skillswap_core::error::{SwapError, SwapResult};
use skillswap_core::lifecycle::{JoinPath, SessionAction, TransitionPlan, join_gate, plan_transition};
use skillswap_core::models::account::{Account, Availability};
use skillswap_core::models::dispute::{CreateDispute, Dispute, DisputeStatus};
use skillswap_core::models::session::{CreateSession, Session, SessionStatus};
use skillswap_core::repository::{
    DisputeRepository, LedgerEffect, LedgerRepository, PaginatedResult, Pagination,
    SessionRepository,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::BookingConfig;
use crate::meet::MeetingProvisioner;
use crate::notify::Notifier;

/// A learner's request for a teaching session.
#[derive(Debug, Clone)]
pub struct RequestSessionInput {
    pub learner_id: Uuid,
    pub teacher_id: Uuid,
    pub skill: String,
    /// The teacher's offered slot the learner is booking into.
    pub slot: Availability,
    pub scheduled_at: chrono::DateTime<Utc>,
    /// Falls back to the configured default when absent.
    pub duration_hours: Option<u32>,
}

/// Verdict of a dispute review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeOutcome {
    /// Uphold the complaint: unwind the session and refund the learner.
    Resolved,
    /// Dismiss the complaint: the session stands as it is.
    Rejected,
}

pub struct BookingService<L, S, D, M, N>
where
    L: LedgerRepository,
    S: SessionRepository,
    D: DisputeRepository,
    M: MeetingProvisioner,
    N: Notifier,
{
    ledger: L,
    sessions: S,
    disputes: D,
    provisioner: M,
    notifier: N,
    config: BookingConfig,
}

impl<L, S, D, M, N> BookingService<L, S, D, M, N>
where
    L: LedgerRepository,
    S: SessionRepository,
    D: DisputeRepository,
    M: MeetingProvisioner,
    N: Notifier,
{
    pub fn new(
        ledger: L,
        sessions: S,
        disputes: D,
        provisioner: M,
        notifier: N,
        config: BookingConfig,
    ) -> Self {
        Self {
            ledger,
            sessions,
            disputes,
            provisioner,
            notifier,
            config,
        }
    }

    /// Book a session with a teacher. Reserves the learner's credits in
    /// the same transaction that creates the record: a learner who
    /// cannot pay leaves no trace.
    pub async fn request_session(&self, input: RequestSessionInput) -> SwapResult<Session> {
        // 1. Validate the request shape
        if input.learner_id == input.teacher_id {
            return Err(SwapError::Validation {
                message: "cannot book a session with yourself".to_string(),
            });
        }
        if input.skill.trim().is_empty() {
            return Err(SwapError::Validation {
                message: "skill must not be empty".to_string(),
            });
        }
        let duration_hours = input
            .duration_hours
            .unwrap_or(self.config.default_duration_hours);
        if duration_hours == 0 {
            return Err(SwapError::Validation {
                message: "duration must be at least one hour".to_string(),
            });
        }

        // 2. The teacher must actually offer this skill in this slot
        let teacher = self.ledger.get_account(input.teacher_id).await?;
        if !teacher.offers_skill(&input.skill) {
            return Err(SwapError::Validation {
                message: format!("{} does not teach {}", teacher.name, input.skill),
            });
        }
        if !teacher.has_slot(&input.slot) {
            return Err(SwapError::Validation {
                message: format!("{} is not available in that slot", teacher.name),
            });
        }

        // 3. Create the session and reserve the credits atomically
        let cost = duration_hours
            .checked_mul(self.config.credits_per_hour)
            .ok_or_else(|| SwapError::Validation {
                message: "session cost exceeds the credit range".to_string(),
            })?;
        let session = self
            .sessions
            .create(
                CreateSession {
                    teacher_id: input.teacher_id,
                    learner_id: input.learner_id,
                    skill: input.skill,
                    scheduled_at: input.scheduled_at,
                    duration_hours,
                    credits_transferred: cost,
                },
                Some(LedgerEffect::Debit {
                    account_id: input.learner_id,
                    amount: cost,
                }),
            )
            .await?;
        info!(session_id = %session.id, cost, "session requested");

        // 4. Let the teacher know
        self.notify_account(
            &teacher,
            "New session request",
            &format!("You have a new request to teach {}.", session.skill),
        )
        .await;

        Ok(session)
    }

    /// Teacher confirms a request (`Requested` to `Scheduled`).
    pub async fn accept_request(&self, session_id: Uuid, actor: Uuid) -> SwapResult<Session> {
        let session = self.apply(session_id, actor, SessionAction::Accept).await?;
        self.notify_participant(
            session.learner_id,
            "Session confirmed",
            &format!("Your {} session was accepted.", session.skill),
        )
        .await;
        Ok(session)
    }

    /// Teacher turns a request down; the learner's reservation is
    /// refunded.
    pub async fn decline_request(&self, session_id: Uuid, actor: Uuid) -> SwapResult<Session> {
        let session = self.apply(session_id, actor, SessionAction::Decline).await?;
        self.notify_participant(
            session.learner_id,
            "Session declined",
            &format!(
                "Your {} session was declined and your credits refunded.",
                session.skill
            ),
        )
        .await;
        Ok(session)
    }

    /// Either participant backs out before the session runs; the
    /// learner's reservation is refunded.
    pub async fn cancel_session(&self, session_id: Uuid, actor: Uuid) -> SwapResult<Session> {
        let session = self.apply(session_id, actor, SessionAction::Cancel).await?;
        let other = if actor == session.teacher_id {
            session.learner_id
        } else {
            session.teacher_id
        };
        self.notify_participant(
            other,
            "Session cancelled",
            &format!("The {} session was cancelled.", session.skill),
        )
        .await;
        Ok(session)
    }

    /// Join a scheduled session. The first teacher join provisions the
    /// meeting link and moves the session to `Ongoing`; later joins by
    /// either participant return the stored link.
    pub async fn join_session(&self, session_id: Uuid, actor: Uuid) -> SwapResult<Session> {
        // 1. Gate on state, time and the link rule
        let session = self.sessions.get_by_id(session_id).await?;
        let path = join_gate(&session, actor, Utc::now())?;

        // 2. Make sure a link is stored
        match path {
            JoinPath::AlreadyOngoing => return Ok(session),
            JoinPath::HasLink => {}
            JoinPath::ProvisionLink => {
                // The session id doubles as the provider idempotency
                // key, so a retried or racing provision yields the same
                // URL and the claim loser needs no cleanup.
                let url = self.provisioner.create_link(session_id).await?;
                match self.sessions.claim_meeting_link(session_id, &url).await {
                    Ok(_) => {}
                    Err(SwapError::InvalidState { .. }) => {
                        // The session left `Scheduled` between the gate
                        // and the claim.
                        let current = self.sessions.get_by_id(session_id).await?;
                        if current.status == SessionStatus::Ongoing {
                            // A concurrent join already started it; the
                            // stored link is the live one.
                            return Ok(current);
                        }
                        // Cancelled out from under us. The minted link
                        // will never reach anyone, release the room.
                        if let Err(err) = self.provisioner.delete_link(session_id).await {
                            warn!(session_id = %session_id, error = %err, "failed to release unused link");
                        }
                        return Err(invalid_join(&current));
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        // 3. Mark the session as running. A concurrent join may have
        // beaten us to it; converging on `Ongoing` is success.
        let session = self
            .transition_or_noop(
                session_id,
                &[SessionStatus::Scheduled],
                SessionStatus::Ongoing,
                None,
            )
            .await?;
        info!(session_id = %session_id, "session ongoing");

        if actor == session.teacher_id
            && let Some(link) = &session.meeting_link
        {
            self.notify_participant(
                session.learner_id,
                "Session started",
                &format!("Your {} session is live: {link}", session.skill),
            )
            .await;
        }
        Ok(session)
    }

    /// Teacher ends an ongoing session; the reserved credits are paid
    /// out to the teacher.
    pub async fn end_session(&self, session_id: Uuid, actor: Uuid) -> SwapResult<Session> {
        let session = self
            .apply(session_id, actor, SessionAction::Complete)
            .await?;
        info!(session_id = %session_id, credits = session.credits_transferred, "session completed");
        self.notify_participant(
            session.learner_id,
            "Session completed",
            &format!("How was your {} session? Leave a rating.", session.skill),
        )
        .await;
        Ok(session)
    }

    /// Learner rates a completed session. Set-once.
    pub async fn rate_session(
        &self,
        session_id: Uuid,
        actor: Uuid,
        rating: u8,
        feedback: &str,
    ) -> SwapResult<Session> {
        let session = self.sessions.get_by_id(session_id).await?;
        if actor != session.learner_id {
            return Err(SwapError::NotAuthorized {
                reason: "only the learner can rate a session".to_string(),
            });
        }
        if !(1..=5).contains(&rating) {
            return Err(SwapError::Validation {
                message: "rating must be between 1 and 5".to_string(),
            });
        }
        self.sessions.set_feedback(session_id, rating, feedback).await
    }

    /// A participant flags a session for review.
    pub async fn raise_dispute(
        &self,
        session_id: Uuid,
        actor: Uuid,
        reason: &str,
    ) -> SwapResult<Dispute> {
        let session = self.sessions.get_by_id(session_id).await?;
        if !session.is_participant(actor) {
            return Err(SwapError::NotAuthorized {
                reason: "caller is not a participant of this session".to_string(),
            });
        }
        if reason.trim().is_empty() {
            return Err(SwapError::Validation {
                message: "a dispute needs a reason".to_string(),
            });
        }

        let dispute = self
            .disputes
            .create(CreateDispute {
                session_id,
                raised_by: actor,
                reason: reason.to_string(),
            })
            .await?;
        info!(dispute_id = %dispute.id, session_id = %session_id, "dispute raised");
        Ok(dispute)
    }

    /// Close an open dispute. Upholding it unwinds the session and
    /// refunds the learner; the dispute is closed only after the
    /// unwind succeeds, so a failed unwind leaves it open for retry.
    pub async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        outcome: DisputeOutcome,
    ) -> SwapResult<Dispute> {
        // 1. The dispute must still be open
        let dispute = self.disputes.get_by_id(dispute_id).await?;
        if dispute.status != DisputeStatus::Open {
            return Err(SwapError::InvalidState {
                entity: "dispute".to_string(),
                reason: "dispute is already closed".to_string(),
            });
        }

        // 2. An upheld dispute unwinds the session with a refund
        if outcome == DisputeOutcome::Resolved {
            let session = self.sessions.get_by_id(dispute.session_id).await?;
            match plan_transition(&session, SessionAction::CancelByResolution, dispute.raised_by)?
            {
                TransitionPlan::Noop => {}
                TransitionPlan::Apply { to, effect } => {
                    self.transition_or_noop(session.id, &[session.status], to, effect)
                        .await?;
                }
            }
        }

        // 3. Record the verdict
        let status = match outcome {
            DisputeOutcome::Resolved => DisputeStatus::Resolved,
            DisputeOutcome::Rejected => DisputeStatus::Rejected,
        };
        let dispute = self.disputes.close(dispute_id, status).await?;
        info!(dispute_id = %dispute_id, ?status, "dispute closed");

        let session = self.sessions.get_by_id(dispute.session_id).await?;
        for participant in [session.teacher_id, session.learner_id] {
            self.notify_participant(
                participant,
                "Dispute resolved",
                &format!("The dispute on your {} session was reviewed.", session.skill),
            )
            .await;
        }
        Ok(dispute)
    }

    /// Sessions the account takes part in, most recent first.
    pub async fn list_sessions(
        &self,
        account_id: Uuid,
        pagination: Pagination,
    ) -> SwapResult<PaginatedResult<Session>> {
        self.sessions.list_for_account(account_id, pagination).await
    }

    /// Load, plan, execute. The plan's `from` guard is the status we
    /// observed, so a concurrent conflicting transition makes the store
    /// reject ours instead of double-applying the effect.
    async fn apply(
        &self,
        session_id: Uuid,
        actor: Uuid,
        action: SessionAction,
    ) -> SwapResult<Session> {
        let session = self.sessions.get_by_id(session_id).await?;
        match plan_transition(&session, action, actor)? {
            TransitionPlan::Noop => Ok(session),
            TransitionPlan::Apply { to, effect } => {
                self.sessions
                    .transition(session_id, &[session.status], to, effect)
                    .await
            }
        }
    }

    /// Like a plain transition, but losing a race to the target status
    /// counts as success. Only used where the loser's effect must not
    /// apply anyway.
    async fn transition_or_noop(
        &self,
        session_id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
        effect: Option<LedgerEffect>,
    ) -> SwapResult<Session> {
        match self.sessions.transition(session_id, from, to, effect).await {
            Ok(session) => Ok(session),
            Err(err @ SwapError::InvalidState { .. }) => {
                let current = self.sessions.get_by_id(session_id).await?;
                if current.status == to {
                    Ok(current)
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn notify_participant(&self, account_id: Uuid, subject: &str, body: &str) {
        match self.ledger.get_account(account_id).await {
            Ok(account) => self.notify_account(&account, subject, body).await,
            Err(err) => warn!(%account_id, error = %err, "skipping notification, account lookup failed"),
        }
    }

    async fn notify_account(&self, account: &Account, subject: &str, body: &str) {
        if let Err(err) = self.notifier.send(&account.email, subject, body).await {
            warn!(%account.id, error = %err, "notification delivery failed");
        }
    }
}

fn invalid_join(session: &Session) -> SwapError {
    SwapError::InvalidState {
        entity: "session".to_string(),
        reason: format!("cannot join a session in status {:?}", session.status),
    }
}
