//! Session lifecycle state machine.
//!
//! Pure logic: given a session, an action, the acting account and the
//! current time, compute the legal transition and the ledger movement
//! that must accompany it. Persistence and link provisioning live in
//! other crates; this module owns legality, authorization and
//! idempotence.
//!
//! Settlement policy: credits are reserved from the learner when the
//! session is created (`Requested`), so accepting moves no money,
//! completion pays the teacher, and every cancellation before
//! completion refunds the learner the reserved amount exactly once.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{SwapError, SwapResult};
use crate::models::session::{Session, SessionStatus};
use crate::repository::LedgerEffect;

/// Participant actions that drive the state machine. Joining is gated
/// separately through [`join_gate`] because of link provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Teacher accepts a request (`Requested → Scheduled`).
    Accept,
    /// Teacher declines a request (`Requested → Cancelled`, refund).
    Decline,
    /// Either participant cancels before the session runs
    /// (`Requested | Scheduled → Cancelled`, refund).
    Cancel,
    /// Teacher ends an ongoing session (`Ongoing → Completed`, pays
    /// the teacher).
    Complete,
    /// Dispute resolution unwinds any non-terminal session
    /// (`→ Cancelled`, refund). Not subject to participant
    /// authorization.
    CancelByResolution,
}

/// Outcome of planning an action against the observed session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// The action was already applied. Return current state and touch
    /// nothing — re-running a settled action must never move credits
    /// twice.
    Noop,
    /// Transition to `to`, committing `effect` in the same store
    /// transaction.
    Apply {
        to: SessionStatus,
        effect: Option<LedgerEffect>,
    },
}

/// How a join proceeds with respect to the meeting link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPath {
    /// Session is already `Ongoing`; the join is a no-op.
    AlreadyOngoing,
    /// A link exists; transition to `Ongoing` directly.
    HasLink,
    /// No link yet and the actor is the teacher: provision one, claim
    /// it, then transition.
    ProvisionLink,
}

fn refund_learner(session: &Session) -> Option<LedgerEffect> {
    Some(LedgerEffect::Credit {
        account_id: session.learner_id,
        amount: session.credits_transferred,
    })
}

fn pay_teacher(session: &Session) -> Option<LedgerEffect> {
    Some(LedgerEffect::Credit {
        account_id: session.teacher_id,
        amount: session.credits_transferred,
    })
}

fn require_teacher(session: &Session, actor: Uuid, what: &str) -> SwapResult<()> {
    if session.teacher_id != actor {
        return Err(SwapError::NotAuthorized {
            reason: format!("only the session's teacher can {what}"),
        });
    }
    Ok(())
}

fn require_participant(session: &Session, actor: Uuid) -> SwapResult<()> {
    if !session.is_participant(actor) {
        return Err(SwapError::NotAuthorized {
            reason: "caller is not a participant of this session".into(),
        });
    }
    Ok(())
}

fn invalid(session: &Session, action: &str) -> SwapError {
    SwapError::InvalidState {
        entity: "session".into(),
        reason: format!("cannot {action} a session in status {:?}", session.status),
    }
}

/// Plan a lifecycle action. Returns the target status and required
/// ledger movement, `Noop` for idempotent re-entry, or a typed error.
pub fn plan_transition(
    session: &Session,
    action: SessionAction,
    actor: Uuid,
) -> SwapResult<TransitionPlan> {
    use SessionStatus::*;

    match action {
        SessionAction::Accept => {
            require_teacher(session, actor, "accept a request")?;
            match session.status {
                Requested => Ok(TransitionPlan::Apply {
                    to: Scheduled,
                    effect: None,
                }),
                Scheduled => Ok(TransitionPlan::Noop),
                _ => Err(invalid(session, "accept")),
            }
        }
        SessionAction::Decline => {
            require_teacher(session, actor, "decline a request")?;
            match session.status {
                Requested => Ok(TransitionPlan::Apply {
                    to: Cancelled,
                    effect: refund_learner(session),
                }),
                Cancelled => Ok(TransitionPlan::Noop),
                _ => Err(invalid(session, "decline")),
            }
        }
        SessionAction::Cancel => {
            require_participant(session, actor)?;
            match session.status {
                Requested | Scheduled => Ok(TransitionPlan::Apply {
                    to: Cancelled,
                    effect: refund_learner(session),
                }),
                Cancelled => Ok(TransitionPlan::Noop),
                _ => Err(invalid(session, "cancel")),
            }
        }
        SessionAction::Complete => {
            require_teacher(session, actor, "end a session")?;
            match session.status {
                Ongoing => Ok(TransitionPlan::Apply {
                    to: Completed,
                    effect: pay_teacher(session),
                }),
                Completed => Ok(TransitionPlan::Noop),
                _ => Err(invalid(session, "complete")),
            }
        }
        SessionAction::CancelByResolution => match session.status {
            Requested | Scheduled | Ongoing => Ok(TransitionPlan::Apply {
                to: Cancelled,
                effect: refund_learner(session),
            }),
            Cancelled => Ok(TransitionPlan::Noop),
            Completed => Err(invalid(session, "cancel")),
        },
    }
}

/// Gate a join attempt: time check, participant check, and the link
/// rule — until a link exists only the teacher may trigger
/// provisioning; once it exists either participant joins freely.
pub fn join_gate(session: &Session, actor: Uuid, now: DateTime<Utc>) -> SwapResult<JoinPath> {
    require_participant(session, actor)?;

    match session.status {
        SessionStatus::Ongoing => Ok(JoinPath::AlreadyOngoing),
        SessionStatus::Scheduled => {
            if now < session.scheduled_at {
                return Err(SwapError::NotYetStarted {
                    starts_at: session.scheduled_at,
                });
            }
            match &session.meeting_link {
                Some(_) => Ok(JoinPath::HasLink),
                None if actor == session.teacher_id => Ok(JoinPath::ProvisionLink),
                None => Err(SwapError::NotAuthorized {
                    reason: "the teacher has not started the session yet".into(),
                }),
            }
        }
        _ => Err(invalid(session, "join")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(status: SessionStatus) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4(),
            teacher_id: Uuid::new_v4(),
            learner_id: Uuid::new_v4(),
            skill: "Python".into(),
            scheduled_at: now - Duration::minutes(5),
            duration_hours: 1,
            credits_transferred: 1,
            status,
            meeting_link: None,
            feedback: None,
            rating: None,
            dispute_raised: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn accept_schedules_without_moving_credits() {
        let s = session(SessionStatus::Requested);
        let plan = plan_transition(&s, SessionAction::Accept, s.teacher_id).unwrap();
        assert_eq!(
            plan,
            TransitionPlan::Apply {
                to: SessionStatus::Scheduled,
                effect: None,
            }
        );
    }

    #[test]
    fn accept_is_idempotent_on_scheduled() {
        let s = session(SessionStatus::Scheduled);
        let plan = plan_transition(&s, SessionAction::Accept, s.teacher_id).unwrap();
        assert_eq!(plan, TransitionPlan::Noop);
    }

    #[test]
    fn learner_cannot_accept() {
        let s = session(SessionStatus::Requested);
        let err = plan_transition(&s, SessionAction::Accept, s.learner_id).unwrap_err();
        assert!(matches!(err, SwapError::NotAuthorized { .. }));
    }

    #[test]
    fn accept_after_cancel_is_invalid() {
        let s = session(SessionStatus::Cancelled);
        let err = plan_transition(&s, SessionAction::Accept, s.teacher_id).unwrap_err();
        assert!(matches!(err, SwapError::InvalidState { .. }));
    }

    #[test]
    fn decline_refunds_the_learner() {
        let s = session(SessionStatus::Requested);
        let plan = plan_transition(&s, SessionAction::Decline, s.teacher_id).unwrap();
        assert_eq!(
            plan,
            TransitionPlan::Apply {
                to: SessionStatus::Cancelled,
                effect: Some(LedgerEffect::Credit {
                    account_id: s.learner_id,
                    amount: 1,
                }),
            }
        );
    }

    #[test]
    fn either_participant_can_cancel_before_it_runs() {
        for actor in [|s: &Session| s.teacher_id, |s: &Session| s.learner_id] {
            let s = session(SessionStatus::Scheduled);
            let plan = plan_transition(&s, SessionAction::Cancel, actor(&s)).unwrap();
            assert!(matches!(
                plan,
                TransitionPlan::Apply {
                    to: SessionStatus::Cancelled,
                    effect: Some(LedgerEffect::Credit { .. }),
                }
            ));
        }
    }

    #[test]
    fn cancel_twice_refunds_once() {
        let s = session(SessionStatus::Cancelled);
        let plan = plan_transition(&s, SessionAction::Cancel, s.learner_id).unwrap();
        assert_eq!(plan, TransitionPlan::Noop);
    }

    #[test]
    fn participants_cannot_cancel_an_ongoing_session() {
        let s = session(SessionStatus::Ongoing);
        let err = plan_transition(&s, SessionAction::Cancel, s.learner_id).unwrap_err();
        assert!(matches!(err, SwapError::InvalidState { .. }));
    }

    #[test]
    fn completion_pays_the_teacher() {
        let s = session(SessionStatus::Ongoing);
        let plan = plan_transition(&s, SessionAction::Complete, s.teacher_id).unwrap();
        assert_eq!(
            plan,
            TransitionPlan::Apply {
                to: SessionStatus::Completed,
                effect: Some(LedgerEffect::Credit {
                    account_id: s.teacher_id,
                    amount: 1,
                }),
            }
        );
    }

    #[test]
    fn completion_is_idempotent() {
        let s = session(SessionStatus::Completed);
        let plan = plan_transition(&s, SessionAction::Complete, s.teacher_id).unwrap();
        assert_eq!(plan, TransitionPlan::Noop);
    }

    #[test]
    fn resolution_cancels_an_ongoing_session_with_refund() {
        let s = session(SessionStatus::Ongoing);
        let plan = plan_transition(&s, SessionAction::CancelByResolution, s.learner_id).unwrap();
        assert_eq!(
            plan,
            TransitionPlan::Apply {
                to: SessionStatus::Cancelled,
                effect: Some(LedgerEffect::Credit {
                    account_id: s.learner_id,
                    amount: 1,
                }),
            }
        );
    }

    #[test]
    fn resolution_cannot_unwind_a_completed_session() {
        let s = session(SessionStatus::Completed);
        let err =
            plan_transition(&s, SessionAction::CancelByResolution, s.learner_id).unwrap_err();
        assert!(matches!(err, SwapError::InvalidState { .. }));
    }

    #[test]
    fn join_before_start_is_rejected() {
        let mut s = session(SessionStatus::Scheduled);
        s.scheduled_at = Utc::now() + Duration::hours(1);
        let err = join_gate(&s, s.teacher_id, Utc::now()).unwrap_err();
        match err {
            SwapError::NotYetStarted { starts_at } => assert_eq!(starts_at, s.scheduled_at),
            other => panic!("expected NotYetStarted, got {other:?}"),
        }
    }

    #[test]
    fn teacher_join_without_link_provisions() {
        let s = session(SessionStatus::Scheduled);
        let path = join_gate(&s, s.teacher_id, Utc::now()).unwrap();
        assert_eq!(path, JoinPath::ProvisionLink);
    }

    #[test]
    fn learner_join_without_link_is_rejected() {
        let s = session(SessionStatus::Scheduled);
        let err = join_gate(&s, s.learner_id, Utc::now()).unwrap_err();
        assert!(matches!(err, SwapError::NotAuthorized { .. }));
    }

    #[test]
    fn learner_joins_freely_once_link_exists() {
        let mut s = session(SessionStatus::Scheduled);
        s.meeting_link = Some("https://meet.example.com/x".into());
        let path = join_gate(&s, s.learner_id, Utc::now()).unwrap();
        assert_eq!(path, JoinPath::HasLink);
    }

    #[test]
    fn join_is_idempotent_on_ongoing() {
        let s = session(SessionStatus::Ongoing);
        let path = join_gate(&s, s.learner_id, Utc::now()).unwrap();
        assert_eq!(path, JoinPath::AlreadyOngoing);
    }

    #[test]
    fn outsiders_cannot_join() {
        let s = session(SessionStatus::Scheduled);
        let err = join_gate(&s, Uuid::new_v4(), Utc::now()).unwrap_err();
        assert!(matches!(err, SwapError::NotAuthorized { .. }));
    }

    #[test]
    fn join_of_a_requested_session_is_invalid() {
        let s = session(SessionStatus::Requested);
        let err = join_gate(&s, s.teacher_id, Utc::now()).unwrap_err();
        assert!(matches!(err, SwapError::InvalidState { .. }));
    }

    #[test]
    fn terminal_states() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::Requested.is_terminal());
        assert!(!SessionStatus::Scheduled.is_terminal());
        assert!(!SessionStatus::Ongoing.is_terminal());
    }
}
