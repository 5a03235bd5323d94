//! End-to-end booking flows against in-memory SurrealDB stores and a
//! fake meeting-link provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};
use skillswap_booking::{
    BookingConfig, BookingService, DisputeOutcome, MeetingProvisioner, ProvisionError,
    RequestSessionInput, TracingNotifier,
};
use skillswap_core::SwapError;
use skillswap_core::models::account::{Account, Availability, CreateAccount, Skill, SkillLevel};
use skillswap_core::models::dispute::DisputeStatus;
use skillswap_core::models::session::{Session, SessionStatus};
use skillswap_core::repository::{LedgerRepository, Pagination, SessionRepository};
use skillswap_db::repository::{
    SurrealDisputeRepository, SurrealLedgerRepository, SurrealSessionRepository,
};
use skillswap_db::run_migrations;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

#[derive(Default)]
struct ProvisionerState {
    minted: Mutex<HashMap<Uuid, String>>,
    mints: AtomicUsize,
    deletes: AtomicUsize,
    fail: AtomicBool,
}

/// Provider fake: idempotent per request id, with switchable outage.
#[derive(Clone, Default)]
struct FakeProvisioner {
    state: Arc<ProvisionerState>,
}

impl FakeProvisioner {
    fn mints(&self) -> usize {
        self.state.mints.load(Ordering::SeqCst)
    }

    fn deletes(&self) -> usize {
        self.state.deletes.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.state.fail.store(failing, Ordering::SeqCst);
    }
}

impl MeetingProvisioner for FakeProvisioner {
    async fn create_link(&self, request_id: Uuid) -> Result<String, ProvisionError> {
        if self.state.fail.load(Ordering::SeqCst) {
            return Err(ProvisionError::Transport("provider down".to_string()));
        }
        let mut minted = self.state.minted.lock().unwrap();
        if let Some(url) = minted.get(&request_id) {
            return Ok(url.clone());
        }
        self.state.mints.fetch_add(1, Ordering::SeqCst);
        let url = format!("https://meet.example.com/{request_id}");
        minted.insert(request_id, url.clone());
        Ok(url)
    }

    async fn delete_link(&self, request_id: Uuid) -> Result<(), ProvisionError> {
        self.state.minted.lock().unwrap().remove(&request_id);
        self.state.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type Service = BookingService<
    SurrealLedgerRepository<Db>,
    SurrealSessionRepository<Db>,
    SurrealDisputeRepository<Db>,
    FakeProvisioner,
    TracingNotifier,
>;

struct Harness {
    service: Service,
    ledger: SurrealLedgerRepository<Db>,
    sessions: SurrealSessionRepository<Db>,
    provisioner: FakeProvisioner,
    teacher: Account,
    learner: Account,
}

fn monday_evening() -> Availability {
    Availability {
        day: "Monday".to_string(),
        time_slot: "18:00 - 20:00".to_string(),
    }
}

async fn setup() -> Harness {
    setup_with(BookingConfig::default()).await
}

async fn setup_with(config: BookingConfig) -> Harness {
    let db = Surreal::new::<Mem>(()).await.expect("in-memory db");
    db.use_ns("test").use_db("test").await.expect("ns/db");
    run_migrations(&db).await.expect("migrations");

    let ledger = SurrealLedgerRepository::new(db.clone());
    let sessions = SurrealSessionRepository::new(db.clone());

    let teacher = ledger
        .create_account(CreateAccount {
            name: "Priya".to_string(),
            email: "priya@example.com".to_string(),
            skills_known: vec![Skill {
                name: "Python".to_string(),
                level: SkillLevel::Advanced,
                verified: true,
            }],
            skills_wanted: vec![],
            availability: vec![monday_evening()],
        })
        .await
        .expect("teacher");
    let learner = ledger
        .create_account(CreateAccount {
            name: "Omar".to_string(),
            email: "omar@example.com".to_string(),
            skills_known: vec![],
            skills_wanted: vec!["Python".to_string()],
            availability: vec![],
        })
        .await
        .expect("learner");
    let learner = ledger.credit(learner.id, 2).await.expect("fund learner");

    let provisioner = FakeProvisioner::default();
    let service = BookingService::new(
        SurrealLedgerRepository::new(db.clone()),
        SurrealSessionRepository::new(db.clone()),
        SurrealDisputeRepository::new(db),
        provisioner.clone(),
        TracingNotifier,
        config,
    );

    Harness {
        service,
        ledger,
        sessions,
        provisioner,
        teacher,
        learner,
    }
}

impl Harness {
    fn request_input(&self, scheduled_at: DateTime<Utc>) -> RequestSessionInput {
        RequestSessionInput {
            learner_id: self.learner.id,
            teacher_id: self.teacher.id,
            skill: "Python".to_string(),
            slot: monday_evening(),
            scheduled_at,
            duration_hours: None,
        }
    }

    /// Book a session whose start time is already in the past, so it
    /// is immediately joinable once accepted.
    async fn requested(&self) -> Session {
        self.service
            .request_session(self.request_input(Utc::now() - Duration::minutes(5)))
            .await
            .expect("request session")
    }

    async fn scheduled(&self) -> Session {
        let session = self.requested().await;
        self.service
            .accept_request(session.id, self.teacher.id)
            .await
            .expect("accept")
    }

    async fn ongoing(&self) -> Session {
        let session = self.scheduled().await;
        self.service
            .join_session(session.id, self.teacher.id)
            .await
            .expect("teacher join")
    }

    async fn balance(&self, account_id: Uuid) -> u32 {
        self.ledger
            .get_account(account_id)
            .await
            .expect("get account")
            .credits
    }
}

#[tokio::test]
async fn request_reserves_credits_immediately() {
    let h = setup().await;

    let session = h.requested().await;

    assert_eq!(session.status, SessionStatus::Requested);
    assert_eq!(session.credits_transferred, 1);
    assert_eq!(session.meeting_link, None);
    assert_eq!(h.balance(h.learner.id).await, 1);
    assert_eq!(h.balance(h.teacher.id).await, 0);
}

#[tokio::test]
async fn request_without_funds_leaves_no_session() {
    let h = setup().await;

    let mut input = h.request_input(Utc::now() + Duration::hours(24));
    input.duration_hours = Some(3);
    let err = h.service.request_session(input).await.expect_err("broke");
    match err {
        SwapError::InsufficientFunds {
            required,
            available,
            ..
        } => {
            assert_eq!(required, 3);
            assert_eq!(available, 2);
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }

    assert_eq!(h.balance(h.learner.id).await, 2);
    let listed = h
        .service
        .list_sessions(h.learner.id, Pagination::default())
        .await
        .expect("list");
    assert_eq!(listed.total, 0);
}

#[tokio::test]
async fn request_validates_skill_slot_and_participants() {
    let h = setup().await;
    let when = Utc::now() + Duration::hours(24);

    let mut input = h.request_input(when);
    input.skill = "Guitar".to_string();
    let err = h.service.request_session(input).await.expect_err("skill");
    assert!(matches!(err, SwapError::Validation { .. }));

    let mut input = h.request_input(when);
    input.slot = Availability {
        day: "Sunday".to_string(),
        time_slot: "08:00 - 09:00".to_string(),
    };
    let err = h.service.request_session(input).await.expect_err("slot");
    assert!(matches!(err, SwapError::Validation { .. }));

    let mut input = h.request_input(when);
    input.learner_id = h.teacher.id;
    let err = h.service.request_session(input).await.expect_err("self");
    assert!(matches!(err, SwapError::Validation { .. }));

    let mut input = h.request_input(when);
    input.duration_hours = Some(0);
    let err = h
        .service
        .request_session(input)
        .await
        .expect_err("duration");
    assert!(matches!(err, SwapError::Validation { .. }));

    // None of the rejected requests touched the ledger.
    assert_eq!(h.balance(h.learner.id).await, 2);
}

#[tokio::test]
async fn request_rejects_a_cost_that_overflows() {
    let h = setup_with(BookingConfig {
        credits_per_hour: 2,
        ..BookingConfig::default()
    })
    .await;

    let mut input = h.request_input(Utc::now() + Duration::hours(24));
    input.duration_hours = Some(u32::MAX);
    let err = h
        .service
        .request_session(input)
        .await
        .expect_err("overflowing cost");
    assert!(matches!(err, SwapError::Validation { .. }));
    assert_eq!(h.balance(h.learner.id).await, 2);
}

#[tokio::test]
async fn accept_is_teacher_only_and_idempotent() {
    let h = setup().await;
    let session = h.requested().await;

    let err = h
        .service
        .accept_request(session.id, h.learner.id)
        .await
        .expect_err("learner accept");
    assert!(matches!(err, SwapError::NotAuthorized { .. }));

    let accepted = h
        .service
        .accept_request(session.id, h.teacher.id)
        .await
        .expect("accept");
    assert_eq!(accepted.status, SessionStatus::Scheduled);

    let again = h
        .service
        .accept_request(session.id, h.teacher.id)
        .await
        .expect("repeat accept");
    assert_eq!(again.status, SessionStatus::Scheduled);

    // Accepting moves no credits; the reservation already happened.
    assert_eq!(h.balance(h.learner.id).await, 1);
    assert_eq!(h.balance(h.teacher.id).await, 0);
}

#[tokio::test]
async fn concurrent_accepts_schedule_the_session_once() {
    let h = setup().await;
    let session = h.requested().await;

    let (first, second) = tokio::join!(
        h.service.accept_request(session.id, h.teacher.id),
        h.service.accept_request(session.id, h.teacher.id),
    );

    // At least one acceptance lands; a racer that read before the
    // commit loses the CAS, one that read after observes the no-op.
    // The store may also surface its own write conflict for the loser.
    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert!(successes >= 1);
    for result in [&first, &second] {
        match result {
            Ok(session) => assert_eq!(session.status, SessionStatus::Scheduled),
            Err(SwapError::InvalidState { .. }) | Err(SwapError::Database(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let current = h.sessions.get_by_id(session.id).await.expect("get");
    assert_eq!(current.status, SessionStatus::Scheduled);

    // However the race went, no credits moved.
    assert_eq!(h.balance(h.learner.id).await, 1);
    assert_eq!(h.balance(h.teacher.id).await, 0);
}

#[tokio::test]
async fn decline_refunds_the_learner_exactly_once() {
    let h = setup().await;
    let session = h.requested().await;

    let declined = h
        .service
        .decline_request(session.id, h.teacher.id)
        .await
        .expect("decline");
    assert_eq!(declined.status, SessionStatus::Cancelled);
    assert_eq!(h.balance(h.learner.id).await, 2);

    let again = h
        .service
        .decline_request(session.id, h.teacher.id)
        .await
        .expect("repeat decline");
    assert_eq!(again.status, SessionStatus::Cancelled);
    assert_eq!(h.balance(h.learner.id).await, 2);
}

#[tokio::test]
async fn cancel_refunds_the_learner_exactly_once() {
    let h = setup().await;
    let session = h.scheduled().await;

    let cancelled = h
        .service
        .cancel_session(session.id, h.learner.id)
        .await
        .expect("cancel");
    assert_eq!(cancelled.status, SessionStatus::Cancelled);
    assert_eq!(h.balance(h.learner.id).await, 2);

    let again = h
        .service
        .cancel_session(session.id, h.learner.id)
        .await
        .expect("repeat cancel");
    assert_eq!(again.status, SessionStatus::Cancelled);
    assert_eq!(h.balance(h.learner.id).await, 2);

    let err = h
        .service
        .cancel_session(session.id, Uuid::new_v4())
        .await
        .expect_err("outsider");
    assert!(matches!(err, SwapError::NotAuthorized { .. }));
}

#[tokio::test]
async fn join_before_start_provisions_nothing() {
    let h = setup().await;
    let session = h
        .service
        .request_session(h.request_input(Utc::now() + Duration::hours(24)))
        .await
        .expect("request");
    h.service
        .accept_request(session.id, h.teacher.id)
        .await
        .expect("accept");

    let err = h
        .service
        .join_session(session.id, h.teacher.id)
        .await
        .expect_err("too early");
    assert!(matches!(err, SwapError::NotYetStarted { .. }));
    assert_eq!(h.provisioner.mints(), 0);

    let current = h.sessions.get_by_id(session.id).await.expect("get");
    assert_eq!(current.status, SessionStatus::Scheduled);
}

#[tokio::test]
async fn learner_cannot_trigger_provisioning() {
    let h = setup().await;
    let session = h.scheduled().await;

    let err = h
        .service
        .join_session(session.id, h.learner.id)
        .await
        .expect_err("learner first");
    assert!(matches!(err, SwapError::NotAuthorized { .. }));
    assert_eq!(h.provisioner.mints(), 0);
}

#[tokio::test]
async fn teacher_join_provisions_one_link_for_both_participants() {
    let h = setup().await;
    let session = h.scheduled().await;

    let started = h
        .service
        .join_session(session.id, h.teacher.id)
        .await
        .expect("teacher join");
    assert_eq!(started.status, SessionStatus::Ongoing);
    let link = started.meeting_link.clone().expect("link");
    assert_eq!(h.provisioner.mints(), 1);

    let learner_view = h
        .service
        .join_session(session.id, h.learner.id)
        .await
        .expect("learner join");
    assert_eq!(learner_view.status, SessionStatus::Ongoing);
    assert_eq!(learner_view.meeting_link.as_deref(), Some(link.as_str()));

    let rejoin = h
        .service
        .join_session(session.id, h.teacher.id)
        .await
        .expect("teacher rejoin");
    assert_eq!(rejoin.meeting_link.as_deref(), Some(link.as_str()));
    assert_eq!(h.provisioner.mints(), 1);
}

#[tokio::test]
async fn simultaneous_teacher_joins_mint_a_single_link() {
    let h = setup().await;
    let session = h.scheduled().await;

    let (first, second) = tokio::join!(
        h.service.join_session(session.id, h.teacher.id),
        h.service.join_session(session.id, h.teacher.id),
    );

    // The provider dedups by session id: one room, however the race
    // interleaves, and the live room is never torn down.
    assert_eq!(h.provisioner.mints(), 1);
    assert_eq!(h.provisioner.deletes(), 0);

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert!(successes >= 1);
    for result in [&first, &second] {
        match result {
            Ok(session) => {
                assert_eq!(session.status, SessionStatus::Ongoing);
                assert!(session.meeting_link.is_some());
            }
            // The in-memory store can surface a write conflict for the
            // loser; it must not mint or delete a second link.
            Err(SwapError::Database(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let current = h.sessions.get_by_id(session.id).await.expect("get");
    assert_eq!(current.status, SessionStatus::Ongoing);
    assert!(current.meeting_link.is_some());
}

#[tokio::test]
async fn provisioning_failure_leaves_the_session_joinable() {
    let h = setup().await;
    let session = h.scheduled().await;

    h.provisioner.set_failing(true);
    let err = h
        .service
        .join_session(session.id, h.teacher.id)
        .await
        .expect_err("provider down");
    assert!(matches!(err, SwapError::ProvisioningFailed(_)));

    let current = h.sessions.get_by_id(session.id).await.expect("get");
    assert_eq!(current.status, SessionStatus::Scheduled);
    assert_eq!(current.meeting_link, None);

    // The provider recovers and the retry succeeds.
    h.provisioner.set_failing(false);
    let started = h
        .service
        .join_session(session.id, h.teacher.id)
        .await
        .expect("retry join");
    assert_eq!(started.status, SessionStatus::Ongoing);
    assert!(started.meeting_link.is_some());
}

#[tokio::test]
async fn end_session_pays_the_teacher_exactly_once() {
    let h = setup().await;
    let session = h.ongoing().await;

    let err = h
        .service
        .end_session(session.id, h.learner.id)
        .await
        .expect_err("learner end");
    assert!(matches!(err, SwapError::NotAuthorized { .. }));

    let completed = h
        .service
        .end_session(session.id, h.teacher.id)
        .await
        .expect("end");
    assert_eq!(completed.status, SessionStatus::Completed);
    assert_eq!(h.balance(h.teacher.id).await, 1);
    assert_eq!(h.balance(h.learner.id).await, 1);

    let again = h
        .service
        .end_session(session.id, h.teacher.id)
        .await
        .expect("repeat end");
    assert_eq!(again.status, SessionStatus::Completed);
    assert_eq!(h.balance(h.teacher.id).await, 1);
}

#[tokio::test]
async fn rating_is_learner_only_completed_only_and_set_once() {
    let h = setup().await;
    let session = h.ongoing().await;

    let err = h
        .service
        .rate_session(session.id, h.learner.id, 5, "great")
        .await
        .expect_err("not completed");
    assert!(matches!(err, SwapError::InvalidState { .. }));

    h.service
        .end_session(session.id, h.teacher.id)
        .await
        .expect("end");

    let err = h
        .service
        .rate_session(session.id, h.teacher.id, 5, "I was great")
        .await
        .expect_err("teacher rating");
    assert!(matches!(err, SwapError::NotAuthorized { .. }));

    let err = h
        .service
        .rate_session(session.id, h.learner.id, 6, "off the scale")
        .await
        .expect_err("out of range");
    assert!(matches!(err, SwapError::Validation { .. }));

    let rated = h
        .service
        .rate_session(session.id, h.learner.id, 5, "great")
        .await
        .expect("rate");
    assert_eq!(rated.rating, Some(5));
    assert_eq!(rated.feedback.as_deref(), Some("great"));

    let err = h
        .service
        .rate_session(session.id, h.learner.id, 1, "changed my mind")
        .await
        .expect_err("second rating");
    assert!(matches!(err, SwapError::InvalidState { .. }));
}

#[tokio::test]
async fn upheld_dispute_unwinds_the_session_and_refunds() {
    let h = setup().await;
    let session = h.scheduled().await;

    let err = h
        .service
        .raise_dispute(session.id, Uuid::new_v4(), "who am I")
        .await
        .expect_err("outsider");
    assert!(matches!(err, SwapError::NotAuthorized { .. }));

    let err = h
        .service
        .raise_dispute(session.id, h.learner.id, "  ")
        .await
        .expect_err("empty reason");
    assert!(matches!(err, SwapError::Validation { .. }));

    let dispute = h
        .service
        .raise_dispute(session.id, h.learner.id, "teacher never showed up")
        .await
        .expect("raise");
    assert_eq!(dispute.status, DisputeStatus::Open);

    let flagged = h.sessions.get_by_id(session.id).await.expect("get");
    assert!(flagged.dispute_raised);

    let resolved = h
        .service
        .resolve_dispute(dispute.id, DisputeOutcome::Resolved)
        .await
        .expect("resolve");
    assert_eq!(resolved.status, DisputeStatus::Resolved);

    let unwound = h.sessions.get_by_id(session.id).await.expect("get");
    assert_eq!(unwound.status, SessionStatus::Cancelled);
    assert_eq!(h.balance(h.learner.id).await, 2);
    assert_eq!(h.balance(h.teacher.id).await, 0);

    let err = h
        .service
        .resolve_dispute(dispute.id, DisputeOutcome::Rejected)
        .await
        .expect_err("second verdict");
    assert!(matches!(err, SwapError::InvalidState { .. }));
}

#[tokio::test]
async fn rejected_dispute_leaves_the_session_untouched() {
    let h = setup().await;
    let session = h.scheduled().await;

    let dispute = h
        .service
        .raise_dispute(session.id, h.teacher.id, "learner keeps rescheduling")
        .await
        .expect("raise");

    let rejected = h
        .service
        .resolve_dispute(dispute.id, DisputeOutcome::Rejected)
        .await
        .expect("reject");
    assert_eq!(rejected.status, DisputeStatus::Rejected);

    let current = h.sessions.get_by_id(session.id).await.expect("get");
    assert_eq!(current.status, SessionStatus::Scheduled);
    assert_eq!(h.balance(h.learner.id).await, 1);
    assert_eq!(h.balance(h.teacher.id).await, 0);
}

#[tokio::test]
async fn credits_are_conserved_across_the_full_lifecycle() {
    let h = setup().await;

    // 2 credits exist in the system throughout; during a pending
    // session one of them is held in escrow by the reservation.
    let session = h.ongoing().await;
    assert_eq!(
        h.balance(h.learner.id).await + h.balance(h.teacher.id).await,
        1
    );

    h.service
        .end_session(session.id, h.teacher.id)
        .await
        .expect("end");
    assert_eq!(
        h.balance(h.learner.id).await + h.balance(h.teacher.id).await,
        2
    );
}
