//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Guarded operations — balance
//! debits, status transitions, link claims — must run their guard and
//! their mutation as one store transaction, so that concurrent
//! conflicting calls serialize and exactly one wins.

use uuid::Uuid;

use crate::error::SwapResult;
use crate::models::{
    account::{Account, CreateAccount},
    dispute::{CreateDispute, Dispute, DisputeStatus},
    session::{CreateSession, Session, SessionStatus},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

/// A ledger movement that must commit atomically with the operation it
/// accompanies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    /// Remove `amount` credits. Fails with `InsufficientFunds` when the
    /// balance is lower; never produces a negative balance.
    Debit { account_id: Uuid, amount: u32 },
    /// Add `amount` credits.
    Credit { account_id: Uuid, amount: u32 },
}

// ---------------------------------------------------------------------------
// Ledger (accounts and balances)
// ---------------------------------------------------------------------------

pub trait LedgerRepository: Send + Sync {
    fn create_account(
        &self,
        input: CreateAccount,
    ) -> impl Future<Output = SwapResult<Account>> + Send;
    fn get_account(&self, id: Uuid) -> impl Future<Output = SwapResult<Account>> + Send;

    /// Atomically remove credits from an account. The balance check and
    /// the write are one indivisible unit; no caller ever observes an
    /// intermediate state.
    fn debit(
        &self,
        account_id: Uuid,
        amount: u32,
    ) -> impl Future<Output = SwapResult<Account>> + Send;

    /// Atomically add credits to an account.
    fn credit(
        &self,
        account_id: Uuid,
        amount: u32,
    ) -> impl Future<Output = SwapResult<Account>> + Send;
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub trait SessionRepository: Send + Sync {
    /// Create a session in `Requested`. When `reserve` is given, the
    /// ledger movement commits in the same transaction as the record
    /// creation: on `InsufficientFunds` no session is written.
    fn create(
        &self,
        input: CreateSession,
        reserve: Option<LedgerEffect>,
    ) -> impl Future<Output = SwapResult<Session>> + Send;

    fn get_by_id(&self, id: Uuid) -> impl Future<Output = SwapResult<Session>> + Send;

    /// Compare-and-swap status transition. Fails with `InvalidState`
    /// unless the current status is one of `from`; `effect` commits in
    /// the same transaction as the status write, so a losing racer can
    /// never move credits.
    fn transition(
        &self,
        id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
        effect: Option<LedgerEffect>,
    ) -> impl Future<Output = SwapResult<Session>> + Send;

    /// Set the meeting link iff none is stored yet, then return the
    /// stored session: the loser of a claim race reads back the
    /// winner's link, never overwrites it. Fails with `InvalidState`
    /// unless the session is `Scheduled`, so a link can never attach
    /// to a cancelled or finished session.
    fn claim_meeting_link(
        &self,
        id: Uuid,
        url: &str,
    ) -> impl Future<Output = SwapResult<Session>> + Send;

    /// Record learner feedback on a completed session. Set-once: fails
    /// with `InvalidState` when a rating is already stored or the
    /// session is not `Completed`.
    fn set_feedback(
        &self,
        id: Uuid,
        rating: u8,
        feedback: &str,
    ) -> impl Future<Output = SwapResult<Session>> + Send;

    /// Sessions where the account is either participant, most recent
    /// first.
    fn list_for_account(
        &self,
        account_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = SwapResult<PaginatedResult<Session>>> + Send;
}

// ---------------------------------------------------------------------------
// Disputes
// ---------------------------------------------------------------------------

pub trait DisputeRepository: Send + Sync {
    /// Create the dispute and flag `dispute_raised` on the session in
    /// one transaction.
    fn create(&self, input: CreateDispute) -> impl Future<Output = SwapResult<Dispute>> + Send;

    fn get_by_id(&self, id: Uuid) -> impl Future<Output = SwapResult<Dispute>> + Send;

    fn list_for_session(
        &self,
        session_id: Uuid,
    ) -> impl Future<Output = SwapResult<Vec<Dispute>>> + Send;

    /// Close an open dispute as `Resolved` or `Rejected`. Fails with
    /// `InvalidState` when already closed.
    fn close(
        &self,
        id: Uuid,
        status: DisputeStatus,
    ) -> impl Future<Output = SwapResult<Dispute>> + Send;
}
