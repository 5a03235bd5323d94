//! SurrealDB repository implementations.
//!
//! Guarded writes run as `BEGIN TRANSACTION … COMMIT` scripts whose
//! guards `THROW` a tag on violation; the shared ledger fragments below
//! are spliced into session transitions so a status change and its
//! accompanying credit movement commit as one unit.

mod account;
mod dispute;
mod session;

pub use account::SurrealLedgerRepository;
pub use dispute::SurrealDisputeRepository;
pub use session::SurrealSessionRepository;

use skillswap_core::error::SwapError;
use skillswap_core::repository::LedgerEffect;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

/// Script fragment: guarded balance removal. Binds `$effect_account`
/// and `$effect_amount`.
pub(crate) const DEBIT_FRAGMENT: &str = "\
 LET $effect_acct = (SELECT * FROM ONLY type::record('account', $effect_account)); \
 IF $effect_acct == NONE { THROW 'account_not_found' }; \
 IF $effect_acct.credits < $effect_amount { THROW 'insufficient_funds' }; \
 UPDATE type::record('account', $effect_account) SET \
 credits -= $effect_amount, updated_at = time::now(); ";

/// Script fragment: balance addition. Binds `$effect_account` and
/// `$effect_amount`. A plain UPDATE on a missing record is a silent
/// no-op in SurrealDB, so existence is guarded explicitly.
pub(crate) const CREDIT_FRAGMENT: &str = "\
 LET $effect_acct = (SELECT * FROM ONLY type::record('account', $effect_account)); \
 IF $effect_acct == NONE { THROW 'account_not_found' }; \
 UPDATE type::record('account', $effect_account) SET \
 credits += $effect_amount, updated_at = time::now(); ";

pub(crate) fn effect_sql(effect: &LedgerEffect) -> &'static str {
    match effect {
        LedgerEffect::Debit { .. } => DEBIT_FRAGMENT,
        LedgerEffect::Credit { .. } => CREDIT_FRAGMENT,
    }
}

pub(crate) fn effect_parts(effect: &LedgerEffect) -> (String, u32) {
    match effect {
        LedgerEffect::Debit { account_id, amount }
        | LedgerEffect::Credit { account_id, amount } => (account_id.to_string(), *amount),
    }
}

pub(crate) fn effect_account(effect: &LedgerEffect) -> Uuid {
    match effect {
        LedgerEffect::Debit { account_id, .. } | LedgerEffect::Credit { account_id, .. } => {
            *account_id
        }
    }
}

#[derive(Debug, SurrealValue)]
struct BalanceRow {
    credits: u32,
}

/// Build the typed error for a tripped balance guard. The re-read is
/// informational only; the guard already decided the outcome.
pub(crate) async fn insufficient_funds<C: Connection>(
    db: &Surreal<C>,
    account_id: Uuid,
    required: u32,
) -> SwapError {
    let available = async {
        let mut result = db
            .query("SELECT credits FROM type::record('account', $id)")
            .bind(("id", account_id.to_string()))
            .await
            .ok()?;
        let rows: Vec<BalanceRow> = result.take(0).ok()?;
        rows.first().map(|r| r.credits)
    }
    .await
    .unwrap_or(0);

    SwapError::InsufficientFunds {
        account_id,
        required,
        available,
    }
}
