//! SurrealDB implementation of [`LedgerRepository`].

use chrono::{DateTime, Utc};
use skillswap_core::error::{SwapError, SwapResult};
use skillswap_core::models::account::{Account, Availability, CreateAccount, Skill, SkillLevel};
use skillswap_core::repository::LedgerRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{CREDIT_FRAGMENT, DEBIT_FRAGMENT, insufficient_funds};
use crate::error::{DbError, Guard, thrown_guard};

#[derive(Debug, SurrealValue)]
struct SkillRow {
    name: String,
    level: String,
    verified: bool,
}

#[derive(Debug, SurrealValue)]
struct AvailabilityRow {
    day: String,
    time_slot: String,
}

#[derive(Debug, SurrealValue)]
struct AccountRow {
    name: String,
    email: String,
    credits: u32,
    skills_known: Vec<SkillRow>,
    skills_wanted: Vec<String>,
    availability: Vec<AvailabilityRow>,
    rating: f64,
    badges: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_level(value: &str) -> Result<SkillLevel, DbError> {
    match value {
        "Basic" => Ok(SkillLevel::Basic),
        "Intermediate" => Ok(SkillLevel::Intermediate),
        "Advanced" => Ok(SkillLevel::Advanced),
        other => Err(DbError::Migration(format!("unknown skill level: {other}"))),
    }
}

fn level_to_string(level: &SkillLevel) -> &'static str {
    match level {
        SkillLevel::Basic => "Basic",
        SkillLevel::Intermediate => "Intermediate",
        SkillLevel::Advanced => "Advanced",
    }
}

fn skill_to_row(skill: &Skill) -> SkillRow {
    SkillRow {
        name: skill.name.clone(),
        level: level_to_string(&skill.level).to_string(),
        verified: skill.verified,
    }
}

fn availability_to_row(slot: &Availability) -> AvailabilityRow {
    AvailabilityRow {
        day: slot.day.clone(),
        time_slot: slot.time_slot.clone(),
    }
}

impl AccountRow {
    fn into_account(self, id: Uuid) -> Result<Account, DbError> {
        let skills_known = self
            .skills_known
            .into_iter()
            .map(|row| {
                Ok(Skill {
                    name: row.name,
                    level: parse_level(&row.level)?,
                    verified: row.verified,
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;
        let availability = self
            .availability
            .into_iter()
            .map(|row| Availability {
                day: row.day,
                time_slot: row.time_slot,
            })
            .collect();

        Ok(Account {
            id,
            name: self.name,
            email: self.email,
            credits: self.credits,
            skills_known,
            skills_wanted: self.skills_wanted,
            availability,
            rating: self.rating,
            badges: self.badges,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Account store and credit ledger backed by SurrealDB.
pub struct SurrealLedgerRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealLedgerRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> LedgerRepository for SurrealLedgerRepository<C> {
    async fn create_account(&self, input: CreateAccount) -> SwapResult<Account> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let skills_known: Vec<SkillRow> = input.skills_known.iter().map(skill_to_row).collect();
        let availability: Vec<AvailabilityRow> =
            input.availability.iter().map(availability_to_row).collect();

        let result = self
            .db
            .query(
                "CREATE type::record('account', $id) SET \
                 name = $name, email = $email, credits = 0, \
                 skills_known = $skills_known, skills_wanted = $skills_wanted, \
                 availability = $availability, rating = 0.0, badges = []",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("email", input.email))
            .bind(("skills_known", skills_known))
            .bind(("skills_wanted", input.skills_wanted))
            .bind(("availability", availability))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(DbError::from)?;
        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "account".to_string(),
            id: id_str,
        })?;

        debug!(account_id = %id, "account created");
        Ok(row.into_account(id)?)
    }

    async fn get_account(&self, account_id: Uuid) -> SwapResult<Account> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('account', $id)")
            .bind(("id", account_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "account".to_string(),
            id: account_id.to_string(),
        })?;

        Ok(row.into_account(account_id)?)
    }

    async fn debit(&self, account_id: Uuid, amount: u32) -> SwapResult<Account> {
        let result = self
            .db
            .query(format!(
                "BEGIN TRANSACTION; {DEBIT_FRAGMENT} COMMIT TRANSACTION;"
            ))
            .bind(("effect_account", account_id.to_string()))
            .bind(("effect_amount", amount))
            .await
            .and_then(|response| response.check());

        match result {
            Ok(_) => self.get_account(account_id).await,
            Err(err) => Err(match thrown_guard(&err) {
                Some(Guard::InsufficientFunds) => {
                    insufficient_funds(&self.db, account_id, amount).await
                }
                Some(Guard::AccountNotFound) => SwapError::NotFound {
                    entity: "account".to_string(),
                    id: account_id.to_string(),
                },
                _ => DbError::from(err).into(),
            }),
        }
    }

    async fn credit(&self, account_id: Uuid, amount: u32) -> SwapResult<Account> {
        let result = self
            .db
            .query(format!(
                "BEGIN TRANSACTION; {CREDIT_FRAGMENT} COMMIT TRANSACTION;"
            ))
            .bind(("effect_account", account_id.to_string()))
            .bind(("effect_amount", amount))
            .await
            .and_then(|response| response.check());

        match result {
            Ok(_) => self.get_account(account_id).await,
            Err(err) => Err(match thrown_guard(&err) {
                Some(Guard::AccountNotFound) => SwapError::NotFound {
                    entity: "account".to_string(),
                    id: account_id.to_string(),
                },
                _ => DbError::from(err).into(),
            }),
        }
    }
}
