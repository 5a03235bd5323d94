//! Account domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillLevel {
    Basic,
    Intermediate,
    Advanced,
}

/// A skill an account can teach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub level: SkillLevel,
    /// Set by the out-of-scope verification workflow.
    pub verified: bool,
}

/// A recurring weekly slot a teacher offers, e.g. "Monday" with
/// "18:00 - 20:00".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub day: String,
    pub time_slot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Credit balance. One credit buys one hour of teaching. Mutated
    /// only through ledger operations; never negative.
    pub credits: u32,
    pub skills_known: Vec<Skill>,
    pub skills_wanted: Vec<String>,
    pub availability: Vec<Availability>,
    pub rating: f64,
    pub badges: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn offers_skill(&self, skill: &str) -> bool {
        self.skills_known.iter().any(|s| s.name == skill)
    }

    pub fn has_slot(&self, slot: &Availability) -> bool {
        self.availability.iter().any(|a| a == slot)
    }
}

/// New accounts start with a zero balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub name: String,
    pub email: String,
    pub skills_known: Vec<Skill>,
    pub skills_wanted: Vec<String>,
    pub availability: Vec<Availability>,
}
