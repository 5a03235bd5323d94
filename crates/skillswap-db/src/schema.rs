//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation. The non-negative balance
//! invariant is enforced at the schema level in addition to the
//! transaction guards.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1 — initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Accounts
-- =======================================================================
DEFINE TABLE account SCHEMAFULL;
DEFINE FIELD name ON TABLE account TYPE string;
DEFINE FIELD email ON TABLE account TYPE string;
DEFINE FIELD credits ON TABLE account TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
DEFINE FIELD skills_known ON TABLE account TYPE array DEFAULT [];
DEFINE FIELD skills_known.* ON TABLE account TYPE object FLEXIBLE;
DEFINE FIELD skills_wanted ON TABLE account TYPE array<string> \
    DEFAULT [];
DEFINE FIELD availability ON TABLE account TYPE array DEFAULT [];
DEFINE FIELD availability.* ON TABLE account TYPE object FLEXIBLE;
DEFINE FIELD rating ON TABLE account TYPE float DEFAULT 0.0;
DEFINE FIELD badges ON TABLE account TYPE array<string> DEFAULT [];
DEFINE FIELD created_at ON TABLE account TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE account TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_account_email ON TABLE account COLUMNS email UNIQUE;

-- =======================================================================
-- Sessions
-- =======================================================================
DEFINE TABLE session SCHEMAFULL;
DEFINE FIELD teacher_id ON TABLE session TYPE string;
DEFINE FIELD learner_id ON TABLE session TYPE string;
DEFINE FIELD skill ON TABLE session TYPE string;
DEFINE FIELD scheduled_at ON TABLE session TYPE datetime;
DEFINE FIELD duration_hours ON TABLE session TYPE int \
    ASSERT $value > 0;
DEFINE FIELD credits_transferred ON TABLE session TYPE int \
    ASSERT $value > 0;
DEFINE FIELD status ON TABLE session TYPE string \
    ASSERT $value IN ['Requested', 'Scheduled', 'Ongoing', \
    'Completed', 'Cancelled'];
DEFINE FIELD meeting_link ON TABLE session TYPE option<string>;
DEFINE FIELD feedback ON TABLE session TYPE option<string>;
DEFINE FIELD rating ON TABLE session TYPE option<int> \
    ASSERT $value == NONE OR ($value >= 1 AND $value <= 5);
DEFINE FIELD dispute_raised ON TABLE session TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE session TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE session TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_session_teacher ON TABLE session \
    COLUMNS teacher_id, status;
DEFINE INDEX idx_session_learner ON TABLE session \
    COLUMNS learner_id, status;

-- =======================================================================
-- Disputes
-- =======================================================================
DEFINE TABLE dispute SCHEMAFULL;
DEFINE FIELD session_id ON TABLE dispute TYPE string;
DEFINE FIELD raised_by ON TABLE dispute TYPE string;
DEFINE FIELD reason ON TABLE dispute TYPE string;
DEFINE FIELD status ON TABLE dispute TYPE string \
    ASSERT $value IN ['Open', 'Resolved', 'Rejected'];
DEFINE FIELD created_at ON TABLE dispute TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD resolved_at ON TABLE dispute TYPE option<datetime>;
DEFINE INDEX idx_dispute_session ON TABLE dispute COLUMNS session_id;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Returns the initial schema DDL.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
/// All DEFINE statements are idempotent so re-running is safe.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    // Ensure migration tracking table exists (idempotent).
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    // Determine current schema version.
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );

            db.query(migration.sql)
                .await?
                .check()
                .map_err(|e| DbError::Migration(e.to_string()))?;

            db.query("CREATE _migration SET version = $version, name = $name")
                .bind(("version", migration.version))
                .bind(("name", migration.name.to_string()))
                .await?
                .check()
                .map_err(|e| DbError::Migration(e.to_string()))?;
        }
    }

    Ok(())
}
