//! SurrealDB schema migrations and initialization
//!
//! This module sets up the state-change table with the constraint that makes
//! conditional appends possible, plus the commit-scoped secondary index.

use crate::schema::STATE_CHANGES_TABLE;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all orchestrator tables in SurrealDB
///
/// This should be called once on first connection to set up the schema.
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing orchestrator SurrealDB schema");

    init_state_changes_table(db).await?;

    info!("Orchestrator schema initialization complete");
    Ok(())
}

/// Initialize `event_state_changes` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE event_state_changes {
///   identifier:             STRING (unique with version)
///   version:                INT    (1-indexed, strictly increasing per identifier)
///   kind:                   STRING (Job | Ingestion | Finalised)
///   repository_identifier:  STRING (indexed with commit)
///   commit:                 STRING
///   provider:               STRING
///   owner:                  STRING
///   repository:             STRING
///   event:                  STRING (serialized JSON payload)
///   event_time:             INT    (epoch seconds)
/// }
/// ```
///
/// Constraints:
/// - `(identifier, version)` is unique. This is the write condition: a
///   concurrent writer that picked the same version fails instead of
///   overwriting.
/// - Rows are never updated or deleted.
async fn init_state_changes_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing {} table", STATE_CHANGES_TABLE);

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS event_state_changes SCHEMALESS
            PERMISSIONS
                FOR select, create FULL
                FOR update, delete NONE;

        -- Composite unique index: at most one row per (identifier, version)
        DEFINE INDEX IF NOT EXISTS idx_identifier_version ON TABLE event_state_changes
            COLUMNS identifier, version UNIQUE;

        -- Commit-wide lookups for readiness checks
        DEFINE INDEX IF NOT EXISTS idx_repository_commit ON TABLE event_state_changes
            COLUMNS repository_identifier, `commit`;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ {} table initialized", STATE_CHANGES_TABLE);
    Ok(())
}
