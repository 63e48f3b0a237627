//! Schema definitions for the orchestrator SurrealDB tables
//!
//! Tables:
//! - event_state_changes: append-only, versioned state changes per entity

use serde::{Deserialize, Serialize};

use crate::storage_traits::StateChangeRecord;

/// Table holding every state change.
pub const STATE_CHANGES_TABLE: &str = "event_state_changes";

/// SurrealDB row for one state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangeRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Unique event identifier (part of the unique key)
    pub identifier: String,
    /// Version within the identifier (part of the unique key)
    pub version: u64,
    /// Payload discriminator
    pub kind: String,
    /// `owner-provider-repository` (secondary index, with `commit`)
    pub repository_identifier: String,
    /// Commit SHA (secondary index, with `repository_identifier`)
    pub commit: String,
    pub provider: String,
    pub owner: String,
    pub repository: String,
    /// Serialized payload (JSON)
    pub event: String,
    /// Epoch seconds
    pub event_time: i64,
}

impl From<&StateChangeRecord> for StateChangeRow {
    fn from(record: &StateChangeRecord) -> Self {
        StateChangeRow {
            id: None,
            identifier: record.identifier.clone(),
            version: record.version,
            kind: record.kind.clone(),
            repository_identifier: record.repository_identifier.clone(),
            commit: record.commit.clone(),
            provider: record.provider.clone(),
            owner: record.owner.clone(),
            repository: record.repository.clone(),
            event: record.event.clone(),
            event_time: record.event_time,
        }
    }
}

impl From<StateChangeRow> for StateChangeRecord {
    fn from(row: StateChangeRow) -> Self {
        StateChangeRecord {
            identifier: row.identifier,
            version: row.version,
            kind: row.kind,
            repository_identifier: row.repository_identifier,
            commit: row.commit,
            provider: row.provider,
            owner: row.owner,
            repository: row.repository,
            event: row.event,
            event_time: row.event_time,
        }
    }
}
