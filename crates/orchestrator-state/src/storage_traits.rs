//! Storage trait definitions for the orchestrator event store
//!
//! The store is a single append-only table with two access patterns:
//! - by entity `identifier` (primary key, together with `version`)
//! - by `repository_identifier` + `commit` (secondary index)
//!
//! The only mutation is a conditional insert that succeeds iff no row exists
//! at `(identifier, version)`. In-memory fakes are provided for testing via
//! the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// One raw, versioned state change for one entity.
///
/// `event` is the serialized payload of the full entity state; `kind` names
/// the payload's concrete type so readers can decode it without guessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeRecord {
    /// Unique event identifier (e.g. `Job#github-owner-repo-main-abc123-42`)
    pub identifier: String,
    /// Strictly increasing per identifier, starting at 1
    pub version: u64,
    /// Payload discriminator (`Job`, `Ingestion`, `Finalised`)
    pub kind: String,
    /// `owner-provider-repository`
    pub repository_identifier: String,
    /// VCS commit SHA
    pub commit: String,
    pub provider: String,
    pub owner: String,
    pub repository: String,
    /// Serialized JSON payload
    pub event: String,
    /// Logical event time, epoch seconds
    pub event_time: i64,
}

/// Append-only, optimistically concurrent event store.
///
/// Guarantees:
/// - `store_state_change` never overwrites. If a row already exists at
///   `(identifier, version)` it fails with `StorageError::AlreadyExists`.
/// - Both reads are strongly consistent; a row acknowledged by
///   `store_state_change` is visible to every subsequent read.
/// - Read ordering is unspecified. Callers sort by `version`.
#[async_trait]
pub trait EventStoreClient: Send + Sync {
    /// Insert `record` iff nothing exists at its `(identifier, version)`.
    async fn store_state_change(&self, record: &StateChangeRecord) -> StorageResult<()>;

    /// All rows sharing `identifier`.
    async fn get_state_changes_for_event(
        &self,
        identifier: &str,
    ) -> StorageResult<Vec<StateChangeRecord>>;

    /// All rows, across every identifier, for one repository + commit.
    async fn get_state_changes_for_commit(
        &self,
        repository_identifier: &str,
        commit: &str,
    ) -> StorageResult<Vec<StateChangeRecord>>;
}
