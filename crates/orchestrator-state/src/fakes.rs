//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryEventStore`, which satisfies the `EventStoreClient`
//! contract without any external dependencies.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryEventStore
// ---------------------------------------------------------------------------

/// In-memory event store backed by a `BTreeMap<(identifier, version), row>`.
///
/// The map lock is held across the existence check and the insert, which
/// gives the same atomic put-if-absent a real store provides.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    rows: Mutex<BTreeMap<(String, u64), StateChangeRecord>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows held, across every identifier.
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> StorageError {
        StorageError::Backend("memory event store lock poisoned".to_string())
    }
}

#[async_trait]
impl EventStoreClient for MemoryEventStore {
    async fn store_state_change(&self, record: &StateChangeRecord) -> StorageResult<()> {
        let mut rows = self.rows.lock().map_err(|_| Self::poisoned())?;
        let key = (record.identifier.clone(), record.version);
        if rows.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                identifier: record.identifier.clone(),
                version: record.version,
            });
        }
        rows.insert(key, record.clone());
        Ok(())
    }

    async fn get_state_changes_for_event(
        &self,
        identifier: &str,
    ) -> StorageResult<Vec<StateChangeRecord>> {
        let rows = self.rows.lock().map_err(|_| Self::poisoned())?;
        Ok(rows
            .values()
            .filter(|row| row.identifier == identifier)
            .cloned()
            .collect())
    }

    async fn get_state_changes_for_commit(
        &self,
        repository_identifier: &str,
        commit: &str,
    ) -> StorageResult<Vec<StateChangeRecord>> {
        let rows = self.rows.lock().map_err(|_| Self::poisoned())?;
        Ok(rows
            .values()
            .filter(|row| row.repository_identifier == repository_identifier && row.commit == commit)
            .cloned()
            .collect())
    }
}
