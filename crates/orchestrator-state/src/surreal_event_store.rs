//! SurrealDB-backed EventStoreClient implementation
//!
//! Uses `schema::StateChangeRow` for persistence, converting to/from
//! `storage_traits::StateChangeRecord` at the boundary. The write condition
//! is enforced by the unique `(identifier, version)` index created in
//! `migrations`.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::handle;
use crate::schema::{StateChangeRow, STATE_CHANGES_TABLE};
use crate::storage_traits::{EventStoreClient, StateChangeRecord, StorageResult};

/// SurrealDB-backed implementation of [`EventStoreClient`].
#[derive(Clone)]
pub struct SurrealEventStore {
    db: Surreal<Any>,
}

impl SurrealEventStore {
    /// Wrap an already connected, migrated database.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(handle::connect_in_memory().await?))
    }

    /// Connect to an explicit URL (`mem://`, `surrealkv://path`, `ws://host`).
    pub async fn connect(url: &str) -> crate::Result<Self> {
        Ok(Self::new(handle::connect_url(url).await?))
    }

    /// Create from environment variables.
    ///
    /// Uses the env-var chain of [`crate::connect_from_env`].
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self::new(handle::connect_from_env().await?))
    }

    // -- private helpers -----------------------------------------------------

    /// Map a failed insert onto the storage taxonomy.
    ///
    /// Two writers racing on the same `(identifier, version)` either hit the
    /// unique index or lose the transaction commit. Both mean the slot was
    /// contended and the caller must re-read before choosing a version, so
    /// both become `AlreadyExists`. Remote (WebSocket) connections only carry
    /// the rendered message, which is matched as a fallback.
    fn classify_write_error(err: surrealdb::Error, record: &StateChangeRecord) -> StorageError {
        if Self::is_contended_write(&err) {
            debug!(error = %err, "conditional write lost to a concurrent writer");
            StorageError::AlreadyExists {
                identifier: record.identifier.clone(),
                version: record.version,
            }
        } else {
            StorageError::Backend(err.to_string())
        }
    }

    fn is_contended_write(err: &surrealdb::Error) -> bool {
        use surrealdb::error::Db;

        match err {
            surrealdb::Error::Db(
                Db::IndexExists { .. } | Db::RecordExists { .. } | Db::TxRetryable,
            ) => true,
            other => {
                let message = other.to_string();
                message.contains("already contains")
                    || message.contains("already exists")
                    || message.contains("read or write conflict")
            }
        }
    }

    async fn select_rows(
        &self,
        sql: &'static str,
        bindings: Vec<(&'static str, String)>,
    ) -> StorageResult<Vec<StateChangeRecord>> {
        let mut query = self.db.query(sql);
        for binding in bindings {
            query = query.bind(binding);
        }
        let mut res = query
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<StateChangeRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(rows.into_iter().map(StateChangeRecord::from).collect())
    }
}

#[async_trait]
impl EventStoreClient for SurrealEventStore {
    #[instrument(skip(self, record), fields(identifier = %record.identifier, version = record.version))]
    async fn store_state_change(&self, record: &StateChangeRecord) -> StorageResult<()> {
        debug!("storing state change");

        let _created: Option<StateChangeRow> = self
            .db
            .create(STATE_CHANGES_TABLE)
            .content(StateChangeRow::from(record))
            .await
            .map_err(|e| Self::classify_write_error(e, record))?;

        Ok(())
    }

    async fn get_state_changes_for_event(
        &self,
        identifier: &str,
    ) -> StorageResult<Vec<StateChangeRecord>> {
        self.select_rows(
            "SELECT * FROM event_state_changes WHERE identifier = $identifier ORDER BY version ASC",
            vec![("identifier", identifier.to_string())],
        )
        .await
    }

    async fn get_state_changes_for_commit(
        &self,
        repository_identifier: &str,
        commit: &str,
    ) -> StorageResult<Vec<StateChangeRecord>> {
        self.select_rows(
            "SELECT * FROM event_state_changes \
             WHERE repository_identifier = $repository_identifier AND `commit` = $commit",
            vec![
                ("repository_identifier", repository_identifier.to_string()),
                ("commit", commit.to_string()),
            ],
        )
        .await
    }
}
