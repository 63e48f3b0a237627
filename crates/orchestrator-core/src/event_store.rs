//! Domain logic over the raw event store client.
//!
//! [`EventStoreService`] turns orchestrated events into versioned rows and
//! back: it picks the next version for a write, groups commit-wide reads by
//! entity identifier, and reduces an entity's rows into its current state.

use std::collections::BTreeMap;
use std::sync::Arc;

use orchestrator_state::{EventStoreClient, StateChangeRecord};
use tracing::{debug, warn};

use crate::domain::OrchestratedEvent;
use crate::Result;

/// Every raw state change recorded for one entity identifier.
///
/// Rows are kept as read from storage (unsorted); [`Self::latest_version`]
/// and [`EventStoreService::reduce_state_changes_to_event`] do their own
/// ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStateChangeCollection {
    identifier: String,
    changes: Vec<StateChangeRecord>,
}

impl EventStateChangeCollection {
    pub fn new(identifier: impl Into<String>, changes: Vec<StateChangeRecord>) -> Self {
        Self {
            identifier: identifier.into(),
            changes,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn changes(&self) -> &[StateChangeRecord] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Highest version recorded so far, `0` when nothing has been recorded.
    pub fn latest_version(&self) -> u64 {
        self.changes.iter().map(|c| c.version).max().unwrap_or(0)
    }
}

/// Versioning, grouping and reduction on top of an [`EventStoreClient`].
#[derive(Clone)]
pub struct EventStoreService {
    client: Arc<dyn EventStoreClient>,
}

impl EventStoreService {
    pub fn new(client: Arc<dyn EventStoreClient>) -> Self {
        Self { client }
    }

    /// All state changes recorded for `event`'s identifier.
    pub async fn get_all_state_changes_for_event(
        &self,
        event: &OrchestratedEvent,
    ) -> Result<EventStateChangeCollection> {
        let identifier = event.unique_identifier();
        let changes = self.client.get_state_changes_for_event(&identifier).await?;
        Ok(EventStateChangeCollection::new(identifier, changes))
    }

    /// Every state change for a commit, grouped into one collection per
    /// entity identifier (ordered by identifier).
    pub async fn get_all_state_changes_for_commit(
        &self,
        repository_identifier: &str,
        commit: &str,
    ) -> Result<Vec<EventStateChangeCollection>> {
        let rows = self
            .client
            .get_state_changes_for_commit(repository_identifier, commit)
            .await?;

        let mut groups: BTreeMap<String, Vec<StateChangeRecord>> = BTreeMap::new();
        for row in rows {
            groups.entry(row.identifier.clone()).or_default().push(row);
        }

        debug!(
            repository_identifier,
            commit,
            groups = groups.len(),
            "grouped commit state changes"
        );

        Ok(groups
            .into_iter()
            .map(|(identifier, changes)| EventStateChangeCollection::new(identifier, changes))
            .collect())
    }

    /// Reduce an entity's state changes to its current logical state.
    ///
    /// Changes are applied in ascending version order. Each version replaces
    /// the whole record, except `event_time`, which keeps the maximum seen so
    /// a stale write can never move the effective time backwards. Payloads
    /// that fail to decode are skipped. Returns `None` when nothing decodes.
    pub fn reduce_state_changes_to_event(
        collection: &EventStateChangeCollection,
    ) -> Option<OrchestratedEvent> {
        let mut changes: Vec<&StateChangeRecord> = collection.changes().iter().collect();
        changes.sort_by_key(|change| change.version);

        changes
            .into_iter()
            .filter_map(|change| match OrchestratedEvent::decode(&change.kind, &change.event) {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(
                        identifier = %change.identifier,
                        version = change.version,
                        error = %err,
                        "skipping undecodable state change"
                    );
                    None
                }
            })
            .reduce(|reduced, mut next| {
                let event_time = reduced.event_time().max(next.event_time());
                next.set_event_time(event_time);
                next
            })
    }

    /// Append `event` at the next version after whatever is currently stored.
    ///
    /// Returns the version written. A concurrent writer claiming the same
    /// version surfaces as [`crate::OrchestratorError::ConditionalWriteConflict`].
    pub async fn store_state_change(&self, event: &OrchestratedEvent) -> Result<u64> {
        let existing = self.get_all_state_changes_for_event(event).await?;
        self.store_state_change_after(&existing, event).await
    }

    /// Append `event` at `existing.latest_version() + 1`.
    ///
    /// Used when the caller has just read (and reasoned about) `existing`.
    pub async fn store_state_change_after(
        &self,
        existing: &EventStateChangeCollection,
        event: &OrchestratedEvent,
    ) -> Result<u64> {
        self.store_state_change_at(event, existing.latest_version() + 1)
            .await
    }

    /// Append `event` at exactly `version`, failing if that slot is taken.
    pub async fn store_state_change_at(
        &self,
        event: &OrchestratedEvent,
        version: u64,
    ) -> Result<u64> {
        let record = Self::to_record(event, version)?;
        self.client.store_state_change(&record).await?;

        debug!(identifier = %record.identifier, version, "stored state change");
        Ok(version)
    }

    fn to_record(event: &OrchestratedEvent, version: u64) -> Result<StateChangeRecord> {
        let coordinates = event.coordinates();
        Ok(StateChangeRecord {
            identifier: event.unique_identifier(),
            version,
            kind: event.kind().to_string(),
            repository_identifier: event.repository_identifier(),
            commit: coordinates.commit.clone(),
            provider: coordinates.provider.to_string(),
            owner: coordinates.owner.clone(),
            repository: coordinates.repository.clone(),
            event: event.encode()?,
            event_time: event.event_time().timestamp(),
        })
    }
}
