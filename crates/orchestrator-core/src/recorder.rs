//! Conditional recording of a new entity state.
//!
//! [`StateChangeRecorder::record_state_change_in_store`] reads the entity's
//! history, reduces it, and appends the new state at the next version unless
//! the new state is older than what is stored. A version collision means
//! another writer got there first, so the attempt is retried from a fresh
//! read under the recorder backoff.

use tracing::debug;

use crate::backoff::{Attempt, BackoffStrategy};
use crate::domain::OrchestratedEvent;
use crate::event_store::EventStoreService;
use crate::obs;
use crate::Result;

/// How a recording attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Appended at `version`.
    Recorded { version: u64 },
    /// Older than the stored state; dropped without writing.
    OutOfOrder,
    /// Identical to the stored state; nothing to write.
    Unchanged,
    /// Every attempt lost a version race.
    Conflicted,
}

impl RecordOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded { .. })
    }

    /// `true` unless contention exhausted the retry budget.
    pub fn is_handled(&self) -> bool {
        !matches!(self, RecordOutcome::Conflicted)
    }
}

#[derive(Clone)]
pub struct StateChangeRecorder {
    store: EventStoreService,
    backoff: BackoffStrategy,
}

impl StateChangeRecorder {
    pub fn new(store: EventStoreService, backoff: BackoffStrategy) -> Self {
        Self { store, backoff }
    }

    pub fn store(&self) -> &EventStoreService {
        &self.store
    }

    /// Append `new_state` unless it is stale or already stored.
    ///
    /// Storage failures other than a version collision are returned as `Err`.
    pub async fn record_state_change_in_store(
        &self,
        new_state: &OrchestratedEvent,
    ) -> Result<RecordOutcome> {
        let store = &self.store;
        let outcome = self
            .backoff
            .run(|attempt| async move {
                let existing = store.get_all_state_changes_for_event(new_state).await?;

                if let Some(previous) = EventStoreService::reduce_state_changes_to_event(&existing)
                {
                    if previous.event_time() > new_state.event_time() {
                        obs::emit_state_change_out_of_order(
                            existing.identifier(),
                            previous.event_time().timestamp(),
                            new_state.event_time().timestamp(),
                        );
                        return Ok(Attempt::Done(RecordOutcome::OutOfOrder));
                    }
                    if &previous == new_state {
                        obs::emit_state_change_unchanged(existing.identifier());
                        return Ok(Attempt::Done(RecordOutcome::Unchanged));
                    }
                }

                match store.store_state_change_after(&existing, new_state).await {
                    Ok(version) => Ok(Attempt::Done(RecordOutcome::Recorded { version })),
                    Err(err) if err.is_conditional_write_conflict() => {
                        debug!(
                            identifier = existing.identifier(),
                            attempt,
                            "version collision, retrying with a fresh view"
                        );
                        Ok(Attempt::Retry(RecordOutcome::Conflicted))
                    }
                    Err(err) => Err(err),
                }
            })
            .await?;

        let identifier = new_state.unique_identifier();
        match outcome.value {
            RecordOutcome::Recorded { version } => {
                obs::emit_state_change_recorded(&identifier, version, outcome.attempts);
            }
            RecordOutcome::Conflicted => {
                obs::emit_contention_exhausted(&identifier, outcome.attempts);
            }
            RecordOutcome::OutOfOrder | RecordOutcome::Unchanged => {}
        }

        Ok(outcome.value)
    }
}
