//! Commit-wide reasoning shared by the processors: is this the first event
//! for a commit, has the commit's pipeline gone quiet, and has it already
//! been finalised.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info};

use crate::backoff::{Attempt, BackoffStrategy};
use crate::domain::{CommitCoordinates, EventKind, EventState, Finalised, OrchestratedEvent};
use crate::event_store::EventStoreService;
use crate::obs;
use crate::Result;

const UNSEEN: usize = usize::MAX;

/// The version a finalisation claim has to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalisationSlot {
    /// Latest `Finalised` version seen while polling, `0` when none.
    pub observed_version: u64,
}

impl FinalisationSlot {
    pub fn version(&self) -> u64 {
        self.observed_version + 1
    }
}

#[derive(Clone)]
pub struct CommitReadinessEvaluator {
    store: EventStoreService,
    backoff: BackoffStrategy,
}

impl CommitReadinessEvaluator {
    pub fn new(store: EventStoreService, backoff: BackoffStrategy) -> Self {
        Self { store, backoff }
    }

    /// `true` when nothing at all has been recorded for the commit yet.
    pub async fn is_no_events_for_commit(&self, coordinates: &CommitCoordinates) -> Result<bool> {
        let groups = self
            .store
            .get_all_state_changes_for_commit(
                &coordinates.repository_identifier(),
                &coordinates.commit,
            )
            .await?;
        Ok(groups.is_empty())
    }

    /// Poll the commit until it is quiescent.
    ///
    /// Each poll stops with `false` when new state changes arrived since the
    /// previous poll (another invocation is handling them), when a job or
    /// ingestion is still ongoing, or when the commit was already finalised
    /// after its latest ingestion. Surviving every poll means the commit is
    /// ready.
    pub async fn is_ready_to_finalise(&self, coordinates: &CommitCoordinates) -> Result<bool> {
        Ok(self.poll_for_finalisation(coordinates).await?.is_some())
    }

    /// Same polling as [`Self::is_ready_to_finalise`], returning the
    /// finalisation slot seen by the last quiescent poll.
    ///
    /// Claiming that exact slot is what keeps finalisation exactly-once: an
    /// invocation that finished polling after someone else claimed will find
    /// the slot taken rather than writing one version further on.
    pub async fn poll_for_finalisation(
        &self,
        coordinates: &CommitCoordinates,
    ) -> Result<Option<FinalisationSlot>> {
        let repository_identifier = coordinates.repository_identifier();
        let repository_identifier = repository_identifier.as_str();
        let finalised_identifier = coordinates.finalised_identifier();
        let finalised_identifier = finalised_identifier.as_str();
        let commit = coordinates.commit.as_str();
        let store = &self.store;
        let last_total = AtomicUsize::new(UNSEEN);
        let last_total = &last_total;

        let outcome = self
            .backoff
            .run(|attempt| async move {
                let groups = store
                    .get_all_state_changes_for_commit(repository_identifier, commit)
                    .await?;

                let total: usize = groups.iter().map(|group| group.len()).sum();
                let previous = last_total.swap(total, Ordering::SeqCst);
                if previous != UNSEEN && total > previous {
                    info!(
                        commit,
                        previous, total, "commit received new state changes while polling"
                    );
                    return Ok(Attempt::Done(None));
                }

                let states: Vec<OrchestratedEvent> = groups
                    .iter()
                    .filter_map(EventStoreService::reduce_state_changes_to_event)
                    .collect();

                let ongoing = states.iter().find(|state| {
                    state.kind() != EventKind::Finalised && state.state() == EventState::Ongoing
                });
                if let Some(ongoing) = ongoing {
                    debug!(
                        commit,
                        identifier = %ongoing.unique_identifier(),
                        "commit still has ongoing work"
                    );
                    return Ok(Attempt::Done(None));
                }

                if Self::is_already_finalised(&states) {
                    debug!(commit, "commit already finalised after its latest ingestion");
                    return Ok(Attempt::Done(None));
                }

                let observed_version = groups
                    .iter()
                    .find(|group| group.identifier() == finalised_identifier)
                    .map_or(0, |group| group.latest_version());
                debug!(commit, attempt, total, observed_version, "commit looks quiescent");
                Ok(Attempt::Retry(Some(FinalisationSlot { observed_version })))
            })
            .await?;

        Ok(outcome.value)
    }

    /// `true` when a finalisation exists and post-dates every ingestion.
    ///
    /// A finalisation with no ingestions at all also counts. With neither,
    /// the commit has never been finalised.
    pub fn is_already_finalised(states: &[OrchestratedEvent]) -> bool {
        let latest_of = |kind: EventKind| {
            states
                .iter()
                .filter(|state| state.kind() == kind)
                .map(OrchestratedEvent::event_time)
                .max()
        };

        match (latest_of(EventKind::Finalised), latest_of(EventKind::Ingestion)) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(finalised), Some(ingestion)) => finalised > ingestion,
        }
    }

    /// Claim the commit's finalisation with a single conditional write at
    /// `slot`.
    ///
    /// Losing the version race means another invocation finalised first:
    /// `Ok(false)`, not an error. A conflict that left the slot empty is
    /// returned as an error so the event is redelivered.
    pub async fn record_finalised_event(
        &self,
        finalised: &Finalised,
        slot: FinalisationSlot,
    ) -> Result<bool> {
        let event = OrchestratedEvent::Finalised(finalised.clone());
        let identifier = event.unique_identifier();

        match self.store.store_state_change_at(&event, slot.version()).await {
            Ok(version) => {
                obs::emit_finalisation_claimed(&identifier, version);
                Ok(true)
            }
            Err(err) if err.is_conditional_write_conflict() => {
                let existing = self.store.get_all_state_changes_for_event(&event).await?;
                if existing.latest_version() < slot.version() {
                    return Err(err);
                }
                obs::emit_finalisation_already_claimed(&identifier);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}
