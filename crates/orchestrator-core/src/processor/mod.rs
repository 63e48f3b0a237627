//! One processor per inbound event type.
//!
//! A processor turns its inbound event into an orchestrated state, records
//! it, and runs whatever commit-level follow-up its event calls for. The
//! returned `bool` tells the invocation framework whether the event was
//! handled; `Err` is reserved for infrastructure failures that should be
//! redelivered.

mod configuration_file_change;
mod coverage_failed;
mod coverage_finalised;
mod ingestion;
mod job_state_change;

pub use configuration_file_change::{
    ConfigurationFileChangeProcessor, ConfigurationFileSource, FilesystemConfigurationSource,
    MemoryConfigurationSource, MemorySettingsStore, SettingsStore, TracingSettingsStore,
    CONFIGURATION_FILE_NAME,
};
pub use coverage_failed::CoverageFailedProcessor;
pub use coverage_finalised::CoverageFinalisedProcessor;
pub use ingestion::IngestEventProcessor;
pub use job_state_change::JobStateChangeProcessor;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchestrator_state::EventStoreClient;

use crate::backoff::BackoffStrategy;
use crate::client::{EventBusClient, PublishClient};
use crate::domain::{
    CommitCoordinates, EventState, Finalised, InboundEvent, InboundEventType, LifecycleEvent,
    PullRequestContext, ORCHESTRATOR_SOURCE,
};
use crate::event_store::EventStoreService;
use crate::obs;
use crate::readiness::CommitReadinessEvaluator;
use crate::recorder::StateChangeRecorder;
use crate::Result;

#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// The inbound event type this processor is registered for.
    fn event_type(&self) -> InboundEventType;

    /// Handle one inbound event.
    ///
    /// An event of any other type is a wiring bug: it is logged at error
    /// level and answered with `Ok(false)`.
    async fn process(&self, event: &InboundEvent) -> Result<bool>;
}

/// The services every processor composes.
#[derive(Clone)]
pub struct OrchestratorServices {
    pub recorder: StateChangeRecorder,
    pub readiness: CommitReadinessEvaluator,
    pub event_bus: Arc<dyn EventBusClient>,
    pub publish: Arc<dyn PublishClient>,
}

impl OrchestratorServices {
    pub fn new(
        client: Arc<dyn EventStoreClient>,
        recorder_backoff: BackoffStrategy,
        ready_backoff: BackoffStrategy,
        event_bus: Arc<dyn EventBusClient>,
        publish: Arc<dyn PublishClient>,
    ) -> Self {
        let store = EventStoreService::new(client);
        Self {
            recorder: StateChangeRecorder::new(store.clone(), recorder_backoff),
            readiness: CommitReadinessEvaluator::new(store, ready_backoff),
            event_bus,
            publish,
        }
    }

    pub fn store(&self) -> &EventStoreService {
        self.recorder.store()
    }

    pub(crate) async fn fire(&self, event: LifecycleEvent) -> Result<()> {
        self.event_bus.fire_event(ORCHESTRATOR_SOURCE, &event).await?;
        obs::emit_lifecycle_fired(
            event.detail_type(),
            &event.event_id().to_string(),
            &event.coordinates().commit,
        );
        Ok(())
    }

    /// Finalise the commit if its pipeline has gone quiet.
    ///
    /// Writes a `Finalised(ONGOING)` placeholder and fires `UploadsFinalised`
    /// when this invocation wins the finalisation slot. The placeholder time
    /// is never earlier than `trigger_time`, so it post-dates every ingestion
    /// observed so far. Returns whether `UploadsFinalised` was fired.
    pub(crate) async fn finalise_if_ready(
        &self,
        coordinates: &CommitCoordinates,
        context: &PullRequestContext,
        trigger_time: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(slot) = self.readiness.poll_for_finalisation(coordinates).await? else {
            return Ok(false);
        };

        let placeholder = Finalised {
            coordinates: coordinates.clone(),
            context: context.clone(),
            coverage_percentage: None,
            state: EventState::Ongoing,
            event_time: Utc::now().max(trigger_time),
        };
        if !self
            .readiness
            .record_finalised_event(&placeholder, slot)
            .await?
        {
            return Ok(false);
        }

        self.fire(LifecycleEvent::uploads_finalised(
            placeholder.coordinates,
            placeholder.context,
            placeholder.event_time,
        ))
        .await?;
        Ok(true)
    }
}
