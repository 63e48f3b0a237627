use async_trait::async_trait;

use super::{EventProcessor, OrchestratorServices};
use crate::domain::{
    EventState, InboundEvent, InboundEventType, IngestEvent, Ingestion, OrchestratedEvent,
};
use crate::obs::{self, CommitSpan};
use crate::recorder::RecordOutcome;
use crate::Result;

/// Records the ingest lifecycle of one coverage upload.
///
/// One instance is registered per ingest event type. An ingestion that ends
/// (successfully or not) attempts to finalise the commit, because an upload
/// finishing after the last job would otherwise never trigger finalisation.
pub struct IngestEventProcessor {
    event_type: InboundEventType,
    state: EventState,
    services: OrchestratorServices,
}

impl IngestEventProcessor {
    pub fn started(services: OrchestratorServices) -> Self {
        Self {
            event_type: InboundEventType::IngestStarted,
            state: EventState::Ongoing,
            services,
        }
    }

    pub fn success(services: OrchestratorServices) -> Self {
        Self {
            event_type: InboundEventType::IngestSuccess,
            state: EventState::Success,
            services,
        }
    }

    pub fn failure(services: OrchestratorServices) -> Self {
        Self {
            event_type: InboundEventType::IngestFailure,
            state: EventState::Failure,
            services,
        }
    }

    async fn handle(&self, ingest: &IngestEvent) -> Result<bool> {
        let coordinates = &ingest.coordinates;
        let state = OrchestratedEvent::Ingestion(Ingestion {
            coordinates: coordinates.clone(),
            upload_id: ingest.upload_id.clone(),
            state: self.state,
            event_time: ingest.event_time,
        });

        match self
            .services
            .recorder
            .record_state_change_in_store(&state)
            .await?
        {
            RecordOutcome::Conflicted => return Ok(false),
            RecordOutcome::OutOfOrder => return Ok(true),
            RecordOutcome::Recorded { .. } | RecordOutcome::Unchanged => {}
        }

        if self.state != EventState::Ongoing {
            self.services
                .finalise_if_ready(coordinates, &ingest.context, ingest.event_time)
                .await?;
        }

        Ok(true)
    }
}

#[async_trait]
impl EventProcessor for IngestEventProcessor {
    fn event_type(&self) -> InboundEventType {
        self.event_type
    }

    async fn process(&self, event: &InboundEvent) -> Result<bool> {
        let ingest = match (self.event_type, event) {
            (InboundEventType::IngestStarted, InboundEvent::IngestStarted(ingest))
            | (InboundEventType::IngestSuccess, InboundEvent::IngestSuccess(ingest))
            | (InboundEventType::IngestFailure, InboundEvent::IngestFailure(ingest)) => ingest,
            _ => {
                obs::emit_routing_mismatch(self.event_type.as_str(), event.event_type().as_str());
                return Ok(false);
            }
        };
        CommitSpan::new(&ingest.coordinates.repository_identifier(), &ingest.coordinates.commit)
            .instrument(self.handle(ingest))
            .await
    }
}
