use async_trait::async_trait;
use tracing::warn;

use super::{EventProcessor, OrchestratorServices};
use crate::domain::{
    CoverageFailed, CoverageFailureMessage, EventState, Finalised, InboundEvent, InboundEventType,
    OrchestratedEvent, PublishableMessage,
};
use crate::obs::{self, CommitSpan};
use crate::recorder::RecordOutcome;
use crate::Result;

/// Records `Finalised(FAILURE)` and tells the user through the publish queue.
pub struct CoverageFailedProcessor {
    services: OrchestratorServices,
}

impl CoverageFailedProcessor {
    pub fn new(services: OrchestratorServices) -> Self {
        Self { services }
    }

    async fn handle(&self, failed: &CoverageFailed) -> Result<bool> {
        let coordinates = &failed.coordinates;
        let state = OrchestratedEvent::Finalised(Finalised {
            coordinates: coordinates.clone(),
            context: failed.context.clone(),
            coverage_percentage: None,
            state: EventState::Failure,
            event_time: failed.event_time,
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

        let message = PublishableMessage::CoverageFailure(CoverageFailureMessage {
            coordinates: coordinates.clone(),
            context: failed.context.clone(),
            reason: failed.reason.clone(),
            event_time: failed.event_time,
        });
        let accepted = self.services.publish.dispatch(&message).await?;
        if !accepted {
            warn!(commit = %coordinates.commit, "publish queue rejected coverage failure message");
        }
        Ok(accepted)
    }
}

#[async_trait]
impl EventProcessor for CoverageFailedProcessor {
    fn event_type(&self) -> InboundEventType {
        InboundEventType::CoverageFailed
    }

    async fn process(&self, event: &InboundEvent) -> Result<bool> {
        let InboundEvent::CoverageFailed(failed) = event else {
            obs::emit_routing_mismatch(self.event_type().as_str(), event.event_type().as_str());
            return Ok(false);
        };
        CommitSpan::new(&failed.coordinates.repository_identifier(), &failed.coordinates.commit)
            .instrument(self.handle(failed))
            .await
    }
}
