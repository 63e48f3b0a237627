use async_trait::async_trait;

use super::{EventProcessor, OrchestratorServices};
use crate::domain::{
    CoverageFinalised, EventState, Finalised, InboundEvent, InboundEventType, OrchestratedEvent,
};
use crate::obs::{self, CommitSpan};
use crate::Result;

/// Records the commit's analysed coverage as `Finalised(SUCCESS)`.
pub struct CoverageFinalisedProcessor {
    services: OrchestratorServices,
}

impl CoverageFinalisedProcessor {
    pub fn new(services: OrchestratorServices) -> Self {
        Self { services }
    }

    async fn handle(&self, finalised: &CoverageFinalised) -> Result<bool> {
        let coordinates = &finalised.coordinates;
        let state = OrchestratedEvent::Finalised(Finalised {
            coordinates: coordinates.clone(),
            context: finalised.context.clone(),
            coverage_percentage: Some(finalised.coverage_percentage),
            state: EventState::Success,
            event_time: finalised.event_time,
        });

        let outcome = self
            .services
            .recorder
            .record_state_change_in_store(&state)
            .await?;
        Ok(outcome.is_handled())
    }
}

#[async_trait]
impl EventProcessor for CoverageFinalisedProcessor {
    fn event_type(&self) -> InboundEventType {
        InboundEventType::CoverageFinalised
    }

    async fn process(&self, event: &InboundEvent) -> Result<bool> {
        let InboundEvent::CoverageFinalised(finalised) = event else {
            obs::emit_routing_mismatch(self.event_type().as_str(), event.event_type().as_str());
            return Ok(false);
        };
        let coordinates = &finalised.coordinates;
        CommitSpan::new(&coordinates.repository_identifier(), &coordinates.commit)
            .instrument(self.handle(finalised))
            .await
    }
}
