//! Routes an inbound event to the processor registered for its type.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{InboundEvent, InboundEventType};
use crate::error::OrchestratorError;
use crate::processor::{
    ConfigurationFileChangeProcessor, ConfigurationFileSource, CoverageFailedProcessor,
    CoverageFinalisedProcessor, EventProcessor, IngestEventProcessor, JobStateChangeProcessor,
    OrchestratorServices, SettingsStore,
};
use crate::Result;

#[derive(Default)]
pub struct EventRouter {
    processors: HashMap<InboundEventType, Arc<dyn EventProcessor>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A router with a processor for every inbound event type.
    pub fn with_default_processors(
        services: OrchestratorServices,
        configuration_source: Arc<dyn ConfigurationFileSource>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self::new()
            .with(Arc::new(JobStateChangeProcessor::new(services.clone())))
            .with(Arc::new(IngestEventProcessor::started(services.clone())))
            .with(Arc::new(IngestEventProcessor::success(services.clone())))
            .with(Arc::new(IngestEventProcessor::failure(services.clone())))
            .with(Arc::new(CoverageFinalisedProcessor::new(services.clone())))
            .with(Arc::new(CoverageFailedProcessor::new(services)))
            .with(Arc::new(ConfigurationFileChangeProcessor::new(
                configuration_source,
                settings,
            )))
    }

    /// Register `processor` under its own event type, replacing any previous one.
    pub fn with(mut self, processor: Arc<dyn EventProcessor>) -> Self {
        self.processors.insert(processor.event_type(), processor);
        self
    }

    pub fn is_registered(&self, event_type: InboundEventType) -> bool {
        self.processors.contains_key(&event_type)
    }

    pub async fn route(&self, event: &InboundEvent) -> Result<bool> {
        let event_type = event.event_type();
        let processor = self
            .processors
            .get(&event_type)
            .ok_or_else(|| OrchestratorError::UnroutableEvent(event_type.to_string()))?;

        debug!(%event_type, "routing inbound event");
        processor.process(event).await
    }

    /// Parse a bus envelope and route it.
    pub async fn route_json(&self, envelope: &str) -> Result<bool> {
        let event: InboundEvent = serde_json::from_str(envelope)?;
        self.route(&event).await
    }
}
