use async_trait::async_trait;

use super::{EventProcessor, OrchestratorServices};
use crate::domain::{
    EventState, InboundEvent, InboundEventType, Job, JobStateChange, LifecycleEvent,
    OrchestratedEvent,
};
use crate::obs::{self, CommitSpan};
use crate::recorder::RecordOutcome;
use crate::Result;

/// Records CI job progress.
///
/// The first state ever recorded for a commit announces `UploadsStarted`.
/// A job reaching success attempts to finalise the commit.
pub struct JobStateChangeProcessor {
    services: OrchestratorServices,
}

impl JobStateChangeProcessor {
    pub fn new(services: OrchestratorServices) -> Self {
        Self { services }
    }

    async fn handle(&self, change: &JobStateChange) -> Result<bool> {
        let coordinates = &change.coordinates;
        let state = OrchestratedEvent::Job(Job {
            coordinates: coordinates.clone(),
            external_id: change.external_id.clone(),
            state: change.state.as_event_state(),
            event_time: change.event_time,
        });

        let is_first_event = self
            .services
            .readiness
            .is_no_events_for_commit(coordinates)
            .await?;
        let outcome = self
            .services
            .recorder
            .record_state_change_in_store(&state)
            .await?;

        if is_first_event && outcome.is_recorded() {
            self.services
                .fire(LifecycleEvent::uploads_started(
                    coordinates.clone(),
                    change.context.clone(),
                    change.event_time,
                ))
                .await?;
        }

        match outcome {
            RecordOutcome::Conflicted => return Ok(false),
            RecordOutcome::OutOfOrder => return Ok(true),
            RecordOutcome::Recorded { .. } | RecordOutcome::Unchanged => {}
        }

        if state.state() == EventState::Success {
            self.services
                .finalise_if_ready(coordinates, &change.context, change.event_time)
                .await?;
        }

        Ok(true)
    }
}

#[async_trait]
impl EventProcessor for JobStateChangeProcessor {
    fn event_type(&self) -> InboundEventType {
        InboundEventType::JobStateChange
    }

    async fn process(&self, event: &InboundEvent) -> Result<bool> {
        let InboundEvent::JobStateChange(change) = event else {
            obs::emit_routing_mismatch(self.event_type().as_str(), event.event_type().as_str());
            return Ok(false);
        };
        CommitSpan::new(&change.coordinates.repository_identifier(), &change.coordinates.commit)
            .instrument(self.handle(change))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffStrategy;
    use crate::client::{MemoryEventBus, MemoryPublishClient};
    use crate::domain::{
        CommitCoordinates, CoverageFailed, JobStateChange, JobStatus, PullRequestContext,
        Provider,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use orchestrator_state::MemoryEventStore;
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn change(external_id: &str, state: JobStatus, secs: i64) -> InboundEvent {
        InboundEvent::JobStateChange(JobStateChange {
            coordinates: CommitCoordinates::new(Provider::Github, "owner", "repo", "main", "abc"),
            context: PullRequestContext::default(),
            external_id: external_id.to_string(),
            state,
            event_time: at(secs),
        })
    }

    fn processor() -> (Arc<MemoryEventStore>, Arc<MemoryEventBus>, JobStateChangeProcessor) {
        let store = Arc::new(MemoryEventStore::new());
        let bus = Arc::new(MemoryEventBus::new());
        let services = OrchestratorServices::new(
            store.clone(),
            BackoffStrategy::immediate(3),
            BackoffStrategy::immediate(2),
            bus.clone(),
            Arc::new(MemoryPublishClient::new()),
        );
        (store, bus, JobStateChangeProcessor::new(services))
    }

    #[tokio::test]
    async fn test_queued_job_announces_uploads_started_once() {
        let (store, bus, processor) = processor();
        assert!(processor.process(&change("1", JobStatus::Queued, 10)).await.unwrap());
        assert!(processor
            .process(&change("1", JobStatus::InProgress, 20))
            .await
            .unwrap());

        assert_eq!(store.len(), 2);
        assert_eq!(bus.count("UploadsStarted"), 1);
        assert_eq!(bus.count("UploadsFinalised"), 0);
    }

    #[tokio::test]
    async fn test_completed_job_finalises_quiet_commit() {
        let (store, bus, processor) = processor();
        processor.process(&change("1", JobStatus::Queued, 10)).await.unwrap();
        processor
            .process(&change("1", JobStatus::Completed, 20))
            .await
            .unwrap();

        // Two job rows plus the Finalised placeholder.
        assert_eq!(store.len(), 3);
        assert_eq!(bus.count("UploadsFinalised"), 1);
    }

    #[tokio::test]
    async fn test_sibling_ongoing_job_defers_finalisation() {
        let (_, bus, processor) = processor();
        processor.process(&change("1", JobStatus::Queued, 10)).await.unwrap();
        processor.process(&change("2", JobStatus::Queued, 10)).await.unwrap();
        processor
            .process(&change("1", JobStatus::Completed, 20))
            .await
            .unwrap();
        assert_eq!(bus.count("UploadsFinalised"), 0);

        processor
            .process(&change("2", JobStatus::Completed, 30))
            .await
            .unwrap();
        assert_eq!(bus.count("UploadsFinalised"), 1);
    }

    #[tokio::test]
    async fn test_routing_mismatch_returns_false() {
        let (store, _, processor) = processor();
        let wrong = InboundEvent::CoverageFailed(CoverageFailed {
            coordinates: CommitCoordinates::new(Provider::Github, "owner", "repo", "main", "abc"),
            context: PullRequestContext::default(),
            reason: None,
            event_time: at(1),
        });
        assert!(!processor.process(&wrong).await.unwrap());
        assert!(store.is_empty());
    }
}
