//! Observability tests for commit orchestration tracing.
//!
//! These verify that the stable `event = "..."` keys are emitted for the
//! recording, finalisation, lifecycle and routing outcomes.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use orchestrator_core::domain::{CoverageFailed, JobStateChange, JobStatus};
use orchestrator_core::obs::{
    emit_contention_exhausted, emit_finalisation_already_claimed, emit_routing_mismatch,
    CommitSpan,
};
use orchestrator_core::processor::{EventProcessor, JobStateChangeProcessor};
use orchestrator_core::{
    BackoffStrategy, CommitCoordinates, InboundEvent, MemoryEventBus, MemoryEventStore,
    MemoryPublishClient, OrchestratorServices, Provider, PullRequestContext,
};
use tracing_test::traced_test;

fn coordinates() -> CommitCoordinates {
    CommitCoordinates::new(Provider::Github, "owner", "repo", "main", "abc123")
}

fn job_change(state: JobStatus, secs: i64) -> InboundEvent {
    InboundEvent::JobStateChange(JobStateChange {
        coordinates: coordinates(),
        context: PullRequestContext::default(),
        external_id: "1".to_string(),
        state,
        event_time: Utc.timestamp_opt(secs, 0).unwrap(),
    })
}

fn processor() -> JobStateChangeProcessor {
    JobStateChangeProcessor::new(OrchestratorServices::new(
        Arc::new(MemoryEventStore::new()),
        BackoffStrategy::immediate(3),
        BackoffStrategy::immediate(2),
        Arc::new(MemoryEventBus::new()),
        Arc::new(MemoryPublishClient::new()),
    ))
}

#[traced_test]
#[tokio::test]
async fn test_commit_span_tags_instrumented_logs() {
    CommitSpan::new("owner-github-repo", "abc123")
        .instrument(async { tracing::info!("inside commit span") })
        .await;
    assert!(logs_contain("orchestrator.commit"));
    assert!(logs_contain("commit=abc123"));
    assert!(logs_contain("inside commit span"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_processing_runs_on_spawned_tasks() {
    let processor = Arc::new(processor());
    let handles: Vec<_> = [(JobStatus::Queued, 10), (JobStatus::Completed, 20)]
        .into_iter()
        .map(|(state, secs)| {
            let processor = processor.clone();
            tokio::spawn(async move { processor.process(&job_change(state, secs)).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }
}

#[traced_test]
#[test]
fn test_contention_exhausted_logs_at_error() {
    emit_contention_exhausted("Job#github-owner-repo-main-abc123-1", 8);
    assert!(logs_contain("state_change.contention_exhausted"));
    assert!(logs_contain("ERROR"));
}

#[traced_test]
#[test]
fn test_already_claimed_logs_identifier() {
    emit_finalisation_already_claimed("Finalised#github-owner-repo-main-abc123");
    assert!(logs_contain("finalisation.already_claimed"));
    assert!(logs_contain("Finalised#github-owner-repo-main-abc123"));
}

#[traced_test]
#[test]
fn test_routing_mismatch_names_both_types() {
    emit_routing_mismatch("JobStateChange", "CoverageFailed");
    assert!(logs_contain("routing.mismatch"));
    assert!(logs_contain("CoverageFailed"));
}

#[traced_test]
#[tokio::test]
async fn test_job_lifecycle_emits_recording_and_finalisation_events() {
    let processor = processor();
    processor
        .process(&job_change(JobStatus::Queued, 10))
        .await
        .unwrap();
    processor
        .process(&job_change(JobStatus::Completed, 20))
        .await
        .unwrap();

    assert!(logs_contain("state_change.recorded"));
    assert!(logs_contain("lifecycle.fired"));
    assert!(logs_contain("UploadsStarted"));
    assert!(logs_contain("finalisation.claimed"));
    assert!(logs_contain("UploadsFinalised"));
}

#[traced_test]
#[tokio::test]
async fn test_stale_and_repeated_events_are_logged() {
    let processor = processor();
    processor
        .process(&job_change(JobStatus::InProgress, 20))
        .await
        .unwrap();
    processor
        .process(&job_change(JobStatus::InProgress, 20))
        .await
        .unwrap();
    processor
        .process(&job_change(JobStatus::Queued, 10))
        .await
        .unwrap();

    assert!(logs_contain("state_change.unchanged"));
    assert!(logs_contain("state_change.out_of_order"));
}

#[traced_test]
#[tokio::test]
async fn test_processor_routing_mismatch_is_logged() {
    let wrong = InboundEvent::CoverageFailed(CoverageFailed {
        coordinates: coordinates(),
        context: PullRequestContext::default(),
        reason: None,
        event_time: Utc::now(),
    });
    assert!(!processor().process(&wrong).await.unwrap());
    assert!(logs_contain("routing.mismatch"));
}
