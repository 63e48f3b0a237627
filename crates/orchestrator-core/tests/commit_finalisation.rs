//! End-to-end commit orchestration scenarios against the in-memory event
//! store (and SurrealDB `mem://` for the full pipeline), with zero-delay
//! backoffs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use orchestrator_core::domain::{CoverageFinalised, IngestEvent, JobStateChange, JobStatus};
use orchestrator_core::processor::{MemoryConfigurationSource, MemorySettingsStore};
use orchestrator_core::{
    BackoffStrategy, CommitCoordinates, CommitReadinessEvaluator, EventKind, EventRouter,
    EventState, EventStateChangeCollection, EventStoreClient, EventStoreService, Finalised,
    InboundEvent, Ingestion, Job, MemoryEventBus, MemoryEventStore, MemoryPublishClient,
    OrchestratedEvent, OrchestratorServices, Provider, PullRequestContext, RecordOutcome,
    SurrealEventStore,
};
use orchestrator_state::{StateChangeRecord, StorageResult};
use tokio::sync::Barrier;

const REPOSITORY_IDENTIFIER: &str = "owner-github-repo";
const COMMIT: &str = "abc123";

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn coordinates() -> CommitCoordinates {
    CommitCoordinates::new(Provider::Github, "owner", "repo", "main", COMMIT)
}

fn context() -> PullRequestContext {
    PullRequestContext {
        pull_request: Some("12".to_string()),
        base_ref: Some("main".to_string()),
        base_commit: Some("def456".to_string()),
        parent: vec!["def456".to_string()],
    }
}

fn job_change(external_id: &str, state: JobStatus, time: DateTime<Utc>) -> InboundEvent {
    InboundEvent::JobStateChange(JobStateChange {
        coordinates: coordinates(),
        context: context(),
        external_id: external_id.to_string(),
        state,
        event_time: time,
    })
}

fn ingest(upload_id: &str, time: DateTime<Utc>) -> IngestEvent {
    IngestEvent {
        coordinates: coordinates(),
        context: context(),
        upload_id: upload_id.to_string(),
        event_time: time,
    }
}

fn job(external_id: &str, state: EventState, time: DateTime<Utc>) -> OrchestratedEvent {
    OrchestratedEvent::Job(Job {
        coordinates: coordinates(),
        external_id: external_id.to_string(),
        state,
        event_time: time,
    })
}

struct Harness {
    store: Arc<dyn EventStoreClient>,
    bus: Arc<MemoryEventBus>,
    services: OrchestratorServices,
    router: EventRouter,
}

impl Harness {
    fn new(store: Arc<dyn EventStoreClient>) -> Self {
        let bus = Arc::new(MemoryEventBus::new());
        let services = OrchestratorServices::new(
            store.clone(),
            BackoffStrategy::immediate(5),
            BackoffStrategy::immediate(2),
            bus.clone(),
            Arc::new(MemoryPublishClient::new()),
        );
        let router = EventRouter::with_default_processors(
            services.clone(),
            Arc::new(MemoryConfigurationSource::new()),
            Arc::new(MemorySettingsStore::new()),
        );
        Self {
            store,
            bus,
            services,
            router,
        }
    }

    fn memory() -> Self {
        Self::new(Arc::new(MemoryEventStore::new()))
    }

    async fn groups(&self) -> Vec<EventStateChangeCollection> {
        self.services
            .store()
            .get_all_state_changes_for_commit(REPOSITORY_IDENTIFIER, COMMIT)
            .await
            .unwrap()
    }

    async fn row_count(&self) -> usize {
        self.groups().await.iter().map(|g| g.len()).sum()
    }

    async fn finalised_rows(&self) -> usize {
        self.store
            .get_state_changes_for_commit(REPOSITORY_IDENTIFIER, COMMIT)
            .await
            .unwrap()
            .iter()
            .filter(|row| row.kind == EventKind::Finalised.as_str())
            .count()
    }

    async fn reduced(&self) -> Vec<OrchestratedEvent> {
        self.groups()
            .await
            .iter()
            .filter_map(EventStoreService::reduce_state_changes_to_event)
            .collect()
    }
}

#[tokio::test]
async fn test_redelivered_job_event_is_stored_once() {
    let harness = Harness::memory();
    let event = job_change("1", JobStatus::InProgress, at(100));

    assert!(harness.router.route(&event).await.unwrap());
    assert!(harness.router.route(&event).await.unwrap());

    assert_eq!(harness.row_count().await, 1);
    assert_eq!(harness.bus.count("UploadsStarted"), 1);
}

#[tokio::test]
async fn test_older_state_is_rejected_without_a_row() {
    let harness = Harness::memory();
    let recorder = harness.services.recorder.clone();

    recorder
        .record_state_change_in_store(&job("1", EventState::Success, at(200)))
        .await
        .unwrap();
    let outcome = recorder
        .record_state_change_in_store(&job("1", EventState::Ongoing, at(100)))
        .await
        .unwrap();

    assert_eq!(outcome, RecordOutcome::OutOfOrder);
    assert_eq!(harness.row_count().await, 1);

    // Through a processor the stale event still counts as handled.
    assert!(harness
        .router
        .route(&job_change("1", JobStatus::Queued, at(50)))
        .await
        .unwrap());
    assert_eq!(harness.row_count().await, 1);
}

#[tokio::test]
async fn test_same_version_writes_are_exclusive() {
    let store = Arc::new(MemoryEventStore::new());
    let service = EventStoreService::new(store.clone());
    let first = job("1", EventState::Ongoing, at(1));
    let second = job("1", EventState::Success, at(2));
    let view = service.get_all_state_changes_for_event(&first).await.unwrap();

    let (a, b) = tokio::join!(
        service.store_state_change_after(&view, &first),
        service.store_state_change_after(&view, &second),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let conflict = a.err().or(b.err()).unwrap();
    assert!(conflict.is_conditional_write_conflict());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_reduction_matches_highest_version() {
    let harness = Harness::memory();
    let service = harness.services.store();
    for (state, secs) in [
        (EventState::Ongoing, 10),
        (EventState::Ongoing, 20),
        (EventState::Success, 30),
    ] {
        service.store_state_change(&job("1", state, at(secs))).await.unwrap();
    }

    let collection = service
        .get_all_state_changes_for_event(&job("1", EventState::Success, at(30)))
        .await
        .unwrap();
    assert_eq!(collection.latest_version(), 3);
    assert_eq!(
        EventStoreService::reduce_state_changes_to_event(&collection),
        Some(job("1", EventState::Success, at(30)))
    );
}

#[tokio::test]
async fn test_ongoing_job_is_not_ready() {
    let harness = Harness::memory();
    harness
        .services
        .store()
        .store_state_change(&job("1", EventState::Ongoing, at(10)))
        .await
        .unwrap();

    let ready = harness
        .services
        .readiness
        .is_ready_to_finalise(&coordinates())
        .await
        .unwrap();
    assert!(!ready);
    assert_eq!(harness.finalised_rows().await, 0);
}

#[tokio::test]
async fn test_successful_job_without_finalisation_is_ready() {
    let harness = Harness::memory();
    harness
        .services
        .store()
        .store_state_change(&job("1", EventState::Success, at(10)))
        .await
        .unwrap();

    // Two quiet polls, then the budget runs out: ready.
    let ready = harness
        .services
        .readiness
        .is_ready_to_finalise(&coordinates())
        .await
        .unwrap();
    assert!(ready);
}

#[tokio::test]
async fn test_first_event_fires_uploads_started_exactly_once() {
    let harness = Harness::memory();
    assert!(harness
        .services
        .readiness
        .is_no_events_for_commit(&coordinates())
        .await
        .unwrap());

    harness
        .router
        .route(&job_change("1", JobStatus::Queued, at(10)))
        .await
        .unwrap();
    harness
        .router
        .route(&job_change("2", JobStatus::Queued, at(11)))
        .await
        .unwrap();

    assert!(!harness
        .services
        .readiness
        .is_no_events_for_commit(&coordinates())
        .await
        .unwrap());
    let started: Vec<_> = harness
        .bus
        .fired()
        .into_iter()
        .filter(|(_, event)| event.detail_type() == "UploadsStarted")
        .collect();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].0, "orchestrator");
    assert_eq!(started[0].1.coordinates(), &coordinates());
}

#[tokio::test]
async fn test_finalisation_after_latest_ingestion_suppresses_refinalising() {
    let harness = Harness::memory();
    let service = harness.services.store();
    service
        .store_state_change(&OrchestratedEvent::Ingestion(Ingestion {
            coordinates: coordinates(),
            upload_id: "u1".to_string(),
            state: EventState::Success,
            event_time: at(100),
        }))
        .await
        .unwrap();
    service
        .store_state_change(&OrchestratedEvent::Finalised(Finalised {
            coordinates: coordinates(),
            context: context(),
            coverage_percentage: Some(90.0),
            state: EventState::Success,
            event_time: at(200),
        }))
        .await
        .unwrap();

    assert!(CommitReadinessEvaluator::is_already_finalised(
        &harness.reduced().await
    ));

    harness
        .router
        .route(&job_change("1", JobStatus::Completed, at(150)))
        .await
        .unwrap();
    assert_eq!(harness.finalised_rows().await, 1);
    assert_eq!(harness.bus.count("UploadsFinalised"), 0);
}

/// Holds writers at the two points where concurrent finalisers interleave:
/// after a job's terminal state lands, and before a finalisation claim.
struct InterleavingStore {
    inner: MemoryEventStore,
    armed: AtomicBool,
    after_job_write: Barrier,
    before_claim: Barrier,
}

impl InterleavingStore {
    fn new() -> Self {
        Self {
            inner: MemoryEventStore::new(),
            armed: AtomicBool::new(false),
            after_job_write: Barrier::new(2),
            before_claim: Barrier::new(2),
        }
    }
}

#[async_trait]
impl EventStoreClient for InterleavingStore {
    async fn store_state_change(&self, record: &StateChangeRecord) -> StorageResult<()> {
        let armed = self.armed.load(Ordering::SeqCst);
        if armed && record.kind == EventKind::Finalised.as_str() {
            self.before_claim.wait().await;
        }
        self.inner.store_state_change(record).await?;
        if armed && record.kind == EventKind::Job.as_str() {
            self.after_job_write.wait().await;
        }
        Ok(())
    }

    async fn get_state_changes_for_event(
        &self,
        identifier: &str,
    ) -> StorageResult<Vec<StateChangeRecord>> {
        self.inner.get_state_changes_for_event(identifier).await
    }

    async fn get_state_changes_for_commit(
        &self,
        repository_identifier: &str,
        commit: &str,
    ) -> StorageResult<Vec<StateChangeRecord>> {
        self.inner
            .get_state_changes_for_commit(repository_identifier, commit)
            .await
    }
}

#[tokio::test]
async fn test_concurrent_job_completions_finalise_once() {
    let store = Arc::new(InterleavingStore::new());
    let harness = Harness::new(store.clone());
    harness
        .router
        .route(&job_change("1", JobStatus::Queued, at(10)))
        .await
        .unwrap();
    harness
        .router
        .route(&job_change("2", JobStatus::Queued, at(10)))
        .await
        .unwrap();

    // Both completions are stored before either polls, and both polls see a
    // quiescent commit before either claims.
    store.armed.store(true, Ordering::SeqCst);
    let first = job_change("1", JobStatus::Completed, at(20));
    let second = job_change("2", JobStatus::Completed, at(21));
    let (a, b) = tokio::join!(harness.router.route(&first), harness.router.route(&second));
    assert!(a.unwrap());
    assert!(b.unwrap());

    assert_eq!(harness.bus.count("UploadsFinalised"), 1);
    assert_eq!(harness.finalised_rows().await, 1);
}

/// Full pipeline on SurrealDB: jobs and uploads finish, the commit is
/// finalised once, analysis reports coverage, and a later upload reopens it.
#[tokio::test]
async fn test_full_pipeline_on_surrealdb() {
    let store = SurrealEventStore::in_memory().await.unwrap();
    let harness = Harness::new(Arc::new(store));
    // Future times keep the placeholder time deterministic.
    let base = Utc::now() + Duration::hours(1);
    let router = &harness.router;

    router
        .route(&job_change("1", JobStatus::Queued, base))
        .await
        .unwrap();
    router
        .route(&InboundEvent::IngestStarted(ingest("u1", base + Duration::seconds(5))))
        .await
        .unwrap();
    router
        .route(&job_change("1", JobStatus::Completed, base + Duration::seconds(10)))
        .await
        .unwrap();
    // Upload still ingesting: nothing finalised yet.
    assert_eq!(harness.bus.count("UploadsFinalised"), 0);

    let ingested_at = base + Duration::seconds(15);
    router
        .route(&InboundEvent::IngestSuccess(ingest("u1", ingested_at)))
        .await
        .unwrap();
    assert_eq!(harness.bus.count("UploadsStarted"), 1);
    assert_eq!(harness.bus.count("UploadsFinalised"), 1);

    let (_, finalised) = harness
        .bus
        .fired()
        .into_iter()
        .find(|(_, e)| e.detail_type() == "UploadsFinalised")
        .unwrap();
    match finalised {
        orchestrator_core::LifecycleEvent::UploadsFinalised(event) => {
            assert_eq!(event.event_time, ingested_at);
            assert_eq!(event.context, context());
        }
        other => panic!("expected UploadsFinalised, got {other:?}"),
    }

    router
        .route(&InboundEvent::CoverageFinalised(CoverageFinalised {
            coordinates: coordinates(),
            context: context(),
            coverage_percentage: 91.25,
            event_time: base + Duration::seconds(30),
        }))
        .await
        .unwrap();
    let finalised_state = harness
        .reduced()
        .await
        .into_iter()
        .find(|state| state.kind() == EventKind::Finalised)
        .unwrap();
    match finalised_state {
        OrchestratedEvent::Finalised(state) => {
            assert_eq!(state.state, EventState::Success);
            assert_eq!(state.coverage_percentage, Some(91.25));
        }
        other => panic!("expected Finalised, got {other:?}"),
    }

    // A new upload after finalisation reopens the commit.
    router
        .route(&InboundEvent::IngestStarted(ingest("u2", base + Duration::seconds(40))))
        .await
        .unwrap();
    router
        .route(&InboundEvent::IngestSuccess(ingest("u2", base + Duration::seconds(45))))
        .await
        .unwrap();
    assert_eq!(harness.bus.count("UploadsFinalised"), 2);
}
