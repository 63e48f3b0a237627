//! Orchestrated events: the entities whose lifecycle the event store tracks.
//!
//! Each value is an immutable, point-in-time observation of one logical
//! entity. Every observation is written as a new versioned row; the current
//! state of an entity is obtained by reducing all of its rows.
//!
//! Stored payloads carry no type information of their own. The concrete type
//! is persisted next to the payload as a [`EventKind`] and decoded through
//! [`OrchestratedEvent::decode`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::EventDecodeError;

/// Source VCS of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Github,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Github => "github",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state shared by every orchestrated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventState {
    Ongoing,
    Success,
    Failure,
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventState::Ongoing => "ONGOING",
            EventState::Success => "SUCCESS",
            EventState::Failure => "FAILURE",
        })
    }
}

/// Repository + ref + commit an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitCoordinates {
    pub provider: Provider,
    pub owner: String,
    pub repository: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub commit: String,
}

impl CommitCoordinates {
    pub fn new(
        provider: Provider,
        owner: impl Into<String>,
        repository: impl Into<String>,
        git_ref: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            owner: owner.into(),
            repository: repository.into(),
            git_ref: git_ref.into(),
            commit: commit.into(),
        }
    }

    /// `owner-provider-repository`: partition key independent of commit.
    pub fn repository_identifier(&self) -> String {
        format!("{}-{}-{}", self.owner, self.provider, self.repository)
    }

    /// `provider-owner-repository-ref-commit`
    fn identifier_stem(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}",
            self.provider, self.owner, self.repository, self.git_ref, self.commit
        )
    }

    /// Identifier of the single `Finalised` entity for this ref and commit.
    pub fn finalised_identifier(&self) -> String {
        format!("Finalised#{}", self.identifier_stem())
    }
}

/// Pull request / base information carried alongside a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_commit: Option<String>,
    /// Parent commit SHAs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent: Vec<String>,
}

/// One CI job's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(flatten)]
    pub coordinates: CommitCoordinates,
    /// Provider-side check run / job id
    pub external_id: String,
    pub state: EventState,
    pub event_time: DateTime<Utc>,
}

/// One coverage file upload's ingest lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingestion {
    #[serde(flatten)]
    pub coordinates: CommitCoordinates,
    pub upload_id: String,
    pub state: EventState,
    pub event_time: DateTime<Utc>,
}

/// The commit's overall finalised coverage outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finalised {
    #[serde(flatten)]
    pub coordinates: CommitCoordinates,
    #[serde(flatten)]
    pub context: PullRequestContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_percentage: Option<f64>,
    pub state: EventState,
    pub event_time: DateTime<Utc>,
}

/// Concrete type of an orchestrated event, persisted as the `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Job,
    Ingestion,
    Finalised,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Job => "Job",
            EventKind::Ingestion => "Ingestion",
            EventKind::Finalised => "Finalised",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Job" => Ok(EventKind::Job),
            "Ingestion" => Ok(EventKind::Ingestion),
            "Finalised" => Ok(EventKind::Finalised),
            other => Err(EventDecodeError::UnknownKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// Tagged union over every orchestrated entity.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratedEvent {
    Job(Job),
    Ingestion(Ingestion),
    Finalised(Finalised),
}

impl OrchestratedEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            OrchestratedEvent::Job(_) => EventKind::Job,
            OrchestratedEvent::Ingestion(_) => EventKind::Ingestion,
            OrchestratedEvent::Finalised(_) => EventKind::Finalised,
        }
    }

    pub fn coordinates(&self) -> &CommitCoordinates {
        match self {
            OrchestratedEvent::Job(e) => &e.coordinates,
            OrchestratedEvent::Ingestion(e) => &e.coordinates,
            OrchestratedEvent::Finalised(e) => &e.coordinates,
        }
    }

    pub fn state(&self) -> EventState {
        match self {
            OrchestratedEvent::Job(e) => e.state,
            OrchestratedEvent::Ingestion(e) => e.state,
            OrchestratedEvent::Finalised(e) => e.state,
        }
    }

    pub fn event_time(&self) -> DateTime<Utc> {
        match self {
            OrchestratedEvent::Job(e) => e.event_time,
            OrchestratedEvent::Ingestion(e) => e.event_time,
            OrchestratedEvent::Finalised(e) => e.event_time,
        }
    }

    pub(crate) fn set_event_time(&mut self, event_time: DateTime<Utc>) {
        match self {
            OrchestratedEvent::Job(e) => e.event_time = event_time,
            OrchestratedEvent::Ingestion(e) => e.event_time = event_time,
            OrchestratedEvent::Finalised(e) => e.event_time = event_time,
        }
    }

    /// Primary storage key shared by every state change of this entity.
    pub fn unique_identifier(&self) -> String {
        let stem = self.coordinates().identifier_stem();
        match self {
            OrchestratedEvent::Job(e) => format!("Job#{}-{}", stem, e.external_id),
            OrchestratedEvent::Ingestion(e) => format!("Ingestion#{}-{}", stem, e.upload_id),
            OrchestratedEvent::Finalised(e) => e.coordinates.finalised_identifier(),
        }
    }

    pub fn repository_identifier(&self) -> String {
        self.coordinates().repository_identifier()
    }

    /// Serialize the concrete payload (without a type tag).
    pub fn encode(&self) -> serde_json::Result<String> {
        match self {
            OrchestratedEvent::Job(e) => serde_json::to_string(e),
            OrchestratedEvent::Ingestion(e) => serde_json::to_string(e),
            OrchestratedEvent::Finalised(e) => serde_json::to_string(e),
        }
    }

    /// Decode a stored payload using its persisted kind.
    pub fn decode(kind: &str, payload: &str) -> Result<Self, EventDecodeError> {
        let kind: EventKind = kind.parse()?;
        let invalid = |source| EventDecodeError::InvalidPayload {
            kind: kind.to_string(),
            source,
        };
        match kind {
            EventKind::Job => serde_json::from_str(payload)
                .map(OrchestratedEvent::Job)
                .map_err(invalid),
            EventKind::Ingestion => serde_json::from_str(payload)
                .map(OrchestratedEvent::Ingestion)
                .map_err(invalid),
            EventKind::Finalised => serde_json::from_str(payload)
                .map(OrchestratedEvent::Finalised)
                .map_err(invalid),
        }
    }
}

impl From<Job> for OrchestratedEvent {
    fn from(job: Job) -> Self {
        OrchestratedEvent::Job(job)
    }
}

impl From<Ingestion> for OrchestratedEvent {
    fn from(ingestion: Ingestion) -> Self {
        OrchestratedEvent::Ingestion(ingestion)
    }
}

impl From<Finalised> for OrchestratedEvent {
    fn from(finalised: Finalised) -> Self {
        OrchestratedEvent::Finalised(finalised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn coordinates() -> CommitCoordinates {
        CommitCoordinates::new(Provider::Github, "owner", "repo", "main", "abc123")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_identifiers() {
        let job = OrchestratedEvent::Job(Job {
            coordinates: coordinates(),
            external_id: "42".to_string(),
            state: EventState::Ongoing,
            event_time: at(1),
        });
        assert_eq!(job.unique_identifier(), "Job#github-owner-repo-main-abc123-42");
        assert_eq!(job.repository_identifier(), "owner-github-repo");

        let ingestion = OrchestratedEvent::Ingestion(Ingestion {
            coordinates: coordinates(),
            upload_id: "up-1".to_string(),
            state: EventState::Success,
            event_time: at(1),
        });
        assert_eq!(
            ingestion.unique_identifier(),
            "Ingestion#github-owner-repo-main-abc123-up-1"
        );

        let finalised = OrchestratedEvent::Finalised(Finalised {
            coordinates: coordinates(),
            context: PullRequestContext::default(),
            coverage_percentage: None,
            state: EventState::Ongoing,
            event_time: at(1),
        });
        assert_eq!(
            finalised.unique_identifier(),
            "Finalised#github-owner-repo-main-abc123"
        );
    }

    #[test]
    fn test_payload_shape_is_camel_case_and_flat() {
        let job = OrchestratedEvent::Job(Job {
            coordinates: coordinates(),
            external_id: "42".to_string(),
            state: EventState::Success,
            event_time: at(1_700_000_000),
        });
        let value: serde_json::Value = serde_json::from_str(&job.encode().unwrap()).unwrap();
        assert_eq!(value["externalId"], "42");
        assert_eq!(value["ref"], "main");
        assert_eq!(value["provider"], "github");
        assert_eq!(value["state"], "SUCCESS");
        assert!(value.get("coordinates").is_none());
    }

    #[test]
    fn test_decode_dispatches_on_kind() {
        let finalised = OrchestratedEvent::Finalised(Finalised {
            coordinates: coordinates(),
            context: PullRequestContext {
                pull_request: Some("7".to_string()),
                base_ref: Some("main".to_string()),
                base_commit: Some("def".to_string()),
                parent: vec!["p1".to_string()],
            },
            coverage_percentage: Some(81.5),
            state: EventState::Success,
            event_time: at(5),
        });
        let payload = finalised.encode().unwrap();
        let decoded = OrchestratedEvent::decode("Finalised", &payload).unwrap();
        assert_eq!(decoded, finalised);

        // Same payload, wrong kind: a Finalised payload has no externalId.
        let err = OrchestratedEvent::decode("Job", &payload).unwrap_err();
        assert!(matches!(err, EventDecodeError::InvalidPayload { .. }));
    }

    #[test]
    fn test_decode_unknown_kind() {
        let err = OrchestratedEvent::decode("Upload", "{}").unwrap_err();
        assert!(matches!(err, EventDecodeError::UnknownKind { kind } if kind == "Upload"));
    }
}
