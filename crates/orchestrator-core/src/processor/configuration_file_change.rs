//! Repository configuration file changes.
//!
//! This processor never touches the event store: it fetches the repository's
//! configuration file at the changed commit, parses it as YAML and hands the
//! resulting settings to a [`SettingsStore`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::EventProcessor;
use crate::domain::{
    CommitCoordinates, ConfigurationFileChange, InboundEvent, InboundEventType,
};
use crate::error::OrchestratorError;
use crate::obs::{self, CommitSpan};
use crate::Result;

/// Name of the per-repository configuration file.
pub const CONFIGURATION_FILE_NAME: &str = ".coverage.yml";

/// Where configuration file contents come from.
#[async_trait]
pub trait ConfigurationFileSource: Send + Sync {
    /// Raw file contents at `coordinates`, or `None` when the repository has
    /// no configuration file.
    async fn fetch(&self, coordinates: &CommitCoordinates) -> Result<Option<String>>;
}

/// Where parsed repository settings are persisted.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn persist(&self, coordinates: &CommitCoordinates, settings: &Value) -> Result<bool>;
}

/// Reads `<root>/<owner>/<repository>/.coverage.yml` from a local mirror.
#[derive(Debug, Clone)]
pub struct FilesystemConfigurationSource {
    root: PathBuf,
}

impl FilesystemConfigurationSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, coordinates: &CommitCoordinates) -> PathBuf {
        self.root
            .join(&coordinates.owner)
            .join(&coordinates.repository)
            .join(CONFIGURATION_FILE_NAME)
    }
}

#[async_trait]
impl ConfigurationFileSource for FilesystemConfigurationSource {
    async fn fetch(&self, coordinates: &CommitCoordinates) -> Result<Option<String>> {
        let path = self.path_for(coordinates);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(OrchestratorError::ConfigurationFile(format!(
                "{}: {err}",
                path.display()
            ))),
        }
    }
}

/// Serves configuration files keyed by repository identifier.
#[derive(Debug, Default)]
pub struct MemoryConfigurationSource {
    files: HashMap<String, String>,
}

impl MemoryConfigurationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, repository_identifier: &str, contents: &str) -> Self {
        self.files
            .insert(repository_identifier.to_string(), contents.to_string());
        self
    }
}

#[async_trait]
impl ConfigurationFileSource for MemoryConfigurationSource {
    async fn fetch(&self, coordinates: &CommitCoordinates) -> Result<Option<String>> {
        Ok(self
            .files
            .get(&coordinates.repository_identifier())
            .cloned())
    }
}

/// Keeps the latest settings per repository identifier.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Mutex<HashMap<String, Value>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, repository_identifier: &str) -> Option<Value> {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(repository_identifier)
            .cloned()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn persist(&self, coordinates: &CommitCoordinates, settings: &Value) -> Result<bool> {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(coordinates.repository_identifier(), settings.clone());
        Ok(true)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSettingsStore;

#[async_trait]
impl SettingsStore for TracingSettingsStore {
    async fn persist(&self, coordinates: &CommitCoordinates, settings: &Value) -> Result<bool> {
        info!(
            repository_identifier = %coordinates.repository_identifier(),
            %settings,
            "settings store (log only)"
        );
        Ok(true)
    }
}

pub struct ConfigurationFileChangeProcessor {
    source: Arc<dyn ConfigurationFileSource>,
    settings: Arc<dyn SettingsStore>,
}

impl ConfigurationFileChangeProcessor {
    pub fn new(
        source: Arc<dyn ConfigurationFileSource>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self { source, settings }
    }

    async fn handle(&self, change: &ConfigurationFileChange) -> Result<bool> {
        let coordinates = &change.coordinates;
        let Some(contents) = self.source.fetch(coordinates).await? else {
            info!("repository has no configuration file");
            return Ok(true);
        };

        // A user's broken file will not parse on redelivery either.
        let settings = match serde_yaml::from_str::<Value>(&contents) {
            Ok(Value::Null) => Value::Object(serde_json::Map::new()),
            Ok(settings) => settings,
            Err(err) => {
                warn!(error = %err, "configuration file is not valid YAML");
                return Ok(false);
            }
        };

        self.settings.persist(coordinates, &settings).await
    }
}

#[async_trait]
impl EventProcessor for ConfigurationFileChangeProcessor {
    fn event_type(&self) -> InboundEventType {
        InboundEventType::ConfigurationFileChange
    }

    async fn process(&self, event: &InboundEvent) -> Result<bool> {
        let InboundEvent::ConfigurationFileChange(change) = event else {
            obs::emit_routing_mismatch(self.event_type().as_str(), event.event_type().as_str());
            return Ok(false);
        };
        CommitSpan::new(&change.coordinates.repository_identifier(), &change.coordinates.commit)
            .instrument(self.handle(change))
            .await
    }
}
