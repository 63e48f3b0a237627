//! Outbound collaborators: the event bus that receives lifecycle events and
//! the publish queue that receives user-facing messages.
//!
//! Each collaborator has three implementations:
//! - `Memory*` records everything it receives (tests)
//! - `Tracing*` only logs (local runs without infrastructure)
//! - `Http*` POSTs JSON to an endpoint with `reqwest`

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::domain::{LifecycleEvent, PublishableMessage};
use crate::error::OrchestratorError;
use crate::Result;

const USER_AGENT: &str = concat!("coverage-orchestrator/", env!("CARGO_PKG_VERSION"));

/// Fire-and-forget publishing of lifecycle events.
#[async_trait]
pub trait EventBusClient: Send + Sync {
    async fn fire_event(&self, source: &str, event: &LifecycleEvent) -> Result<()>;
}

/// Enqueue a user-facing message. Returns whether the queue accepted it.
#[async_trait]
pub trait PublishClient: Send + Sync {
    async fn dispatch(&self, message: &PublishableMessage) -> Result<bool>;
}

/// Records every fired event with its source.
#[derive(Debug, Default)]
pub struct MemoryEventBus {
    fired: Mutex<Vec<(String, LifecycleEvent)>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fired(&self) -> Vec<(String, LifecycleEvent)> {
        self.fired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of fired events with the given detail type.
    pub fn count(&self, detail_type: &str) -> usize {
        self.fired()
            .iter()
            .filter(|(_, event)| event.detail_type() == detail_type)
            .count()
    }
}

#[async_trait]
impl EventBusClient for MemoryEventBus {
    async fn fire_event(&self, source: &str, event: &LifecycleEvent) -> Result<()> {
        self.fired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((source.to_string(), event.clone()));
        Ok(())
    }
}

/// Records every dispatched message and accepts all of them.
#[derive(Debug, Default)]
pub struct MemoryPublishClient {
    dispatched: Mutex<Vec<PublishableMessage>>,
}

impl MemoryPublishClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> Vec<PublishableMessage> {
        self.dispatched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl PublishClient for MemoryPublishClient {
    async fn dispatch(&self, message: &PublishableMessage) -> Result<bool> {
        self.dispatched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());
        Ok(true)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventBus;

#[async_trait]
impl EventBusClient for TracingEventBus {
    async fn fire_event(&self, source: &str, event: &LifecycleEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        info!(source, detail_type = event.detail_type(), %payload, "event bus (log only)");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublishClient;

#[async_trait]
impl PublishClient for TracingPublishClient {
    async fn dispatch(&self, message: &PublishableMessage) -> Result<bool> {
        let payload = serde_json::to_string(message)?;
        info!(%payload, "publish queue (log only)");
        Ok(true)
    }
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| OrchestratorError::Configuration(format!("http client: {e}")))
}

/// POSTs `{ "source", "detail-type", "detail" }` to a bus endpoint.
pub struct HttpEventBus {
    url: String,
    http_client: reqwest::Client,
}

impl HttpEventBus {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            http_client: http_client()?,
        })
    }
}

#[async_trait]
impl EventBusClient for HttpEventBus {
    async fn fire_event(&self, source: &str, event: &LifecycleEvent) -> Result<()> {
        let mut body = serde_json::to_value(event)?;
        body["source"] = json!(source);

        let response = self
            .http_client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestratorError::EventBus(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::EventBus(format!(
                "{} responded {}",
                self.url,
                response.status()
            )));
        }
        Ok(())
    }
}

/// POSTs the message JSON to a publish queue endpoint.
pub struct HttpPublishClient {
    url: String,
    http_client: reqwest::Client,
}

impl HttpPublishClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            http_client: http_client()?,
        })
    }
}

#[async_trait]
impl PublishClient for HttpPublishClient {
    async fn dispatch(&self, message: &PublishableMessage) -> Result<bool> {
        let response = self
            .http_client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| OrchestratorError::Publish(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::Publish(format!(
                "{} responded {}",
                self.url,
                response.status()
            )));
        }
        Ok(true)
    }
}
