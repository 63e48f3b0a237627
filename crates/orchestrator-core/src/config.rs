//! Orchestrator configuration from the environment.
//!
//! | variable | default |
//! |---|---|
//! | `ORCHESTRATOR_RECORDER_MAX_ATTEMPTS` | 8 |
//! | `ORCHESTRATOR_RECORDER_BASE_DELAY_MS` | 50 |
//! | `ORCHESTRATOR_RECORDER_MAX_DELAY_MS` | 1000 |
//! | `ORCHESTRATOR_RECORDER_MAX_ELAPSED_MS` | 5000 |
//! | `ORCHESTRATOR_READY_MAX_ATTEMPTS` | 4 |
//! | `ORCHESTRATOR_READY_DELAY_MS` | 3000 |
//! | `ORCHESTRATOR_READY_MAX_ELAPSED_MS` | 30000 |
//! | `ORCHESTRATOR_EVENT_BUS_URL` | unset (log only) |
//! | `ORCHESTRATOR_PUBLISH_URL` | unset (log only) |
//! | `ORCHESTRATOR_CONFIGURATION_ROOT` | unset (no configuration files) |

use std::path::PathBuf;
use std::str::FromStr;

use crate::backoff::{BackoffConfig, BackoffStrategy};
use crate::error::OrchestratorError;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub recorder_backoff: BackoffConfig,
    pub ready_backoff: BackoffConfig,
    pub event_bus_url: Option<String>,
    pub publish_url: Option<String>,
    /// Local mirror holding `<owner>/<repository>/.coverage.yml` files.
    pub configuration_root: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            recorder_backoff: BackoffConfig::event_store_recorder(),
            ready_backoff: BackoffConfig::ready_to_finalise(),
            event_bus_url: None,
            publish_url: None,
            configuration_root: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults;
    /// values that do not parse are a [`OrchestratorError::Configuration`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let recorder = &mut config.recorder_backoff;
        set(&lookup, "ORCHESTRATOR_RECORDER_MAX_ATTEMPTS", &mut recorder.max_attempts)?;
        set(&lookup, "ORCHESTRATOR_RECORDER_BASE_DELAY_MS", &mut recorder.base_delay_ms)?;
        set(&lookup, "ORCHESTRATOR_RECORDER_MAX_DELAY_MS", &mut recorder.max_delay_ms)?;
        set(&lookup, "ORCHESTRATOR_RECORDER_MAX_ELAPSED_MS", &mut recorder.max_elapsed_ms)?;

        let ready = &mut config.ready_backoff;
        set(&lookup, "ORCHESTRATOR_READY_MAX_ATTEMPTS", &mut ready.max_attempts)?;
        if let Some(delay_ms) = parse::<u64>(&lookup, "ORCHESTRATOR_READY_DELAY_MS")? {
            ready.base_delay_ms = delay_ms;
            ready.max_delay_ms = delay_ms;
        }
        set(&lookup, "ORCHESTRATOR_READY_MAX_ELAPSED_MS", &mut ready.max_elapsed_ms)?;

        config.event_bus_url = non_empty(&lookup, "ORCHESTRATOR_EVENT_BUS_URL");
        config.publish_url = non_empty(&lookup, "ORCHESTRATOR_PUBLISH_URL");
        config.configuration_root =
            non_empty(&lookup, "ORCHESTRATOR_CONFIGURATION_ROOT").map(PathBuf::from);

        Ok(config)
    }

    pub fn recorder_strategy(&self) -> BackoffStrategy {
        BackoffStrategy::new("event_store_recorder", self.recorder_backoff.clone())
    }

    pub fn ready_strategy(&self) -> BackoffStrategy {
        BackoffStrategy::new("ready_to_finalise", self.ready_backoff.clone())
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| OrchestratorError::Configuration(format!("{key}={raw}: {e}"))),
    }
}

fn set<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = parse(lookup, key)? {
        *target = value;
    }
    Ok(())
}
