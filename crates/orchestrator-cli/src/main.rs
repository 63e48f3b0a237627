//! Coverage Orchestrator CLI
//!
//! The `orchestrator` command is the invocation entry point for one inbound
//! bus event, plus an inspection command for a commit's current state.
//!
//! ## Commands
//!
//! - `handle`: route one event envelope (from a file or stdin) to its processor
//! - `state`: print the reduced state of every entity recorded for a commit

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use orchestrator_core::processor::{
    ConfigurationFileSource, FilesystemConfigurationSource, MemoryConfigurationSource,
    SettingsStore, TracingSettingsStore,
};
use orchestrator_core::{
    CommitCoordinates, EventBusClient, EventRouter, EventStoreClient, EventStoreService,
    HttpEventBus, HttpPublishClient, InboundEvent, OrchestratorConfig, OrchestratorServices,
    Provider, PublishClient, SurrealEventStore, TracingEventBus, TracingPublishClient,
};
use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Coverage pipeline orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one inbound event envelope
    ///
    /// Exits non-zero when processing fails or the event was not handled, so
    /// the caller can redeliver.
    Handle {
        /// Path to the event envelope JSON (default: read stdin)
        #[arg(short, long)]
        event: Option<PathBuf>,
    },

    /// Print the reduced state of every entity for a commit
    State {
        /// Source VCS provider
        #[arg(long, default_value = "github")]
        provider: String,

        /// Repository owner
        #[arg(long)]
        owner: String,

        /// Repository name
        #[arg(long)]
        repository: String,

        /// Commit SHA
        #[arg(long)]
        commit: String,
    },
}

#[derive(Debug, Serialize)]
struct EntityState {
    identifier: String,
    kind: String,
    version: u64,
    state: Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    orchestrator_core::telemetry::init_tracing(cli.json, level);

    let config = OrchestratorConfig::from_env().context("Invalid orchestrator configuration")?;
    let store: Arc<dyn EventStoreClient> = Arc::new(
        SurrealEventStore::from_env()
            .await
            .context("Failed to connect to the event store")?,
    );

    match cli.command {
        Commands::Handle { event } => cmd_handle(&config, store, event.as_deref()).await,
        Commands::State {
            provider,
            owner,
            repository,
            commit,
        } => cmd_state(store, &provider, &owner, &repository, &commit).await,
    }
}

fn build_router(config: &OrchestratorConfig, store: Arc<dyn EventStoreClient>) -> Result<EventRouter> {
    let event_bus: Arc<dyn EventBusClient> = match &config.event_bus_url {
        Some(url) => Arc::new(HttpEventBus::new(url.as_str())?),
        None => Arc::new(TracingEventBus),
    };
    let publish: Arc<dyn PublishClient> = match &config.publish_url {
        Some(url) => Arc::new(HttpPublishClient::new(url.as_str())?),
        None => Arc::new(TracingPublishClient),
    };
    let configuration_source: Arc<dyn ConfigurationFileSource> = match &config.configuration_root
    {
        Some(root) => Arc::new(FilesystemConfigurationSource::new(root.clone())),
        None => Arc::new(MemoryConfigurationSource::new()),
    };
    let settings: Arc<dyn SettingsStore> = Arc::new(TracingSettingsStore);

    let services = OrchestratorServices::new(
        store,
        config.recorder_strategy(),
        config.ready_strategy(),
        event_bus,
        publish,
    );
    Ok(EventRouter::with_default_processors(
        services,
        configuration_source,
        settings,
    ))
}

fn read_event(path: Option<&Path>) -> Result<InboundEvent> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event from {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read event from stdin")?;
            raw
        }
    };
    serde_json::from_str(&raw).context("Event is not a recognised bus envelope")
}

async fn cmd_handle(
    config: &OrchestratorConfig,
    store: Arc<dyn EventStoreClient>,
    path: Option<&Path>,
) -> Result<()> {
    let event = read_event(path)?;
    let router = build_router(config, store)?;
    let event_type = event.event_type();

    let handled = router
        .route(&event)
        .await
        .with_context(|| format!("Failed to process {event_type}"))?;
    if !handled {
        bail!("{event_type} was not handled");
    }

    info!(%event_type, "event handled");
    Ok(())
}

async fn cmd_state(
    store: Arc<dyn EventStoreClient>,
    provider: &str,
    owner: &str,
    repository: &str,
    commit: &str,
) -> Result<()> {
    let provider: Provider = serde_json::from_value(Value::String(provider.to_string()))
        .with_context(|| format!("Unknown provider: {provider}"))?;
    // Ref does not take part in the commit index.
    let coordinates = CommitCoordinates::new(provider, owner, repository, "", commit);

    let service = EventStoreService::new(store);
    let groups = service
        .get_all_state_changes_for_commit(&coordinates.repository_identifier(), commit)
        .await
        .context("Failed to read commit state")?;

    let mut entities = Vec::with_capacity(groups.len());
    for group in &groups {
        let Some(reduced) = EventStoreService::reduce_state_changes_to_event(group) else {
            continue;
        };
        entities.push(EntityState {
            identifier: group.identifier().to_string(),
            kind: reduced.kind().to_string(),
            version: group.latest_version(),
            state: serde_json::from_str(&reduced.encode()?)?,
        });
    }

    println!("{}", serde_json::to_string_pretty(&entities)?);
    Ok(())
}
