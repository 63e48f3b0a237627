//! SurrealDB connection setup
//!
//! Supports in-memory, URL (`ws://`, `surrealkv://`, ...) and cloud
//! (WebSocket + credentials) connections. Every connection selects the
//! namespace/database and runs the schema migrations before it is handed out.

use crate::error::StateError;
use crate::migrations;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

const DEFAULT_NAMESPACE: &str = "coverage";
const DEFAULT_DATABASE: &str = "orchestrator";
const LOCAL_DB_PATH: &str = ".orchestrator/db";

/// Credentials for a remote (WebSocket) event store.
///
/// Orchestrator invocations are short-lived, so every one signs in again;
/// nothing here is cached between connections.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// `wss://` endpoint of the hosted instance
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Defaults to `coverage`
    pub namespace: String,
    /// Defaults to `orchestrator`
    pub database: String,
    /// Sign in as a root user instead of a database-scoped user
    pub is_root: bool,
}

impl CloudConfig {
    /// Database-scoped credentials in the default namespace and database.
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Read the remote store credentials from the process environment.
    ///
    /// See [`Self::from_lookup`] for the variables.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the remote store credentials through `lookup`.
    ///
    /// `SURREALDB_ENDPOINT` selects the remote store; without it there is
    /// nothing to connect to and `None` is returned. Once an endpoint is
    /// given, `SURREALDB_USERNAME` and `SURREALDB_PASSWORD` are required.
    /// `SURREALDB_NAMESPACE`, `SURREALDB_DATABASE` and `SURREALDB_ROOT`
    /// (`true` for a root user) are optional.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let Some(endpoint) = lookup("SURREALDB_ENDPOINT") else {
            return Ok(None);
        };
        let required = |key: &str| {
            lookup(key).ok_or_else(|| {
                StateError::Connection(format!("{key} is required when SURREALDB_ENDPOINT is set"))
            })
        };

        let mut config = Self::new(
            endpoint,
            required("SURREALDB_USERNAME")?,
            required("SURREALDB_PASSWORD")?,
        );
        if let Some(namespace) = lookup("SURREALDB_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Some(database) = lookup("SURREALDB_DATABASE") {
            config.database = database;
        }
        config.is_root = lookup("SURREALDB_ROOT")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(Some(config))
    }
}

/// Connect to an in-memory SurrealDB and run migrations.
#[instrument(skip_all)]
pub async fn connect_in_memory() -> Result<Surreal<Any>> {
    connect_url("mem://").await
}

/// Connect to the given SurrealDB URL, using the default namespace/database.
#[instrument]
pub async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    info!("SurrealDB connected ({})", url);
    Ok(db)
}

/// Connect to SurrealDB Cloud and run migrations.
#[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
pub async fn connect_cloud(config: &CloudConfig) -> Result<Surreal<Any>> {
    info!("Connecting to SurrealDB Cloud (root={})", config.is_root);

    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Database authentication failed: {}", e)))?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to select namespace/database: {}", e))
        })?;

    migrations::init_schema(&db).await?;
    info!("SurrealDB Cloud connected and schema initialized");
    Ok(db)
}

/// Connect using environment variables
///
/// If SURREALDB_ENDPOINT is set, signs in to that remote store.
/// If SURREALDB_URL is set, connects to that URL.
/// Otherwise, falls back to local persistence under `.orchestrator/db`.
#[instrument(skip_all)]
pub async fn connect_from_env() -> Result<Surreal<Any>> {
    if let Some(config) = CloudConfig::from_env()? {
        info!("Remote store credentials found, connecting to {}", config.endpoint);
        return connect_cloud(&config).await;
    }

    if let Ok(url) = std::env::var("SURREALDB_URL") {
        info!("SURREALDB_URL found, connecting to {}", url);
        return connect_url(&url).await;
    }

    std::fs::create_dir_all(LOCAL_DB_PATH).map_err(|e| {
        StateError::Connection(format!(
            "Failed to create database directory {}: {}",
            LOCAL_DB_PATH, e
        ))
    })?;
    let url = format!("surrealkv://{}", LOCAL_DB_PATH);
    info!(
        "No cloud config or SURREALDB_URL found, using local persistence: {}",
        url
    );
    connect_url(&url).await
}
