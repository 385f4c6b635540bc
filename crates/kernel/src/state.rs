//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use crate::config::Config;
use crate::content::{CollisionPolicy, FilterPipeline, TypeRegistry};
use crate::file::{FileStorage, LocalFileStorage};
use crate::middleware::{Authorizer, TokenAuthorizer};
use crate::plugin::LoadedPlugins;
use crate::store::{MemoryStore, PgStore, Store};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Content types attached at startup; frozen before serving.
    registry: TypeRegistry,

    /// Content persistence.
    store: Arc<dyn Store>,

    /// Storage for uploaded files.
    files: Arc<dyn FileStorage>,

    /// Decides which callers are authorized.
    authorizer: Arc<dyn Authorizer>,

    /// Visibility and omission filters for outgoing records.
    filters: FilterPipeline,

    /// How forms mixing `field` and `field.N` are treated.
    collision_policy: CollisionPolicy,

    config: Config,

    /// Outcome of the startup load pass.
    plugins: Option<LoadedPlugins>,
}

impl AppState {
    /// Create application state, connecting the configured store.
    pub async fn new(config: &Config, registry: TypeRegistry, plugins: LoadedPlugins) -> Result<Self> {
        let store = connect_store(config).await?;
        record_server_config(store.as_ref(), config).await?;

        Ok(Self::builder(config.clone(), registry)
            .store(store)
            .plugins(plugins)
            .build())
    }

    /// Assemble state from parts. Unset parts get in-memory or
    /// config-derived defaults.
    pub fn builder(config: Config, registry: TypeRegistry) -> AppStateBuilder {
        AppStateBuilder {
            config,
            registry,
            store: None,
            files: None,
            authorizer: None,
            plugins: None,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    pub fn files(&self) -> &dyn FileStorage {
        self.inner.files.as_ref()
    }

    pub fn authorizer(&self) -> &dyn Authorizer {
        self.inner.authorizer.as_ref()
    }

    pub fn filters(&self) -> &FilterPipeline {
        &self.inner.filters
    }

    pub fn collision_policy(&self) -> CollisionPolicy {
        self.inner.collision_policy
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn plugins(&self) -> Option<&LoadedPlugins> {
        self.inner.plugins.as_ref()
    }
}

/// Builder returned by [`AppState::builder`].
pub struct AppStateBuilder {
    config: Config,
    registry: TypeRegistry,
    store: Option<Arc<dyn Store>>,
    files: Option<Arc<dyn FileStorage>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    plugins: Option<LoadedPlugins>,
}

impl AppStateBuilder {
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn files(mut self, files: Arc<dyn FileStorage>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn plugins(mut self, plugins: LoadedPlugins) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn build(self) -> AppState {
        let config = self.config;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let files = self.files.unwrap_or_else(|| {
            Arc::new(LocalFileStorage::new(
                config.uploads_dir.clone(),
                config.files_url.clone(),
            ))
        });
        let authorizer = self
            .authorizer
            .unwrap_or_else(|| Arc::new(TokenAuthorizer::new(config.api_token.clone())));

        AppState {
            inner: Arc::new(AppStateInner {
                registry: self.registry,
                store,
                files,
                authorizer,
                filters: FilterPipeline::standard(),
                collision_policy: config.collision_policy(),
                config,
                plugins: self.plugins,
            }),
        }
    }
}

/// Connect PostgreSQL when `DATABASE_URL` is set, else use memory.
pub async fn connect_store(config: &Config) -> Result<Arc<dyn Store>> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections)
                .await
                .context("failed to connect to PostgreSQL")?;
            info!("using PostgreSQL content store");
            Ok(Arc::new(store))
        }
        None => {
            info!("DATABASE_URL not set; content is kept in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Write the listener settings other components read from the store.
pub async fn record_server_config(store: &dyn Store, config: &Config) -> Result<()> {
    let entries = [
        ("http_port", Value::from(config.http_port)),
        ("https_port", Value::from(config.https_port)),
        ("bind_addr", Value::from(config.bind_addr.clone())),
    ];
    for (key, value) in entries {
        store
            .put_config(key, value)
            .await
            .with_context(|| format!("failed to record {key}"))?;
    }
    Ok(())
}
