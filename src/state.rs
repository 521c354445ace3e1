use crate::config::AppConfig;
use crate::storage::{IntakeStore, MemoryStore, PgStore, WeightStore};
use anyhow::Context;
use std::sync::Arc;

/// Everything a handler needs, passed explicitly through axum's `State`.
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<dyn IntakeStore>,
    pub weights: Arc<dyn WeightStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = PgStore::connect(&config.database_url, config.max_connections)
            .await
            .context("connect to database")?;
        store.migrate().await.context("run migrations")?;

        Ok(Self::with_store(store, config))
    }

    pub fn with_store<S>(store: S, config: Arc<AppConfig>) -> Self
    where
        S: IntakeStore + WeightStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            intake: store.clone(),
            weights: store,
            config,
        }
    }

    /// In-memory state with an empty catalog and the test JWT settings.
    pub fn fake() -> Self {
        Self::with_store(MemoryStore::new(), Arc::new(AppConfig::for_tests()))
    }
}
