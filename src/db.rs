// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Application state: the store, the Redis cache and the outbound clients.

use crate::{
    auth,
    chart::{ChartBackend, HttpChartBackend},
    config::Config,
    events::{spawn_access_log_recorder, EventBus},
    health::{CoreChecker, DatabaseChecker, HealthRegistry, HttpStatusChecker, PeriodicChecker},
    models::NewUser,
    project_manager::{ProjectManager, StoreProjectManager},
    registry_client::{HttpRegistryClient, RegistryClient},
    scan::{ScanController, StoreScanController},
    store::{MemoryStore, Store, UserStore},
    store_pg::PgStore,
    worker::{HttpJobServiceClient, JobServiceClient},
};
use redis::aio::ConnectionManager;
use reqwest::{header::HeaderMap, Method, StatusCode};
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub projects: Arc<dyn ProjectManager>,
    pub scans: Arc<dyn ScanController>,
    pub worker: Arc<dyn JobServiceClient>,
    pub charts: Arc<dyn ChartBackend>,
    pub registry: Arc<dyn RegistryClient>,
    pub events: EventBus,
    pub health: HealthRegistry,
}

impl AppState {
    /// Wire a state from already-built collaborators. Registers the `core` and
    /// `database` health checkers; nothing is spawned.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        worker: Arc<dyn JobServiceClient>,
        charts: Arc<dyn ChartBackend>,
        registry: Arc<dyn RegistryClient>,
    ) -> Self {
        let mut health = HealthRegistry::new();
        health.register("core", Arc::new(CoreChecker));
        health.register("database", Arc::new(DatabaseChecker::new(store.clone())));
        Self {
            config,
            projects: Arc::new(StoreProjectManager::new(store.clone(), None)),
            scans: Arc::new(StoreScanController::new(store.clone())),
            store,
            worker,
            charts,
            registry,
            events: EventBus::default(),
            health,
        }
    }

    /// Connect everything described by `config`: Postgres (or the in-memory
    /// store when no `DATABASE_URL` is set), Redis (optional), the job service,
    /// the chart backend and the registry.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = match &config.database_url {
            Some(url) => {
                let pool = PgPool::connect(url).await?;
                tracing::info!("Registry Control connected to database");
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("Migrations applied");
                Arc::new(PgStore::new(pool))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using the in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let cache = connect_cache(config.redis_url.as_deref()).await;

        let worker = Arc::new(HttpJobServiceClient::new(
            &config.jobservice_url,
            config.core_secret.clone(),
            config.outbound_timeout,
        )?);
        let charts = Arc::new(HttpChartBackend::new(
            &config.chart_backend_url,
            config.chart_backend_credentials.clone(),
            config.outbound_timeout,
        )?);
        let registry = Arc::new(HttpRegistryClient::new(
            &config.registry_url,
            config.registry_credentials.clone(),
            config.outbound_timeout,
        )?);

        let mut state = Self::new(config, store.clone(), worker, charts, registry);
        state.projects = Arc::new(StoreProjectManager::new(store.clone(), cache));
        state.register_component_checkers()?;
        bootstrap_admin(&state).await?;
        spawn_access_log_recorder(&state.events, store);
        Ok(state)
    }

    /// Periodic checks of the external components.
    fn register_component_checkers(&mut self) -> anyhow::Result<()> {
        let timeout = self.config.health_check_timeout;
        let period = self.config.health_check_period;
        let base = |url: &str| url.trim_end_matches('/').to_string();

        let mut chart_headers = HeaderMap::new();
        if let Some((user, password)) = &self.config.chart_backend_credentials {
            use base64::{engine::general_purpose::STANDARD, Engine};
            let token = STANDARD.encode(format!("{user}:{password}"));
            chart_headers.insert(reqwest::header::AUTHORIZATION, format!("Basic {token}").parse()?);
        }

        let endpoints = [
            (
                "jobservice",
                format!("{}/api/v1/stats", base(&self.config.jobservice_url)),
                HeaderMap::new(),
            ),
            ("registry", format!("{}/", base(&self.config.registry_url)), HeaderMap::new()),
            (
                "chartmuseum",
                format!("{}/health", base(&self.config.chart_backend_url)),
                chart_headers,
            ),
        ];
        for (name, url, headers) in endpoints {
            let checker =
                HttpStatusChecker::new(Method::GET, url, headers, timeout, StatusCode::OK)?;
            self.health
                .register(name, Arc::new(PeriodicChecker::new(Arc::new(checker), period)));
        }
        Ok(())
    }
}

/// Connect to Redis if configured. Failure only disables the cache.
async fn connect_cache(url: Option<&str>) -> Option<ConnectionManager> {
    let Some(url) = url else {
        tracing::info!("REDIS_URL not set, project cache disabled");
        return None;
    };
    match redis::Client::open(url) {
        Ok(client) => match ConnectionManager::new(client).await {
            Ok(mgr) => {
                tracing::info!("Redis cache connected: {}", url);
                Some(mgr)
            }
            Err(e) => {
                tracing::warn!("Redis connect failed (cache disabled): {e}");
                None
            }
        },
        Err(e) => {
            tracing::warn!("Redis URL invalid (cache disabled): {e}");
            None
        }
    }
}

/// Create the configured system administrator on first start.
async fn bootstrap_admin(state: &AppState) -> anyhow::Result<()> {
    let Some(password) = &state.config.admin_password else {
        tracing::warn!("ADMIN_PASSWORD not set, no administrator is bootstrapped");
        return Ok(());
    };
    let username = &state.config.admin_username;
    if state.store.get_user_by_name(username).await?.is_some() {
        return Ok(());
    }
    let salt = auth::generate_salt();
    state
        .store
        .add_user(NewUser {
            username: username.clone(),
            email: String::new(),
            realname: "system admin".into(),
            password_hash: auth::hash_password(password, &salt),
            salt,
            sysadmin_flag: true,
            group_ids: Vec::new(),
        })
        .await?;
    tracing::info!("Created system administrator {username}");
    Ok(())
}
