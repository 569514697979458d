use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context};

use crate::config::{Config, Mode};
use crate::errors::{AppError, AppResult};
use crate::services::{
    ClientFactory, ClientStore, Database, ExpiringMemoryStore, MemoryClientStore, SharedClient,
};

/// Everything a handler may need, shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub factory: Arc<dyn ClientFactory>,
    pub clients: Arc<dyn ClientStore>,
    /// Browser-session records behind the session cookie.
    pub sessions: ExpiringMemoryStore,
    pub shared: Arc<SharedClient>,
    pub db: Option<Database>,
    /// Fetches file bodies for the download proxy.
    pub http: reqwest::Client,
}

impl AppState {
    /// Opens the database when running multi-tenant.
    pub fn from_config(config: Config, factory: Arc<dyn ClientFactory>) -> anyhow::Result<Self> {
        let db = match config.app.mode {
            Mode::MultiTenant => Some(
                Database::open(&config.database.path)
                    .with_context(|| format!("Failed to open database {}", config.database.path))?,
            ),
            Mode::Session => None,
        };
        Self::new(config, factory, db)
    }

    pub fn new(
        config: Config,
        factory: Arc<dyn ClientFactory>,
        db: Option<Database>,
    ) -> anyhow::Result<Self> {
        if config.app.mode == Mode::MultiTenant {
            ensure!(
                config.pikpak.has_service_account(),
                "multi_tenant mode requires pikpak.username and pikpak.password"
            );
            ensure!(db.is_some(), "multi_tenant mode requires a database");
        }

        let http = reqwest::Client::builder()
            .user_agent(config.pikpak.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.pikpak.request_timeout_secs))
            .build()
            .context("Failed to build download HTTP client")?;

        let clients: Arc<dyn ClientStore> = Arc::new(MemoryClientStore::new(Duration::from_secs(
            config.session.idle_timeout_secs,
        )));
        let shared = Arc::new(SharedClient::new(
            factory.clone(),
            config.pikpak.username.clone(),
            config.pikpak.password.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            factory,
            clients,
            sessions: ExpiringMemoryStore::default(),
            shared,
            db,
            http,
        })
    }

    pub fn mode(&self) -> Mode {
        self.config.app.mode
    }

    pub fn database(&self) -> AppResult<&Database> {
        self.db
            .as_ref()
            .ok_or_else(|| AppError::Internal("Database is not configured".into()))
    }
}
