//! Dumphub - dumper task dashboard backend

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dumphub::{
    api::{self, AppState},
    auth::{select_backend, TokenCodec},
    config::{self, Config},
    db::{
        self,
        repositories::{
            SqlxLicenseRepository, SqlxMachineRepository, SqlxNotificationRepository,
            SqlxPresetRepository, SqlxTaskRepository, SqlxUserRepository,
        },
    },
    services::{AccountService, LicenseService, LocalObjectStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dumphub=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting dumphub...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // The signing secret must come from the environment; refuse to start
    // without it
    let secret = config::require_session_secret()?;

    // Initialize database
    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("Database connected: {}", config.database.url);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Token codec with the configured MAC backend
    let backend = select_backend(config.session.mac_backend);
    tracing::info!("Session tokens signed with {} backend", backend.name());
    let codec = Arc::new(TokenCodec::new(secret, backend));

    // Create repositories
    let users = SqlxUserRepository::boxed(pool.clone());
    let licenses = SqlxLicenseRepository::boxed(pool.clone());
    let machines = SqlxMachineRepository::boxed(pool.clone());
    let tasks = SqlxTaskRepository::boxed(pool.clone());
    let notifications = SqlxNotificationRepository::boxed(pool.clone());
    let presets = SqlxPresetRepository::boxed(pool.clone());

    // Initialize services
    let account_service = Arc::new(AccountService::new(users.clone()));
    let license_service = Arc::new(LicenseService::new(users.clone(), licenses));

    // Dump file storage
    tokio::fs::create_dir_all(&config.storage.path).await?;
    let store = Arc::new(LocalObjectStore::new(config.storage.path.clone()));
    tracing::info!("File storage at {}", config.storage.path.display());

    // Build application state
    let state = AppState {
        pool,
        codec,
        account_service,
        license_service,
        users,
        machines,
        tasks,
        notifications,
        presets,
        store,
        session_config: Arc::new(config.session.clone()),
        storage_config: Arc::new(config.storage.clone()),
    };

    // Build router
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
