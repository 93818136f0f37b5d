mod models;
mod handlers;
mod routes;
mod docs;
mod websocket;
mod config;
mod db;
mod hub;
mod runner;
mod utils;

use config::Config;
use db::{dbcode::DbCode, memory::MemoryStore, ChatStore, DocumentStore};
use hub::HubHandle;
use routes::create_app;
use runner::{CodeRunner, ProcessRunner};
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Shared state handed to every route
pub struct AppState {
    pub hub: HubHandle,
    pub runner: Arc<dyn CodeRunner>,
    pub config: Config,
}

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration first so its log level can seed the tracing filter
    let loaded = Config::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter().into()))
        .init();

    info!("Starting server...");
    match loaded {
        Ok(_) => info!("✅ Configuration loaded successfully"),
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            warn!("Using default configuration");
        }
    }
    if config.is_development() {
        info!("Running in {} mode", config.environment);
    }

    let (documents, chats) = open_stores(&config).await;

    // The hub task owns all presence and typing state
    let (hub, hub_task) = HubHandle::spawn(documents, chats, config.history_limit);

    let runner: Arc<dyn CodeRunner> = Arc::new(ProcessRunner::new(
        config.runner_program.clone(),
        config.runner_timeout(),
    ));

    let address = config.server_address();
    let app_state = Arc::new(AppState { hub, runner, config });
    let app_routes = create_app(app_state);

    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", address, e);
            return;
        }
    };

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    if let Err(e) = axum::serve(listener, app_routes).await {
        error!("Server error: {}", e);
    }
    hub_task.abort();
}

/// Pick the persistence backend: PostgreSQL when configured and reachable, memory otherwise
async fn open_stores(config: &Config) -> (Arc<dyn DocumentStore>, Arc<dyn ChatStore>) {
    if let Some(db_url) = &config.db_url {
        match DbCode::connect(db_url).await {
            Ok(db) => {
                info!("Database initialized successfully");
                let db = Arc::new(db);
                let documents: Arc<dyn DocumentStore> = db.clone();
                let chats: Arc<dyn ChatStore> = db;
                return (documents, chats);
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Falling back to in-memory storage; code and chat will not survive a restart");
            }
        }
    } else {
        warn!("No database URL configured - code and chat are kept in memory only");
    }

    let store = Arc::new(MemoryStore::new());
    let documents: Arc<dyn DocumentStore> = store.clone();
    let chats: Arc<dyn ChatStore> = store;
    (documents, chats)
}
