use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use draftmill::db::store::RunStore;
use draftmill::db::PgRunStore;
use draftmill::engine::WorkflowEngine;
use draftmill::llm::{Generation, GenerationClient};
use draftmill::search::{SerpApiClient, WebSearch};
use draftmill::{config::Config, create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "draftmill=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    // Connect to database
    let pool = draftmill::db::create_pool(&config.database).await?;

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    info!("Database migrations completed");

    // Wire the capability clients and the workflow engine
    let store: Arc<dyn RunStore> = Arc::new(PgRunStore::new(pool));
    let generation: Arc<dyn Generation> = Arc::new(GenerationClient::from_config(&config.llm)?);
    let search: Arc<dyn WebSearch> = Arc::new(
        SerpApiClient::from_config(&config.search)
            .ok_or_else(|| anyhow::anyhow!("SERPAPI_KEY must be set"))?,
    );
    let engine = Arc::new(WorkflowEngine::new(
        store.clone(),
        generation,
        search,
        config.engine.clone(),
    ));

    // Create shared state
    let state = AppState {
        store,
        engine,
        config: config.clone(),
    };

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
