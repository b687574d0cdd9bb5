use std::sync::Arc;
use std::time::Duration;

use gramgate::observability::{init_metrics, init_tracing};
use gramgate::startup::{build_state, serve, shutdown_signal, Collaborators};
use gramgate::storage::memory::{
    HashEmbeddingProvider, InMemorySessionAuthenticator, InMemoryVectorStore,
    InlineWorkflowEngine, StaticApiKeyVerifier, StaticFunctionRuntime, StaticOAuthService,
};
use gramgate::storage::repositories::{
    SqliteBillingRepository, SqliteChatRepository, SqliteToolsetRepository,
};
use gramgate::storage::{create_pool, EmbeddingProvider, VectorStore};
use gramgate::{AppConfig, Result, APP_NAME, VERSION};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before any configuration is read; a missing file is fine.
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: error loading .env file: {}", e);
        }
    }

    let config = AppConfig::from_env()?;
    init_tracing(&config.observability)?;
    let metrics_handle = init_metrics(&config.observability)?;

    info!(app_name = APP_NAME, version = VERSION, "Starting MCP gateway");
    info!(
        address = %config.server.bind_address(),
        public_url = %config.server.public_url,
        database = %database_kind(&config.database.url),
        metrics_enabled = config.observability.enable_metrics,
        "Loaded configuration from environment"
    );

    let pool = create_pool(&config.database).await?;
    let read_timeout = config.database.read_timeout();
    let write_timeout = config.database.write_timeout();

    let billing =
        Arc::new(SqliteBillingRepository::new(pool.clone(), read_timeout, write_timeout));

    // Tool search, OAuth validation and the function runtime are collaborator
    // seams; single-node deployments run on the in-process implementations.
    let vectors = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(HashEmbeddingProvider::default());
    let workflow_engine = Arc::new(InlineWorkflowEngine::new(
        Arc::clone(&vectors) as Arc<dyn VectorStore>,
        Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
    ));

    let collaborators = Collaborators {
        toolsets: Arc::new(SqliteToolsetRepository::new(pool.clone(), read_timeout)),
        environments: Arc::new(gramgate::storage::memory::InMemoryEnvironmentLoader::new()),
        billing_repository: billing.clone(),
        billing_tracker: billing,
        chats: Arc::new(SqliteChatRepository::new(pool.clone(), read_timeout, write_timeout)),
        api_keys: Arc::new(StaticApiKeyVerifier::new()),
        sessions: Arc::new(InMemorySessionAuthenticator::new()),
        oauth: Arc::new(StaticOAuthService::new()),
        functions: Arc::new(StaticFunctionRuntime::new()),
        workflow_engine,
        vector_store: vectors,
        embedder,
    };

    let component_timeout = config.server.component_timeout();
    let state = build_state(config, collaborators, metrics_handle);

    if let Err(e) = serve(state, shutdown_signal()).await {
        error!(error = %e, "Gateway terminated with error");
        std::process::exit(1);
    }

    // In-flight requests are drained; component shutdowns run in parallel
    // within their own window.
    shutdown_components(component_timeout, pool).await;

    info!("Gateway shutdown completed");
    Ok(())
}

async fn shutdown_components(timeout: Duration, pool: gramgate::storage::DbPool) {
    let result = tokio::time::timeout(timeout, async {
        tokio::join!(pool.close(), async {
            // Detached billing and persistence tasks finish on the runtime;
            // a yield lets already-queued work run before the pool is gone.
            tokio::task::yield_now().await;
        });
    })
    .await;

    if result.is_err() {
        error!(
            timeout_seconds = timeout.as_secs(),
            "Component shutdown window elapsed; forcing exit"
        );
    }
}

fn database_kind(url: &str) -> &'static str {
    if url.starts_with("sqlite:") {
        "sqlite"
    } else {
        "database"
    }
}
