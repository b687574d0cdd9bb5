//! Server assembly and lifecycle.
//!
//! Wires collaborators into the handler stack, builds the router and runs
//! the HTTP server. On a termination signal the listener stops accepting,
//! in-flight requests drain within the configured window, and remaining
//! work is cancelled.

use metrics_exporter_prometheus::PrometheusHandle;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use crate::auth::AuthResolver;
use crate::config::AppConfig;
use crate::errors::{GatewayError, Result};
use crate::mcp::http::{build_router, AppState};
use crate::mcp::McpHandler;
use crate::observability::MetricsRecorder;
use crate::proxy::{FunctionBackend, ToolProxyExecutor};
use crate::services::search::ToolSearchService;
use crate::services::session_writer::SessionWriter;
use crate::services::toolset_cache::ToolsetCache;
use crate::services::usage::UsageGuard;
use crate::storage::{
    ApiKeyVerifier, BillingRepository, BillingTracker, ChatRepository, EmbeddingProvider,
    EnvironmentLoader, OAuthService, SessionAuthenticator, ToolsetRepository, VectorStore,
    WorkflowEngine,
};

/// Everything the gateway consumes but does not own.
pub struct Collaborators {
    pub toolsets: Arc<dyn ToolsetRepository>,
    pub environments: Arc<dyn EnvironmentLoader>,
    pub billing_repository: Arc<dyn BillingRepository>,
    pub billing_tracker: Arc<dyn BillingTracker>,
    pub chats: Arc<dyn ChatRepository>,
    pub api_keys: Arc<dyn ApiKeyVerifier>,
    pub sessions: Arc<dyn SessionAuthenticator>,
    pub oauth: Arc<dyn OAuthService>,
    pub functions: Arc<dyn FunctionBackend>,
    pub workflow_engine: Arc<dyn WorkflowEngine>,
    pub vector_store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

/// Assemble the application state from configuration and collaborators.
pub fn build_state(
    config: AppConfig,
    collaborators: Collaborators,
    metrics_handle: Option<PrometheusHandle>,
) -> AppState {
    let metrics = MetricsRecorder::new();

    let auth = Arc::new(AuthResolver::new(
        collaborators.api_keys,
        collaborators.sessions,
        Arc::clone(&collaborators.oauth),
    ));

    let cache = Arc::new(ToolsetCache::new(Arc::clone(&collaborators.toolsets)));

    let executor = Arc::new(ToolProxyExecutor::new(
        collaborators.environments,
        Arc::new(UsageGuard::new(
            collaborators.billing_repository,
            config.limits.clone(),
        )),
        collaborators.billing_tracker,
        collaborators.functions,
        metrics.clone(),
    ));

    let search = Arc::new(ToolSearchService::new(
        collaborators.workflow_engine,
        collaborators.vector_store,
        collaborators.embedder,
    ));

    let handler = Arc::new(McpHandler::new(
        cache,
        executor,
        search,
        Arc::new(SessionWriter::new(collaborators.chats)),
        metrics.clone(),
    ));

    AppState {
        config: Arc::new(config),
        toolsets: collaborators.toolsets,
        auth,
        handler,
        oauth: collaborators.oauth,
        metrics_handle,
    }
}

/// Run the HTTP server until `shutdown` resolves, then drain in-flight
/// requests within the configured window.
pub async fn serve(state: AppState, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
    let address = state.config.server.bind_address();
    let drain_timeout = state.config.server.drain_timeout();

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| GatewayError::config(format!("failed to bind {}: {}", address, e)))?;

    info!(address = %address, "MCP gateway listening");

    let router = build_router(state);
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = stop_rx.await;
    });

    let mut server_task = tokio::spawn(server.into_future());

    tokio::select! {
        result = &mut server_task => {
            return flatten_serve_result(result);
        }
        _ = shutdown => {
            info!("Shutdown signal received; draining in-flight requests");
        }
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(drain_timeout, &mut server_task).await {
        Ok(result) => flatten_serve_result(result)?,
        Err(_) => {
            warn!(
                drain_seconds = drain_timeout.as_secs(),
                "Drain window elapsed; cancelling remaining requests"
            );
            server_task.abort();
        }
    }

    info!("HTTP server stopped");
    Ok(())
}

fn flatten_serve_result(
    result: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(GatewayError::unexpected(format!("server error: {}", e))),
        Err(e) => Err(GatewayError::unexpected(format!("server task failed: {}", e))),
    }
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install CTRL+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
