//! MCP HTTP transport.
//!
//! Axum routes for the public (`/mcp/{mcpSlug}`) and API-key
//! (`/mcp/{project}/{toolset}/{environment}`) JSON-RPC endpoints plus the
//! well-known OAuth metadata documents. Batches decode here; empty and
//! notification-only batches answer `202` with no body, a one-element batch
//! answers a bare response object, larger batches an array in submission
//! order. The session id from the last tool call is echoed in the
//! `Mcp-Session-Id` response header.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{bearer_token, AuthResolver};
use crate::config::AppConfig;
use crate::domain::{connection_fingerprint, header_to_env_key, EnvMap, Toolset};
use crate::errors::GatewayError;
use crate::mcp::error::McpError;
use crate::mcp::handler::{McpHandler, RequestContext};
use crate::mcp::protocol::{error_codes, BatchInput, JsonRpcError, JsonRpcResponse};
use crate::mcp::session_context::MCP_SESSION_ID_HEADER;
use crate::mcp::wellknown;
use crate::secrets::SecretString;
use crate::storage::{OAuthService, ToolsetRepository};

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub toolsets: Arc<dyn ToolsetRepository>,
    pub auth: Arc<AuthResolver>,
    pub handler: Arc<McpHandler>,
    pub oauth: Arc<dyn OAuthService>,
    pub metrics_handle: Option<PrometheusHandle>,
}

/// Build the gateway router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/mcp/{mcp_slug}", post(post_public).get(get_public))
        .route("/mcp/{project}/{toolset}/{environment}", post(post_private))
        .route(
            "/.well-known/oauth-authorization-server/mcp/{mcp_slug}",
            get(wellknown::authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource/mcp/{mcp_slug}",
            get(wellknown::protected_resource_metadata),
        )
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// POST /mcp/{mcpSlug} - public MCP JSON-RPC endpoint.
async fn post_public(
    State(state): State<AppState>,
    Path(mcp_slug): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let toolset = match resolve_public_toolset(&state, &mcp_slug).await {
        Ok(toolset) => toolset,
        Err(response) => return *response,
    };

    let token = bearer_header(&headers);
    let auth = match state.auth.resolve_public(&toolset, token.as_deref()).await {
        Ok(auth) => auth,
        Err(err) => return auth_failure_response(&state, &toolset, &headers, err),
    };

    let environment_slug = header_value(&headers, "gram-environment");
    let ctx = build_request_context(&state, &headers, auth, environment_slug, &mcp_slug);

    run_batch(&state, &toolset, &ctx, &body).await
}

/// GET /mcp/{mcpSlug} - browsers are redirected to the install page, every
/// other client receives 405 with a JSON-RPC-shaped body.
async fn get_public(
    State(state): State<AppState>,
    Path(mcp_slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    let accept = header_value(&headers, "accept").unwrap_or_default();
    if accept.contains("text/html") || accept.contains("application/xhtml+xml") {
        let install = state.config.server.install_page_url.trim_end_matches('/');
        return Redirect::temporary(&format!("{}/{}", install, mcp_slug)).into_response();
    }

    let error = McpError::MethodNotAllowed { method: "GET".to_string() };
    (StatusCode::METHOD_NOT_ALLOWED, Json(error.to_response(None))).into_response()
}

/// POST /mcp/{project}/{toolset}/{environment} - API-key endpoint.
async fn post_private(
    State(state): State<AppState>,
    Path((project, toolset_slug, environment)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let toolset = match state.toolsets.find_by_project_and_slug(&project, &toolset_slug).await {
        Ok(Some(toolset)) if toolset.mcp_enabled => toolset,
        Ok(_) => return not_found_response("toolset", &toolset_slug),
        Err(err) => return gateway_error_response(err),
    };

    let token = bearer_header(&headers);
    let auth = match state.auth.resolve_private(&toolset, token.as_deref()).await {
        Ok(auth) => auth,
        Err(err) => return auth_failure_response(&state, &toolset, &headers, err),
    };

    let endpoint = format!("{}/{}/{}", project, toolset_slug, environment);
    let ctx = build_request_context(&state, &headers, auth, Some(environment), &endpoint);

    run_batch(&state, &toolset, &ctx, &body).await
}

async fn resolve_public_toolset(
    state: &AppState,
    mcp_slug: &str,
) -> Result<Toolset, Box<Response>> {
    match state.toolsets.find_by_mcp_slug(mcp_slug, None).await {
        Ok(Some(toolset)) if toolset.mcp_enabled => Ok(toolset),
        Ok(_) => Err(Box::new(not_found_response("toolset", mcp_slug))),
        Err(err) => Err(Box::new(gateway_error_response(err))),
    }
}

/// Decode and run one batch, shaping the HTTP response.
async fn run_batch(
    state: &AppState,
    toolset: &Toolset,
    ctx: &RequestContext,
    body: &Bytes,
) -> Response {
    let requests = match serde_json::from_slice::<BatchInput>(body) {
        Ok(batch) => batch.into_requests(),
        Err(e) => {
            debug!(error = %e, "Failed to decode request batch");
            let response = JsonRpcResponse::error(
                None,
                JsonRpcError::new(error_codes::PARSE_ERROR, format!("parse error: {}", e)),
            );
            return Json(response).into_response();
        }
    };

    if requests.is_empty() {
        return StatusCode::ACCEPTED.into_response();
    }

    let outcome = state.handler.handle_batch(toolset, ctx, requests).await;

    let mut response = if outcome.responses.is_empty() {
        // Notification-only batches acknowledge with no body.
        StatusCode::ACCEPTED.into_response()
    } else if outcome.responses.len() == 1 {
        Json(outcome.responses.into_iter().next().expect("length checked")).into_response()
    } else {
        Json(outcome.responses).into_response()
    };

    if let Some(session_id) = outcome.session_id {
        set_session_header(&mut response, session_id);
    }
    response
}

fn set_session_header(response: &mut Response, session_id: Uuid) {
    if let Ok(value) = header::HeaderValue::from_str(&session_id.to_string()) {
        response
            .headers_mut()
            .insert(header::HeaderName::from_static(MCP_SESSION_ID_HEADER), value);
    }
}

/// Shape an auth-resolution failure.
///
/// Missing or invalid tokens against OAuth-bound endpoints answer 401 with a
/// `WWW-Authenticate` challenge pointing at the protected-resource metadata;
/// existence-hiding failures answer 404. Everything else stays a JSON-RPC
/// error in a 200 envelope.
fn auth_failure_response(
    state: &AppState,
    toolset: &Toolset,
    headers: &HeaderMap,
    err: GatewayError,
) -> Response {
    match &err {
        GatewayError::Unauthorized { .. } => {
            warn!(toolset_id = %toolset.id, error = %err, "Authentication failed");
            let mut response = (
                StatusCode::UNAUTHORIZED,
                Json(rpc_error_body(error_codes::INVALID_REQUEST, err.user_message())),
            )
                .into_response();

            if toolset.has_oauth_binding() {
                let base = resolved_base_url(toolset, headers, &state.config);
                let slug = toolset.mcp_slug.as_deref().unwrap_or(&toolset.slug);
                let challenge = format!(
                    "Bearer resource_metadata={}/.well-known/oauth-protected-resource/mcp/{}",
                    base, slug
                );
                if let Ok(value) = header::HeaderValue::from_str(&challenge) {
                    response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
                }
            }
            response
        }
        GatewayError::NotFound { .. } => {
            not_found_response("toolset", toolset.mcp_slug.as_deref().unwrap_or(&toolset.slug))
        }
        _ => gateway_error_response(err),
    }
}

fn not_found_response(resource: &str, id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(rpc_error_body(
            error_codes::INVALID_REQUEST,
            format!("{} '{}' not found", resource, id),
        )),
    )
        .into_response()
}

fn gateway_error_response(err: GatewayError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(rpc_error_body(err.rpc_code(), err.user_message()))).into_response()
}

fn rpc_error_body(code: i32, message: String) -> JsonRpcResponse {
    JsonRpcResponse::error(None, JsonRpcError::new(code, message))
}

fn bearer_header(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|v| v.to_string())
}

/// Forwarded client IP: first `X-Forwarded-For` element, else `X-Real-IP`.
/// Peer address resolution is the reverse proxy's concern; absent headers
/// yield an empty component and, with an empty user agent and origin, an
/// empty fingerprint.
fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = header_value(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    header_value(headers, "x-real-ip").unwrap_or_default()
}

/// Assemble the request-scoped context threaded through the handlers.
pub fn build_request_context(
    state: &AppState,
    headers: &HeaderMap,
    auth: crate::auth::AuthContext,
    environment_slug: Option<String>,
    path_label: &str,
) -> RequestContext {
    let mode_override = header_value(headers, "gram-mode").and_then(|raw| match raw.parse() {
        Ok(mode) => Some(mode),
        Err(e) => {
            debug!(value = %raw, error = %e, "Ignoring invalid Gram-Mode header");
            None
        }
    });

    let mut env_overrides = EnvMap::new();
    for (name, value) in headers {
        let Some(key) = header_to_env_key(name.as_str()) else {
            continue;
        };
        if let Ok(value) = value.to_str() {
            env_overrides.insert(key, SecretString::new(value));
        }
    }

    let fingerprint = connection_fingerprint(
        &client_ip(headers),
        &header_value(headers, "user-agent").unwrap_or_default(),
        &header_value(headers, "origin").unwrap_or_default(),
    );

    let host = header_value(headers, "host").unwrap_or_default();
    let endpoint = format!("{}/mcp/{}", host, path_label);

    RequestContext {
        auth,
        environment_slug,
        mode_override,
        header_session_id: header_value(headers, MCP_SESSION_ID_HEADER),
        env_overrides,
        fingerprint,
        endpoint,
    }
}

/// Base URL for metadata documents and challenge headers: the request's
/// custom domain when the toolset is bound to one, else the configured
/// public URL.
pub fn resolved_base_url(toolset: &Toolset, headers: &HeaderMap, config: &AppConfig) -> String {
    if toolset.custom_domain_id.is_some() {
        if let Some(host) = header_value(headers, "host") {
            let scheme = header_value(headers, "x-forwarded-proto")
                .unwrap_or_else(|| "https".to_string());
            return format!("{}://{}", scheme, host);
        }
    }
    config.server.public_url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.4".parse().unwrap());
        assert_eq!(client_ip(&headers), "203.0.113.9");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.4".parse().unwrap());
        assert_eq!(client_ip(&headers), "198.51.100.4");

        assert_eq!(client_ip(&HeaderMap::new()), "");
    }

    #[test]
    fn test_bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer tok-123".parse().unwrap());
        assert_eq!(bearer_header(&headers), Some("tok-123".to_string()));
        assert_eq!(bearer_header(&HeaderMap::new()), None);
    }

    #[test]
    fn test_rpc_error_body_shape() {
        let body = rpc_error_body(error_codes::INVALID_REQUEST, "nope".to_string());
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["jsonrpc"], json!("2.0"));
        assert_eq!(value["id"], json!(null));
        assert_eq!(value["error"]["code"], json!(-32600));
    }
}
