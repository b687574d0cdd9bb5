//! OAuth 2.1 well-known metadata endpoints.
//!
//! `/.well-known/oauth-authorization-server/mcp/{mcpSlug}` serves the
//! authorization-server document for gram-proxied OAuth, or the stored
//! upstream document verbatim for external OAuth. The protected-resource
//! variant points clients at the authorization server. A toolset with
//! neither binding answers 404 from both.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::domain::Toolset;
use crate::mcp::http::{resolved_base_url, AppState};

/// GET /.well-known/oauth-authorization-server/mcp/{mcpSlug}
pub async fn authorization_server_metadata(
    State(state): State<AppState>,
    Path(mcp_slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(toolset) = lookup(&state, &mcp_slug).await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if toolset.oauth_proxy_server_id.is_some() {
        let base = resolved_base_url(&toolset, &headers, &state.config);
        return Json(json!({
            "issuer": base,
            "authorization_endpoint": format!("{}/oauth/authorize", base),
            "token_endpoint": format!("{}/oauth/token", base),
            "registration_endpoint": format!("{}/oauth/register", base),
            "response_types_supported": ["code"],
            "grant_types_supported": ["authorization_code"],
            "code_challenge_methods_supported": ["plain", "S256"],
        }))
        .into_response();
    }

    if let Some(server_id) = &toolset.external_oauth_server_id {
        return match state.oauth.upstream_metadata(server_id).await {
            Ok(Some(document)) => Json(document).into_response(),
            Ok(None) => StatusCode::NOT_FOUND.into_response(),
            Err(err) => {
                warn!(
                    toolset_id = %toolset.id,
                    error = %err,
                    "Failed to load upstream OAuth metadata"
                );
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        };
    }

    StatusCode::NOT_FOUND.into_response()
}

/// GET /.well-known/oauth-protected-resource/mcp/{mcpSlug}
pub async fn protected_resource_metadata(
    State(state): State<AppState>,
    Path(mcp_slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(toolset) = lookup(&state, &mcp_slug).await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if !toolset.has_oauth_binding() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let base = resolved_base_url(&toolset, &headers, &state.config);
    Json(json!({
        "issuer": base,
        "authorization_servers": [format!("{}/mcp/{}", base, mcp_slug)],
    }))
    .into_response()
}

async fn lookup(state: &AppState, mcp_slug: &str) -> Option<Toolset> {
    match state.toolsets.find_by_mcp_slug(mcp_slug, None).await {
        Ok(Some(toolset)) if toolset.mcp_enabled => Some(toolset),
        Ok(_) => None,
        Err(err) => {
            warn!(mcp_slug, error = %err, "Toolset lookup failed for well-known route");
            None
        }
    }
}
