//! Per-request authentication resolution.
//!
//! The resolver decides one of four terminal states: anonymous public,
//! OAuth-authenticated public, API-key-authenticated private, or
//! session-authenticated private. Organization/project mismatches surface
//! as not-found so route probing cannot confirm existence.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::models::{AuthContext, AuthKind, SCOPE_CHAT, SCOPE_CONSUMER};
use crate::domain::Toolset;
use crate::errors::{GatewayError, Result};
use crate::storage::{ApiKeyVerifier, OAuthService, SessionAuthenticator};

/// Strip a case-insensitive `Bearer ` prefix from an `Authorization` value.
pub fn bearer_token(authorization: Option<&str>) -> Option<String> {
    let value = authorization?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Resolves request credentials into an [`AuthContext`].
pub struct AuthResolver {
    api_keys: Arc<dyn ApiKeyVerifier>,
    sessions: Arc<dyn SessionAuthenticator>,
    oauth: Arc<dyn OAuthService>,
}

impl AuthResolver {
    pub fn new(
        api_keys: Arc<dyn ApiKeyVerifier>,
        sessions: Arc<dyn SessionAuthenticator>,
        oauth: Arc<dyn OAuthService>,
    ) -> Self {
        Self { api_keys, sessions, oauth }
    }

    /// Resolve auth for a public MCP route (`/mcp/{mcpSlug}`).
    ///
    /// OAuth-bound toolsets require a valid bearer token. Unbound toolsets
    /// accept tokens opportunistically: a failed API key attempt degrades to
    /// anonymous access instead of failing the request.
    pub async fn resolve_public(
        &self,
        toolset: &Toolset,
        token: Option<&str>,
    ) -> Result<AuthContext> {
        if toolset.has_oauth_binding() {
            let token = token.ok_or_else(|| {
                GatewayError::unauthorized("missing bearer token")
            })?;

            let access = self.oauth.validate_access_token(&toolset.id, token).await.map_err(
                |err| {
                    warn!(
                        toolset_id = %toolset.id,
                        error = %err,
                        "OAuth token validation failed"
                    );
                    GatewayError::unauthorized("invalid bearer token")
                },
            )?;

            return Ok(AuthContext {
                kind: AuthKind::OAuth { access },
                organization_id: Some(toolset.organization_id.clone()),
                user_id: None,
            });
        }

        // Opportunistic API key auth on an unbound public route.
        if let Some(token) = token {
            match self.authenticate_token(token).await? {
                Some(ctx) if ctx.organization_id.as_ref() == Some(&toolset.organization_id) => {
                    return Ok(ctx);
                }
                Some(_) => {
                    debug!(
                        toolset_id = %toolset.id,
                        "Token belongs to a different organization; continuing anonymously"
                    );
                }
                None => {
                    debug!(toolset_id = %toolset.id, "Unrecognized token on public route");
                }
            }
        }

        if !toolset.mcp_is_public {
            // Private toolset reached without usable credentials: report
            // not-found rather than confirming the slug exists.
            return Err(GatewayError::not_found("toolset", &toolset.slug));
        }

        Ok(AuthContext::anonymous())
    }

    /// Resolve auth for a private route (`/mcp/{project}/{toolset}/{env}`).
    pub async fn resolve_private(
        &self,
        toolset: &Toolset,
        token: Option<&str>,
    ) -> Result<AuthContext> {
        let token =
            token.ok_or_else(|| GatewayError::unauthorized("missing API key"))?;

        let ctx = self
            .authenticate_token(token)
            .await?
            .ok_or_else(|| GatewayError::unauthorized("invalid API key"))?;

        if ctx.organization_id.as_ref() != Some(&toolset.organization_id) {
            warn!(
                toolset_id = %toolset.id,
                project_slug = %toolset.project_slug,
                "Toolset project outside the caller's organization"
            );
            return Err(GatewayError::not_found("toolset", &toolset.slug));
        }

        Ok(ctx)
    }

    /// Try API key strategies (`consumer`, then `chat`), then session-token
    /// exchange. `None` when the token matches nothing.
    async fn authenticate_token(&self, token: &str) -> Result<Option<AuthContext>> {
        if let Some(auth) = self.api_keys.verify(token).await? {
            let scope = if auth.scopes.iter().any(|s| s == SCOPE_CONSUMER) {
                Some(SCOPE_CONSUMER)
            } else if auth.scopes.iter().any(|s| s == SCOPE_CHAT) {
                Some(SCOPE_CHAT)
            } else {
                None
            };

            if let Some(scope) = scope {
                return Ok(Some(AuthContext {
                    kind: AuthKind::ApiKey { scope: scope.to_string() },
                    organization_id: Some(auth.organization_id),
                    user_id: auth.user_id,
                }));
            }
            debug!("API key lacks consumer/chat scope");
            return Ok(None);
        }

        if let Some(session) = self.sessions.authenticate(token, true).await? {
            return Ok(Some(AuthContext {
                kind: AuthKind::Session,
                organization_id: Some(session.organization_id),
                user_id: Some(session.user_id),
            }));
        }

        Ok(None)
    }
}
