//! Authentication context models.
//!
//! The resolver produces an [`AuthContext`] per request; it is threaded
//! explicitly through handlers rather than stashed in task-local storage.

use crate::domain::OrganizationId;
use crate::storage::{AccessToken, ExternalSecret};

/// API key scope granting tool consumption.
pub const SCOPE_CONSUMER: &str = "consumer";
/// Fallback API key scope accepted for tool consumption.
pub const SCOPE_CHAT: &str = "chat";

/// How the request authenticated.
#[derive(Debug, Clone)]
pub enum AuthKind {
    /// Public MCP with no OAuth binding and no usable credentials
    Anonymous,
    /// Bearer token validated against the toolset's OAuth binding
    OAuth { access: AccessToken },
    /// API key with one of the accepted scopes
    ApiKey { scope: String },
    /// Gram session token exchanged for an identity
    Session,
}

/// Request-scoped authentication state.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub kind: AuthKind,
    pub organization_id: Option<OrganizationId>,
    pub user_id: Option<String>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self { kind: AuthKind::Anonymous, organization_id: None, user_id: None }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self.kind, AuthKind::Anonymous)
    }

    /// Gram environment selection is an authenticated-only feature.
    pub fn environment_selection_allowed(&self) -> bool {
        self.is_authenticated()
    }

    /// External secrets attached by a custom-OAuth token exchange.
    pub fn oauth_secrets(&self) -> &[ExternalSecret] {
        match &self.kind {
            AuthKind::OAuth { access } => &access.external_secrets,
            _ => &[],
        }
    }
}
