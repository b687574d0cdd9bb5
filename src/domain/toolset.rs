//! Toolset domain types.
//!
//! A toolset is the unit of public exposure: a project-scoped bundle of
//! tools, prompts and resources served as one MCP server. Its `version`
//! counter increases on every content-affecting mutation and keys the
//! snapshot cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::domain::id::{
    CustomDomainId, ExternalOauthServerId, OauthProxyServerId, OrganizationId, ProjectId,
    ToolsetId,
};
use crate::errors::{GatewayError, Result};

/// Tool-selection mode shaping `tools/list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolSelectionMode {
    /// Verbatim tool list with session fields injected
    Static,
    /// Synthetic search/describe/execute surface backed by vector search
    Dynamic,
    /// Synthetic list/describe/execute surface driven by structural paths
    Progressive,
}

impl ToolSelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Progressive => "progressive",
        }
    }
}

impl FromStr for ToolSelectionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "static" => Ok(Self::Static),
            "dynamic" => Ok(Self::Dynamic),
            "progressive" => Ok(Self::Progressive),
            other => Err(format!("unknown tool selection mode: {}", other)),
        }
    }
}

impl fmt::Display for ToolSelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing tier of the owning organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountTier {
    Free,
    Pro,
    Enterprise,
}

impl AccountTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl FromStr for AccountTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown account tier: {}", other)),
        }
    }
}

/// A project-scoped, versioned bundle of tools, prompts and resources.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Toolset {
    pub id: ToolsetId,
    pub project_id: ProjectId,
    pub project_slug: String,
    pub organization_id: OrganizationId,

    /// Project-scoped slug
    pub slug: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_docs_url: Option<String>,

    /// Globally unique slug for public MCP routing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_slug: Option<String>,
    pub mcp_is_public: bool,
    pub mcp_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_domain_id: Option<CustomDomainId>,

    /// OAuth proxy binding (gram-managed authorization server)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_proxy_server_id: Option<OauthProxyServerId>,
    /// External OAuth binding (upstream authorization server)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_oauth_server_id: Option<ExternalOauthServerId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_environment_slug: Option<String>,
    pub mode: ToolSelectionMode,
    pub account_tier: AccountTier,

    /// Monotonically increasing; bumped on every content-affecting mutation
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Toolset {
    /// A toolset may bind an OAuth proxy server or an external OAuth server,
    /// never both.
    pub fn validate_oauth_binding(&self) -> Result<()> {
        if self.oauth_proxy_server_id.is_some() && self.external_oauth_server_id.is_some() {
            return Err(GatewayError::conflict(format!(
                "toolset '{}' binds both an OAuth proxy and an external OAuth server",
                self.slug
            )));
        }
        Ok(())
    }

    /// Whether any OAuth binding is present.
    pub fn has_oauth_binding(&self) -> bool {
        self.oauth_proxy_server_id.is_some() || self.external_oauth_server_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_toolset() -> Toolset {
        Toolset {
            id: ToolsetId::new(),
            project_id: ProjectId::new(),
            project_slug: "acme".to_string(),
            organization_id: OrganizationId::new(),
            slug: "billing".to_string(),
            name: "Billing".to_string(),
            description: None,
            logo_url: None,
            external_docs_url: None,
            mcp_slug: Some("acme-billing".to_string()),
            mcp_is_public: true,
            mcp_enabled: true,
            custom_domain_id: None,
            oauth_proxy_server_id: None,
            external_oauth_server_id: None,
            default_environment_slug: Some("production".to_string()),
            mode: ToolSelectionMode::Static,
            account_tier: AccountTier::Free,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_mode_roundtrip() {
        for mode in [
            ToolSelectionMode::Static,
            ToolSelectionMode::Dynamic,
            ToolSelectionMode::Progressive,
        ] {
            let parsed: ToolSelectionMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
        assert!("semantic".parse::<ToolSelectionMode>().is_err());
    }

    #[test]
    fn test_oauth_binding_exclusivity() {
        let mut toolset = sample_toolset();
        assert!(toolset.validate_oauth_binding().is_ok());
        assert!(!toolset.has_oauth_binding());

        toolset.oauth_proxy_server_id = Some(OauthProxyServerId::new());
        assert!(toolset.validate_oauth_binding().is_ok());
        assert!(toolset.has_oauth_binding());

        toolset.external_oauth_server_id = Some(ExternalOauthServerId::new());
        assert!(toolset.validate_oauth_binding().is_err());
    }

    #[test]
    fn test_tier_roundtrip() {
        for tier in [AccountTier::Free, AccountTier::Pro, AccountTier::Enterprise] {
            let parsed: AccountTier = tier.as_str().parse().unwrap();
            assert_eq!(parsed, tier);
        }
    }
}
