//! Environment domain types.
//!
//! An environment is a project-scoped bag of named secrets
//! (`slug -> {key -> secret}`), encrypted at rest by the storage layer. The
//! gateway selects one per request via the `Gram-Environment` header or the
//! toolset default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::id::ProjectId;
use crate::secrets::SecretString;

/// Effective key/value environment resolved for one request.
pub type EnvMap = BTreeMap<String, SecretString>;

/// A named, project-scoped environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub project_id: ProjectId,
    pub slug: String,
    pub entries: EnvMap,
}

impl Environment {
    pub fn new(project_id: ProjectId, slug: impl Into<String>) -> Self {
        Self { project_id, slug: slug.into(), entries: EnvMap::new() }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<SecretString>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

/// Normalize an `Mcp-*` request header name into an environment variable key:
/// strip the `mcp-` prefix, map `-` to `_`, lowercase.
///
/// Returns `None` for headers that must never become overrides.
pub fn header_to_env_key(header_name: &str) -> Option<String> {
    let lower = header_name.to_ascii_lowercase();
    let rest = lower.strip_prefix("mcp-")?;
    if rest.is_empty() || lower == "mcp-session-id" {
        return None;
    }
    Some(rest.replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_to_env_key() {
        assert_eq!(header_to_env_key("Mcp-Api-Key"), Some("api_key".to_string()));
        assert_eq!(header_to_env_key("mcp-petstore-token"), Some("petstore_token".to_string()));
        assert_eq!(header_to_env_key("MCP-BASE-URL"), Some("base_url".to_string()));
        assert_eq!(header_to_env_key("Gram-Environment"), None);
        assert_eq!(header_to_env_key("mcp-"), None);
    }

    #[test]
    fn test_session_header_never_propagates() {
        assert_eq!(header_to_env_key("Mcp-Session-Id"), None);
        assert_eq!(header_to_env_key("mcp-session-id"), None);
    }

    #[test]
    fn test_environment_entries_are_masked_in_json() {
        let env = Environment::new(ProjectId::new(), "production")
            .with_entry("API_KEY", "sk-live-123");
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("API_KEY"));
        assert!(!json.contains("sk-live-123"));
    }
}
