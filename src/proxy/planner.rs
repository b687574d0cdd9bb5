//! Tool-call planning.
//!
//! A call plan is the short-lived record binding a tool to a concrete
//! backend execution. The planner enumerates the four known tool kinds and
//! rejects anything else at the type level; it also seeds user OAuth tokens
//! into the `*_ACCESS_TOKEN` environment variables of OAuth-flavored
//! security schemes.

use crate::domain::{
    EnvMap, ExternalMcpToolDefinition, FunctionToolDefinition, HttpSecurityScheme,
    HttpToolDefinition, ProjectId, PromptTemplate, ToolDefinition, ToolKind, ToolUrn, ToolsetId,
};
use crate::services::snapshot::EffectiveTool;
use crate::storage::ExternalSecret;

/// Suffix identifying the environment variables that accept user OAuth
/// tokens.
const ACCESS_TOKEN_SUFFIX: &str = "ACCESS_TOKEN";

/// How the call is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingKind {
    ToolCall,
    PromptRender,
    ResourceRead,
}

/// Identifiers correlated on every log line and usage event for the call.
#[derive(Debug, Clone)]
pub struct CallDescriptor {
    pub project_id: ProjectId,
    pub toolset_id: ToolsetId,
    pub toolset_slug: String,
    /// Client-facing tool name (variation rename applied)
    pub tool_name: String,
    pub urn: ToolUrn,
}

/// Backend binding for one call.
#[derive(Debug, Clone)]
pub enum CallBinding {
    Http(HttpToolDefinition),
    Function(FunctionToolDefinition),
    Prompt(PromptTemplate),
    ExternalMcp(ExternalMcpBinding),
}

/// External MCP binding with the remote name already split off the
/// client-facing `<slug>--<remote>` form.
#[derive(Debug, Clone)]
pub struct ExternalMcpBinding {
    pub definition: ExternalMcpToolDefinition,
    pub server_slug: String,
    pub remote_name: String,
}

/// Short-lived execution plan. Never persisted.
#[derive(Debug, Clone)]
pub struct CallPlan {
    pub descriptor: CallDescriptor,
    pub binding: CallBinding,
    pub billing: BillingKind,
}

impl CallPlan {
    pub fn kind(&self) -> ToolKind {
        match &self.binding {
            CallBinding::Http(_) => ToolKind::Http,
            CallBinding::Function(_) => ToolKind::Function,
            CallBinding::Prompt(_) => ToolKind::Prompt,
            CallBinding::ExternalMcp(_) => ToolKind::ExternalMcp,
        }
    }

    /// The producing source slug, used for system-environment lookup.
    pub fn source(&self) -> &str {
        self.descriptor.urn.source()
    }

    /// Whether the underlying tool requests passthrough response shaping.
    pub fn is_passthrough(&self) -> bool {
        match &self.binding {
            CallBinding::Http(t) => {
                tool_meta_is_passthrough(t.meta.as_ref())
            }
            CallBinding::Function(t) => tool_meta_is_passthrough(t.meta.as_ref()),
            CallBinding::Prompt(_) | CallBinding::ExternalMcp(_) => false,
        }
    }
}

fn tool_meta_is_passthrough(meta: Option<&serde_json::Value>) -> bool {
    meta.and_then(|m| m.get(crate::domain::tool::META_KIND_KEY))
        .and_then(|v| v.as_str())
        .map(|v| v == crate::domain::tool::META_KIND_PASSTHROUGH)
        .unwrap_or(false)
}

/// Resolve an effective tool into a call plan.
pub fn plan_call(
    tool: &EffectiveTool,
    project_id: &ProjectId,
    toolset_id: &ToolsetId,
    toolset_slug: &str,
    billing: BillingKind,
) -> CallPlan {
    let descriptor = CallDescriptor {
        project_id: project_id.clone(),
        toolset_id: toolset_id.clone(),
        toolset_slug: toolset_slug.to_string(),
        tool_name: tool.name.clone(),
        urn: tool.definition.urn().clone(),
    };

    let binding = match &tool.definition {
        ToolDefinition::Http(http) => CallBinding::Http(http.clone()),
        ToolDefinition::Function(function) => CallBinding::Function(function.clone()),
        ToolDefinition::Prompt(template) => CallBinding::Prompt(template.clone()),
        ToolDefinition::ExternalMcp(external) => {
            // The definition carries the authoritative split; the client-facing
            // name is re-split only when a variation renamed the tool.
            let (server_slug, remote_name) =
                crate::domain::split_external_name(&tool.name).map_or_else(
                    || (external.server_slug.clone(), external.remote_name.clone()),
                    |(slug, remote)| (slug.to_string(), remote.to_string()),
                );
            CallBinding::ExternalMcp(ExternalMcpBinding {
                definition: external.clone(),
                server_slug,
                remote_name,
            })
        }
    };

    CallPlan { descriptor, binding, billing }
}

/// Seed user OAuth tokens into the environment for every OAuth-flavored
/// security scheme.
///
/// For each scheme accepting OAuth tokens (`authorization_code` flow or
/// `openIdConnect`), the first external secret whose `security_keys` scope
/// matches the scheme (empty keys = unscoped, matches anything) fills every
/// declared variable ending in `ACCESS_TOKEN`. Existing values are not
/// overwritten: explicit environment configuration wins.
pub fn seed_oauth_tokens(
    security: &[HttpSecurityScheme],
    secrets: &[ExternalSecret],
    env: &mut EnvMap,
) {
    for scheme in security {
        if !scheme.accepts_oauth_token() {
            continue;
        }

        let secret = secrets.iter().find(|s| {
            s.security_keys.is_empty() || s.security_keys.iter().any(|k| k == &scheme.key)
        });
        let Some(secret) = secret else {
            continue;
        };

        for variable in &scheme.env_variables {
            if variable.ends_with(ACCESS_TOKEN_SUFFIX) && !env.contains_key(variable) {
                env.insert(variable.clone(), secret.token.clone());
            }
        }
    }
}

/// Pick the caller's unscoped OAuth token, used for external MCP proxies
/// that require OAuth.
pub fn unscoped_token(secrets: &[ExternalSecret]) -> Option<&crate::secrets::SecretString> {
    secrets.iter().find(|s| s.security_keys.is_empty()).map(|s| &s.token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ToolHints, ToolId};
    use crate::secrets::SecretString;
    use serde_json::json;

    fn effective(definition: ToolDefinition, name: &str) -> EffectiveTool {
        EffectiveTool {
            name: name.to_string(),
            description: definition.description().map(|d| d.to_string()),
            tags: vec![],
            confirm: None,
            hints: ToolHints::default(),
            definition,
        }
    }

    fn http_definition() -> ToolDefinition {
        ToolDefinition::Http(HttpToolDefinition {
            id: ToolId::new(),
            urn: ToolUrn::new(ToolKind::Http, "billing", "create_invoice"),
            name: "create_invoice".to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
            method: "POST".to_string(),
            path: "/invoices".to_string(),
            operation_id: None,
            security: vec![],
            server_env_variables: vec!["BILLING_SERVER_URL".to_string()],
            meta: None,
        })
    }

    #[test]
    fn test_plan_http_tool() {
        let tool = effective(http_definition(), "create_invoice");
        let plan = plan_call(
            &tool,
            &ProjectId::new(),
            &ToolsetId::new(),
            "billing",
            BillingKind::ToolCall,
        );

        assert_eq!(plan.kind(), ToolKind::Http);
        assert_eq!(plan.source(), "billing");
        assert_eq!(plan.descriptor.tool_name, "create_invoice");
        assert!(!plan.is_passthrough());
    }

    #[test]
    fn test_plan_external_splits_name() {
        let definition = ToolDefinition::ExternalMcp(ExternalMcpToolDefinition {
            id: ToolId::new(),
            urn: ToolUrn::new(ToolKind::ExternalMcp, "weather", "get_weather"),
            name: "weather--get_weather".to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
            server_slug: "weather".to_string(),
            remote_name: "get_weather".to_string(),
            server_url: "https://weather.example.com/mcp".to_string(),
            transport: crate::domain::ExternalMcpTransport::StreamableHttp,
            oauth_required: false,
            annotations: None,
        });

        let tool = effective(definition, "weather--get_weather");
        let plan = plan_call(
            &tool,
            &ProjectId::new(),
            &ToolsetId::new(),
            "mixed",
            BillingKind::ToolCall,
        );

        match plan.binding {
            CallBinding::ExternalMcp(binding) => {
                assert_eq!(binding.server_slug, "weather");
                assert_eq!(binding.remote_name, "get_weather");
            }
            other => panic!("expected external binding, got {:?}", other),
        }
    }

    #[test]
    fn test_passthrough_meta_detected() {
        let definition = ToolDefinition::Http(HttpToolDefinition {
            id: ToolId::new(),
            urn: ToolUrn::new(ToolKind::Http, "billing", "raw"),
            name: "raw".to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
            method: "GET".to_string(),
            path: "/raw".to_string(),
            operation_id: None,
            security: vec![],
            server_env_variables: vec![],
            meta: Some(json!({"gram.ai/kind": "mcp-passthrough"})),
        });

        let tool = effective(definition, "raw");
        let plan =
            plan_call(&tool, &ProjectId::new(), &ToolsetId::new(), "billing", BillingKind::ToolCall);
        assert!(plan.is_passthrough());
    }

    fn oauth_scheme(key: &str, variables: &[&str]) -> HttpSecurityScheme {
        HttpSecurityScheme {
            key: key.to_string(),
            scheme_type: "oauth2".to_string(),
            oauth_flow: Some("authorization_code".to_string()),
            env_variables: variables.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn test_seed_oauth_tokens_scoped() {
        let security = vec![
            oauth_scheme("petstore_auth", &["PETSTORE_ACCESS_TOKEN", "PETSTORE_CLIENT_ID"]),
            oauth_scheme("corp_sso", &["CORP_ACCESS_TOKEN"]),
        ];
        let secrets = vec![ExternalSecret {
            security_keys: vec!["petstore_auth".to_string()],
            token: SecretString::new("tok-petstore"),
        }];

        let mut env = EnvMap::new();
        seed_oauth_tokens(&security, &secrets, &mut env);

        assert_eq!(env["PETSTORE_ACCESS_TOKEN"].expose_secret(), "tok-petstore");
        // Non-token variables and unmatched schemes stay untouched.
        assert!(!env.contains_key("PETSTORE_CLIENT_ID"));
        assert!(!env.contains_key("CORP_ACCESS_TOKEN"));
    }

    #[test]
    fn test_seed_oauth_tokens_unscoped_matches_all() {
        let security = vec![
            oauth_scheme("petstore_auth", &["PETSTORE_ACCESS_TOKEN"]),
            oauth_scheme("corp_sso", &["CORP_ACCESS_TOKEN"]),
        ];
        let secrets = vec![ExternalSecret {
            security_keys: vec![],
            token: SecretString::new("tok-any"),
        }];

        let mut env = EnvMap::new();
        seed_oauth_tokens(&security, &secrets, &mut env);

        assert_eq!(env["PETSTORE_ACCESS_TOKEN"].expose_secret(), "tok-any");
        assert_eq!(env["CORP_ACCESS_TOKEN"].expose_secret(), "tok-any");
    }

    #[test]
    fn test_seed_oauth_does_not_overwrite_existing() {
        let security = vec![oauth_scheme("petstore_auth", &["PETSTORE_ACCESS_TOKEN"])];
        let secrets = vec![ExternalSecret {
            security_keys: vec![],
            token: SecretString::new("from-oauth"),
        }];

        let mut env = EnvMap::new();
        env.insert("PETSTORE_ACCESS_TOKEN".to_string(), SecretString::new("from-env"));
        seed_oauth_tokens(&security, &secrets, &mut env);

        assert_eq!(env["PETSTORE_ACCESS_TOKEN"].expose_secret(), "from-env");
    }

    #[test]
    fn test_non_oauth_schemes_are_skipped() {
        let security = vec![HttpSecurityScheme {
            key: "api_key".to_string(),
            scheme_type: "apiKey".to_string(),
            oauth_flow: None,
            env_variables: vec!["BILLING_ACCESS_TOKEN".to_string()],
        }];
        let secrets =
            vec![ExternalSecret { security_keys: vec![], token: SecretString::new("tok") }];

        let mut env = EnvMap::new();
        seed_oauth_tokens(&security, &secrets, &mut env);
        assert!(env.is_empty());
    }

    #[test]
    fn test_unscoped_token_selection() {
        let secrets = vec![
            ExternalSecret {
                security_keys: vec!["scoped".to_string()],
                token: SecretString::new("scoped-tok"),
            },
            ExternalSecret { security_keys: vec![], token: SecretString::new("open-tok") },
        ];
        assert_eq!(unscoped_token(&secrets).unwrap().expose_secret(), "open-tok");
        assert!(unscoped_token(&secrets[..1]).is_none());
    }
}
