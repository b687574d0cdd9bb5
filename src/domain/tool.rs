//! Tool domain types.
//!
//! Tools are polymorphic: HTTP operations, hosted functions, higher-order
//! prompt templates, and tools proxied from external MCP servers. The
//! discriminated union carries an explicit variant tag; dispatch enumerates
//! known variants and rejects anything else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::domain::id::ToolId;
use crate::domain::prompt::PromptTemplate;

/// Name prefix separator for tools proxied from an attached external MCP
/// server: `<server_slug>--<remote_name>`.
pub const EXTERNAL_MCP_SEPARATOR: &str = "--";

/// Meta key requesting that the gateway return the backend's raw payload
/// instead of shaping an MCP content chunk.
pub const META_KIND_KEY: &str = "gram.ai/kind";

/// Meta value for the passthrough behavior.
pub const META_KIND_PASSTHROUGH: &str = "mcp-passthrough";

/// Tool kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Http,
    Function,
    Prompt,
    ExternalMcp,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Function => "function",
            Self::Prompt => "prompt",
            Self::ExternalMcp => "external_mcp",
        }
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Self::Http),
            "function" => Ok(Self::Function),
            "prompt" => Ok(Self::Prompt),
            "external_mcp" => Ok(Self::ExternalMcp),
            other => Err(format!("unknown tool kind: {}", other)),
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stable addressable identifier for a tool: `tools:<kind>:<source>:<instance>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
pub struct ToolUrn {
    kind: ToolKind,
    source: String,
    instance: String,
}

impl ToolUrn {
    pub fn new(kind: ToolKind, source: impl Into<String>, instance: impl Into<String>) -> Self {
        Self { kind, source: source.into(), instance: instance.into() }
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    /// The producing deployment or attachment (an OpenAPI document slug, a
    /// function source slug, an external server slug).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The tool's name within its source.
    pub fn instance(&self) -> &str {
        &self.instance
    }
}

impl fmt::Display for ToolUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tools:{}:{}:{}", self.kind, self.source, self.instance)
    }
}

impl FromStr for ToolUrn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(4, ':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("tools"), Some(kind), Some(source), Some(instance))
                if !source.is_empty() && !instance.is_empty() =>
            {
                Ok(Self { kind: kind.parse()?, source: source.to_string(), instance: instance.to_string() })
            }
            _ => Err(format!("malformed tool URN: {}", s)),
        }
    }
}

impl TryFrom<String> for ToolUrn {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ToolUrn> for String {
    fn from(urn: ToolUrn) -> Self {
        urn.to_string()
    }
}

/// A declared security requirement on an HTTP tool.
///
/// `env_variables` names the environment variables the scheme draws from;
/// OAuth-flavored schemes additionally accept user OAuth tokens into the
/// variables ending in `ACCESS_TOKEN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpSecurityScheme {
    /// Security key as declared by the source document (e.g. `petstore_auth`)
    pub key: String,
    /// Scheme type: `apiKey`, `http`, `oauth2`, `openIdConnect`
    pub scheme_type: String,
    /// OAuth flow, when applicable (e.g. `authorization_code`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_flow: Option<String>,
    /// Environment variable names backing this scheme
    pub env_variables: Vec<String>,
}

impl HttpSecurityScheme {
    /// Whether user OAuth tokens may satisfy this scheme.
    pub fn accepts_oauth_token(&self) -> bool {
        self.oauth_flow.as_deref() == Some("authorization_code")
            || self.scheme_type == "openIdConnect"
    }
}

/// HTTP tool definition derived from an OpenAPI operation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpToolDefinition {
    pub id: ToolId,
    pub urn: ToolUrn,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub security: Vec<HttpSecurityScheme>,
    /// Environment variable names supplying server configuration (base URL
    /// overrides and the like), beyond the security schemes.
    #[serde(default)]
    pub server_env_variables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Function tool definition backed by a hosted function runtime.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunctionToolDefinition {
    pub id: ToolId,
    pub urn: ToolUrn,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
    pub function_id: String,
    pub runtime: String,
    /// Mime type the function declares for its response body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_input: Option<FunctionAuthInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Declared auth requirement forwarded to a function runtime.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunctionAuthInput {
    pub name: String,
    #[serde(default)]
    pub env_variables: Vec<String>,
}

/// External MCP transport flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExternalMcpTransport {
    Sse,
    StreamableHttp,
}

impl ExternalMcpTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sse => "sse",
            Self::StreamableHttp => "streamable_http",
        }
    }
}

impl FromStr for ExternalMcpTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sse" => Ok(Self::Sse),
            "streamable_http" => Ok(Self::StreamableHttp),
            other => Err(format!("unknown external MCP transport: {}", other)),
        }
    }
}

/// Tool proxied from an attached external MCP server.
///
/// The client-facing `name` is always `<server_slug>--<remote_name>`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMcpToolDefinition {
    pub id: ToolId,
    pub urn: ToolUrn,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
    pub server_slug: String,
    pub remote_name: String,
    pub server_url: String,
    pub transport: ExternalMcpTransport,
    pub oauth_required: bool,
    /// Remote annotations forwarded verbatim, explicit `false` hints included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
}

impl ExternalMcpToolDefinition {
    /// Compose the client-facing name for a remote tool.
    pub fn prefixed_name(server_slug: &str, remote_name: &str) -> String {
        format!("{}{}{}", server_slug, EXTERNAL_MCP_SEPARATOR, remote_name)
    }
}

/// Split a client-facing external tool name into `(server_slug, remote_name)`.
pub fn split_external_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(EXTERNAL_MCP_SEPARATOR).filter(|(slug, remote)| {
        !slug.is_empty() && !remote.is_empty()
    })
}

/// Polymorphic tool definition.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolDefinition {
    Http(HttpToolDefinition),
    Function(FunctionToolDefinition),
    Prompt(PromptTemplate),
    ExternalMcp(ExternalMcpToolDefinition),
}

impl ToolDefinition {
    pub fn kind(&self) -> ToolKind {
        match self {
            Self::Http(_) => ToolKind::Http,
            Self::Function(_) => ToolKind::Function,
            Self::Prompt(_) => ToolKind::Prompt,
            Self::ExternalMcp(_) => ToolKind::ExternalMcp,
        }
    }

    pub fn urn(&self) -> &ToolUrn {
        match self {
            Self::Http(t) => &t.urn,
            Self::Function(t) => &t.urn,
            Self::Prompt(t) => &t.urn,
            Self::ExternalMcp(t) => &t.urn,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Http(t) => &t.name,
            Self::Function(t) => &t.name,
            Self::Prompt(t) => &t.name,
            Self::ExternalMcp(t) => &t.name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Http(t) => t.description.as_deref(),
            Self::Function(t) => t.description.as_deref(),
            Self::Prompt(t) => t.description.as_deref(),
            Self::ExternalMcp(t) => t.description.as_deref(),
        }
    }

    pub fn input_schema(&self) -> &serde_json::Value {
        match self {
            Self::Http(t) => &t.input_schema,
            Self::Function(t) => &t.input_schema,
            Self::Prompt(t) => &t.arguments_schema,
            Self::ExternalMcp(t) => &t.input_schema,
        }
    }

    pub fn meta(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Http(t) => t.meta.as_ref(),
            Self::Function(t) => t.meta.as_ref(),
            Self::Prompt(_) | Self::ExternalMcp(_) => None,
        }
    }

    /// Whether the meta annotation requests passthrough response shaping.
    pub fn is_passthrough(&self) -> bool {
        self.meta()
            .and_then(|m| m.get(META_KIND_KEY))
            .and_then(|v| v.as_str())
            .map(|v| v == META_KIND_PASSTHROUGH)
            .unwrap_or(false)
    }
}
