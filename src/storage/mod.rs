//! Storage contracts and backends.
//!
//! The gateway core consumes these interfaces; it does not own schemas.
//! SQLite-backed repositories live under [`repositories`]; in-memory
//! implementations of every contract live in [`memory`] and back the test
//! suite and the non-persistent collaborators (OAuth validation, workflow
//! engine, vector store).

pub mod memory;
pub mod pool;
pub mod repositories;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{
    ChatMessage, ChatSession, CustomDomainId, EnvMap, ExternalOauthServerId, FunctionResource,
    OrganizationId, ProjectId, PromptTemplate, ToolDefinition, ToolKind, ToolUrn, ToolVariation,
    Toolset, ToolsetId,
};
use crate::errors::Result;
use crate::secrets::SecretString;

pub use pool::{create_pool, DbPool};

/// Raw toolset contents at the current version, before variation overrides.
#[derive(Debug, Clone, Default)]
pub struct ToolsetContent {
    pub tools: Vec<ToolDefinition>,
    pub prompts: Vec<PromptTemplate>,
    pub resources: Vec<FunctionResource>,
    pub variations: Vec<ToolVariation>,
}

/// Toolset lookup and content loading.
#[async_trait]
pub trait ToolsetRepository: Send + Sync {
    /// Resolve a public MCP slug, optionally scoped to a custom domain.
    async fn find_by_mcp_slug(
        &self,
        mcp_slug: &str,
        custom_domain_id: Option<&CustomDomainId>,
    ) -> Result<Option<Toolset>>;

    /// Resolve a project-scoped toolset slug.
    async fn find_by_project_and_slug(
        &self,
        project_slug: &str,
        toolset_slug: &str,
    ) -> Result<Option<Toolset>>;

    /// Load the toolset's contents at its current version.
    async fn load_content(&self, toolset_id: &ToolsetId) -> Result<ToolsetContent>;
}

/// Environment (user secret) loading.
#[async_trait]
pub trait EnvironmentLoader: Send + Sync {
    /// Load a named environment; `None` when the slug does not exist.
    async fn load(&self, project_id: &ProjectId, slug: &str) -> Result<Option<EnvMap>>;

    /// Load gateway-managed system configuration for a tool source.
    async fn load_system_env(
        &self,
        project_id: &ProjectId,
        toolset_id: &ToolsetId,
        kind: ToolKind,
        source: &str,
    ) -> Result<EnvMap>;
}

/// Stored billing-period usage for an organization.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodUsage {
    pub tool_calls: i64,
    /// Zero when billing has no allowance on record
    pub max_tool_calls: i64,
}

#[async_trait]
pub trait BillingRepository: Send + Sync {
    async fn get_stored_period_usage(&self, organization_id: &OrganizationId)
        -> Result<PeriodUsage>;
}

/// Function execution metrics surfaced by backend response headers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FunctionMetrics {
    pub cpu_time_seconds: Option<f64>,
    pub memory_mb: Option<f64>,
    pub execution_time_seconds: Option<f64>,
}

/// One billable tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCallUsageEvent {
    pub organization_id: OrganizationId,
    pub project_id: ProjectId,
    pub toolset_id: ToolsetId,
    pub toolset_slug: String,
    pub tool_name: String,
    pub tool_urn: Option<ToolUrn>,
    pub kind: ToolKind,
    pub status_code: u16,
    pub duration_ms: u64,
    pub request_bytes: usize,
    pub response_bytes: usize,
    pub function_metrics: Option<FunctionMetrics>,
}

/// Usage event sink. Implementations must tolerate being called from a
/// detached task after the originating request completed.
#[async_trait]
pub trait BillingTracker: Send + Sync {
    async fn track_tool_call_usage(&self, event: ToolCallUsageEvent);
}

/// Chat session and message persistence.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Insert the session on first write, update it thereafter.
    async fn upsert_session(&self, session: &ChatSession) -> Result<()>;

    async fn insert_message(&self, session_id: Uuid, message: &ChatMessage) -> Result<()>;

    async fn find_session(&self, session_id: Uuid) -> Result<Option<ChatSession>>;
}

/// Authenticated API key identity.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    pub organization_id: OrganizationId,
    pub scopes: Vec<String>,
    pub user_id: Option<String>,
}

/// API key verification against stored digests.
#[async_trait]
pub trait ApiKeyVerifier: Send + Sync {
    /// `None` when the key is unknown or revoked.
    async fn verify(&self, token: &str) -> Result<Option<ApiKeyAuth>>;
}

/// Gram-session token exchange.
#[derive(Debug, Clone)]
pub struct SessionAuth {
    pub organization_id: OrganizationId,
    pub user_id: String,
}

#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    /// `None` when the token is not a session token. `strict` demands a
    /// currently-active session rather than a recently-expired one.
    async fn authenticate(&self, token: &str, strict: bool) -> Result<Option<SessionAuth>>;
}

/// Secret attached to a custom-OAuth access token.
#[derive(Debug, Clone)]
pub struct ExternalSecret {
    /// Security keys this secret satisfies; empty means unscoped
    pub security_keys: Vec<String>,
    pub token: SecretString,
}

/// Result of a custom-OAuth token exchange.
#[derive(Debug, Clone, Default)]
pub struct AccessToken {
    pub external_secrets: Vec<ExternalSecret>,
}

/// OAuth token validation and upstream metadata access.
#[async_trait]
pub trait OAuthService: Send + Sync {
    /// Validate a bearer token presented against an OAuth-bound toolset.
    async fn validate_access_token(
        &self,
        toolset_id: &ToolsetId,
        token: &str,
    ) -> Result<AccessToken>;

    /// Stored upstream metadata document for an external OAuth server.
    async fn upstream_metadata(
        &self,
        server_id: &ExternalOauthServerId,
    ) -> Result<Option<Value>>;
}

/// Parameters for the toolset indexing workflow.
#[derive(Debug, Clone)]
pub struct IndexToolsetParams {
    pub toolset_id: ToolsetId,
    pub version: i64,
    /// Embedding inputs, one per tool
    pub docs: Vec<ToolIndexDoc>,
}

/// Handle to a submitted workflow run.
#[async_trait]
pub trait WorkflowRun: Send {
    /// Await workflow completion.
    async fn get(self: Box<Self>) -> Result<()>;
}

/// Background workflow submission.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn execute_index_toolset(
        &self,
        params: IndexToolsetParams,
    ) -> Result<Box<dyn WorkflowRun>>;
}

/// Document indexed for one tool.
#[derive(Debug, Clone)]
pub struct ToolIndexDoc {
    pub urn: ToolUrn,
    pub name: String,
    pub text: String,
    pub tags: Vec<String>,
}

/// Tag filter combination for vector search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMatchMode {
    #[default]
    Any,
    All,
}

/// One vector-search hit.
#[derive(Debug, Clone)]
pub struct ToolSearchHit {
    pub name: String,
    pub description: Option<String>,
    pub score: f32,
    pub tags: Vec<String>,
}

/// Versioned tool-embedding store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store embedded documents for one toolset version.
    ///
    /// Idempotent: the first writer wins; indexing an already-indexed
    /// version is a no-op.
    async fn index_toolset_with_vectors(
        &self,
        toolset_id: &ToolsetId,
        version: i64,
        docs: Vec<ToolIndexDoc>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<()>;

    async fn toolset_tools_are_indexed(
        &self,
        toolset_id: &ToolsetId,
        version: i64,
    ) -> Result<bool>;

    async fn search_toolset_tools(
        &self,
        toolset_id: &ToolsetId,
        version: i64,
        query_vector: &[f32],
        tags: &[String],
        match_mode: TagMatchMode,
        num_results: usize,
    ) -> Result<Vec<ToolSearchHit>>;
}

/// Text embedding seam; real providers live outside the core.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
