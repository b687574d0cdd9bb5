//! Shared fixtures for the HTTP-surface integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum_test::TestServer;
use chrono::Utc;
use serde_json::json;

use gramgate::config::AppConfig;
use gramgate::domain::toolset::{AccountTier, ToolSelectionMode};
use gramgate::domain::{
    FunctionToolDefinition, HttpSecurityScheme, HttpToolDefinition, OrganizationId, ProjectId,
    PromptKind, PromptTemplate, ToolDefinition, ToolId, ToolKind, ToolUrn, Toolset, ToolsetId,
};
use gramgate::startup::{build_state, Collaborators};
use gramgate::storage::memory::{
    HashEmbeddingProvider, InMemoryBillingRepository, InMemoryChatRepository,
    InMemoryEnvironmentLoader, InMemorySessionAuthenticator, InMemoryToolsetRepository,
    InMemoryVectorStore, InlineWorkflowEngine, StaticApiKeyVerifier, StaticFunctionRuntime,
    StaticOAuthService,
};
use gramgate::storage::{
    BillingRepository, EmbeddingProvider, ToolsetContent, VectorStore,
};

pub struct TestGateway {
    pub server: TestServer,
    pub toolsets: Arc<InMemoryToolsetRepository>,
    pub environments: Arc<InMemoryEnvironmentLoader>,
    pub billing: Arc<InMemoryBillingRepository>,
    pub api_keys: Arc<StaticApiKeyVerifier>,
    pub oauth: Arc<StaticOAuthService>,
    pub functions: Arc<StaticFunctionRuntime>,
    pub chats: Arc<InMemoryChatRepository>,
}

pub fn gateway() -> TestGateway {
    gateway_with_config(AppConfig::default())
}

pub fn gateway_with_config(config: AppConfig) -> TestGateway {
    let toolsets = Arc::new(InMemoryToolsetRepository::new());
    let environments = Arc::new(InMemoryEnvironmentLoader::new());
    let billing = Arc::new(InMemoryBillingRepository::new());
    let api_keys = Arc::new(StaticApiKeyVerifier::new());
    let oauth = Arc::new(StaticOAuthService::new());
    let functions = Arc::new(StaticFunctionRuntime::new());
    let chats = Arc::new(InMemoryChatRepository::new());

    let vectors = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(HashEmbeddingProvider::default());
    let engine = Arc::new(InlineWorkflowEngine::new(
        Arc::clone(&vectors) as Arc<dyn VectorStore>,
        Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
    ));

    let state = build_state(
        config,
        Collaborators {
            toolsets: Arc::clone(&toolsets) as _,
            environments: Arc::clone(&environments) as _,
            billing_repository: Arc::clone(&billing) as Arc<dyn BillingRepository>,
            billing_tracker: Arc::clone(&billing) as _,
            chats: Arc::clone(&chats) as _,
            api_keys: Arc::clone(&api_keys) as _,
            sessions: Arc::new(InMemorySessionAuthenticator::new()),
            oauth: Arc::clone(&oauth) as _,
            functions: Arc::clone(&functions) as _,
            workflow_engine: engine,
            vector_store: vectors,
            embedder,
        },
        None,
    );

    let server = TestServer::new(gramgate::mcp::build_router(state)).expect("test server");

    TestGateway { server, toolsets, environments, billing, api_keys, oauth, functions, chats }
}

pub fn toolset(mcp_slug: &str, mode: ToolSelectionMode) -> Toolset {
    Toolset {
        id: ToolsetId::new(),
        project_id: ProjectId::new(),
        project_slug: "acme".to_string(),
        organization_id: OrganizationId::new(),
        slug: mcp_slug.to_string(),
        name: mcp_slug.to_string(),
        description: None,
        logo_url: None,
        external_docs_url: None,
        mcp_slug: Some(mcp_slug.to_string()),
        mcp_is_public: true,
        mcp_enabled: true,
        custom_domain_id: None,
        oauth_proxy_server_id: None,
        external_oauth_server_id: None,
        default_environment_slug: None,
        mode,
        account_tier: AccountTier::Pro,
        version: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn function_tool(name: &str, function_id: &str) -> ToolDefinition {
    ToolDefinition::Function(FunctionToolDefinition {
        id: ToolId::new(),
        urn: ToolUrn::new(ToolKind::Function, "fns", name),
        name: name.to_string(),
        description: Some(format!("{} function", name)),
        input_schema: json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {"text": {"type": "string"}}
        }),
        function_id: function_id.to_string(),
        runtime: "nodejs22".to_string(),
        response_mime_type: None,
        auth_input: None,
        meta: None,
    })
}

pub fn passthrough_function_tool(name: &str, function_id: &str) -> ToolDefinition {
    match function_tool(name, function_id) {
        ToolDefinition::Function(mut tool) => {
            tool.meta = Some(json!({"gram.ai/kind": "mcp-passthrough"}));
            ToolDefinition::Function(tool)
        }
        _ => unreachable!(),
    }
}

pub fn http_tool(name: &str, method: &str, path: &str) -> ToolDefinition {
    ToolDefinition::Http(HttpToolDefinition {
        id: ToolId::new(),
        urn: ToolUrn::new(ToolKind::Http, "billing", name),
        name: name.to_string(),
        description: Some(format!("{} operation", name)),
        input_schema: json!({"type": "object"}),
        method: method.to_string(),
        path: path.to_string(),
        operation_id: None,
        security: vec![HttpSecurityScheme {
            key: "api_key".to_string(),
            scheme_type: "apiKey".to_string(),
            oauth_flow: None,
            env_variables: vec!["BILLING_API_KEY".to_string()],
        }],
        server_env_variables: vec!["BILLING_SERVER_URL".to_string()],
        meta: None,
    })
}

pub fn prompt(name: &str, template: &str) -> PromptTemplate {
    PromptTemplate::new(
        name,
        template,
        PromptKind::Prompt,
        json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        }),
    )
}

pub fn content(tools: Vec<ToolDefinition>) -> ToolsetContent {
    ToolsetContent { tools, prompts: vec![], resources: vec![], variations: vec![] }
}

pub fn rpc(id: i64, method: &str, params: serde_json::Value) -> serde_json::Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}
