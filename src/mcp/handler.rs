//! MCP Request Handler
//!
//! Routes incoming JSON-RPC requests to the appropriate method handlers.
//! Each request in a batch is handled independently; failures marshal into
//! per-request error objects and never abort siblings. Every request records
//! a duration histogram keyed by method and endpoint.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{PromptKind, ToolSelectionMode, Toolset};
use crate::errors::{GatewayError, Result};
use crate::mcp::error::McpError;
use crate::mcp::protocol::*;
use crate::mcp::schema::{append_session_instruction, inject_session_fields};
use crate::mcp::session_context::SessionContext;
use crate::mcp::synthetic;
use crate::observability::MetricsRecorder;
use crate::proxy::executor::{ExecutionInput, ProxyOutcome, ToolProxyExecutor};
use crate::proxy::planner::BillingKind;
use crate::services::session_writer::{SessionPersistRecord, SessionWriter};
use crate::services::snapshot::{EffectiveTool, ToolsetSnapshot};
use crate::services::search::ToolSearchService;
use crate::services::toolset_cache::ToolsetCache;
use crate::auth::AuthContext;
use crate::domain::EnvMap;

/// Cross-cutting request state, threaded explicitly through handlers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub auth: AuthContext,
    /// Resolved gram environment slug (path or header selection, else the
    /// toolset default)
    pub environment_slug: Option<String>,
    /// `Gram-Mode` header override for the tool-selection mode
    pub mode_override: Option<ToolSelectionMode>,
    /// `Mcp-Session-Id` request header, session fallback
    pub header_session_id: Option<String>,
    /// `Mcp-*` header overrides renamed to lower snake case
    pub env_overrides: EnvMap,
    /// Connection fingerprint hash; empty when no signal was present
    pub fingerprint: String,
    /// `host + path` label for the duration histogram
    pub endpoint: String,
}

/// Result of handling one decoded batch.
pub struct BatchOutcome {
    /// Responses for non-notification requests, in submission order
    pub responses: Vec<JsonRpcResponse>,
    /// Session id from the last tool call, echoed as `Mcp-Session-Id`
    pub session_id: Option<Uuid>,
}

/// JSON-RPC method dispatcher for one toolset endpoint.
pub struct McpHandler {
    cache: Arc<ToolsetCache>,
    executor: Arc<ToolProxyExecutor>,
    search: Arc<ToolSearchService>,
    session_writer: Arc<SessionWriter>,
    metrics: MetricsRecorder,
}

impl McpHandler {
    pub fn new(
        cache: Arc<ToolsetCache>,
        executor: Arc<ToolProxyExecutor>,
        search: Arc<ToolSearchService>,
        session_writer: Arc<SessionWriter>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self { cache, executor, search, session_writer, metrics }
    }

    /// Handle a decoded batch. Requests are processed in submission order;
    /// notifications produce no response entry.
    pub async fn handle_batch(
        &self,
        toolset: &Toolset,
        ctx: &RequestContext,
        requests: Vec<JsonRpcRequest>,
    ) -> BatchOutcome {
        let mut responses = Vec::with_capacity(requests.len());
        let mut session_id = None;

        for request in requests {
            // A request without an id is a notification: it is still
            // processed, but produces no response entry.
            let is_notification = request.is_notification();
            let (response, session) = self.handle_request(toolset, ctx, request).await;
            if let Some(session) = session {
                session_id = Some(session);
            }
            if let Some(response) = response {
                if !is_notification {
                    responses.push(response);
                }
            }
        }

        BatchOutcome { responses, session_id }
    }

    /// Handle one request. Returns `None` for notifications.
    pub async fn handle_request(
        &self,
        toolset: &Toolset,
        ctx: &RequestContext,
        request: JsonRpcRequest,
    ) -> (Option<JsonRpcResponse>, Option<Uuid>) {
        let method = request.method.clone();
        let id = request.id.clone();
        let started = Instant::now();

        debug!(method = %method, id = ?id, toolset_id = %toolset.id, "Handling MCP request");

        let (response, session) = match method.as_str() {
            "ping" => (Some(JsonRpcResponse::success(id, json!({}))), None),
            "initialize" => (Some(self.handle_initialize(id)), None),
            "notifications/initialized" | "notifications/cancelled" => {
                debug!(method = %method, "Acknowledged notification");
                (None, None)
            }
            "tools/list" => (Some(self.wrap(id, self.handle_tools_list(toolset, ctx).await)), None),
            "tools/call" => {
                let (response, session) = self.handle_tools_call(toolset, ctx, id, request.params).await;
                (Some(response), session)
            }
            "prompts/list" => {
                (Some(self.wrap(id, self.handle_prompts_list(toolset).await)), None)
            }
            "prompts/get" => {
                (Some(self.wrap(id, self.handle_prompts_get(toolset, request.params).await)), None)
            }
            "resources/list" => {
                (Some(self.wrap(id, self.handle_resources_list(toolset).await)), None)
            }
            "resources/read" => (
                Some(self.wrap(id, self.handle_resources_read(toolset, ctx, request.params).await)),
                None,
            ),
            _ => {
                // A notification for an unknown method still gets no reply.
                if request.is_notification() {
                    (None, None)
                } else {
                    (Some(McpError::MethodNotFound(method.clone()).to_response(id)), None)
                }
            }
        };

        let is_error = response.as_ref().map(|r| r.error.is_some()).unwrap_or(false);
        self.metrics.record_rpc_request(
            &method,
            &ctx.endpoint,
            started.elapsed().as_secs_f64(),
            is_error,
        );

        (response, session)
    }

    fn wrap(&self, id: Option<RequestId>, result: Result<Value>) -> JsonRpcResponse {
        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(err) => McpError::Gateway(err).to_response(id),
        }
    }

    fn handle_initialize(&self, id: Option<RequestId>) -> JsonRpcResponse {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities { tools: Some(ToolsCapability {}) },
            server_info: ServerInfo {
                name: crate::APP_NAME.to_string(),
                version: crate::VERSION.to_string(),
            },
        };
        JsonRpcResponse::success(id, json!(result))
    }

    fn effective_mode(&self, toolset: &Toolset, ctx: &RequestContext) -> ToolSelectionMode {
        ctx.mode_override.unwrap_or(toolset.mode)
    }

    async fn handle_tools_list(&self, toolset: &Toolset, ctx: &RequestContext) -> Result<Value> {
        let snapshot = self.cache.snapshot(toolset).await?;

        let mut tools = match self.effective_mode(toolset, ctx) {
            ToolSelectionMode::Static => {
                snapshot.tools.iter().map(wire_tool).collect::<Vec<_>>()
            }
            ToolSelectionMode::Progressive => synthetic::progressive_tools(&snapshot.tools),
            ToolSelectionMode::Dynamic => synthetic::dynamic_tools(&snapshot.tools),
        };

        // Session fields ride on every exposed schema, synthetic surfaces
        // included, so ids propagate end to end.
        for tool in &mut tools {
            inject_session_fields(&mut tool.input_schema);
            tool.description = Some(append_session_instruction(tool.description.as_deref()));
        }

        Ok(json!(ToolsListResult { tools, next_cursor: None }))
    }

    async fn handle_tools_call(
        &self,
        toolset: &Toolset,
        ctx: &RequestContext,
        id: Option<RequestId>,
        params: Value,
    ) -> (JsonRpcResponse, Option<Uuid>) {
        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                return (
                    McpError::InvalidParams(format!("malformed tools/call params: {}", e))
                        .to_response(id),
                    None,
                );
            }
        };

        let mut arguments = params.arguments.unwrap_or_else(|| json!({}));
        let session = SessionContext::extract(&mut arguments, ctx.header_session_id.as_deref());
        let session_id = session.session_id;

        let result = self
            .dispatch_tool_call(toolset, ctx, &params.name, arguments, &session)
            .await;

        match result {
            Ok(value) => (JsonRpcResponse::success(id, value), Some(session_id)),
            Err(err) => (McpError::Gateway(err).to_response(id), Some(session_id)),
        }
    }

    async fn dispatch_tool_call(
        &self,
        toolset: &Toolset,
        ctx: &RequestContext,
        name: &str,
        arguments: Value,
        session: &SessionContext,
    ) -> Result<Value> {
        let snapshot = self.cache.snapshot(toolset).await?;
        let mode = self.effective_mode(toolset, ctx);

        if mode != ToolSelectionMode::Static && synthetic::is_synthetic(name) {
            if name == synthetic::EXECUTE_TOOL {
                let (target, mut inner) = synthetic::parse_execute_tool(&arguments)?;
                // Inner payloads may repeat the session fields; strip them,
                // keeping the session already established at the outer level.
                let _ = SessionContext::extract(
                    &mut inner,
                    Some(session.session_id.to_string().as_str()),
                );
                return self.execute_tool(toolset, ctx, &snapshot, &target, inner, session).await;
            }
            return self.handle_synthetic(&snapshot, mode, name, &arguments, session).await;
        }

        self.execute_tool(toolset, ctx, &snapshot, name, arguments, session).await
    }

    async fn handle_synthetic(
        &self,
        snapshot: &ToolsetSnapshot,
        mode: ToolSelectionMode,
        name: &str,
        arguments: &Value,
        session: &SessionContext,
    ) -> Result<Value> {
        let mut result = match (name, mode) {
            (synthetic::LIST_TOOLS, ToolSelectionMode::Progressive) => {
                let paths = synthetic::parse_list_tools(arguments);
                let listed: Vec<Value> = synthetic::filter_by_paths(&snapshot.tools, &paths)
                    .into_iter()
                    .map(|tool| {
                        json!({
                            "name": tool.name,
                            "path": synthetic::tool_path(tool),
                            "description": tool.description,
                        })
                    })
                    .collect();
                ToolCallResult {
                    content: vec![ContentBlock::text(
                        serde_json::to_string(&json!({"tools": listed}))?,
                    )],
                    is_error: None,
                }
            }
            (synthetic::DESCRIBE_TOOLS, _) => {
                let names = synthetic::parse_describe_tools(arguments)?;
                let payload = synthetic::describe_tools(&snapshot.tools, &names);
                ToolCallResult {
                    content: vec![ContentBlock::text(serde_json::to_string(&payload)?)],
                    is_error: None,
                }
            }
            (synthetic::SEARCH_TOOLS, ToolSelectionMode::Dynamic) => {
                let params = synthetic::parse_search_tools(arguments)?;
                let hits = self
                    .search
                    .search(
                        snapshot,
                        &params.query,
                        &params.tags,
                        params.match_mode,
                        params.num_results,
                    )
                    .await?;

                let content = hits
                    .into_iter()
                    .map(|hit| {
                        let mut block = ContentBlock::text(format!(
                            "{}: {}",
                            hit.name,
                            hit.description.unwrap_or_default()
                        ));
                        block.set_meta("similarity", json!(hit.score));
                        block.set_meta("tags", json!(hit.tags));
                        block
                    })
                    .collect();
                ToolCallResult { content, is_error: None }
            }
            _ => {
                return Err(GatewayError::not_found("tool", name));
            }
        };

        session.inject_into_result(&mut result);
        Ok(json!(result))
    }

    async fn execute_tool(
        &self,
        toolset: &Toolset,
        ctx: &RequestContext,
        snapshot: &ToolsetSnapshot,
        name: &str,
        arguments: Value,
        session: &SessionContext,
    ) -> Result<Value> {
        let tool = snapshot
            .find_tool(name)
            .ok_or_else(|| GatewayError::not_found("tool", name))?;

        let output = self
            .executor
            .execute(ExecutionInput {
                toolset,
                tool,
                arguments,
                auth: &ctx.auth,
                environment_slug: ctx
                    .environment_slug
                    .as_deref()
                    .or(toolset.default_environment_slug.as_deref()),
                env_overrides: &ctx.env_overrides,
                billing: BillingKind::ToolCall,
            })
            .await?;

        self.session_writer.spawn_persist(SessionPersistRecord {
            session_id: session.session_id,
            project_id: toolset.project_id.clone(),
            organization_id: toolset.organization_id.clone(),
            user_id: ctx.auth.user_id.clone(),
            fingerprint: ctx.fingerprint.clone(),
            messages: session.messages.clone(),
            response_body: output.response_body.clone(),
            tool_call_id: Some(name.to_string()),
        });

        match output.outcome {
            ProxyOutcome::Shaped(mut result) => {
                session.inject_into_result(&mut result);
                Ok(json!(result))
            }
            // Passthrough bypasses MCP shaping entirely; the raw backend
            // body is the result.
            ProxyOutcome::Passthrough(raw) => Ok(raw),
        }
    }

    async fn handle_prompts_list(&self, toolset: &Toolset) -> Result<Value> {
        let snapshot = self.cache.snapshot(toolset).await?;

        let prompts: Vec<Prompt> = snapshot
            .prompts
            .iter()
            .filter(|p| p.kind == PromptKind::Prompt)
            .map(|template| Prompt {
                name: template.name.clone(),
                description: template.description.clone(),
                arguments: Some(
                    template
                        .arguments()
                        .into_iter()
                        .map(|arg| PromptArgumentDef {
                            name: arg.name,
                            description: arg.description,
                            required: Some(arg.required),
                        })
                        .collect(),
                ),
            })
            .collect();

        Ok(json!(PromptsListResult { prompts, next_cursor: None }))
    }

    async fn handle_prompts_get(&self, toolset: &Toolset, params: Value) -> Result<Value> {
        let params: PromptGetParams = serde_json::from_value(params)
            .map_err(|e| GatewayError::invalid(format!("malformed prompts/get params: {}", e)))?;

        let snapshot = self.cache.snapshot(toolset).await?;
        let template = snapshot
            .find_prompt(&params.name)
            .ok_or_else(|| GatewayError::not_found("prompt", &params.name))?;

        let arguments = params.arguments.unwrap_or(Value::Null);
        let rendered = template.render(&arguments)?;

        Ok(json!(PromptGetResult {
            description: template.description.clone(),
            messages: vec![PromptMessage::User { content: PromptContent::Text { text: rendered } }],
        }))
    }

    async fn handle_resources_list(&self, toolset: &Toolset) -> Result<Value> {
        let snapshot = self.cache.snapshot(toolset).await?;

        let resources: Vec<Resource> = snapshot
            .resources
            .iter()
            .map(|resource| Resource {
                uri: resource.uri.clone(),
                name: resource.name.clone(),
                title: resource.title.clone(),
                description: resource.description.clone(),
                mime_type: resource.mime_type.clone(),
            })
            .collect();

        Ok(json!(ResourcesListResult { resources, next_cursor: None }))
    }

    async fn handle_resources_read(
        &self,
        toolset: &Toolset,
        ctx: &RequestContext,
        params: Value,
    ) -> Result<Value> {
        let params: ResourceReadParams = serde_json::from_value(params).map_err(|e| {
            GatewayError::invalid(format!("malformed resources/read params: {}", e))
        })?;

        let snapshot = self.cache.snapshot(toolset).await?;
        let resource = snapshot
            .find_resource(&params.uri)
            .ok_or_else(|| GatewayError::not_found("resource", &params.uri))?;

        let (payload, content_type) = self
            .executor
            .read_resource(
                toolset,
                resource,
                json!({"uri": params.uri}),
                &ctx.auth,
                ctx.environment_slug
                    .as_deref()
                    .or(toolset.default_environment_slug.as_deref()),
                &ctx.env_overrides,
            )
            .await?;

        let (text, blob) = match payload {
            crate::proxy::content::ResourcePayload::Text(text) => (Some(text), None),
            crate::proxy::content::ResourcePayload::Blob(blob) => (None, Some(blob)),
        };

        Ok(json!(ResourceReadResult {
            contents: vec![ResourceContent {
                uri: resource.uri.clone(),
                name: Some(resource.name.clone()),
                mime_type: Some(content_type),
                text,
                blob,
            }],
        }))
    }
}

/// Map an effective tool onto the wire shape, applying variation hints as
/// MCP annotations.
fn wire_tool(tool: &EffectiveTool) -> Tool {
    let mut annotations: Map<String, Value> = match &tool.definition {
        crate::domain::ToolDefinition::ExternalMcp(external) => external
            .annotations
            .as_ref()
            .and_then(|a| a.as_object().cloned())
            .unwrap_or_default(),
        _ => Map::new(),
    };

    let hints = &tool.hints;
    for (key, value) in [
        ("readOnlyHint", hints.read_only),
        ("destructiveHint", hints.destructive),
        ("idempotentHint", hints.idempotent),
        ("openWorldHint", hints.open_world),
    ] {
        if let Some(value) = value {
            annotations.insert(key.to_string(), json!(value));
        }
    }

    Tool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.definition.input_schema().clone(),
        annotations: if annotations.is_empty() { None } else { Some(Value::Object(annotations)) },
        meta: tool.definition.meta().cloned(),
    }
}
