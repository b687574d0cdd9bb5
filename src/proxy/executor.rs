//! Tool proxy executor.
//!
//! Owns the runtime contract for a call: gather user and system
//! configuration, enforce usage limits, run the backend adapter against an
//! in-memory response capture, extract function metrics, classify the body
//! into an MCP content chunk (or pass the raw body through), and emit a
//! usage event and structured log exactly once on a detached context.

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::auth::AuthContext;
use crate::domain::{EnvMap, HttpToolDefinition, ToolKind, Toolset};
use crate::errors::{GatewayError, Result};
use crate::mcp::protocol::ToolCallResult;
use crate::observability::MetricsRecorder;
use crate::proxy::capture::{content_type_headers, ResponseCapture};
use crate::proxy::content;
use crate::proxy::external::ExternalMcpClient;
use crate::proxy::planner::{
    plan_call, seed_oauth_tokens, unscoped_token, BillingKind, CallBinding, CallPlan,
};
use crate::services::snapshot::EffectiveTool;
use crate::services::usage::UsageGuard;
use crate::storage::{BillingTracker, EnvironmentLoader, ToolCallUsageEvent};

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

static PATH_PARAM_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^}]+)\}").expect("path parameter regex is valid"));

/// One hosted-function invocation handed to the runtime collaborator.
#[derive(Debug, Clone)]
pub struct FunctionInvocation {
    pub function_id: String,
    pub runtime: String,
    pub arguments: Value,
    pub env: EnvMap,
    pub response_mime_type: Option<String>,
}

/// Hosted-function runtime seam. Implementations write exactly one response
/// into the capture and set a content type.
#[async_trait]
pub trait FunctionBackend: Send + Sync {
    async fn invoke(
        &self,
        invocation: FunctionInvocation,
        capture: &mut ResponseCapture,
    ) -> Result<()>;
}

/// Everything the executor needs for one call.
pub struct ExecutionInput<'a> {
    pub toolset: &'a Toolset,
    pub tool: &'a EffectiveTool,
    /// Session-stripped tool arguments
    pub arguments: Value,
    pub auth: &'a AuthContext,
    /// Resolved gram environment slug (path/header selection over default)
    pub environment_slug: Option<&'a str>,
    /// `Mcp-*` header overrides, already renamed to lower snake case
    pub env_overrides: &'a EnvMap,
    pub billing: BillingKind,
}

/// Shaped or raw execution result.
pub enum ProxyOutcome {
    Shaped(ToolCallResult),
    /// Raw backend body, returned verbatim as the RPC `result`
    Passthrough(Value),
}

/// Execution result plus the bookkeeping the dispatcher needs.
pub struct ToolCallOutput {
    pub outcome: ProxyOutcome,
    pub status_code: u16,
    /// Serialized response body, persisted as the session's `tool` message
    pub response_body: String,
    /// Function metrics lifted from backend response headers
    pub function_metrics: Option<crate::storage::FunctionMetrics>,
}

/// Executes call plans against backend adapters.
pub struct ToolProxyExecutor {
    environments: Arc<dyn EnvironmentLoader>,
    usage_guard: Arc<UsageGuard>,
    billing: Arc<dyn BillingTracker>,
    functions: Arc<dyn FunctionBackend>,
    metrics: MetricsRecorder,
}

impl ToolProxyExecutor {
    pub fn new(
        environments: Arc<dyn EnvironmentLoader>,
        usage_guard: Arc<UsageGuard>,
        billing: Arc<dyn BillingTracker>,
        functions: Arc<dyn FunctionBackend>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self { environments, usage_guard, billing, functions, metrics }
    }

    /// Execute one tool call end to end.
    pub async fn execute(&self, input: ExecutionInput<'_>) -> Result<ToolCallOutput> {
        let plan = plan_call(
            input.tool,
            &input.toolset.project_id,
            &input.toolset.id,
            &input.toolset.slug,
            input.billing,
        );

        self.usage_guard.check(input.toolset).await?;

        let env = self.gather_env(&input, &plan).await?;
        let request_bytes = input.arguments.to_string().len();

        let started = Instant::now();
        let result = self.dispatch(&plan, input.arguments, &env, input.auth).await;
        let duration = started.elapsed();

        let (status_code, response_bytes, function_metrics) = match &result {
            Ok(output) => (output.status_code, output.response_body.len(), output.function_metrics),
            Err(err) => (err.status_code(), 0, None),
        };

        self.record_call(
            input.toolset,
            &plan,
            status_code,
            duration.as_millis() as u64,
            request_bytes,
            response_bytes,
            function_metrics,
            result.as_ref().err(),
        );

        self.metrics.record_tool_call(
            plan.kind().as_str(),
            status_code,
            duration.as_secs_f64(),
        );

        result
    }

    /// Execute a resource read through the function backend, classifying the
    /// body into text or a base64 blob.
    pub async fn read_resource(
        &self,
        toolset: &Toolset,
        resource: &crate::domain::FunctionResource,
        arguments: Value,
        auth: &AuthContext,
        environment_slug: Option<&str>,
        env_overrides: &EnvMap,
    ) -> Result<(content::ResourcePayload, String)> {
        self.usage_guard.check(toolset).await?;

        let mut env = self
            .environments
            .load_system_env(
                &toolset.project_id,
                &toolset.id,
                ToolKind::Function,
                resource.urn.source(),
            )
            .await?;
        self.merge_user_env(&mut env, auth, &toolset.project_id, environment_slug, env_overrides)
            .await?;

        let mut capture = ResponseCapture::new();
        self.functions
            .invoke(
                FunctionInvocation {
                    function_id: resource.function_id.clone(),
                    runtime: resource.runtime.clone(),
                    arguments,
                    env,
                    response_mime_type: resource.mime_type.clone(),
                },
                &mut capture,
            )
            .await?;

        if !capture.is_written() {
            return Err(GatewayError::unexpected("function backend wrote no response"));
        }
        let content_type = capture.content_type()?.to_string();
        let payload = content::classify_resource(&content_type, capture.body())?;
        Ok((payload, content_type))
    }

    async fn gather_env(&self, input: &ExecutionInput<'_>, plan: &CallPlan) -> Result<EnvMap> {
        // System configuration first, then the user's gram environment, then
        // request-scoped header overrides, overwriting in that order.
        let mut env = self
            .environments
            .load_system_env(
                &input.toolset.project_id,
                &input.toolset.id,
                plan.kind(),
                plan.source(),
            )
            .await?;

        self.merge_user_env(
            &mut env,
            input.auth,
            &input.toolset.project_id,
            input.environment_slug,
            input.env_overrides,
        )
        .await?;

        if let CallBinding::Http(http) = &plan.binding {
            seed_oauth_tokens(&http.security, input.auth.oauth_secrets(), &mut env);
        }

        Ok(env)
    }

    async fn merge_user_env(
        &self,
        env: &mut EnvMap,
        auth: &AuthContext,
        project_id: &crate::domain::ProjectId,
        environment_slug: Option<&str>,
        env_overrides: &EnvMap,
    ) -> Result<()> {
        // Gram environments are an authenticated-only feature.
        if auth.environment_selection_allowed() {
            if let Some(slug) = environment_slug {
                match self.environments.load(project_id, slug).await? {
                    Some(user_env) => env.extend(user_env),
                    None => {
                        return Err(GatewayError::not_found("environment", slug));
                    }
                }
            }
        }

        for (key, value) in env_overrides {
            env.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        plan: &CallPlan,
        arguments: Value,
        env: &EnvMap,
        auth: &AuthContext,
    ) -> Result<ToolCallOutput> {
        match &plan.binding {
            CallBinding::ExternalMcp(binding) => {
                let client = ExternalMcpClient::for_binding(
                    binding,
                    unscoped_token(auth.oauth_secrets()),
                );
                let result = client.call_tool(&binding.remote_name, arguments).await?;
                let status_code = if result.is_error.unwrap_or(false) { 502 } else { 200 };
                let response_body = serde_json::to_string(&result)?;
                Ok(ToolCallOutput {
                    outcome: ProxyOutcome::Shaped(result),
                    status_code,
                    response_body,
                    function_metrics: None,
                })
            }
            binding => {
                let mut capture = ResponseCapture::new();
                match binding {
                    CallBinding::Http(http) => {
                        execute_http(http, &arguments, env, &mut capture).await?
                    }
                    CallBinding::Function(function) => {
                        self.functions
                            .invoke(
                                FunctionInvocation {
                                    function_id: function.function_id.clone(),
                                    runtime: function.runtime.clone(),
                                    arguments,
                                    env: env.clone(),
                                    response_mime_type: function.response_mime_type.clone(),
                                },
                                &mut capture,
                            )
                            .await?
                    }
                    CallBinding::Prompt(template) => {
                        let rendered = template.render(&arguments)?;
                        capture.write(
                            200,
                            content_type_headers("text/plain"),
                            Bytes::from(rendered),
                        )?;
                    }
                    CallBinding::ExternalMcp(_) => unreachable!("handled above"),
                }
                self.shape_captured(plan, capture)
            }
        }
    }

    fn shape_captured(&self, plan: &CallPlan, capture: ResponseCapture) -> Result<ToolCallOutput> {
        if !capture.is_written() {
            return Err(GatewayError::unexpected("backend adapter wrote no response"));
        }
        let content_type = capture.content_type()?.to_string();
        let status_code = capture.status();
        let response_body = String::from_utf8_lossy(capture.body()).into_owned();

        let function_metrics = capture.function_metrics();
        if let Some(metrics) = &function_metrics {
            debug!(
                tool_urn = %plan.descriptor.urn,
                cpu_seconds = ?metrics.cpu_time_seconds,
                memory_mb = ?metrics.memory_mb,
                exec_seconds = ?metrics.execution_time_seconds,
                "Function metrics extracted"
            );
        }

        if plan.is_passthrough() {
            // Raw backend body becomes the RPC result; non-JSON bodies are
            // carried as a JSON string.
            let raw = serde_json::from_slice::<Value>(capture.body())
                .unwrap_or_else(|_| Value::String(response_body.clone()));
            return Ok(ToolCallOutput {
                outcome: ProxyOutcome::Passthrough(raw),
                status_code,
                response_body,
                function_metrics,
            });
        }

        let block = content::classify(&content_type, capture.body())?;
        let result = ToolCallResult {
            content: vec![block],
            is_error: capture.is_error().then_some(true),
        };
        Ok(ToolCallOutput {
            outcome: ProxyOutcome::Shaped(result),
            status_code,
            response_body,
            function_metrics,
        })
    }

    /// Emit the structured log line and the billing event exactly once.
    ///
    /// Usage tracking runs on a spawned task so request cancellation cannot
    /// lose the event.
    #[allow(clippy::too_many_arguments)]
    fn record_call(
        &self,
        toolset: &Toolset,
        plan: &CallPlan,
        status_code: u16,
        duration_ms: u64,
        request_bytes: usize,
        response_bytes: usize,
        function_metrics: Option<crate::storage::FunctionMetrics>,
        failure: Option<&GatewayError>,
    ) {
        match failure {
            None => debug!(
                toolset_id = %toolset.id,
                tool_name = %plan.descriptor.tool_name,
                tool_urn = %plan.descriptor.urn,
                organization_id = %toolset.organization_id,
                project_slug = %toolset.project_slug,
                status_code,
                duration_ms,
                "Tool call completed"
            ),
            Some(err) => error!(
                toolset_id = %toolset.id,
                tool_name = %plan.descriptor.tool_name,
                tool_urn = %plan.descriptor.urn,
                organization_id = %toolset.organization_id,
                project_slug = %toolset.project_slug,
                status_code,
                duration_ms,
                error = %err,
                "Tool call failed"
            ),
        }

        let event = ToolCallUsageEvent {
            organization_id: toolset.organization_id.clone(),
            project_id: toolset.project_id.clone(),
            toolset_id: toolset.id.clone(),
            toolset_slug: toolset.slug.clone(),
            tool_name: plan.descriptor.tool_name.clone(),
            tool_urn: Some(plan.descriptor.urn.clone()),
            kind: plan.kind(),
            status_code,
            duration_ms,
            request_bytes,
            response_bytes,
            function_metrics,
        };

        let billing = Arc::clone(&self.billing);
        tokio::spawn(async move {
            billing.track_tool_call_usage(event).await;
        });
    }
}

/// Execute an HTTP tool against its upstream.
///
/// The base URL comes from the first configured server environment variable.
/// Path template parameters are substituted from the arguments; remaining
/// arguments become query parameters for GET/DELETE and the JSON body
/// otherwise. Configured security schemes are applied as request headers.
async fn execute_http(
    tool: &HttpToolDefinition,
    arguments: &Value,
    env: &EnvMap,
    capture: &mut ResponseCapture,
) -> Result<()> {
    let base_url = tool
        .server_env_variables
        .iter()
        .find_map(|name| env.get(name))
        .map(|secret| secret.expose_secret().trim_end_matches('/').to_string())
        .ok_or_else(|| {
            GatewayError::invalid(format!(
                "no server configuration for tool '{}'; set one of: {}",
                tool.name,
                tool.server_env_variables.join(", ")
            ))
        })?;

    let empty = serde_json::Map::new();
    let args_obj = arguments.as_object().unwrap_or(&empty);

    let mut path = tool.path.clone();
    let mut path_params: Vec<&str> = Vec::new();
    for captures in PATH_PARAM_REGEX.captures_iter(&tool.path) {
        let name = captures.get(1).expect("capture group 1 exists").as_str();
        let value = args_obj.get(name).ok_or_else(|| {
            GatewayError::invalid_field(format!("missing required path parameter: {}", name), name)
        })?;
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => {
                return Err(GatewayError::invalid_field(
                    format!("path parameter '{}' must be a scalar", name),
                    name,
                ));
            }
        };
        path = path.replace(&format!("{{{}}}", name), &rendered);
        path_params.push(name);
    }

    let body: serde_json::Map<String, Value> = args_obj
        .iter()
        .filter(|(key, _)| !path_params.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let url = format!("{}{}", base_url, path);
    let method: reqwest::Method = tool
        .method
        .to_uppercase()
        .parse()
        .map_err(|_| GatewayError::invalid(format!("unsupported HTTP method: {}", tool.method)))?;

    let mut request = HTTP_CLIENT.request(method.clone(), &url);

    for scheme in &tool.security {
        let Some((variable, secret)) =
            scheme.env_variables.iter().find_map(|name| env.get(name).map(|v| (name, v)))
        else {
            continue;
        };
        if variable.ends_with("ACCESS_TOKEN") || scheme.scheme_type != "apiKey" {
            request = request.bearer_auth(secret.expose_secret());
        } else {
            // apiKey schemes send the value under the scheme's declared key.
            request = request.header(scheme.key.as_str(), secret.expose_secret());
        }
    }

    request = if method == reqwest::Method::GET || method == reqwest::Method::DELETE {
        let mut query: Vec<(String, String)> = Vec::new();
        for (key, value) in &body {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            query.push((key.clone(), rendered));
        }
        request.query(&query)
    } else {
        request.json(&Value::Object(body))
    };

    debug!(url = %url, method = %tool.method, "Executing HTTP tool");

    let response = request.send().await.map_err(|e| {
        warn!(url = %url, error = %e, "HTTP tool request failed");
        GatewayError::unexpected(format!("backend request failed: {}", e))
    })?;

    let status = response.status().as_u16();
    let mut headers = response.headers().clone();
    // Backends occasionally omit the content type; default to octet-stream
    // so classification can reject it explicitly.
    headers
        .entry(http::header::CONTENT_TYPE)
        .or_insert_with(|| http::HeaderValue::from_static("application/octet-stream"));
    let bytes = response
        .bytes()
        .await
        .map_err(|e| GatewayError::unexpected(format!("failed to read backend body: {}", e)))?;

    capture.write(status, headers, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::mcp::protocol::ContentBlock;
    use crate::domain::toolset::{AccountTier, ToolSelectionMode};
    use crate::domain::{
        FunctionToolDefinition, OrganizationId, ProjectId, PromptKind, PromptTemplate, ToolDefinition,
        ToolHints, ToolId, ToolUrn, ToolsetId,
    };
    use crate::secrets::SecretString;
    use crate::storage::memory::{InMemoryBillingRepository, InMemoryEnvironmentLoader};
    use chrono::Utc;
    use serde_json::json;

    struct StaticFunctionBackend {
        status: u16,
        content_type: &'static str,
        body: &'static [u8],
    }

    #[async_trait]
    impl FunctionBackend for StaticFunctionBackend {
        async fn invoke(
            &self,
            _invocation: FunctionInvocation,
            capture: &mut ResponseCapture,
        ) -> Result<()> {
            capture.write(
                self.status,
                content_type_headers(self.content_type),
                Bytes::from_static(self.body),
            )
        }
    }

    fn toolset() -> Toolset {
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
            default_environment_slug: None,
            mode: ToolSelectionMode::Static,
            account_tier: AccountTier::Pro,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn function_tool(meta: Option<Value>) -> EffectiveTool {
        let definition = ToolDefinition::Function(FunctionToolDefinition {
            id: ToolId::new(),
            urn: ToolUrn::new(ToolKind::Function, "fns", "summarize"),
            name: "summarize".to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
            function_id: "fn-1".to_string(),
            runtime: "nodejs22".to_string(),
            response_mime_type: None,
            auth_input: None,
            meta,
        });
        EffectiveTool {
            name: "summarize".to_string(),
            description: None,
            tags: vec![],
            confirm: None,
            hints: ToolHints::default(),
            definition,
        }
    }

    fn executor(
        backend: StaticFunctionBackend,
    ) -> (ToolProxyExecutor, Arc<InMemoryBillingRepository>) {
        let billing = Arc::new(InMemoryBillingRepository::new());
        let executor = ToolProxyExecutor::new(
            Arc::new(InMemoryEnvironmentLoader::new()),
            Arc::new(UsageGuard::new(billing.clone(), LimitsConfig::default())),
            billing.clone(),
            Arc::new(backend),
            MetricsRecorder::new(),
        );
        (executor, billing)
    }

    fn input<'a>(toolset: &'a Toolset, tool: &'a EffectiveTool, auth: &'a AuthContext, overrides: &'a EnvMap) -> ExecutionInput<'a> {
        ExecutionInput {
            toolset,
            tool,
            arguments: json!({"text": "hello"}),
            auth,
            environment_slug: None,
            env_overrides: overrides,
            billing: BillingKind::ToolCall,
        }
    }

    #[tokio::test]
    async fn test_function_call_shapes_text_content() {
        let (executor, billing) = executor(StaticFunctionBackend {
            status: 200,
            content_type: "application/json",
            body: b"{\"ok\":true}",
        });
        let ts = toolset();
        let tool = function_tool(None);
        let auth = AuthContext::anonymous();
        let overrides = EnvMap::new();

        let output = executor.execute(input(&ts, &tool, &auth, &overrides)).await.unwrap();
        assert_eq!(output.status_code, 200);

        match output.outcome {
            ProxyOutcome::Shaped(result) => {
                assert_eq!(result.is_error, None);
                assert!(matches!(result.content[0], ContentBlock::Text { .. }));
            }
            ProxyOutcome::Passthrough(_) => panic!("expected shaped output"),
        }

        // Detached billing lands shortly after.
        for _ in 0..50 {
            if !billing.recorded_events().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let events = billing.recorded_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status_code, 200);
        assert_eq!(events[0].kind, ToolKind::Function);
    }

    #[tokio::test]
    async fn test_error_status_shapes_is_error() {
        let (executor, _) = executor(StaticFunctionBackend {
            status: 500,
            content_type: "text/plain",
            body: b"boom",
        });
        let ts = toolset();
        let tool = function_tool(None);
        let auth = AuthContext::anonymous();
        let overrides = EnvMap::new();

        let output = executor.execute(input(&ts, &tool, &auth, &overrides)).await.unwrap();
        assert_eq!(output.status_code, 500);
        match output.outcome {
            ProxyOutcome::Shaped(result) => {
                assert_eq!(result.is_error, Some(true));
                let value = serde_json::to_value(&result.content[0]).unwrap();
                assert_eq!(value["text"], json!("boom"));
                assert_eq!(value["_meta"]["gram-mime-type"], json!("text/plain"));
            }
            ProxyOutcome::Passthrough(_) => panic!("expected shaped output"),
        }
    }

    #[tokio::test]
    async fn test_passthrough_returns_raw_body() {
        let (executor, _) = executor(StaticFunctionBackend {
            status: 200,
            content_type: "application/json",
            body: b"{\"raw\":[1,2,3]}",
        });
        let ts = toolset();
        let tool = function_tool(Some(json!({"gram.ai/kind": "mcp-passthrough"})));
        let auth = AuthContext::anonymous();
        let overrides = EnvMap::new();

        let output = executor.execute(input(&ts, &tool, &auth, &overrides)).await.unwrap();
        match output.outcome {
            ProxyOutcome::Passthrough(raw) => assert_eq!(raw, json!({"raw": [1, 2, 3]})),
            ProxyOutcome::Shaped(_) => panic!("expected passthrough"),
        }
    }

    #[tokio::test]
    async fn test_usage_guard_blocks_before_dispatch() {
        let billing = Arc::new(InMemoryBillingRepository::new());
        let ts = {
            let mut ts = toolset();
            ts.account_tier = AccountTier::Free;
            ts
        };
        billing.set_usage(
            &ts.organization_id,
            crate::storage::PeriodUsage { tool_calls: 4_000, max_tool_calls: 2_000 },
        );

        let executor = ToolProxyExecutor::new(
            Arc::new(InMemoryEnvironmentLoader::new()),
            Arc::new(UsageGuard::new(billing.clone(), LimitsConfig::default())),
            billing,
            Arc::new(StaticFunctionBackend {
                status: 200,
                content_type: "application/json",
                body: b"{}",
            }),
            MetricsRecorder::new(),
        );

        let tool = function_tool(None);
        let auth = AuthContext::anonymous();
        let overrides = EnvMap::new();

        let err = executor.execute(input(&ts, &tool, &auth, &overrides)).await.unwrap_err();
        assert_eq!(err.user_message(), "tool usage limit reached");
    }

    #[tokio::test]
    async fn test_unknown_environment_slug_is_not_found() {
        let (executor, _) = executor(StaticFunctionBackend {
            status: 200,
            content_type: "application/json",
            body: b"{}",
        });
        let ts = toolset();
        let tool = function_tool(None);
        let auth = AuthContext {
            kind: crate::auth::AuthKind::ApiKey { scope: "consumer".to_string() },
            organization_id: Some(ts.organization_id.clone()),
            user_id: None,
        };
        let overrides = EnvMap::new();

        let mut call = input(&ts, &tool, &auth, &overrides);
        call.environment_slug = Some("missing");
        let err = executor.execute(call).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_anonymous_callers_cannot_select_environments() {
        // The same missing slug is silently ignored for anonymous callers:
        // gram environments are an authenticated-only feature.
        let (executor, _) = executor(StaticFunctionBackend {
            status: 200,
            content_type: "application/json",
            body: b"{}",
        });
        let ts = toolset();
        let tool = function_tool(None);
        let auth = AuthContext::anonymous();
        let overrides = EnvMap::new();

        let mut call = input(&ts, &tool, &auth, &overrides);
        call.environment_slug = Some("missing");
        assert!(executor.execute(call).await.is_ok());
    }

    #[tokio::test]
    async fn test_prompt_tool_renders_template() {
        let billing = Arc::new(InMemoryBillingRepository::new());
        let executor = ToolProxyExecutor::new(
            Arc::new(InMemoryEnvironmentLoader::new()),
            Arc::new(UsageGuard::new(billing.clone(), LimitsConfig::default())),
            billing,
            Arc::new(StaticFunctionBackend {
                status: 200,
                content_type: "application/json",
                body: b"{}",
            }),
            MetricsRecorder::new(),
        );

        let template = PromptTemplate::new(
            "greet",
            "Hello {{name}}!",
            PromptKind::HigherOrderTool,
            json!({"type": "object", "properties": {"name": {"type": "string"}}}),
        );
        let tool = EffectiveTool {
            name: "greet".to_string(),
            description: None,
            tags: vec![],
            confirm: None,
            hints: ToolHints::default(),
            definition: ToolDefinition::Prompt(template),
        };
        let ts = toolset();
        let auth = AuthContext::anonymous();
        let overrides = EnvMap::new();

        let mut call = input(&ts, &tool, &auth, &overrides);
        call.arguments = json!({"name": "Ada"});
        let output = executor.execute(call).await.unwrap();
        assert_eq!(output.response_body, "Hello Ada!");
        match output.outcome {
            ProxyOutcome::Shaped(result) => {
                let value = serde_json::to_value(&result.content[0]).unwrap();
                assert_eq!(value["text"], json!("Hello Ada!"));
            }
            ProxyOutcome::Passthrough(_) => panic!("expected shaped output"),
        }
    }

    #[tokio::test]
    async fn test_header_overrides_win_over_environment() {
        let environments = Arc::new(InMemoryEnvironmentLoader::new());
        let ts = toolset();
        let mut gram_env = EnvMap::new();
        gram_env.insert("api_key".to_string(), SecretString::new("from-env"));
        environments.set_environment(&ts.project_id, "production", gram_env);

        let billing = Arc::new(InMemoryBillingRepository::new());
        let executor = ToolProxyExecutor::new(
            environments,
            Arc::new(UsageGuard::new(billing.clone(), LimitsConfig::default())),
            billing,
            Arc::new(StaticFunctionBackend {
                status: 200,
                content_type: "application/json",
                body: b"{}",
            }),
            MetricsRecorder::new(),
        );

        let auth = AuthContext {
            kind: crate::auth::AuthKind::ApiKey { scope: "consumer".to_string() },
            organization_id: Some(ts.organization_id.clone()),
            user_id: None,
        };
        let mut overrides = EnvMap::new();
        overrides.insert("api_key".to_string(), SecretString::new("from-header"));

        let mut merged = EnvMap::new();
        executor
            .merge_user_env(&mut merged, &auth, &ts.project_id, Some("production"), &overrides)
            .await
            .unwrap();
        assert_eq!(merged["api_key"].expose_secret(), "from-header");
    }
}
