//! External MCP proxy client.
//!
//! Forwards a single tool call to a remote MCP server over streamable HTTP
//! or SSE. The client issues `initialize` followed by the actual request and
//! forwards the remote `content` array verbatim, propagating `isError`.
//! Remote tool listings come back with names prefixed `<slug>--` and
//! annotations preserved, explicit `false` hints included.

use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domain::{ExternalMcpToolDefinition, ExternalMcpTransport};
use crate::errors::{GatewayError, Result};
use crate::mcp::protocol::{
    JsonRpcRequest, JsonRpcResponse, RequestId, Tool, ToolCallResult, PROTOCOL_VERSION,
};
use crate::proxy::planner::ExternalMcpBinding;
use crate::secrets::SecretString;

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Client bound to one remote MCP server.
pub struct ExternalMcpClient {
    server_url: String,
    transport: ExternalMcpTransport,
    bearer: Option<SecretString>,
}

impl ExternalMcpClient {
    pub fn new(
        server_url: impl Into<String>,
        transport: ExternalMcpTransport,
        bearer: Option<SecretString>,
    ) -> Self {
        Self { server_url: server_url.into(), transport, bearer }
    }

    /// Build a client for a planned external call. The bearer token is
    /// attached only when the remote server requires OAuth.
    pub fn for_binding(binding: &ExternalMcpBinding, token: Option<&SecretString>) -> Self {
        let bearer = if binding.definition.oauth_required { token.cloned() } else { None };
        Self::new(
            binding.definition.server_url.clone(),
            binding.definition.transport,
            bearer,
        )
    }

    /// Forward one tool call with the remote (unprefixed) name.
    pub async fn call_tool(&self, remote_name: &str, arguments: Value) -> Result<ToolCallResult> {
        self.initialize().await?;

        let response = self
            .rpc(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: Some(RequestId::Number(2)),
                method: "tools/call".to_string(),
                params: json!({"name": remote_name, "arguments": arguments}),
            })
            .await?;

        let result = rpc_result(response)?;
        serde_json::from_value(result)
            .map_err(|e| GatewayError::unexpected(format!("malformed remote tool result: {}", e)))
    }

    /// List the remote server's tools, prefixed for the local toolset.
    pub async fn list_tools(&self, server_slug: &str) -> Result<Vec<Tool>> {
        self.initialize().await?;

        let response = self
            .rpc(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: Some(RequestId::Number(2)),
                method: "tools/list".to_string(),
                params: json!({}),
            })
            .await?;

        let result = rpc_result(response)?;
        let tools = result
            .get("tools")
            .and_then(|t| t.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(tools
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<Tool>(raw) {
                Ok(mut tool) => {
                    tool.name =
                        ExternalMcpToolDefinition::prefixed_name(server_slug, &tool.name);
                    Some(tool)
                }
                Err(e) => {
                    warn!(server_slug, error = %e, "Skipping malformed remote tool");
                    None
                }
            })
            .collect())
    }

    async fn initialize(&self) -> Result<()> {
        let response = self
            .rpc(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: Some(RequestId::Number(1)),
                method: "initialize".to_string(),
                params: json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "gramgate", "version": crate::VERSION}
                }),
            })
            .await?;

        rpc_result(response).map(|_| ())
    }

    async fn rpc(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let expected_id = request.id.clone();

        let mut builder = HTTP_CLIENT
            .post(&self.server_url)
            .header("Accept", "application/json, text/event-stream")
            .json(&request);
        if let Some(bearer) = &self.bearer {
            builder = builder.bearer_auth(bearer.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            warn!(server_url = %self.server_url, error = %e, "External MCP request failed");
            GatewayError::unexpected(format!("external MCP server unreachable: {}", e))
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await.map_err(|e| {
            GatewayError::unexpected(format!("failed to read external MCP response: {}", e))
        })?;

        if !status.is_success() {
            return Err(GatewayError::unexpected(format!(
                "external MCP server returned status {}",
                status.as_u16()
            )));
        }

        debug!(
            server_url = %self.server_url,
            transport = %self.transport.as_str(),
            content_type = %content_type,
            "External MCP response received"
        );

        if content_type.starts_with("text/event-stream") {
            parse_sse_response(&body, expected_id.as_ref())
        } else {
            serde_json::from_str(&body).map_err(|e| {
                GatewayError::unexpected(format!("malformed external MCP response: {}", e))
            })
        }
    }
}

/// Pull the matching JSON-RPC response out of an SSE body.
///
/// Each event's `data:` lines are concatenated and parsed; the first
/// response whose id matches wins. Non-response events (notifications,
/// keep-alives) are skipped.
fn parse_sse_response(body: &str, expected_id: Option<&RequestId>) -> Result<JsonRpcResponse> {
    let mut data = String::new();
    let mut candidates: Vec<JsonRpcResponse> = Vec::new();

    let flush = |data: &mut String, candidates: &mut Vec<JsonRpcResponse>| {
        if data.is_empty() {
            return;
        }
        if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(data) {
            if response.result.is_some() || response.error.is_some() {
                candidates.push(response);
            }
        }
        data.clear();
    };

    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        } else if line.is_empty() {
            flush(&mut data, &mut candidates);
        }
    }
    flush(&mut data, &mut candidates);

    candidates
        .iter()
        .position(|r| expected_id.is_none() || r.id.as_ref() == expected_id)
        .or(if candidates.is_empty() { None } else { Some(0) })
        .map(|i| candidates.swap_remove(i))
        .ok_or_else(|| GatewayError::unexpected("external MCP SSE stream carried no response"))
}

fn rpc_result(response: JsonRpcResponse) -> Result<Value> {
    if let Some(error) = response.error {
        return Err(GatewayError::unexpected(format!(
            "external MCP server error {}: {}",
            error.code, error.message
        )));
    }
    response
        .result
        .ok_or_else(|| GatewayError::unexpected("external MCP response carried no result"))
}
