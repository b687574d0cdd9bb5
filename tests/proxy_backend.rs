//! Proxy execution against a real HTTP backend.
//!
//! Exercises the HTTP adapter with a wiremock upstream: path templates,
//! query and body mapping, security headers, content classification and the
//! passthrough path.

mod common;

use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{content, gateway, http_tool, passthrough_function_tool, rpc, toolset};
use gramgate::domain::toolset::ToolSelectionMode;
use gramgate::domain::{EnvMap, ToolKind};
use gramgate::secrets::SecretString;

async fn http_gateway(
    tools: Vec<gramgate::domain::ToolDefinition>,
) -> (common::TestGateway, MockServer) {
    let backend = MockServer::start().await;

    let gw = gateway();
    let ts = toolset("acme-billing", ToolSelectionMode::Static);

    let mut env = EnvMap::new();
    env.insert("BILLING_SERVER_URL".to_string(), SecretString::new(backend.uri()));
    env.insert("BILLING_API_KEY".to_string(), SecretString::new("sk-test-123"));
    gw.environments.set_system_env(&ts.project_id, &ts.id, ToolKind::Http, "billing", env);

    gw.toolsets.insert(ts, content(tools));
    (gw, backend)
}

#[tokio::test]
async fn test_post_tool_sends_json_body_and_security_header() {
    let (gw, backend) =
        http_gateway(vec![http_tool("create_invoice", "POST", "/invoices")]).await;

    Mock::given(method("POST"))
        .and(path("/invoices"))
        .and(header("api_key", "sk-test-123"))
        .and(body_json(json!({"amount": 100})))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("content-type", "application/json")
                .set_body_string("{\"id\":\"inv-1\"}"),
        )
        .expect(1)
        .mount(&backend)
        .await;

    let response = gw
        .server
        .post("/mcp/acme-billing")
        .json(&rpc(1, "tools/call", json!({"name": "create_invoice", "arguments": {"amount": 100}})))
        .await;

    let body: Value = response.json();
    let chunk = &body["result"]["content"][0];
    assert_eq!(chunk["type"], json!("text"));
    assert_eq!(chunk["text"], json!("{\"id\":\"inv-1\"}"));
    assert_eq!(chunk["_meta"]["gram-mime-type"], json!("application/json"));
    assert!(body["result"].get("isError").is_none());
}

#[tokio::test]
async fn test_get_tool_substitutes_path_params_and_queries() {
    let (gw, backend) =
        http_gateway(vec![http_tool("get_invoice", "GET", "/invoices/{id}")]).await;

    Mock::given(method("GET"))
        .and(path("/invoices/inv-7"))
        .and(query_param("expand", "lines"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string("{\"id\":\"inv-7\"}"),
        )
        .expect(1)
        .mount(&backend)
        .await;

    let response = gw
        .server
        .post("/mcp/acme-billing")
        .json(&rpc(
            1,
            "tools/call",
            json!({"name": "get_invoice", "arguments": {"id": "inv-7", "expand": "lines"}}),
        ))
        .await;

    let body: Value = response.json();
    assert!(body.get("error").is_none(), "unexpected error: {}", body);
    assert_eq!(body["result"]["content"][0]["text"], json!("{\"id\":\"inv-7\"}"));
}

#[tokio::test]
async fn test_missing_path_param_is_invalid_params() {
    let (gw, _backend) =
        http_gateway(vec![http_tool("get_invoice", "GET", "/invoices/{id}")]).await;

    let response = gw
        .server
        .post("/mcp/acme-billing")
        .json(&rpc(1, "tools/call", json!({"name": "get_invoice", "arguments": {}})))
        .await;

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], json!(-32602));
    assert!(body["error"]["message"].as_str().unwrap().contains("id"));
}

#[tokio::test]
async fn test_backend_500_shapes_is_error_with_body() {
    let (gw, backend) = http_gateway(vec![http_tool("boom", "GET", "/boom")]).await;

    Mock::given(method("GET"))
        .and(path("/boom"))
        .respond_with(
            ResponseTemplate::new(500)
                .insert_header("content-type", "text/plain")
                .set_body_string("boom"),
        )
        .mount(&backend)
        .await;

    let response = gw
        .server
        .post("/mcp/acme-billing")
        .json(&rpc(1, "tools/call", json!({"name": "boom", "arguments": {}})))
        .await;

    let body: Value = response.json();
    assert_eq!(body["result"]["isError"], json!(true));
    let chunk = &body["result"]["content"][0];
    assert_eq!(chunk["type"], json!("text"));
    assert_eq!(chunk["text"], json!("boom"));
    assert_eq!(chunk["_meta"]["gram-mime-type"], json!("text/plain"));
}

#[tokio::test]
async fn test_image_body_is_base64_image_chunk() {
    let (gw, backend) = http_gateway(vec![http_tool("logo", "GET", "/logo")]).await;

    let png = [0x89u8, 0x50, 0x4e, 0x47];
    Mock::given(method("GET"))
        .and(path("/logo"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png.to_vec()),
        )
        .mount(&backend)
        .await;

    let response = gw
        .server
        .post("/mcp/acme-billing")
        .json(&rpc(1, "tools/call", json!({"name": "logo", "arguments": {}})))
        .await;

    let body: Value = response.json();
    let chunk = &body["result"]["content"][0];
    assert_eq!(chunk["type"], json!("image"));
    assert_eq!(chunk["mimeType"], json!("image/png"));
    assert_eq!(chunk["data"], json!("iVBORw=="));
}

#[tokio::test]
async fn test_structured_suffix_is_text() {
    let (gw, backend) = http_gateway(vec![http_tool("api", "GET", "/api")]).await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/vnd.api+json")
                .set_body_string("{\"data\":[]}"),
        )
        .mount(&backend)
        .await;

    let response = gw
        .server
        .post("/mcp/acme-billing")
        .json(&rpc(1, "tools/call", json!({"name": "api", "arguments": {}})))
        .await;

    let body: Value = response.json();
    assert_eq!(body["result"]["content"][0]["type"], json!("text"));
    assert_eq!(
        body["result"]["content"][0]["_meta"]["gram-mime-type"],
        json!("application/vnd.api+json")
    );
}

#[tokio::test]
async fn test_unsupported_content_type_is_rpc_error() {
    let (gw, backend) = http_gateway(vec![http_tool("pdf", "GET", "/pdf")]).await;

    Mock::given(method("GET"))
        .and(path("/pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_string("%PDF-1.7"),
        )
        .mount(&backend)
        .await;

    let response = gw
        .server
        .post("/mcp/acme-billing")
        .json(&rpc(1, "tools/call", json!({"name": "pdf", "arguments": {}})))
        .await;

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], json!(-32600));
    assert!(body["error"]["message"].as_str().unwrap().contains("application/pdf"));
}

#[tokio::test]
async fn test_passthrough_tool_returns_raw_result() {
    let gw = gateway();
    let ts = toolset("raw", ToolSelectionMode::Static);
    gw.functions.add_response("fn-raw", 200, "application/json", "{\"rows\":[1,2,3]}");
    gw.toolsets.insert(ts, content(vec![passthrough_function_tool("export", "fn-raw")]));

    let response = gw
        .server
        .post("/mcp/raw")
        .json(&rpc(1, "tools/call", json!({"name": "export", "arguments": {}})))
        .await;

    let body: Value = response.json();
    // No MCP content wrapper: the backend body is the result.
    assert_eq!(body["result"], json!({"rows": [1, 2, 3]}));
    assert!(body["result"].get("content").is_none());
}

#[tokio::test]
async fn test_mcp_header_overrides_reach_the_backend_config() {
    // No system env at all: the server URL arrives solely through the
    // Mcp-Billing-Server-Url header override. Header overrides are renamed
    // to lower snake case, so the tool must reference that form.
    let backend = MockServer::start().await;
    let gw = gateway();
    let ts = toolset("override", ToolSelectionMode::Static);

    let tool = match http_tool("ping_backend", "GET", "/ping") {
        gramgate::domain::ToolDefinition::Http(mut tool) => {
            tool.server_env_variables = vec!["billing_server_url".to_string()];
            tool.security = vec![];
            gramgate::domain::ToolDefinition::Http(tool)
        }
        _ => unreachable!(),
    };
    gw.toolsets.insert(ts, content(vec![tool]));

    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("pong"),
        )
        .expect(1)
        .mount(&backend)
        .await;

    let response = gw
        .server
        .post("/mcp/override")
        .add_header("mcp-billing-server-url", backend.uri())
        .json(&rpc(1, "tools/call", json!({"name": "ping_backend", "arguments": {}})))
        .await;

    let body: Value = response.json();
    assert_eq!(body["result"]["content"][0]["text"], json!("pong"));
}

#[tokio::test]
async fn test_external_mcp_tool_forwards_remote_content() {
    use gramgate::domain::{
        ExternalMcpToolDefinition, ExternalMcpTransport, ToolDefinition, ToolId, ToolUrn,
    };
    use wiremock::matchers::body_partial_json;

    let remote = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "serverInfo": {"name": "weather-mcp", "version": "1.0.0"}
            }
        })))
        .mount(&remote)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(
            json!({"method": "tools/call", "params": {"name": "get_weather"}}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {
                "content": [{
                    "type": "text",
                    "text": "The weather in San Francisco is sunny and 72°F"
                }],
                "isError": false
            }
        })))
        .expect(1)
        .mount(&remote)
        .await;

    let gw = gateway();
    let ts = toolset("acme-weather", ToolSelectionMode::Static);
    let tool = ToolDefinition::ExternalMcp(ExternalMcpToolDefinition {
        id: ToolId::new(),
        urn: ToolUrn::new(ToolKind::ExternalMcp, "weather", "get_weather"),
        name: "weather--get_weather".to_string(),
        description: Some("Current weather for a city".to_string()),
        input_schema: json!({"type": "object", "properties": {"location": {"type": "string"}}}),
        server_slug: "weather".to_string(),
        remote_name: "get_weather".to_string(),
        server_url: remote.uri(),
        transport: ExternalMcpTransport::StreamableHttp,
        oauth_required: false,
        annotations: None,
    });
    gw.toolsets.insert(ts, content(vec![tool]));

    let response = gw
        .server
        .post("/mcp/acme-weather")
        .json(&rpc(
            1,
            "tools/call",
            json!({"name": "weather--get_weather", "arguments": {"location": "San Francisco"}}),
        ))
        .await;

    let body: Value = response.json();
    let chunk = &body["result"]["content"][0];
    assert_eq!(chunk["type"], json!("text"));
    assert_eq!(chunk["text"], json!("The weather in San Francisco is sunny and 72°F"));
    // The gateway injects the session id even on proxied content.
    assert!(chunk["_meta"]["x-gram-session"].is_string());
}

#[tokio::test]
async fn test_usage_events_record_once_per_call() {
    let (gw, backend) = http_gateway(vec![http_tool("ok", "GET", "/ok")]).await;

    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string("{}"),
        )
        .mount(&backend)
        .await;

    let response = gw
        .server
        .post("/mcp/acme-billing")
        .json(&rpc(1, "tools/call", json!({"name": "ok", "arguments": {}})))
        .await;
    response.assert_status_ok();

    // Billing runs detached; give it a moment.
    let mut events = gw.billing.recorded_events();
    for _ in 0..50 {
        if !events.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        events = gw.billing.recorded_events();
    }

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tool_name, "ok");
    assert_eq!(events[0].status_code, 200);
    assert_eq!(events[0].kind, ToolKind::Http);
}
