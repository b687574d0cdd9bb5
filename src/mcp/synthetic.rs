//! Synthetic tool surfaces for large toolsets.
//!
//! Progressive mode replaces `tools/list` with a structural surface
//! (`list_tools` over hierarchical paths, `describe_tools`, `execute_tool`);
//! dynamic mode replaces it with a semantic surface (`search_tools`,
//! `describe_tools`, `execute_tool`). `execute_tool` invocations are parsed
//! here and reissued by the dispatcher as if the client had called the named
//! tool directly.

use serde_json::{json, Map, Value};

use crate::errors::{GatewayError, Result};
use crate::mcp::protocol::Tool;
use crate::services::snapshot::EffectiveTool;
use crate::storage::TagMatchMode;

/// Tool-count threshold above which progressive mode adds `list_tools`.
pub const PROGRESSIVE_LIST_THRESHOLD: usize = 50;

pub const LIST_TOOLS: &str = "list_tools";
pub const DESCRIBE_TOOLS: &str = "describe_tools";
pub const EXECUTE_TOOL: &str = "execute_tool";
pub const SEARCH_TOOLS: &str = "search_tools";

/// Whether a tool name belongs to the synthetic surface.
pub fn is_synthetic(name: &str) -> bool {
    matches!(name, LIST_TOOLS | DESCRIBE_TOOLS | EXECUTE_TOOL | SEARCH_TOOLS)
}

/// Hierarchical path for one tool: `/<source>/<kind>/<name>`.
pub fn tool_path(tool: &EffectiveTool) -> String {
    let urn = tool.definition.urn();
    format!("/{}/{}/{}", urn.source(), urn.kind(), tool.name)
}

/// Filter tools by hierarchical path prefixes. An empty filter matches all.
pub fn filter_by_paths<'a>(
    tools: &'a [EffectiveTool],
    paths: &[String],
) -> Vec<&'a EffectiveTool> {
    if paths.is_empty() {
        return tools.iter().collect();
    }
    tools
        .iter()
        .filter(|tool| {
            let path = tool_path(tool);
            paths.iter().any(|prefix| path.starts_with(prefix.trim_end_matches('/')))
        })
        .collect()
}

/// Full definition payload for `describe_tools`.
pub fn describe_tools(tools: &[EffectiveTool], names: &[String]) -> Value {
    let described: Vec<Value> = tools
        .iter()
        .filter(|tool| names.contains(&tool.name))
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.definition.input_schema(),
                "path": tool_path(tool),
                "tags": tool.tags,
            })
        })
        .collect();
    json!({"tools": described})
}

/// The progressive-mode tool surface.
pub fn progressive_tools(tools: &[EffectiveTool]) -> Vec<Tool> {
    let mut surface = Vec::new();

    if tools.len() > PROGRESSIVE_LIST_THRESHOLD {
        let groups = path_groups(tools);
        surface.push(Tool::new(
            LIST_TOOLS,
            format!(
                "List available tools filtered by hierarchical path prefixes. \
Paths take the form /source/group/tool; available groups include: {}.",
                examples(&groups, 5)
            ),
            json!({
                "type": "object",
                "properties": {
                    "paths": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Path prefixes to filter by; empty lists everything."
                    }
                }
            }),
        ));
        surface.push(describe_tool_definition(&format!(
            "Return the full definitions of named tools. Tool groups include: {}.",
            examples(&groups, 5)
        )));
    } else {
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        surface.push(describe_tool_definition(&format!(
            "Return the full definitions of named tools. Available tools: {}.",
            names.join(", ")
        )));
    }

    surface.push(execute_tool_definition(tools));
    surface
}

/// The dynamic-mode tool surface.
pub fn dynamic_tools(tools: &[EffectiveTool]) -> Vec<Tool> {
    vec![
        Tool::new(
            SEARCH_TOOLS,
            "Search the toolset's tools by semantic similarity. Returns the \
best-matching tools with a similarity score; follow up with describe_tools \
and execute_tool.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Natural-language description of the task."},
                    "tags": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Restrict results to tools carrying these tags."
                    },
                    "match_mode": {
                        "type": "string",
                        "enum": ["any", "all"],
                        "description": "Whether a tool must carry any or all of the tags."
                    },
                    "num_results": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 20,
                        "description": "How many tools to return."
                    }
                },
                "required": ["query"]
            }),
        ),
        describe_tool_definition(
            "Return the full definitions of named tools found via search_tools.",
        ),
        execute_tool_definition(tools),
    ]
}

fn describe_tool_definition(description: &str) -> Tool {
    Tool::new(
        DESCRIBE_TOOLS,
        description,
        json!({
            "type": "object",
            "properties": {
                "names": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Tool names to describe."
                }
            },
            "required": ["names"]
        }),
    )
}

fn execute_tool_definition(tools: &[EffectiveTool]) -> Tool {
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).take(5).collect();
    Tool::new(
        EXECUTE_TOOL,
        format!(
            "Execute a tool by name with a JSON payload, e.g. {}. Use \
describe_tools first to learn the tool's input schema.",
            examples(&names, 5)
        ),
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Name of the tool to execute."},
                "arguments": {
                    "description": "Tool arguments, as an object or a JSON-encoded string."
                }
            },
            "required": ["name"]
        }),
    )
}

fn path_groups(tools: &[EffectiveTool]) -> Vec<String> {
    let mut groups: Vec<String> = tools
        .iter()
        .map(|tool| {
            let urn = tool.definition.urn();
            format!("/{}/{}", urn.source(), urn.kind())
        })
        .collect();
    groups.sort();
    groups.dedup();
    groups
}

fn examples<S: AsRef<str>>(items: &[S], limit: usize) -> String {
    let shown: Vec<&str> = items.iter().take(limit).map(|s| s.as_ref()).collect();
    if items.len() > limit {
        format!("{}, ...", shown.join(", "))
    } else {
        shown.join(", ")
    }
}

/// Parsed `search_tools` arguments.
#[derive(Debug, Clone)]
pub struct SearchToolsParams {
    pub query: String,
    pub tags: Vec<String>,
    pub match_mode: TagMatchMode,
    pub num_results: usize,
}

/// Parse `search_tools` arguments, defaulting `match_mode` to `any` and
/// `num_results` to 5.
pub fn parse_search_tools(arguments: &Value) -> Result<SearchToolsParams> {
    let obj = arguments
        .as_object()
        .ok_or_else(|| GatewayError::invalid("search_tools arguments must be an object"))?;

    let query = obj
        .get("query")
        .and_then(|q| q.as_str())
        .ok_or_else(|| GatewayError::invalid_field("query is required", "query"))?
        .to_string();

    let tags = obj
        .get("tags")
        .and_then(|t| t.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
        .unwrap_or_default();

    let match_mode = match obj.get("match_mode").and_then(|m| m.as_str()) {
        None | Some("any") => TagMatchMode::Any,
        Some("all") => TagMatchMode::All,
        Some(other) => {
            return Err(GatewayError::invalid_field(
                format!("match_mode must be 'any' or 'all', got '{}'", other),
                "match_mode",
            ));
        }
    };

    let num_results = match obj.get("num_results") {
        None => 5,
        Some(value) => value
            .as_u64()
            .ok_or_else(|| GatewayError::invalid_field("num_results must be an integer", "num_results"))?
            as usize,
    };

    Ok(SearchToolsParams { query, tags, match_mode, num_results })
}

/// Parse `list_tools` arguments into path prefixes.
pub fn parse_list_tools(arguments: &Value) -> Vec<String> {
    arguments
        .get("paths")
        .and_then(|p| p.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
        .unwrap_or_default()
}

/// Parse `describe_tools` arguments into tool names.
pub fn parse_describe_tools(arguments: &Value) -> Result<Vec<String>> {
    arguments
        .get("names")
        .and_then(|n| n.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
        .ok_or_else(|| GatewayError::invalid_field("names is required", "names"))
}

/// Parse an `execute_tool` invocation into the target name and arguments.
///
/// The payload is `{name, arguments}` where `arguments` may be an object or
/// a JSON-encoded string wrapping one. The whole payload may itself arrive
/// as a JSON string. Whatever the wrapping, the inner arguments must decode
/// to valid JSON.
pub fn parse_execute_tool(arguments: &Value) -> Result<(String, Value)> {
    let unwrapped: Value = match arguments {
        Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
            GatewayError::invalid(format!("execute_tool payload is not valid JSON: {}", e))
        })?,
        other => other.clone(),
    };

    let obj = unwrapped
        .as_object()
        .ok_or_else(|| GatewayError::invalid("execute_tool payload must be an object"))?;

    let name = obj
        .get("name")
        .and_then(|n| n.as_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| GatewayError::invalid_field("name is required", "name"))?
        .to_string();

    let inner = match obj.get("arguments") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::String(raw)) => serde_json::from_str(raw).map_err(|e| {
            GatewayError::invalid(format!("execute_tool arguments are not valid JSON: {}", e))
        })?,
        Some(other) => other.clone(),
    };

    Ok((name, inner))
}
