//! Prompt template domain types.
//!
//! A prompt template is a named, parameterized string with a JSON-schema
//! argument contract. Templates of kind `prompt` surface under
//! `prompts/list`; higher-order templates surface under `tools/list` and are
//! callable like any other tool.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::domain::id::ToolId;
use crate::domain::tool::{ToolKind, ToolUrn};
use crate::errors::{GatewayError, Result};

/// Exposure surface for a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Listed under `prompts/list`, fetched via `prompts/get`
    Prompt,
    /// Listed under `tools/list`, invoked via `tools/call`
    HigherOrderTool,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::HigherOrderTool => "higher_order_tool",
        }
    }
}

impl FromStr for PromptKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(Self::Prompt),
            "higher_order_tool" => Ok(Self::HigherOrderTool),
            other => Err(format!("unknown prompt kind: {}", other)),
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, parameterized prompt.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    pub id: ToolId,
    pub urn: ToolUrn,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Template body with `{{name}}` placeholders
    pub template: String,
    /// Rendering engine identifier (only `mustache`-style substitution is
    /// rendered in-process)
    pub engine: String,
    pub kind: PromptKind,
    /// JSON schema for the template arguments
    pub arguments_schema: serde_json::Value,
}

/// Flattened prompt argument record derived from the arguments schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PromptArgument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
}

impl PromptTemplate {
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        kind: PromptKind,
        arguments_schema: serde_json::Value,
    ) -> Self {
        let name = name.into();
        Self {
            id: ToolId::new(),
            urn: ToolUrn::new(ToolKind::Prompt, "templates", name.clone()),
            name,
            description: None,
            template: template.into(),
            engine: "mustache".to_string(),
            kind,
            arguments_schema,
        }
    }

    /// Parse the arguments schema into `{name, description, required}` records.
    ///
    /// Only root-level `properties` are considered; a property is required
    /// when it appears in the root `required` array.
    pub fn arguments(&self) -> Vec<PromptArgument> {
        let required: Vec<&str> = self
            .arguments_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        self.arguments_schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| {
                props
                    .iter()
                    .map(|(name, schema)| PromptArgument {
                        name: name.clone(),
                        description: schema
                            .get("description")
                            .and_then(|d| d.as_str())
                            .map(|d| d.to_string()),
                        required: required.contains(&name.as_str()),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Render the template with the supplied arguments.
    ///
    /// Missing required arguments are an error; extraneous arguments are
    /// ignored. Values render via their JSON string form (strings unquoted).
    pub fn render(&self, arguments: &serde_json::Value) -> Result<String> {
        let args = match arguments {
            serde_json::Value::Null => serde_json::Map::new(),
            serde_json::Value::Object(map) => map.clone(),
            _ => {
                return Err(GatewayError::invalid("prompt arguments must be an object"));
            }
        };

        for arg in self.arguments() {
            if arg.required && !args.contains_key(&arg.name) {
                return Err(GatewayError::invalid_field(
                    format!("missing required prompt argument: {}", arg.name),
                    arg.name,
                ));
            }
        }

        let mut rendered = self.template.clone();
        for (name, value) in &args {
            let replacement = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&format!("{{{{{}}}}}", name), &replacement);
        }

        Ok(rendered)
    }
}
