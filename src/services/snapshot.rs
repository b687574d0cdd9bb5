//! Toolset snapshot projection.
//!
//! A snapshot is the deterministic materialization of a toolset's effective
//! contents at one version: tools with variation overrides applied,
//! higher-order prompts folded into the tool list, prompt templates,
//! resources, and the union of security/environment variable names. Two
//! projections of the same content are identical.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::warn;

use crate::domain::{
    ConfirmMode, FunctionResource, PromptKind, PromptTemplate, ToolDefinition, ToolHints,
    ToolUrn, ToolVariation, Toolset,
};
use crate::storage::ToolsetContent;

/// One tool as exposed to clients, after variation overrides.
#[derive(Debug, Clone)]
pub struct EffectiveTool {
    pub definition: ToolDefinition,
    /// Exposed name (variation rename applied)
    pub name: String,
    /// Exposed description (variation replacement applied)
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub confirm: Option<ConfirmMode>,
    pub hints: ToolHints,
}

impl EffectiveTool {
    /// Canonical name before any variation rename, for audit.
    pub fn canonical_name(&self) -> &str {
        self.definition.name()
    }
}

/// Materialized toolset contents at a fixed version.
#[derive(Debug, Clone)]
pub struct ToolsetSnapshot {
    pub toolset: Toolset,
    pub tools: Vec<EffectiveTool>,
    /// Templates of kind `prompt` (higher-order templates are in `tools`)
    pub prompts: Vec<PromptTemplate>,
    pub resources: Vec<FunctionResource>,
    /// Union of environment variable names backing security schemes
    pub security_variables: Vec<String>,
    /// Union of every environment variable name the toolset references
    pub env_variables: Vec<String>,
}

impl ToolsetSnapshot {
    pub fn version(&self) -> i64 {
        self.toolset.version
    }

    pub fn find_tool(&self, name: &str) -> Option<&EffectiveTool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn find_prompt(&self, name: &str) -> Option<&PromptTemplate> {
        self.prompts.iter().find(|p| p.name == name)
    }

    pub fn find_resource(&self, uri: &str) -> Option<&FunctionResource> {
        self.resources.iter().find(|r| r.uri == uri)
    }
}

/// Project raw toolset contents into a snapshot.
pub fn project_snapshot(toolset: Toolset, content: ToolsetContent) -> Arc<ToolsetSnapshot> {
    let variations: HashMap<ToolUrn, &ToolVariation> =
        content.variations.iter().map(|v| (v.source_tool_urn.clone(), v)).collect();

    let mut security_variables = BTreeSet::new();
    let mut env_variables = BTreeSet::new();

    for tool in &content.tools {
        match tool {
            ToolDefinition::Http(http) => {
                for scheme in &http.security {
                    for variable in &scheme.env_variables {
                        security_variables.insert(variable.clone());
                        env_variables.insert(variable.clone());
                    }
                }
                for variable in &http.server_env_variables {
                    env_variables.insert(variable.clone());
                }
            }
            ToolDefinition::Function(function) => {
                if let Some(auth) = &function.auth_input {
                    for variable in &auth.env_variables {
                        security_variables.insert(variable.clone());
                        env_variables.insert(variable.clone());
                    }
                }
            }
            ToolDefinition::Prompt(_) | ToolDefinition::ExternalMcp(_) => {}
        }
    }

    let mut tools: Vec<EffectiveTool> = Vec::new();
    let mut seen_names: BTreeSet<String> = BTreeSet::new();

    let higher_order = content
        .prompts
        .iter()
        .filter(|p| p.kind == PromptKind::HigherOrderTool)
        .cloned()
        .map(ToolDefinition::Prompt);

    for definition in content.tools.iter().cloned().chain(higher_order) {
        let variation = variations.get(definition.urn());

        let name = variation
            .and_then(|v| v.name.clone())
            .unwrap_or_else(|| definition.name().to_string());

        if !seen_names.insert(name.clone()) {
            warn!(
                toolset_id = %toolset.id,
                tool_name = %name,
                tool_urn = %definition.urn(),
                "Duplicate effective tool name; skipping"
            );
            continue;
        }

        let description = variation
            .and_then(|v| v.description.clone())
            .or_else(|| definition.description().map(|d| d.to_string()));

        tools.push(EffectiveTool {
            name,
            description,
            tags: variation.map(|v| v.tags.clone()).unwrap_or_default(),
            confirm: variation.and_then(|v| v.confirm),
            hints: variation.map(|v| v.hints).unwrap_or_default(),
            definition,
        });
    }

    let prompts =
        content.prompts.into_iter().filter(|p| p.kind == PromptKind::Prompt).collect();

    Arc::new(ToolsetSnapshot {
        toolset,
        tools,
        prompts,
        resources: content.resources,
        security_variables: security_variables.into_iter().collect(),
        env_variables: env_variables.into_iter().collect(),
    })
}
