//! Tool variation overrides.
//!
//! Variations are global per-project overrides keyed by source tool URN.
//! When present they mutate the effective tool exposed to clients; the
//! canonical attributes remain on the underlying definition for audit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::domain::id::ProjectId;
use crate::domain::tool::ToolUrn;

/// Client-side confirmation requirement for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmMode {
    Always,
    Session,
    Never,
}

impl ConfirmMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Session => "session",
            Self::Never => "never",
        }
    }
}

impl FromStr for ConfirmMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "always" => Ok(Self::Always),
            "session" => Ok(Self::Session),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown confirm mode: {}", other)),
        }
    }
}

impl fmt::Display for ConfirmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// LLM behavioral hint flags, mapped into MCP tool annotations.
///
/// All four are tri-state: absent means the hint is unknown, explicit
/// `false` is preserved on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_world: Option<bool>,
}

impl ToolHints {
    pub fn is_empty(&self) -> bool {
        self.read_only.is_none()
            && self.destructive.is_none()
            && self.idempotent.is_none()
            && self.open_world.is_none()
    }
}

/// Per-project override for one source tool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolVariation {
    pub project_id: ProjectId,
    /// URN of the tool this variation overrides
    pub source_tool_urn: ToolUrn,
    /// Rename applied to the exposed tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Replacement for the exposed description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm: Option<ConfirmMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summarizer: Option<String>,
    #[serde(default)]
    pub hints: ToolHints,
}

impl ToolVariation {
    pub fn new(project_id: ProjectId, source_tool_urn: ToolUrn) -> Self {
        Self {
            project_id,
            source_tool_urn,
            name: None,
            summary: None,
            description: None,
            tags: Vec::new(),
            confirm: None,
            summarizer: None,
            hints: ToolHints::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tool::ToolKind;

    #[test]
    fn test_confirm_mode_roundtrip() {
        for mode in [ConfirmMode::Always, ConfirmMode::Session, ConfirmMode::Never] {
            let parsed: ConfirmMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn test_hints_preserve_explicit_false() {
        let hints = ToolHints { read_only: Some(false), ..Default::default() };
        let json = serde_json::to_value(hints).unwrap();
        assert_eq!(json, serde_json::json!({"readOnly": false}));
        assert!(!hints.is_empty());
        assert!(ToolHints::default().is_empty());
    }

    #[test]
    fn test_variation_defaults() {
        let variation = ToolVariation::new(
            ProjectId::new(),
            ToolUrn::new(ToolKind::Http, "billing", "create_invoice"),
        );
        assert!(variation.name.is_none());
        assert!(variation.tags.is_empty());
        assert!(variation.hints.is_empty());
    }
}
