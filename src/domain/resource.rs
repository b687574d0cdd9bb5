//! Resource domain types.
//!
//! Resources are URI-addressable, tool-like objects produced by a function
//! backend. They enumerate via `resources/list` and fetch via
//! `resources/read`, which executes the backing function.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::id::ToolId;
use crate::domain::tool::ToolUrn;

/// A function-backed resource.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResource {
    pub id: ToolId,
    pub urn: ToolUrn,
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for URI variable substitution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables_schema: Option<serde_json::Value>,
    pub function_id: String,
    pub runtime: String,
}
