//! Domain model for the gateway.
//!
//! Toolsets, polymorphic tool definitions, variations, prompt templates,
//! resources, environments and chat sessions. Storage rows convert into
//! these types at the repository boundary.

pub mod chat;
pub mod environment;
pub mod id;
pub mod prompt;
pub mod resource;
pub mod tool;
pub mod toolset;
pub mod variation;

pub use chat::{connection_fingerprint, derive_title, ChatMessage, ChatSession, MessageRole};
pub use environment::{header_to_env_key, EnvMap, Environment};
pub use id::{
    ChatId, CustomDomainId, DeploymentId, ExternalOauthServerId, OauthProxyServerId,
    OrganizationId, ProjectId, ToolId, ToolsetId,
};
pub use prompt::{PromptArgument, PromptKind, PromptTemplate};
pub use resource::FunctionResource;
pub use tool::{
    split_external_name, ExternalMcpToolDefinition, ExternalMcpTransport, FunctionAuthInput,
    FunctionToolDefinition, HttpSecurityScheme, HttpToolDefinition, ToolDefinition, ToolKind,
    ToolUrn,
};
pub use toolset::{AccountTier, ToolSelectionMode, Toolset};
pub use variation::{ConfirmMode, ToolHints, ToolVariation};
