//! Chat session and message domain types.
//!
//! A session is a UUID correlating consecutive tool calls from one logical
//! conversation. Messages arrive inline on tool-call arguments and are
//! persisted asynchronously after each call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::id::{ChatId, OrganizationId, ProjectId};

/// Maximum character length of a derived session title (before the ellipsis).
const TITLE_MAX_CHARS: usize = 100;

/// Role of a persisted chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(format!("unknown message role: {}", other)),
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One conversation message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persisted session record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: ChatId,
    /// Session UUID carried on the wire
    pub session_id: Uuid,
    pub project_id: ProjectId,
    pub organization_id: OrganizationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// SHA-256 of `ip|user-agent|origin`; empty when no signal was present
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derive a session title from the first `user` message.
///
/// Longer titles are truncated to 100 characters and suffixed with an
/// ellipsis.
pub fn derive_title(messages: &[ChatMessage]) -> Option<String> {
    let first_user = messages.iter().find(|m| m.role == MessageRole::User)?;
    let content = first_user.content.trim();
    if content.is_empty() {
        return None;
    }

    let truncated: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if truncated.chars().count() < content.chars().count() {
        Some(format!("{}...", truncated))
    } else {
        Some(truncated)
    }
}

/// Derive a connection fingerprint from forwarded request metadata.
///
/// The IP is the first element of `X-Forwarded-For`, else `X-Real-IP`, else
/// the peer address; callers resolve that precedence before calling. An
/// entirely empty input yields an empty hash.
pub fn connection_fingerprint(ip: &str, user_agent: &str, origin: &str) -> String {
    if ip.is_empty() && user_agent.is_empty() && origin.is_empty() {
        return String::new();
    }

    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", ip, user_agent, origin).as_bytes());
    hex::encode(hasher.finalize())
}
