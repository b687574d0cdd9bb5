//! Asynchronous session persistence.
//!
//! After each tool call the dispatcher queues a persistence record: the
//! session row is upserted, inline conversation messages are written, and a
//! final `tool` message carries the response body. The work runs on a
//! detached task so client disconnects never lose a write, and persistence
//! failures are logged without affecting the response.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{
    derive_title, ChatId, ChatMessage, ChatSession, MessageRole, OrganizationId, ProjectId,
};
use crate::mcp::session_context::IncomingMessage;
use crate::storage::ChatRepository;

/// Everything needed to persist one tool call's session state.
#[derive(Debug, Clone)]
pub struct SessionPersistRecord {
    pub session_id: Uuid,
    pub project_id: ProjectId,
    pub organization_id: OrganizationId,
    pub user_id: Option<String>,
    pub fingerprint: String,
    pub messages: Vec<IncomingMessage>,
    /// Serialized tool response body, written as a `tool` message
    pub response_body: String,
    pub tool_call_id: Option<String>,
}

/// Detached writer for session records and conversation messages.
pub struct SessionWriter {
    chats: Arc<dyn ChatRepository>,
}

impl SessionWriter {
    pub fn new(chats: Arc<dyn ChatRepository>) -> Self {
        Self { chats }
    }

    /// Queue persistence on a detached task. Callers must not await the
    /// write; it survives request cancellation.
    pub fn spawn_persist(&self, record: SessionPersistRecord) {
        let chats = Arc::clone(&self.chats);
        tokio::spawn(async move {
            if let Err(err) = persist(chats, record).await {
                warn!(error = %err, "Session persistence failed");
            }
        });
    }
}

async fn persist(
    chats: Arc<dyn ChatRepository>,
    record: SessionPersistRecord,
) -> crate::errors::Result<()> {
    let now = Utc::now();

    let inline_messages: Vec<ChatMessage> = record
        .messages
        .iter()
        .filter(|m| !m.content.is_empty())
        .map(|m| ChatMessage {
            role: m.role,
            content: m.content.clone(),
            tool_call_id: None,
            created_at: now,
        })
        .collect();

    let session = ChatSession {
        id: ChatId::new(),
        session_id: record.session_id,
        project_id: record.project_id,
        organization_id: record.organization_id,
        user_id: record.user_id,
        external_user_id: None,
        title: derive_title(&inline_messages),
        fingerprint: record.fingerprint,
        created_at: now,
        updated_at: now,
    };
    chats.upsert_session(&session).await?;

    for message in &inline_messages {
        chats.insert_message(record.session_id, message).await?;
    }

    let tool_message = ChatMessage {
        role: MessageRole::Tool,
        content: record.response_body,
        tool_call_id: record.tool_call_id,
        created_at: now,
    };
    chats.insert_message(record.session_id, &tool_message).await?;

    debug!(
        session_id = %record.session_id,
        inline_messages = inline_messages.len(),
        "Persisted session state"
    );
    Ok(())
}
