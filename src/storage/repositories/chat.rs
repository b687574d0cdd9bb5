//! Chat session and message repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{ChatId, ChatMessage, ChatSession, MessageRole, OrganizationId, ProjectId};
use crate::errors::{GatewayError, Result};
use crate::storage::{ChatRepository, DbPool};

#[derive(Debug, Clone, FromRow)]
struct ChatSessionRow {
    id: String,
    session_id: String,
    project_id: String,
    organization_id: String,
    user_id: Option<String>,
    external_user_id: Option<String>,
    title: Option<String>,
    fingerprint: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ChatSessionRow> for ChatSession {
    type Error = GatewayError;

    fn try_from(row: ChatSessionRow) -> Result<Self> {
        let session_id = Uuid::parse_str(&row.session_id)
            .map_err(|e| GatewayError::invalid(format!("invalid session UUID: {}", e)))?;

        Ok(Self {
            id: ChatId::from_string(row.id),
            session_id,
            project_id: ProjectId::from_string(row.project_id),
            organization_id: OrganizationId::from_string(row.organization_id),
            user_id: row.user_id,
            external_user_id: row.external_user_id,
            title: row.title,
            fingerprint: row.fingerprint,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// SQLite-backed chat repository
pub struct SqliteChatRepository {
    pool: DbPool,
    write_timeout: Duration,
    read_timeout: Duration,
}

impl SqliteChatRepository {
    pub fn new(pool: DbPool, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self { pool, write_timeout, read_timeout }
    }

    async fn with_deadline<T>(
        &self,
        deadline: Duration,
        fut: impl std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    ) -> Result<T> {
        tokio::time::timeout(deadline, fut)
            .await
            .map_err(|_| GatewayError::unexpected("database deadline exceeded"))?
            .map_err(GatewayError::from)
    }
}

#[async_trait]
impl ChatRepository for SqliteChatRepository {
    async fn upsert_session(&self, session: &ChatSession) -> Result<()> {
        self.with_deadline(
            self.write_timeout,
            sqlx::query(
                "INSERT INTO chat_sessions (id, session_id, project_id, organization_id, \
                 user_id, external_user_id, title, fingerprint, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT(session_id) DO UPDATE SET \
                     title = COALESCE(chat_sessions.title, excluded.title), \
                     user_id = COALESCE(excluded.user_id, chat_sessions.user_id), \
                     fingerprint = excluded.fingerprint, \
                     updated_at = excluded.updated_at",
            )
            .bind(&session.id)
            .bind(session.session_id.to_string())
            .bind(&session.project_id)
            .bind(&session.organization_id)
            .bind(&session.user_id)
            .bind(&session.external_user_id)
            .bind(&session.title)
            .bind(&session.fingerprint)
            .bind(session.created_at)
            .bind(session.updated_at)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn insert_message(&self, session_id: Uuid, message: &ChatMessage) -> Result<()> {
        self.with_deadline(
            self.write_timeout,
            sqlx::query(
                "INSERT INTO chat_messages (session_id, role, content, tool_call_id, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(session_id.to_string())
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(&message.tool_call_id)
            .bind(message.created_at)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<ChatSession>> {
        let row = self
            .with_deadline(
                self.read_timeout,
                sqlx::query_as::<_, ChatSessionRow>(
                    "SELECT id, session_id, project_id, organization_id, user_id, \
                     external_user_id, title, fingerprint, created_at, updated_at \
                     FROM chat_sessions WHERE session_id = $1",
                )
                .bind(session_id.to_string())
                .fetch_optional(&self.pool),
            )
            .await?;

        row.map(ChatSession::try_from).transpose()
    }
}
