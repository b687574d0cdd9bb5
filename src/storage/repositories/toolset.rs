//! Toolset repository.
//!
//! Reads toolset records and their contents. Tool, prompt, resource and
//! variation payloads are stored as JSON documents; this repository only
//! depends on the columns it reads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::time::Duration;

use crate::domain::{
    CustomDomainId, ExternalOauthServerId, FunctionResource, OauthProxyServerId, OrganizationId,
    ProjectId, PromptTemplate, ToolDefinition, ToolVariation, Toolset, ToolsetId,
};
use crate::errors::{GatewayError, Result};
use crate::storage::{DbPool, ToolsetContent, ToolsetRepository};

/// Database row structure for toolsets
#[derive(Debug, Clone, FromRow)]
struct ToolsetRow {
    id: String,
    project_id: String,
    project_slug: String,
    organization_id: String,
    slug: String,
    name: String,
    description: Option<String>,
    logo_url: Option<String>,
    external_docs_url: Option<String>,
    mcp_slug: Option<String>,
    mcp_is_public: bool,
    mcp_enabled: bool,
    custom_domain_id: Option<String>,
    oauth_proxy_server_id: Option<String>,
    external_oauth_server_id: Option<String>,
    default_environment_slug: Option<String>,
    mode: String,
    account_tier: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ToolsetRow> for Toolset {
    type Error = GatewayError;

    fn try_from(row: ToolsetRow) -> Result<Self> {
        let mode = row
            .mode
            .parse()
            .map_err(|e: String| GatewayError::invalid(format!("invalid toolset mode: {}", e)))?;
        let account_tier = row
            .account_tier
            .parse()
            .map_err(|e: String| GatewayError::invalid(format!("invalid account tier: {}", e)))?;

        Ok(Self {
            id: ToolsetId::from_string(row.id),
            project_id: ProjectId::from_string(row.project_id),
            project_slug: row.project_slug,
            organization_id: OrganizationId::from_string(row.organization_id),
            slug: row.slug,
            name: row.name,
            description: row.description,
            logo_url: row.logo_url,
            external_docs_url: row.external_docs_url,
            mcp_slug: row.mcp_slug,
            mcp_is_public: row.mcp_is_public,
            mcp_enabled: row.mcp_enabled,
            custom_domain_id: row.custom_domain_id.map(CustomDomainId::from_string),
            oauth_proxy_server_id: row.oauth_proxy_server_id.map(OauthProxyServerId::from_string),
            external_oauth_server_id: row
                .external_oauth_server_id
                .map(ExternalOauthServerId::from_string),
            default_environment_slug: row.default_environment_slug,
            mode,
            account_tier,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// JSON-document row used for tools, prompts, resources and variations
#[derive(Debug, Clone, FromRow)]
struct DocumentRow {
    document: String,
}

const TOOLSET_COLUMNS: &str = "id, project_id, project_slug, organization_id, slug, name, \
    description, logo_url, external_docs_url, mcp_slug, mcp_is_public, mcp_enabled, \
    custom_domain_id, oauth_proxy_server_id, external_oauth_server_id, \
    default_environment_slug, mode, account_tier, version, created_at, updated_at";

/// SQLite-backed toolset repository
pub struct SqliteToolsetRepository {
    pool: DbPool,
    read_timeout: Duration,
}

impl SqliteToolsetRepository {
    pub fn new(pool: DbPool, read_timeout: Duration) -> Self {
        Self { pool, read_timeout }
    }

    async fn read<T>(
        &self,
        fut: impl std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    ) -> Result<T> {
        tokio::time::timeout(self.read_timeout, fut)
            .await
            .map_err(|_| GatewayError::unexpected("database read deadline exceeded"))?
            .map_err(GatewayError::from)
    }

    async fn load_documents<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        toolset_id: &ToolsetId,
    ) -> Result<Vec<T>> {
        let query =
            format!("SELECT document FROM {} WHERE toolset_id = $1 ORDER BY rowid", table);
        let rows = self
            .read(sqlx::query_as::<_, DocumentRow>(&query).bind(toolset_id).fetch_all(&self.pool))
            .await?;

        rows.into_iter()
            .map(|row| serde_json::from_str(&row.document).map_err(GatewayError::from))
            .collect()
    }
}

#[async_trait]
impl ToolsetRepository for SqliteToolsetRepository {
    async fn find_by_mcp_slug(
        &self,
        mcp_slug: &str,
        custom_domain_id: Option<&CustomDomainId>,
    ) -> Result<Option<Toolset>> {
        let query = format!(
            "SELECT {} FROM toolsets WHERE mcp_slug = $1 \
             AND ($2 IS NULL OR custom_domain_id = $2)",
            TOOLSET_COLUMNS
        );
        let row = self
            .read(
                sqlx::query_as::<_, ToolsetRow>(&query)
                    .bind(mcp_slug)
                    .bind(custom_domain_id)
                    .fetch_optional(&self.pool),
            )
            .await?;

        row.map(Toolset::try_from).transpose()
    }

    async fn find_by_project_and_slug(
        &self,
        project_slug: &str,
        toolset_slug: &str,
    ) -> Result<Option<Toolset>> {
        let query = format!(
            "SELECT {} FROM toolsets WHERE project_slug = $1 AND slug = $2",
            TOOLSET_COLUMNS
        );
        let row = self
            .read(
                sqlx::query_as::<_, ToolsetRow>(&query)
                    .bind(project_slug)
                    .bind(toolset_slug)
                    .fetch_optional(&self.pool),
            )
            .await?;

        row.map(Toolset::try_from).transpose()
    }

    async fn load_content(&self, toolset_id: &ToolsetId) -> Result<ToolsetContent> {
        let tools: Vec<ToolDefinition> = self.load_documents("toolset_tools", toolset_id).await?;
        let prompts: Vec<PromptTemplate> =
            self.load_documents("toolset_prompts", toolset_id).await?;
        let resources: Vec<FunctionResource> =
            self.load_documents("toolset_resources", toolset_id).await?;
        let variations: Vec<ToolVariation> =
            self.load_documents("tool_variations", toolset_id).await?;

        Ok(ToolsetContent { tools, prompts, resources, variations })
    }
}
