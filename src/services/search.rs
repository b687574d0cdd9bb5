//! Dynamic-mode tool search.
//!
//! The first `search_tools` invocation for a toolset version submits the
//! index workflow and awaits its completion; concurrent submissions are
//! de-duplicated by the store's is-indexed precondition. Searches embed the
//! query and return the top-K tools by cosine similarity.

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{GatewayError, Result};
use crate::services::snapshot::{EffectiveTool, ToolsetSnapshot};
use crate::storage::{
    EmbeddingProvider, IndexToolsetParams, TagMatchMode, ToolIndexDoc, ToolSearchHit,
    VectorStore, WorkflowEngine,
};

/// Bounds on `num_results` accepted by `search_tools`.
pub const MIN_SEARCH_RESULTS: usize = 1;
pub const MAX_SEARCH_RESULTS: usize = 20;

/// Orchestrates indexing and semantic search over a toolset's tools.
pub struct ToolSearchService {
    engine: Arc<dyn WorkflowEngine>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ToolSearchService {
    pub fn new(
        engine: Arc<dyn WorkflowEngine>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self { engine, vectors, embedder }
    }

    /// Build the embedding input for one tool:
    /// `name | description | schema | meta`.
    fn index_doc(tool: &EffectiveTool) -> ToolIndexDoc {
        let schema = tool.definition.input_schema().to_string();
        let meta = tool
            .definition
            .meta()
            .map(|m| m.to_string())
            .unwrap_or_default();
        let description = tool.description.clone().unwrap_or_default();

        ToolIndexDoc {
            urn: tool.definition.urn().clone(),
            name: tool.name.clone(),
            text: format!("{} | {} | {} | {}", tool.name, description, schema, meta),
            tags: tool.tags.clone(),
        }
    }

    /// Ensure the toolset version is indexed, submitting and awaiting the
    /// index workflow when it is not.
    pub async fn ensure_indexed(&self, snapshot: &ToolsetSnapshot) -> Result<()> {
        let toolset_id = &snapshot.toolset.id;
        let version = snapshot.version();

        if self.vectors.toolset_tools_are_indexed(toolset_id, version).await? {
            debug!(toolset_id = %toolset_id, version, "Toolset already indexed");
            return Ok(());
        }

        info!(toolset_id = %toolset_id, version, "Submitting toolset index workflow");
        let params = IndexToolsetParams {
            toolset_id: toolset_id.clone(),
            version,
            docs: snapshot.tools.iter().map(Self::index_doc).collect(),
        };
        let run = self.engine.execute_index_toolset(params).await?;
        run.get().await
    }

    /// Search the toolset's tools by semantic similarity.
    pub async fn search(
        &self,
        snapshot: &ToolsetSnapshot,
        query: &str,
        tags: &[String],
        match_mode: TagMatchMode,
        num_results: usize,
    ) -> Result<Vec<ToolSearchHit>> {
        if query.trim().is_empty() {
            return Err(GatewayError::invalid_field("query must not be empty", "query"));
        }
        if !(MIN_SEARCH_RESULTS..=MAX_SEARCH_RESULTS).contains(&num_results) {
            return Err(GatewayError::invalid_field(
                format!(
                    "num_results must be between {} and {}",
                    MIN_SEARCH_RESULTS, MAX_SEARCH_RESULTS
                ),
                "num_results",
            ));
        }

        self.ensure_indexed(snapshot).await?;

        let query_vectors = self.embedder.embed(&[query.to_string()]).await?;
        let query_vector = query_vectors
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::unexpected("embedding provider returned nothing"))?;

        self.vectors
            .search_toolset_tools(
                &snapshot.toolset.id,
                snapshot.version(),
                &query_vector,
                tags,
                match_mode,
                num_results,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::toolset::{AccountTier, ToolSelectionMode};
    use crate::domain::{
        HttpToolDefinition, OrganizationId, ProjectId, ToolDefinition, ToolId, ToolKind, ToolUrn,
        Toolset, ToolsetId,
    };
    use crate::services::snapshot::project_snapshot;
    use crate::storage::memory::{
        HashEmbeddingProvider, InMemoryVectorStore, InlineWorkflowEngine,
    };
    use crate::storage::ToolsetContent;
    use chrono::Utc;
    use serde_json::json;

    fn http_tool(name: &str, description: &str) -> ToolDefinition {
        ToolDefinition::Http(HttpToolDefinition {
            id: ToolId::new(),
            urn: ToolUrn::new(ToolKind::Http, "src", name),
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: json!({"type": "object"}),
            method: "GET".to_string(),
            path: format!("/{}", name),
            operation_id: None,
            security: vec![],
            server_env_variables: vec![],
            meta: None,
        })
    }

    fn snapshot_with_tools() -> Arc<crate::services::snapshot::ToolsetSnapshot> {
        let toolset = Toolset {
            id: ToolsetId::new(),
            project_id: ProjectId::new(),
            project_slug: "acme".to_string(),
            organization_id: OrganizationId::new(),
            slug: "mixed".to_string(),
            name: "Mixed".to_string(),
            description: None,
            logo_url: None,
            external_docs_url: None,
            mcp_slug: None,
            mcp_is_public: true,
            mcp_enabled: true,
            custom_domain_id: None,
            oauth_proxy_server_id: None,
            external_oauth_server_id: None,
            default_environment_slug: None,
            mode: ToolSelectionMode::Dynamic,
            account_tier: AccountTier::Free,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        project_snapshot(
            toolset,
            ToolsetContent {
                tools: vec![
                    http_tool("get_weather", "current weather conditions for a city"),
                    http_tool("create_invoice", "create a billing invoice for a customer"),
                ],
                prompts: vec![],
                resources: vec![],
                variations: vec![],
            },
        )
    }

    fn service() -> (ToolSearchService, Arc<InMemoryVectorStore>) {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(HashEmbeddingProvider::default());
        let engine = Arc::new(InlineWorkflowEngine::new(
            vectors.clone() as Arc<dyn VectorStore>,
            embedder.clone() as Arc<dyn EmbeddingProvider>,
        ));
        (ToolSearchService::new(engine, vectors.clone(), embedder), vectors)
    }

    #[tokio::test]
    async fn test_first_search_triggers_indexing() {
        let (service, vectors) = service();
        let snapshot = snapshot_with_tools();

        assert!(!vectors
            .toolset_tools_are_indexed(&snapshot.toolset.id, 1)
            .await
            .unwrap());

        let hits = service
            .search(&snapshot, "weather conditions", &[], TagMatchMode::Any, 2)
            .await
            .unwrap();

        assert!(vectors
            .toolset_tools_are_indexed(&snapshot.toolset.id, 1)
            .await
            .unwrap());
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "get_weather");
    }

    #[tokio::test]
    async fn test_ensure_indexed_is_idempotent() {
        let (service, _) = service();
        let snapshot = snapshot_with_tools();

        service.ensure_indexed(&snapshot).await.unwrap();
        service.ensure_indexed(&snapshot).await.unwrap();
    }

    #[tokio::test]
    async fn test_num_results_bounds() {
        let (service, _) = service();
        let snapshot = snapshot_with_tools();

        assert!(service.search(&snapshot, "x", &[], TagMatchMode::Any, 0).await.is_err());
        assert!(service.search(&snapshot, "x", &[], TagMatchMode::Any, 21).await.is_err());
        assert!(service.search(&snapshot, "x", &[], TagMatchMode::Any, 20).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (service, _) = service();
        let snapshot = snapshot_with_tools();
        assert!(service.search(&snapshot, "  ", &[], TagMatchMode::Any, 5).await.is_err());
    }
}
