//! In-memory implementations of the storage contracts.
//!
//! These back the test suite and single-node deployments of the
//! collaborators that have no SQL shape here (OAuth validation, workflow
//! engine, vector store, embeddings).

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::domain::{
    ChatMessage, ChatSession, CustomDomainId, EnvMap, ExternalOauthServerId, OrganizationId,
    ProjectId, ToolKind, Toolset, ToolsetId,
};
use crate::errors::{GatewayError, Result};
use crate::storage::{
    AccessToken, ApiKeyAuth, ApiKeyVerifier, BillingRepository, BillingTracker, ChatRepository,
    EmbeddingProvider, EnvironmentLoader, IndexToolsetParams, OAuthService, PeriodUsage,
    SessionAuth, SessionAuthenticator, TagMatchMode, ToolCallUsageEvent, ToolIndexDoc,
    ToolSearchHit, ToolsetContent, ToolsetRepository, VectorStore, WorkflowEngine, WorkflowRun,
};

/// In-memory toolset repository.
#[derive(Default)]
pub struct InMemoryToolsetRepository {
    entries: DashMap<String, (Toolset, ToolsetContent)>,
}

impl InMemoryToolsetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, toolset: Toolset, content: ToolsetContent) {
        self.entries.insert(toolset.id.as_str().to_string(), (toolset, content));
    }

    /// Replace a toolset's contents and bump its version.
    pub fn update_content(&self, toolset_id: &ToolsetId, content: ToolsetContent) {
        if let Some(mut entry) = self.entries.get_mut(toolset_id.as_str()) {
            entry.0.version += 1;
            entry.1 = content;
        }
    }
}

#[async_trait]
impl ToolsetRepository for InMemoryToolsetRepository {
    async fn find_by_mcp_slug(
        &self,
        mcp_slug: &str,
        custom_domain_id: Option<&CustomDomainId>,
    ) -> Result<Option<Toolset>> {
        Ok(self
            .entries
            .iter()
            .map(|entry| entry.0.clone())
            .find(|toolset| {
                toolset.mcp_slug.as_deref() == Some(mcp_slug)
                    && match custom_domain_id {
                        Some(domain) => toolset.custom_domain_id.as_ref() == Some(domain),
                        None => true,
                    }
            }))
    }

    async fn find_by_project_and_slug(
        &self,
        project_slug: &str,
        toolset_slug: &str,
    ) -> Result<Option<Toolset>> {
        Ok(self
            .entries
            .iter()
            .map(|entry| entry.0.clone())
            .find(|t| t.project_slug == project_slug && t.slug == toolset_slug))
    }

    async fn load_content(&self, toolset_id: &ToolsetId) -> Result<ToolsetContent> {
        self.entries
            .get(toolset_id.as_str())
            .map(|entry| entry.1.clone())
            .ok_or_else(|| GatewayError::not_found("toolset", toolset_id.as_str()))
    }
}

/// In-memory environment loader.
#[derive(Default)]
pub struct InMemoryEnvironmentLoader {
    environments: DashMap<String, EnvMap>,
    system: DashMap<String, EnvMap>,
}

impl InMemoryEnvironmentLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn env_key(project_id: &ProjectId, slug: &str) -> String {
        format!("{}/{}", project_id, slug)
    }

    fn system_key(project_id: &ProjectId, toolset_id: &ToolsetId, kind: ToolKind, source: &str) -> String {
        format!("{}/{}/{}/{}", project_id, toolset_id, kind, source)
    }

    pub fn set_environment(&self, project_id: &ProjectId, slug: &str, env: EnvMap) {
        self.environments.insert(Self::env_key(project_id, slug), env);
    }

    pub fn set_system_env(
        &self,
        project_id: &ProjectId,
        toolset_id: &ToolsetId,
        kind: ToolKind,
        source: &str,
        env: EnvMap,
    ) {
        self.system.insert(Self::system_key(project_id, toolset_id, kind, source), env);
    }
}

#[async_trait]
impl EnvironmentLoader for InMemoryEnvironmentLoader {
    async fn load(&self, project_id: &ProjectId, slug: &str) -> Result<Option<EnvMap>> {
        Ok(self.environments.get(&Self::env_key(project_id, slug)).map(|e| e.clone()))
    }

    async fn load_system_env(
        &self,
        project_id: &ProjectId,
        toolset_id: &ToolsetId,
        kind: ToolKind,
        source: &str,
    ) -> Result<EnvMap> {
        Ok(self
            .system
            .get(&Self::system_key(project_id, toolset_id, kind, source))
            .map(|e| e.clone())
            .unwrap_or_default())
    }
}

/// In-memory billing reader/tracker recording every event.
#[derive(Default)]
pub struct InMemoryBillingRepository {
    usage: DashMap<String, PeriodUsage>,
    events: Mutex<Vec<ToolCallUsageEvent>>,
}

impl InMemoryBillingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_usage(&self, organization_id: &OrganizationId, usage: PeriodUsage) {
        self.usage.insert(organization_id.as_str().to_string(), usage);
    }

    pub fn recorded_events(&self) -> Vec<ToolCallUsageEvent> {
        self.events.lock().expect("events lock").clone()
    }
}

#[async_trait]
impl BillingRepository for InMemoryBillingRepository {
    async fn get_stored_period_usage(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<PeriodUsage> {
        Ok(self.usage.get(organization_id.as_str()).map(|u| *u).unwrap_or_default())
    }
}

#[async_trait]
impl BillingTracker for InMemoryBillingRepository {
    async fn track_tool_call_usage(&self, event: ToolCallUsageEvent) {
        self.events.lock().expect("events lock").push(event);
    }
}

/// In-memory chat repository.
#[derive(Default)]
pub struct InMemoryChatRepository {
    sessions: DashMap<Uuid, ChatSession>,
    messages: DashMap<Uuid, Vec<ChatMessage>>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages_for(&self, session_id: Uuid) -> Vec<ChatMessage> {
        self.messages.get(&session_id).map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn upsert_session(&self, session: &ChatSession) -> Result<()> {
        match self.sessions.get_mut(&session.session_id) {
            Some(mut existing) => {
                if existing.title.is_none() {
                    existing.title = session.title.clone();
                }
                existing.fingerprint = session.fingerprint.clone();
                existing.updated_at = session.updated_at;
            }
            None => {
                self.sessions.insert(session.session_id, session.clone());
            }
        }
        Ok(())
    }

    async fn insert_message(&self, session_id: Uuid, message: &ChatMessage) -> Result<()> {
        self.messages.entry(session_id).or_default().push(message.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<ChatSession>> {
        Ok(self.sessions.get(&session_id).map(|s| s.clone()))
    }
}

/// API key verifier backed by stored SHA-256 digests.
#[derive(Default)]
pub struct StaticApiKeyVerifier {
    keys: DashMap<String, ApiKeyAuth>,
}

impl StaticApiKeyVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn digest(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn add_key(&self, token: &str, auth: ApiKeyAuth) {
        self.keys.insert(Self::digest(token), auth);
    }
}

#[async_trait]
impl ApiKeyVerifier for StaticApiKeyVerifier {
    async fn verify(&self, token: &str) -> Result<Option<ApiKeyAuth>> {
        Ok(self.keys.get(&Self::digest(token)).map(|auth| auth.clone()))
    }
}

/// OAuth service with registered tokens and upstream metadata.
#[derive(Default)]
pub struct StaticOAuthService {
    tokens: DashMap<String, AccessToken>,
    metadata: DashMap<String, Value>,
}

impl StaticOAuthService {
    pub fn new() -> Self {
        Self::default()
    }

    fn token_key(toolset_id: &ToolsetId, token: &str) -> String {
        format!("{}/{}", toolset_id, token)
    }

    pub fn add_token(&self, toolset_id: &ToolsetId, token: &str, access: AccessToken) {
        self.tokens.insert(Self::token_key(toolset_id, token), access);
    }

    pub fn set_upstream_metadata(&self, server_id: &ExternalOauthServerId, document: Value) {
        self.metadata.insert(server_id.as_str().to_string(), document);
    }
}

#[async_trait]
impl OAuthService for StaticOAuthService {
    async fn validate_access_token(
        &self,
        toolset_id: &ToolsetId,
        token: &str,
    ) -> Result<AccessToken> {
        self.tokens
            .get(&Self::token_key(toolset_id, token))
            .map(|access| access.clone())
            .ok_or_else(|| GatewayError::unauthorized("invalid access token"))
    }

    async fn upstream_metadata(
        &self,
        server_id: &ExternalOauthServerId,
    ) -> Result<Option<Value>> {
        Ok(self.metadata.get(server_id.as_str()).map(|doc| doc.clone()))
    }
}

/// Session authenticator with registered session tokens.
#[derive(Default)]
pub struct InMemorySessionAuthenticator {
    tokens: DashMap<String, SessionAuth>,
}

impl InMemorySessionAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&self, token: &str, auth: SessionAuth) {
        self.tokens.insert(token.to_string(), auth);
    }
}

#[async_trait]
impl SessionAuthenticator for InMemorySessionAuthenticator {
    async fn authenticate(&self, token: &str, _strict: bool) -> Result<Option<SessionAuth>> {
        Ok(self.tokens.get(token).map(|auth| auth.clone()))
    }
}

/// Workflow engine that runs the index workflow on a spawned task.
pub struct InlineWorkflowEngine {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl InlineWorkflowEngine {
    pub fn new(vector_store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { vector_store, embedder }
    }
}

struct InlineWorkflowRun {
    handle: tokio::task::JoinHandle<Result<()>>,
}

#[async_trait]
impl WorkflowRun for InlineWorkflowRun {
    async fn get(self: Box<Self>) -> Result<()> {
        self.handle
            .await
            .map_err(|e| GatewayError::unexpected(format!("index workflow panicked: {}", e)))?
    }
}

#[async_trait]
impl WorkflowEngine for InlineWorkflowEngine {
    async fn execute_index_toolset(
        &self,
        params: IndexToolsetParams,
    ) -> Result<Box<dyn WorkflowRun>> {
        let vector_store = Arc::clone(&self.vector_store);
        let embedder = Arc::clone(&self.embedder);

        let handle = tokio::spawn(async move {
            if vector_store
                .toolset_tools_are_indexed(&params.toolset_id, params.version)
                .await?
            {
                return Ok(());
            }

            let texts: Vec<String> = params.docs.iter().map(|d| d.text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;
            let docs = params.docs;
            vector_store.index_toolset_with_vectors(&params.toolset_id, params.version, docs, vectors).await
        });

        Ok(Box::new(InlineWorkflowRun { handle }))
    }
}

/// A document with its embedding vector.
#[derive(Debug, Clone)]
struct IndexedDoc {
    doc: ToolIndexDoc,
    vector: Vec<f32>,
}

/// In-memory versioned vector store with cosine-similarity search.
#[derive(Default)]
pub struct InMemoryVectorStore {
    indexed: DashMap<String, Vec<IndexedDoc>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(toolset_id: &ToolsetId, version: i64) -> String {
        format!("{}@{}", toolset_id, version)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn tags_match(hit_tags: &[String], filter: &[String], mode: TagMatchMode) -> bool {
    if filter.is_empty() {
        return true;
    }
    match mode {
        TagMatchMode::Any => filter.iter().any(|t| hit_tags.contains(t)),
        TagMatchMode::All => filter.iter().all(|t| hit_tags.contains(t)),
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn index_toolset_with_vectors(
        &self,
        toolset_id: &ToolsetId,
        version: i64,
        docs: Vec<ToolIndexDoc>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<()> {
        let key = Self::key(toolset_id, version);
        // First writer wins; a concurrent indexer observing the version
        // becomes a no-op.
        if self.indexed.contains_key(&key) {
            return Ok(());
        }

        if docs.len() != vectors.len() {
            return Err(GatewayError::unexpected("embedding count mismatch"));
        }

        let entries = docs
            .into_iter()
            .zip(vectors)
            .map(|(doc, vector)| IndexedDoc { doc, vector })
            .collect();
        self.indexed.insert(key, entries);
        Ok(())
    }

    async fn toolset_tools_are_indexed(
        &self,
        toolset_id: &ToolsetId,
        version: i64,
    ) -> Result<bool> {
        Ok(self.indexed.contains_key(&Self::key(toolset_id, version)))
    }

    async fn search_toolset_tools(
        &self,
        toolset_id: &ToolsetId,
        version: i64,
        query_vector: &[f32],
        tags: &[String],
        match_mode: TagMatchMode,
        num_results: usize,
    ) -> Result<Vec<ToolSearchHit>> {
        let entries = self
            .indexed
            .get(&Self::key(toolset_id, version))
            .map(|e| e.clone())
            .unwrap_or_default();

        let mut hits: Vec<ToolSearchHit> = entries
            .iter()
            .filter(|entry| tags_match(&entry.doc.tags, tags, match_mode))
            .map(|entry| ToolSearchHit {
                name: entry.doc.name.clone(),
                description: Some(entry.doc.text.clone()),
                score: cosine_similarity(query_vector, &entry.vector),
                tags: entry.doc.tags.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(num_results);
        Ok(hits)
    }
}

/// Deterministic local embedder hashing character trigrams into a fixed
/// dimensionality. Not a semantic model; good enough for tests and
/// single-node deployments without an embedding provider.
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let normalized = text.to_lowercase();
        let chars: Vec<char> = normalized.chars().collect();

        for window in chars.windows(3) {
            let mut hasher = Sha256::new();
            hasher.update(window.iter().collect::<String>().as_bytes());
            let digest = hasher.finalize();
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimensions;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Function runtime fake with canned responses keyed by function id.
#[derive(Default)]
pub struct StaticFunctionRuntime {
    responses: DashMap<String, (u16, String, bytes::Bytes)>,
}

impl StaticFunctionRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_response(
        &self,
        function_id: &str,
        status: u16,
        content_type: &str,
        body: impl Into<bytes::Bytes>,
    ) {
        self.responses.insert(
            function_id.to_string(),
            (status, content_type.to_string(), body.into()),
        );
    }
}

#[async_trait]
impl crate::proxy::FunctionBackend for StaticFunctionRuntime {
    async fn invoke(
        &self,
        invocation: crate::proxy::FunctionInvocation,
        capture: &mut crate::proxy::ResponseCapture,
    ) -> Result<()> {
        match self.responses.get(&invocation.function_id) {
            Some(entry) => {
                let (status, content_type, body) = entry.value().clone();
                capture.write(
                    status,
                    crate::proxy::capture::content_type_headers(&content_type),
                    body,
                )
            }
            None => capture.write(
                404,
                crate::proxy::capture::content_type_headers("text/plain"),
                bytes::Bytes::from(format!("function {} not found", invocation.function_id)),
            ),
        }
    }
}
