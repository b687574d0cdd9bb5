//! Versioned toolset snapshot cache.
//!
//! Read-through cache keyed `(toolset_id, version)` with a one-hour TTL.
//! A version bump produces a new key, so mutated toolsets never serve stale
//! snapshots; superseded entries age out by TTL or explicit eviction.
//! Readers share the current `Arc` value; writers replace atomically under
//! the per-key map lock.

use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::domain::{Toolset, ToolsetId};
use crate::errors::Result;
use crate::services::snapshot::{project_snapshot, ToolsetSnapshot};
use crate::storage::ToolsetRepository;

/// Snapshot TTL (1 hour)
const SNAPSHOT_TTL_SECS: u64 = 3600;

struct CacheEntry {
    snapshot: Arc<ToolsetSnapshot>,
    inserted_at: Instant,
}

/// Read-through snapshot cache over a [`ToolsetRepository`].
pub struct ToolsetCache {
    repository: Arc<dyn ToolsetRepository>,
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ToolsetCache {
    pub fn new(repository: Arc<dyn ToolsetRepository>) -> Self {
        Self::with_ttl(repository, Duration::from_secs(SNAPSHOT_TTL_SECS))
    }

    pub fn with_ttl(repository: Arc<dyn ToolsetRepository>, ttl: Duration) -> Self {
        Self { repository, entries: DashMap::new(), ttl }
    }

    fn key(toolset_id: &ToolsetId, version: i64) -> String {
        format!("{}@{}", toolset_id, version)
    }

    /// Get the snapshot for a toolset at its current version, loading and
    /// projecting on miss.
    pub async fn snapshot(&self, toolset: &Toolset) -> Result<Arc<ToolsetSnapshot>> {
        let key = Self::key(&toolset.id, toolset.version);

        if let Some(entry) = self.entries.get(&key) {
            if entry.inserted_at.elapsed() <= self.ttl {
                counter!("toolset_snapshot_cache_hits_total").increment(1);
                return Ok(Arc::clone(&entry.snapshot));
            }
        }
        // Expired or missing; drop any stale entry before reloading.
        self.entries.remove(&key);

        counter!("toolset_snapshot_cache_misses_total").increment(1);
        let content = self.repository.load_content(&toolset.id).await?;
        let snapshot = project_snapshot(toolset.clone(), content);

        debug!(
            toolset_id = %toolset.id,
            version = toolset.version,
            tools = snapshot.tools.len(),
            "Cached toolset snapshot"
        );

        self.entries
            .insert(key, CacheEntry { snapshot: Arc::clone(&snapshot), inserted_at: Instant::now() });

        Ok(snapshot)
    }

    /// Evict one cached version. Idempotent.
    pub fn evict(&self, toolset_id: &ToolsetId, version: i64) {
        self.entries.remove(&Self::key(toolset_id, version));
    }

    /// Number of live cache entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
