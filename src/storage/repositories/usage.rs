//! Billing usage repository.
//!
//! Reads stored period usage for the free-tier guard and records tool-call
//! usage events. Event writes run on detached tasks; failures are logged and
//! never surface to the caller.

use async_trait::async_trait;
use sqlx::FromRow;
use std::time::Duration;
use tracing::warn;

use crate::domain::OrganizationId;
use crate::errors::{GatewayError, Result};
use crate::storage::{BillingRepository, BillingTracker, DbPool, PeriodUsage, ToolCallUsageEvent};

#[derive(Debug, Clone, FromRow)]
struct PeriodUsageRow {
    tool_calls: i64,
    max_tool_calls: i64,
}

/// SQLite-backed billing reader/tracker
pub struct SqliteBillingRepository {
    pool: DbPool,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl SqliteBillingRepository {
    pub fn new(pool: DbPool, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self { pool, read_timeout, write_timeout }
    }
}

#[async_trait]
impl BillingRepository for SqliteBillingRepository {
    async fn get_stored_period_usage(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<PeriodUsage> {
        let row = tokio::time::timeout(
            self.read_timeout,
            sqlx::query_as::<_, PeriodUsageRow>(
                "SELECT tool_calls, max_tool_calls FROM period_usage WHERE organization_id = $1",
            )
            .bind(organization_id)
            .fetch_optional(&self.pool),
        )
        .await
        .map_err(|_| GatewayError::unexpected("database read deadline exceeded"))??;

        Ok(row
            .map(|r| PeriodUsage { tool_calls: r.tool_calls, max_tool_calls: r.max_tool_calls })
            .unwrap_or_default())
    }
}

#[async_trait]
impl BillingTracker for SqliteBillingRepository {
    async fn track_tool_call_usage(&self, event: ToolCallUsageEvent) {
        let write = sqlx::query(
            "INSERT INTO tool_call_events (organization_id, project_id, toolset_id, \
             toolset_slug, tool_name, tool_urn, kind, status_code, duration_ms, \
             request_bytes, response_bytes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&event.organization_id)
        .bind(&event.project_id)
        .bind(&event.toolset_id)
        .bind(&event.toolset_slug)
        .bind(&event.tool_name)
        .bind(event.tool_urn.as_ref().map(|u| u.to_string()))
        .bind(event.kind.as_str())
        .bind(event.status_code as i64)
        .bind(event.duration_ms as i64)
        .bind(event.request_bytes as i64)
        .bind(event.response_bytes as i64)
        .execute(&self.pool);

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(error = %e, tool_name = %event.tool_name, "Failed to record usage event")
            }
            Err(_) => {
                warn!(tool_name = %event.tool_name, "Usage event write deadline exceeded")
            }
        }
    }
}
