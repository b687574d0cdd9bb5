//! Usage limit enforcement.
//!
//! Free-tier organizations are hard-stopped once their period tool calls
//! exceed the configured multiple of their allowance. The guard runs before
//! every tool execution; organizations without a recorded allowance fall
//! back to the configured default.

use std::sync::Arc;

use metrics::counter;
use tracing::warn;

use crate::config::LimitsConfig;
use crate::domain::toolset::AccountTier;
use crate::domain::Toolset;
use crate::errors::{GatewayError, Result};
use crate::storage::BillingRepository;

/// Free-tier tool-call guard.
pub struct UsageGuard {
    billing: Arc<dyn BillingRepository>,
    limits: LimitsConfig,
}

impl UsageGuard {
    pub fn new(billing: Arc<dyn BillingRepository>, limits: LimitsConfig) -> Self {
        Self { billing, limits }
    }

    /// Reject the call when the organization is over its hard limit.
    pub async fn check(&self, toolset: &Toolset) -> Result<()> {
        if toolset.account_tier != AccountTier::Free {
            return Ok(());
        }

        let usage =
            self.billing.get_stored_period_usage(&toolset.organization_id).await?;

        let allowance = if usage.max_tool_calls > 0 {
            usage.max_tool_calls
        } else {
            self.limits.free_tier_fallback_allowance
        };
        let hard_limit = allowance.saturating_mul(self.limits.free_tier_multiplier);

        if usage.tool_calls >= hard_limit {
            warn!(
                organization_id = %toolset.organization_id,
                toolset_id = %toolset.id,
                tool_calls = usage.tool_calls,
                hard_limit,
                "Organization over free-tier tool-call limit"
            );
            counter!("tool_calls_rejected_over_limit_total").increment(1);
            return Err(GatewayError::forbidden("tool usage limit reached"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::toolset::ToolSelectionMode;
    use crate::domain::{OrganizationId, ProjectId, ToolsetId};
    use crate::storage::memory::InMemoryBillingRepository;
    use crate::storage::PeriodUsage;
    use chrono::Utc;

    fn toolset(tier: AccountTier, org: OrganizationId) -> Toolset {
        Toolset {
            id: ToolsetId::new(),
            project_id: ProjectId::new(),
            project_slug: "acme".to_string(),
            organization_id: org,
            slug: "billing".to_string(),
            name: "Billing".to_string(),
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
            mode: ToolSelectionMode::Static,
            account_tier: tier,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn guard(billing: Arc<InMemoryBillingRepository>) -> UsageGuard {
        UsageGuard::new(billing, LimitsConfig::default())
    }

    #[tokio::test]
    async fn test_paid_tiers_are_never_limited() {
        let billing = Arc::new(InMemoryBillingRepository::new());
        let org = OrganizationId::new();
        billing.set_usage(&org, PeriodUsage { tool_calls: 1_000_000, max_tool_calls: 100 });

        let guard = guard(billing);
        assert!(guard.check(&toolset(AccountTier::Pro, org)).await.is_ok());
    }

    #[tokio::test]
    async fn test_free_tier_under_limit_passes() {
        let billing = Arc::new(InMemoryBillingRepository::new());
        let org = OrganizationId::new();
        billing.set_usage(&org, PeriodUsage { tool_calls: 3_999, max_tool_calls: 2_000 });

        let guard = guard(billing);
        assert!(guard.check(&toolset(AccountTier::Free, org)).await.is_ok());
    }

    #[tokio::test]
    async fn test_free_tier_at_double_allowance_rejects() {
        let billing = Arc::new(InMemoryBillingRepository::new());
        let org = OrganizationId::new();
        billing.set_usage(&org, PeriodUsage { tool_calls: 4_000, max_tool_calls: 2_000 });

        let guard = guard(billing);
        let err = guard.check(&toolset(AccountTier::Free, org)).await.unwrap_err();
        assert_eq!(err.user_message(), "tool usage limit reached");
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_unknown_allowance_falls_back_to_default() {
        let billing = Arc::new(InMemoryBillingRepository::new());
        let org = OrganizationId::new();
        // max_tool_calls = 0: allowance falls back to 2000, hard limit 4000.
        billing.set_usage(&org, PeriodUsage { tool_calls: 4_000, max_tool_calls: 0 });

        let guard = guard(billing);
        assert!(guard.check(&toolset(AccountTier::Free, org.clone())).await.is_err());

        billing.set_usage(&org, PeriodUsage { tool_calls: 3_999, max_tool_calls: 0 });
        assert!(guard.check(&toolset(AccountTier::Free, org)).await.is_ok());
    }
}
