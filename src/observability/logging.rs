//! # Structured Logging
//!
//! Tracing subscriber initialisation for the gateway. Log lines carry
//! structured fields; the JSON format is meant for log shippers, the default
//! format for terminals.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::errors::{GatewayError, Result};

/// Initialise the global tracing subscriber from configuration.
///
/// The filter directive comes from `observability.log_filter` (for example
/// `info,gramgate=debug`); `RUST_LOG` takes precedence when set.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| GatewayError::config(format!("invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    // A second init (tests spin up multiple servers) is not an error worth
    // failing startup over.
    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already initialised");
    }

    Ok(())
}

/// Create a tracing span for request tracking.
#[macro_export]
macro_rules! request_span {
    ($method:expr, $endpoint:expr) => {
        tracing::info_span!(
            "rpc_request",
            method = %$method,
            endpoint = %$endpoint,
            request_id = %uuid::Uuid::new_v4()
        )
    };
    ($method:expr, $endpoint:expr, $($field:tt)*) => {
        tracing::info_span!(
            "rpc_request",
            method = %$method,
            endpoint = %$endpoint,
            request_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_accepts_default_filter() {
        let config = ObservabilityConfig::default();
        assert!(init_tracing(&config).is_ok());
        // Re-initialisation is tolerated.
        assert!(init_tracing(&config).is_ok());
    }

    #[test]
    fn test_span_macro_compiles() {
        let _span = request_span!("tools/call", "example.com/mcp/acme");
        let _span = request_span!("tools/list", "example.com/mcp/acme", toolset_id = "ts-1");
    }
}
