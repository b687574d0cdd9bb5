//! # Configuration Settings
//!
//! Configuration structure for the gramgate gateway. Loaded from environment
//! variables with the `GRAMGATE_` prefix (double underscore as section
//! separator), optionally seeded from a `.env` file by the binary.

use crate::errors::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// HTTP server configuration
    #[validate(nested)]
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[validate(nested)]
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Usage limit policy
    #[validate(nested)]
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Observability configuration
    #[validate(nested)]
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("GRAMGATE").separator("__").try_parsing(true),
            )
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.validate_all()?;
        Ok(app)
    }

    /// Validate the entire configuration
    pub fn validate_all(&self) -> Result<()> {
        Validate::validate(self).map_err(GatewayError::from)?;

        if !self.database.url.starts_with("sqlite:") && !self.database.url.starts_with("postgres") {
            return Err(GatewayError::config(
                "database URL must start with 'sqlite:' or 'postgres'",
            ));
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, message = "Port must be nonzero"))]
    pub port: u16,

    /// Public base URL used to assemble well-known metadata and challenge
    /// headers, e.g. `https://mcp.example.com`
    pub public_url: String,

    /// Install-page collaborator a browser GET on `/mcp/{slug}` redirects to
    pub install_page_url: String,

    /// In-flight request drain window on shutdown, seconds
    pub shutdown_drain_seconds: u64,

    /// Parallel component shutdown window, seconds
    pub shutdown_component_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_url: "http://127.0.0.1:8080".to_string(),
            install_page_url: "https://app.getgram.ai/mcp".to_string(),
            shutdown_drain_seconds: 60,
            shutdown_component_seconds: 30,
        }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_seconds)
    }

    pub fn component_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_component_seconds)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Connection (dial) deadline in milliseconds
    pub dial_timeout_ms: u64,

    /// Per-read deadline in milliseconds
    pub read_timeout_ms: u64,

    /// Per-write deadline in milliseconds
    pub write_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 10,
            dial_timeout_ms: 1_000,
            read_timeout_ms: 300,
            write_timeout_ms: 1_000,
        }
    }
}

impl DatabaseConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Usage limit policy.
///
/// The free-tier guard rejects tool calls once an organization exceeds
/// `multiplier x` its period allowance; organizations with no recorded
/// allowance fall back to `fallback_allowance`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LimitsConfig {
    /// Period tool-call allowance assumed when billing has none on record
    #[validate(range(min = 1, message = "Fallback allowance must be nonzero"))]
    pub free_tier_fallback_allowance: i64,

    /// Hard-stop multiplier applied to the period allowance
    #[validate(range(min = 1, message = "Multiplier must be at least 1"))]
    pub free_tier_multiplier: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { free_tier_fallback_allowance: 2_000, free_tier_multiplier: 2 }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log filter directive, e.g. `info,gramgate=debug`
    pub log_filter: String,

    /// Emit JSON log lines instead of the human-readable format
    pub json_logs: bool,

    /// Expose the Prometheus scrape endpoint
    pub enable_metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_filter: "info".to_string(), json_logs: false, enable_metrics: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_default_limits() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.free_tier_fallback_allowance, 2_000);
        assert_eq!(limits.free_tier_multiplier, 2);
    }

    #[test]
    fn test_database_deadlines() {
        let db = DatabaseConfig::default();
        assert_eq!(db.dial_timeout(), Duration::from_secs(1));
        assert_eq!(db.read_timeout(), Duration::from_millis(300));
        assert_eq!(db.write_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_database_url_rejected() {
        let mut config = AppConfig::default();
        config.database.url = "mysql://nope".to_string();
        assert!(config.validate_all().is_err());
    }

    #[test]
    fn test_bind_address() {
        let server = ServerConfig::default();
        assert_eq!(server.bind_address(), "127.0.0.1:8080");
    }
}
