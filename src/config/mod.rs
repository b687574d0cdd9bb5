//! # Configuration Management
//!
//! Environment-driven configuration for the gateway.

pub mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, LimitsConfig, ObservabilityConfig, ServerConfig,
};
