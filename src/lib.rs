//! # gramgate
//!
//! An MCP (Model Context Protocol) gateway server: a JSON-RPC 2.0 endpoint
//! exposing curated toolsets (tools, prompts, resources) to remote LLM
//! clients, proxying invocations to HTTP, function, prompt-template and
//! external-MCP backends with per-client session continuity,
//! authentication, billing guards and observability.
//!
//! ## Architecture
//!
//! ```text
//! HTTP transport → JSON-RPC dispatcher → auth resolver → snapshot cache
//!        ↓                  ↓                  ↓
//! Session context      Tool planner      Proxy executor → backend adapters
//!        ↓                                     ↓
//! Session persistence (detached)      Billing + metrics (detached)
//! ```
//!
//! ## Core modules
//!
//! - [`mcp`]: protocol envelope, method dispatcher, HTTP transport,
//!   well-known OAuth metadata
//! - [`proxy`]: call planning, backend adapters, response capture and
//!   classification
//! - [`auth`]: four-state per-request authentication resolution
//! - [`services`]: snapshot projection/caching, usage limits, session
//!   persistence, semantic tool search
//! - [`storage`]: collaborator contracts, SQLite repositories, in-memory
//!   fakes

pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod mcp;
pub mod observability;
pub mod proxy;
pub mod secrets;
pub mod services;
pub mod startup;
pub mod storage;

pub use config::AppConfig;
pub use errors::{Error, GatewayError, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_identity() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "gramgate");
    }
}
