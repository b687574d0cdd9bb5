//! # Error Handling
//!
//! Error types for the gramgate gateway, built on `thiserror`. The JSON-RPC
//! wire code for any failure comes from [`GatewayError::rpc_code`] so that
//! handlers never pick codes themselves.

pub mod types;

pub use types::{GatewayError, Result};

/// Alias kept for signature brevity in handler-heavy modules.
pub type Error = GatewayError;
