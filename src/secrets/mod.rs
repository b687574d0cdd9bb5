//! Secret handling primitives.
//!
//! Environments, API keys and OAuth tokens are carried as [`SecretString`]
//! values everywhere above the proxy layer.

pub mod types;

pub use types::SecretString;
