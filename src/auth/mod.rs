//! Authentication and authorization.
//!
//! Four terminal states per request: anonymous public, OAuth-authenticated
//! public, API-key-authenticated private, session-authenticated private.

pub mod models;
pub mod resolver;

pub use models::{AuthContext, AuthKind, SCOPE_CHAT, SCOPE_CONSUMER};
pub use resolver::{bearer_token, AuthResolver};
