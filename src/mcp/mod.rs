//! MCP protocol surface.
//!
//! JSON-RPC envelope and wire types, the method dispatcher, session context
//! extraction, schema injection, the synthetic tool surfaces and the HTTP
//! transport.

pub mod error;
pub mod handler;
pub mod http;
pub mod protocol;
pub mod schema;
pub mod session_context;
pub mod synthetic;
pub mod wellknown;

pub use error::McpError;
pub use handler::{BatchOutcome, McpHandler, RequestContext};
pub use http::{build_router, AppState};
pub use session_context::SessionContext;
