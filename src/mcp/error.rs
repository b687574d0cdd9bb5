//! MCP Error Types
//!
//! Wire-facing error construction for the JSON-RPC dispatcher. The code for
//! gateway failures always comes from [`GatewayError::rpc_code`]; this module
//! only shapes the envelope.

use crate::errors::GatewayError;
use crate::mcp::protocol::{error_codes, JsonRpcError, JsonRpcResponse, RequestId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}: method does not exist or is not available")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("{method} is not allowed on this endpoint")]
    MethodNotAllowed { method: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl McpError {
    /// Convert to JSON-RPC error code
    pub fn error_code(&self) -> i32 {
        match self {
            McpError::ParseError(_) => error_codes::PARSE_ERROR,
            McpError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            McpError::InternalError(_) => error_codes::INTERNAL_ERROR,
            McpError::MethodNotAllowed { .. } => error_codes::METHOD_NOT_ALLOWED,
            McpError::Gateway(err) => err.rpc_code(),
        }
    }

    /// Convert to JsonRpcError with a client-safe message.
    pub fn to_json_rpc_error(&self) -> JsonRpcError {
        let message = match self {
            McpError::Gateway(err) => err.user_message(),
            other => other.to_string(),
        };
        JsonRpcError { code: self.error_code(), message, data: None }
    }

    /// Build a full error response carrying the originating request id.
    pub fn to_response(&self, id: Option<RequestId>) -> JsonRpcResponse {
        JsonRpcResponse::error(id, self.to_json_rpc_error())
    }
}

impl From<McpError> for JsonRpcError {
    fn from(error: McpError) -> Self {
        error.to_json_rpc_error()
    }
}

impl From<serde_json::Error> for McpError {
    fn from(error: serde_json::Error) -> Self {
        McpError::ParseError(error.to_string())
    }
}
