//! # Error Types
//!
//! Error types for the gramgate gateway using `thiserror`.
//!
//! Every failure surfaced to a client goes through [`GatewayError::rpc_code`],
//! the single point of truth for JSON-RPC wire code selection. Handlers raise
//! the internal kind; the mapper decides the code.

use crate::mcp::protocol::error_codes;

/// Custom result type for gramgate operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    /// Malformed request body or envelope
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Structurally valid request with invalid parameters
    #[error("Invalid: {message}")]
    Invalid { message: String, field: Option<String> },

    /// Missing or unusable credentials
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Valid credentials, insufficient rights or exhausted quota
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Referenced entity does not exist (or must appear not to)
    #[error("Not found: {resource_type} '{id}'")]
    NotFound { resource_type: String, id: String },

    /// State conflict (duplicate slug, stale version)
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Backend produced a content type the gateway cannot shape
    #[error("Unsupported media type: {content_type}")]
    UnsupportedMedia { content_type: String },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Everything else; never shown verbatim to clients
    #[error("Internal server error: {message}")]
    Unexpected {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl GatewayError {
    /// Create a bad-request error
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest { message: message.into() }
    }

    /// Create a validation error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn invalid_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Invalid { message: message.into(), field: Some(field.into()) }
    }

    /// Create an unauthorized error
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    /// Create a forbidden error
    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden { message: message.into() }
    }

    /// Create a not-found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict { message: message.into() }
    }

    /// Create an unsupported-media error
    pub fn unsupported_media<S: Into<String>>(content_type: S) -> Self {
        Self::UnsupportedMedia { content_type: content_type.into() }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create an internal error
    pub fn unexpected<S: Into<String>>(message: S) -> Self {
        Self::Unexpected { message: message.into(), source: None }
    }

    /// Create an internal error with source
    pub fn unexpected_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Unexpected { message: message.into(), source: Some(source) }
    }

    /// Map this error to its JSON-RPC wire code.
    ///
    /// Single point of truth: bad-request maps to the parse code, invalid to
    /// invalid-params, the authorization/state family to invalid-request, and
    /// everything unexpected to internal-error.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::BadRequest { .. } => error_codes::PARSE_ERROR,
            Self::Invalid { .. } => error_codes::INVALID_PARAMS,
            Self::Unauthorized { .. }
            | Self::Forbidden { .. }
            | Self::NotFound { .. }
            | Self::Conflict { .. }
            | Self::UnsupportedMedia { .. } => error_codes::INVALID_REQUEST,
            Self::Database { .. }
            | Self::Serialization { .. }
            | Self::Config { .. }
            | Self::Unexpected { .. } => error_codes::INTERNAL_ERROR,
        }
    }

    /// HTTP status used when the error must surface at the transport layer
    /// (OAuth challenges, unknown slugs) rather than inside a 200 envelope.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } | Self::Invalid { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::UnsupportedMedia { .. } => 415,
            Self::Database { .. }
            | Self::Serialization { .. }
            | Self::Config { .. }
            | Self::Unexpected { .. } => 500,
        }
    }

    /// One-line message safe to show a client, without the internal kind
    /// prefix. Internal detail stays in logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message }
            | Self::Unauthorized { message }
            | Self::Forbidden { message }
            | Self::Conflict { message }
            | Self::Invalid { message, .. } => message.clone(),
            Self::NotFound { resource_type, id } => {
                format!("{} '{}' not found", resource_type, id)
            }
            Self::UnsupportedMedia { content_type } => {
                format!("unsupported content type: {}", content_type)
            }
            Self::Database { .. }
            | Self::Serialization { .. }
            | Self::Config { .. }
            | Self::Unexpected { .. } => "internal server error".to_string(),
        }
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for GatewayError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "database operation failed".to_string() }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(error: config::ConfigError) -> Self {
        Self::Config { message: "configuration loading failed".to_string(), source: Some(Box::new(error)) }
    }
}

impl From<validator::ValidationErrors> for GatewayError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::invalid(format!("validation failed: {}", message))
    }
}
