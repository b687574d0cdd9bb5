//! In-memory response capture.
//!
//! Backend adapters write their result into a [`ResponseCapture`] instead of
//! a network socket: status code, headers and body bytes land in a buffer the
//! executor then classifies. An adapter must write exactly once and must set
//! a `Content-Type`.

use bytes::Bytes;
use http::HeaderMap;

use crate::errors::{GatewayError, Result};
use crate::storage::FunctionMetrics;

/// Response headers carrying function execution metrics.
const METRIC_CPU_HEADER: &str = "x-gram-function-cpu-seconds";
const METRIC_MEMORY_HEADER: &str = "x-gram-function-memory-mb";
const METRIC_EXEC_HEADER: &str = "x-gram-function-exec-seconds";

/// Captured backend response.
#[derive(Debug, Default)]
pub struct ResponseCapture {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
    written: bool,
}

impl ResponseCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the backend response. Errors on a second write.
    pub fn write(&mut self, status: u16, headers: HeaderMap, body: Bytes) -> Result<()> {
        if self.written {
            return Err(GatewayError::unexpected("backend adapter wrote the response twice"));
        }
        self.status = status;
        self.headers = headers;
        self.body = body;
        self.written = true;
        Ok(())
    }

    pub fn is_written(&self) -> bool {
        self.written
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The declared content type, required from every adapter.
    pub fn content_type(&self) -> Result<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                GatewayError::unexpected("backend adapter did not set a content type")
            })
    }

    /// `isError` per the RPC contract: status outside 2xx.
    pub fn is_error(&self) -> bool {
        self.status < 200 || self.status >= 300
    }

    /// Extract optional function metrics from the response headers.
    ///
    /// Absent or unparsable headers yield `None` fields; a response with no
    /// metric headers at all yields `None`.
    pub fn function_metrics(&self) -> Option<FunctionMetrics> {
        let read = |name: &str| {
            self.headers.get(name).and_then(|v| v.to_str().ok()).and_then(|v| v.parse::<f64>().ok())
        };

        let metrics = FunctionMetrics {
            cpu_time_seconds: read(METRIC_CPU_HEADER),
            memory_mb: read(METRIC_MEMORY_HEADER),
            execution_time_seconds: read(METRIC_EXEC_HEADER),
        };

        if metrics == FunctionMetrics::default() {
            None
        } else {
            Some(metrics)
        }
    }
}

/// Build a header map with a single content type, the common adapter case.
pub fn content_type_headers(content_type: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = http::HeaderValue::from_str(content_type) {
        headers.insert(http::header::CONTENT_TYPE, value);
    }
    headers
}
