//! Observability stack.
//!
//! Structured logging via `tracing` and Prometheus metrics via the `metrics`
//! facade. Handlers record through [`MetricsRecorder`] so metric names stay
//! in one place.

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::{init_metrics, MetricsRecorder};
