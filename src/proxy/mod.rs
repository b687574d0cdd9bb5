//! Tool execution proxy.
//!
//! Planning, backend adapters, response capture and classification. The
//! executor is the single place that dereferences secrets and the only
//! writer of usage events.

pub mod capture;
pub mod content;
pub mod executor;
pub mod external;
pub mod planner;

pub use capture::ResponseCapture;
pub use executor::{
    ExecutionInput, FunctionBackend, FunctionInvocation, ProxyOutcome, ToolCallOutput,
    ToolProxyExecutor,
};
pub use external::ExternalMcpClient;
pub use planner::{plan_call, BillingKind, CallBinding, CallPlan};
