//! Gateway services.
//!
//! Snapshot projection and caching, usage limits, session persistence, and
//! dynamic-mode search orchestration.

pub mod search;
pub mod session_writer;
pub mod snapshot;
pub mod toolset_cache;
pub mod usage;

pub use search::ToolSearchService;
pub use session_writer::{SessionPersistRecord, SessionWriter};
pub use snapshot::{project_snapshot, EffectiveTool, ToolsetSnapshot};
pub use toolset_cache::ToolsetCache;
pub use usage::UsageGuard;
