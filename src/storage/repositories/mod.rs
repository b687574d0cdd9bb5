//! SQLite repository implementations.

pub mod chat;
pub mod toolset;
pub mod usage;

pub use chat::SqliteChatRepository;
pub use toolset::SqliteToolsetRepository;
pub use usage::SqliteBillingRepository;
