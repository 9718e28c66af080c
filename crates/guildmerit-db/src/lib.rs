pub mod audit_events;
pub mod cursors;
pub mod error;
pub mod events;
pub mod identity_links;
pub mod models;
pub mod pool;
pub mod scores;
pub mod storage;

// Re-export commonly used types
pub use error::{DbError, DbResult};
pub use models::IdentityLink;
pub use pool::{create_pool, run_migrations};
pub use storage::SqlStorage;
