//! Persistent store for the mirrored feed.
//!
//! One SQLite database per target user holds:
//! - Statuses keyed by `sid`, the cursor source for incremental passes
//! - Friend profiles keyed by user id (full refresh, latest wins)
//! - A `sync_runs` audit trail used by the `status` command

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{FeedStore, SqliteFeedStore};
pub use error::StateError;
pub use types::{PhotoRef, StatusRecord, StoreSummary, SyncRunStats, UserRecord};
