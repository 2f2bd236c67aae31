use std::path::PathBuf;

use thiserror::Error;

/// Failures of the on-disk status store.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Cannot open store {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// The file was written by a newer build; refusing to touch it.
    #[error("Store schema v{found} is newer than this build understands (v{expected})")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },

    #[error("Store migration failed: {0}")]
    Migration(#[from] rusqlite::Error),

    #[error("Store query failed: {0}")]
    Query(String),

    /// A stored `data` column no longer parses as JSON.
    #[error("Stored {key} is not valid JSON: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },

    #[error("Store worker failed: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    /// A previous store call panicked while holding the connection.
    #[error("Store connection is poisoned")]
    Poisoned,
}

impl StateError {
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }
}
