//! Records held by the persistent store.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// One timeline post. Identity is `sid`, which increases monotonically
/// within a user's feed and doubles as the incremental-fetch cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub sid: i64,
    pub created_at: Option<String>,
    /// Large photo URL when the post carries an image.
    pub photo_url: Option<String>,
    /// The document exactly as the API returned it.
    pub raw: Value,
}

impl StatusRecord {
    pub fn photo(&self) -> Option<PhotoRef> {
        self.photo_url.as_ref().map(|url| PhotoRef {
            sid: self.sid,
            url: url.clone(),
        })
    }
}

/// A friend profile snapshot. Overwritten on every followings refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub screen_name: Option<String>,
    pub statuses_count: Option<u64>,
    pub friends_count: Option<u64>,
    pub raw: Value,
}

/// A photo to mirror, derived from a stored status. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhotoRef {
    pub sid: i64,
    pub url: String,
}

impl PhotoRef {
    /// Deterministic local file name: `<sid>.<ext>`.
    ///
    /// The extension comes from the last path segment of the URL, ignoring
    /// query strings and `@`-style resize suffixes; anything that doesn't look
    /// like a short alphanumeric extension falls back to `jpg`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.sid, url_extension(&self.url).unwrap_or("jpg"))
    }
}

fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next()?;
    let segment = segment.split('@').next().unwrap_or(segment);
    let (_, ext) = segment.rsplit_once('.')?;
    let valid = (1..=4).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}

/// Statistics for a single backup run.
#[derive(Debug, Clone, Default)]
pub struct SyncRunStats {
    pub statuses_fetched: u64,
    pub photos_downloaded: u64,
    pub users_fetched: u64,
    /// Whether the run was cancelled or aborted by an error.
    pub interrupted: bool,
}

/// Summary of the current store contents.
#[derive(Debug, Clone)]
pub struct StoreSummary {
    pub statuses: u64,
    pub photo_statuses: u64,
    pub users: u64,
    pub newest_sid: Option<i64>,
    pub oldest_sid: Option<i64>,
    pub last_sync_started: Option<DateTime<Utc>>,
    pub last_sync_completed: Option<DateTime<Utc>>,
    pub last_sync_interrupted: bool,
}
