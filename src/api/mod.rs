//! Remote feed API seam.
//!
//! The sync engine only talks to [`FeedApi`]; [`HttpFeedApi`] is the
//! JSON-over-HTTP adapter used by the binary. Credentials are acquired
//! elsewhere and handed in as a ready `Authorization` header value.

pub mod error;
pub mod http;
pub mod parse;

pub use error::ApiError;
pub use http::HttpFeedApi;

use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::state::{StatusRecord, UserRecord};

/// Body of a remote file, delivered in chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, ApiError>>;

/// Which side of the stored timeline a page request extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineCursor {
    /// No bound: the newest page. Used to seed an empty store.
    Unbounded,
    /// Statuses strictly newer than this sid.
    SinceId(i64),
    /// Statuses strictly older than this sid.
    MaxId(i64),
}

/// One timeline response. `received` counts every entry the server sent,
/// including ones that failed to decode, so a page thinned by a bad record
/// is not mistaken for the end of the timeline.
#[derive(Debug, Clone, Default)]
pub struct TimelinePage {
    pub statuses: Vec<StatusRecord>,
    pub received: usize,
}

#[async_trait::async_trait]
pub trait FeedApi: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<UserRecord, ApiError>;

    async fn get_user_timeline(
        &self,
        target: &str,
        count: u32,
        cursor: TimelineCursor,
    ) -> Result<TimelinePage, ApiError>;

    async fn get_friends(
        &self,
        target: &str,
        page: u32,
        count: u32,
    ) -> Result<Vec<UserRecord>, ApiError>;

    async fn fetch_file(&self, url: &str) -> Result<ByteStream, ApiError>;
}
