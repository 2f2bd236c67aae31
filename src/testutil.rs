//! In-memory [`FeedApi`] used by the engine tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::api::parse::{status_from_json, user_from_json};
use crate::api::{ApiError, ByteStream, FeedApi, TimelineCursor, TimelinePage};
use crate::state::{StatusRecord, UserRecord};

#[derive(Default)]
pub struct FakeFeedApi {
    /// Remote timeline sids, any order.
    timeline: Vec<i64>,
    photo_sids: HashSet<i64>,
    /// Sent by the server but undecodable on our side.
    undecodable: HashSet<i64>,
    friends: Vec<String>,
    missing_users: HashSet<String>,
    missing_photos: HashSet<String>,
    transient_timeline_failures: AtomicU32,
    cancel_after_timeline: Option<(usize, CancellationToken)>,
    cancel_after_fetch: Option<(usize, CancellationToken)>,
    timeline_calls: Mutex<Vec<TimelineCursor>>,
    friends_calls: Mutex<Vec<u32>>,
    fetches: Mutex<Vec<String>>,
}

impl FakeFeedApi {
    pub fn with_timeline(mut self, sids: impl IntoIterator<Item = i64>) -> Self {
        self.timeline = sids.into_iter().collect();
        self
    }

    pub fn with_photos(mut self, sids: impl IntoIterator<Item = i64>) -> Self {
        self.photo_sids = sids.into_iter().collect();
        self
    }

    pub fn with_undecodable(mut self, sids: impl IntoIterator<Item = i64>) -> Self {
        self.undecodable = sids.into_iter().collect();
        self
    }

    pub fn with_friends(mut self, count: usize) -> Self {
        self.friends = (0..count).map(|i| format!("friend{:04}", i)).collect();
        self
    }

    pub fn with_missing_user(mut self, id: &str) -> Self {
        self.missing_users.insert(id.to_string());
        self
    }

    pub fn with_missing_photo(mut self, url: &str) -> Self {
        self.missing_photos.insert(url.to_string());
        self
    }

    /// The next `n` timeline calls fail with a connection error.
    pub fn failing_timeline(self, n: u32) -> Self {
        self.transient_timeline_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Cancel `token` while serving the `n`th timeline call.
    pub fn cancel_after_timeline_calls(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after_timeline = Some((n, token));
        self
    }

    /// Cancel `token` while serving the `n`th file fetch.
    pub fn cancel_after_fetches(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after_fetch = Some((n, token));
        self
    }

    pub fn timeline_calls(&self) -> Vec<TimelineCursor> {
        self.timeline_calls.lock().unwrap().clone()
    }

    pub fn friends_calls(&self) -> Vec<u32> {
        self.friends_calls.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    fn status(&self, sid: i64) -> StatusRecord {
        let mut raw = json!({"id": sid, "text": format!("post {}", sid)});
        if self.photo_sids.contains(&sid) {
            raw["photo"] = json!({"largeurl": format!("http://p.example/{}.jpg", sid)});
        }
        status_from_json(raw).unwrap()
    }

    fn user(&self, id: &str) -> UserRecord {
        user_from_json(json!({
            "id": id,
            "screen_name": id.to_uppercase(),
            "statuses_count": self.timeline.len(),
            "friends_count": self.friends.len(),
        }))
        .unwrap()
    }
}

#[async_trait::async_trait]
impl FeedApi for FakeFeedApi {
    async fn get_user(&self, id: &str) -> Result<UserRecord, ApiError> {
        if self.missing_users.contains(id) {
            return Err(ApiError::NotFound(format!("user {}", id)));
        }
        Ok(self.user(id))
    }

    /// Pages behave like a forward-scanning API: `SinceId` yields the oldest
    /// `count` newer statuses, `MaxId` and `Unbounded` the newest `count`
    /// older ones. Each page is returned newest first.
    async fn get_user_timeline(
        &self,
        _target: &str,
        count: u32,
        cursor: TimelineCursor,
    ) -> Result<TimelinePage, ApiError> {
        let calls = {
            let mut calls = self.timeline_calls.lock().unwrap();
            calls.push(cursor);
            calls.len()
        };
        if let Some((n, token)) = &self.cancel_after_timeline {
            if calls == *n {
                token.cancel();
            }
        }
        let pending = self.transient_timeline_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_timeline_failures
                .store(pending - 1, Ordering::SeqCst);
            return Err(ApiError::Connection("connection reset by peer".into()));
        }

        let mut sids: Vec<i64> = self.timeline.clone();
        let count = count as usize;
        let page: Vec<i64> = match cursor {
            TimelineCursor::SinceId(since) => {
                sids.retain(|&s| s > since);
                sids.sort_unstable();
                sids.truncate(count);
                sids.reverse();
                sids
            }
            TimelineCursor::MaxId(max) => {
                sids.retain(|&s| s < max);
                sids.sort_unstable_by(|a, b| b.cmp(a));
                sids.truncate(count);
                sids
            }
            TimelineCursor::Unbounded => {
                sids.sort_unstable_by(|a, b| b.cmp(a));
                sids.truncate(count);
                sids
            }
        };
        Ok(TimelinePage {
            received: page.len(),
            statuses: page
                .into_iter()
                .filter(|sid| !self.undecodable.contains(sid))
                .map(|sid| self.status(sid))
                .collect(),
        })
    }

    async fn get_friends(
        &self,
        _target: &str,
        page: u32,
        count: u32,
    ) -> Result<Vec<UserRecord>, ApiError> {
        self.friends_calls.lock().unwrap().push(page);
        Ok(self
            .friends
            .iter()
            .skip(page as usize * count as usize)
            .take(count as usize)
            .map(|id| self.user(id))
            .collect())
    }

    async fn fetch_file(&self, url: &str) -> Result<ByteStream, ApiError> {
        let fetches = {
            let mut fetches = self.fetches.lock().unwrap();
            fetches.push(url.to_string());
            fetches.len()
        };
        if let Some((n, token)) = &self.cancel_after_fetch {
            if fetches == *n {
                token.cancel();
            }
        }
        if self.missing_photos.contains(url) {
            return Err(ApiError::from_status(404, url));
        }
        let body = Bytes::from(format!("photo:{}", url));
        Ok(futures_util::stream::iter(vec![Ok(body)]).boxed())
    }
}
