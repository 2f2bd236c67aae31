use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde_json::Value;

use super::parse::{list_from_json, status_from_json, user_from_json};
use super::{ApiError, ByteStream, FeedApi, TimelineCursor, TimelinePage};
use crate::state::UserRecord;

const DEFAULT_USER_AGENT: &str = concat!("fanfou-backup/", env!("CARGO_PKG_VERSION"));

/// JSON-over-HTTP adapter for the feed API.
///
/// One `reqwest::Client` is built per run and reused for API calls and
/// photo downloads alike. The `Authorization` value is attached to API calls
/// only; photo CDN URLs are fetched without it.
///
/// The timeout is client-wide and covers the whole exchange, body included,
/// so a photo server that stalls mid-body fails the attempt instead of
/// pinning a download worker.
pub struct HttpFeedApi {
    client: Client,
    base_url: String,
    authorization: Option<HeaderValue>,
}

impl std::fmt::Debug for HttpFeedApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFeedApi")
            .field("base_url", &self.base_url)
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl HttpFeedApi {
    pub fn new(
        base_url: &str,
        authorization: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let authorization = authorization
            .map(|v| {
                let mut value = HeaderValue::from_str(v)?;
                value.set_sensitive(true);
                Ok::<_, reqwest::header::InvalidHeaderValue>(value)
            })
            .transpose()?;

        let client = Client::builder()
            .default_headers(default_headers)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization,
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut builder = self.client.get(&url).query(query);
        if let Some(auth) = &self.authorization {
            builder = builder.header(AUTHORIZATION, auth.clone());
        }
        tracing::debug!(url = %url, ?query, "GET");

        let response = builder.send().await.map_err(ApiError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &url));
        }
        response.json::<Value>().await.map_err(ApiError::from_reqwest)
    }
}

#[async_trait::async_trait]
impl FeedApi for HttpFeedApi {
    async fn get_user(&self, id: &str) -> Result<UserRecord, ApiError> {
        let value = self
            .get_json("users/show.json", &[("id", id.to_string())])
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => ApiError::NotFound(format!("user {}", id)),
                other => other,
            })?;
        user_from_json(value)
    }

    async fn get_user_timeline(
        &self,
        target: &str,
        count: u32,
        cursor: TimelineCursor,
    ) -> Result<TimelinePage, ApiError> {
        let mut query = vec![("id", target.to_string()), ("count", count.to_string())];
        match cursor {
            TimelineCursor::Unbounded => {}
            TimelineCursor::SinceId(sid) => query.push(("since_id", sid.to_string())),
            TimelineCursor::MaxId(sid) => query.push(("max_id", sid.to_string())),
        }
        let value = self.get_json("statuses/user_timeline.json", &query).await?;
        let received = value.as_array().map_or(0, Vec::len);
        let statuses = list_from_json(value, status_from_json)?;
        Ok(TimelinePage { statuses, received })
    }

    async fn get_friends(
        &self,
        target: &str,
        page: u32,
        count: u32,
    ) -> Result<Vec<UserRecord>, ApiError> {
        let query = [
            ("id", target.to_string()),
            ("count", count.to_string()),
            ("page", page.to_string()),
        ];
        let value = self.get_json("users/friends.json", &query).await?;
        list_from_json(value, user_from_json)
    }

    async fn fetch_file(&self, url: &str) -> Result<ByteStream, ApiError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), url));
        }
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ApiError::from_reqwest))
            .boxed())
    }
}
