//! Incremental timeline passes.
//!
//! The forward pass fetches statuses newer than the newest stored `sid`; the
//! backward pass fetches statuses older than the oldest stored `sid`. The
//! cursor is re-read from the store before every page, so an interrupted run
//! resumes exactly where the store left off.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use super::RunContext;
use crate::api::{self, FeedApi, TimelineCursor, TimelinePage};
use crate::retry;
use crate::state::{FeedStore, StatusRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Newer,
    Older,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Newer => "newer",
            Direction::Older => "older",
        }
    }
}

/// Fetch statuses newer than anything stored. A no-op on an empty store:
/// without an anchor there is no "newer", and the backward pass seeds it.
pub async fn sync_forward(
    ctx: &RunContext,
    api: &dyn FeedApi,
    store: &dyn FeedStore,
    token: &CancellationToken,
) -> Result<u64> {
    if store.latest_status().await?.is_none() {
        tracing::debug!("Store is empty, skipping the newer-statuses pass");
        return Ok(0);
    }
    run_pass(Direction::Newer, ctx, api, store, token).await
}

/// Fetch statuses older than anything stored, starting from the newest page
/// when the store is empty.
pub async fn sync_backward(
    ctx: &RunContext,
    api: &dyn FeedApi,
    store: &dyn FeedStore,
    token: &CancellationToken,
) -> Result<u64> {
    run_pass(Direction::Older, ctx, api, store, token).await
}

async fn current_cursor(direction: Direction, store: &dyn FeedStore) -> Result<TimelineCursor> {
    let cursor = match direction {
        Direction::Newer => store
            .latest_status()
            .await?
            .map(|s| TimelineCursor::SinceId(s.sid)),
        Direction::Older => store
            .oldest_status()
            .await?
            .map(|s| TimelineCursor::MaxId(s.sid)),
    };
    Ok(cursor.unwrap_or(TimelineCursor::Unbounded))
}

/// Drop statuses on the wrong side of the cursor so a pass can only ever
/// extend the stored range.
fn retain_beyond_cursor(page: &mut Vec<StatusRecord>, cursor: TimelineCursor) {
    let before = page.len();
    match cursor {
        TimelineCursor::SinceId(since) => page.retain(|s| s.sid > since),
        TimelineCursor::MaxId(max) => page.retain(|s| s.sid < max),
        TimelineCursor::Unbounded => {}
    }
    if page.len() < before {
        tracing::debug!(
            dropped = before - page.len(),
            ?cursor,
            "Ignoring statuses outside the requested range"
        );
    }
}

async fn run_pass(
    direction: Direction,
    ctx: &RunContext,
    api: &dyn FeedApi,
    store: &dyn FeedStore,
    token: &CancellationToken,
) -> Result<u64> {
    let mut total: u64 = 0;

    loop {
        if token.is_cancelled() {
            tracing::info!("Shutdown requested, stopping {} statuses pass", direction.label());
            break;
        }

        let cursor = current_cursor(direction, store).await?;
        let TimelinePage {
            statuses: mut page,
            received,
        } = retry::retry_with_backoff(&ctx.retry, token, api::error::classify, || {
            api.get_user_timeline(&ctx.target, ctx.page_size, cursor)
        })
        .await
        .with_context(|| {
            format!(
                "Fetching {} statuses of {} ({:?})",
                direction.label(),
                ctx.target,
                cursor
            )
        })?;

        if received == 0 {
            tracing::debug!("No more {} statuses", direction.label());
            break;
        }
        retain_beyond_cursor(&mut page, cursor);
        if page.is_empty() {
            tracing::warn!(
                "Page of {} {} statuses held nothing usable past {:?}, stopping",
                received,
                direction.label(),
                cursor
            );
            break;
        }

        let count = page.len() as u64;
        tracing::info!(
            "Saving {} statuses {}-{}...",
            direction.label(),
            total,
            total + count
        );
        store.upsert_statuses(&page).await?;
        total += count;

        if received < ctx.page_size as usize {
            break;
        }
        tokio::time::sleep(ctx.page_delay).await;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use crate::state::SqliteFeedStore;
    use crate::sync::tests::test_context;
    use crate::testutil::FakeFeedApi;
    use serde_json::json;

    fn status(sid: i64) -> StatusRecord {
        StatusRecord {
            sid,
            created_at: None,
            photo_url: None,
            raw: json!({"id": sid}),
        }
    }

    async fn seeded_store(sids: impl IntoIterator<Item = i64>) -> SqliteFeedStore {
        let store = SqliteFeedStore::open_in_memory().unwrap();
        let records: Vec<_> = sids.into_iter().map(status).collect();
        store.upsert_statuses(&records).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_forward_is_noop_on_empty_store() {
        let ctx = test_context();
        let api = FakeFeedApi::default().with_timeline(1..=100);
        let store = SqliteFeedStore::open_in_memory().unwrap();

        let n = sync_forward(&ctx, &api, &store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(n, 0);
        assert!(api.timeline_calls().is_empty());
    }

    #[tokio::test]
    async fn test_backward_seeds_empty_store() {
        let ctx = test_context();
        let api = FakeFeedApi::default().with_timeline(1..=150);
        let store = SqliteFeedStore::open_in_memory().unwrap();

        let n = sync_backward(&ctx, &api, &store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(n, 150);
        assert_eq!(store.status_count().await.unwrap(), 150);
        assert_eq!(
            api.timeline_calls(),
            vec![
                TimelineCursor::Unbounded,
                TimelineCursor::MaxId(91),
                TimelineCursor::MaxId(31),
            ]
        );
    }

    #[tokio::test]
    async fn test_backward_resumes_below_oldest() {
        let ctx = test_context();
        let api = FakeFeedApi::default().with_timeline(1..=200);
        let store = seeded_store(101..=200).await;

        let n = sync_backward(&ctx, &api, &store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(n, 100);
        assert_eq!(api.timeline_calls()[0], TimelineCursor::MaxId(101));
        assert_eq!(store.oldest_status().await.unwrap().unwrap().sid, 1);
    }

    #[tokio::test]
    async fn test_forward_catches_up_with_monotonic_pages() {
        let ctx = test_context();
        let api = FakeFeedApi::default().with_timeline(1..=250);
        let store = seeded_store([100]).await;

        let n = sync_forward(&ctx, &api, &store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(n, 150);
        assert_eq!(store.latest_status().await.unwrap().unwrap().sid, 250);
        // Each request starts strictly after the previous page's newest sid.
        assert_eq!(
            api.timeline_calls(),
            vec![
                TimelineCursor::SinceId(100),
                TimelineCursor::SinceId(160),
                TimelineCursor::SinceId(220),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_pages_end_with_one_empty_fetch() {
        let ctx = test_context();
        let api = FakeFeedApi::default().with_timeline(0..=120);
        let store = seeded_store([0]).await;

        let n = sync_forward(&ctx, &api, &store, &CancellationToken::new())
            .await
            .unwrap();

        // ceil(120 / 60) + 1 fetches.
        assert_eq!(n, 120);
        assert_eq!(api.timeline_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_short_page_stops_without_extra_fetch() {
        let ctx = test_context();
        let api = FakeFeedApi::default().with_timeline(0..=70);
        let store = seeded_store([0]).await;

        sync_forward(&ctx, &api, &store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(api.timeline_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_status_does_not_end_pass() {
        let ctx = test_context();
        let api = FakeFeedApi::default()
            .with_timeline(0..=120)
            .with_undecodable([30]);
        let store = seeded_store([0]).await;

        let n = sync_forward(&ctx, &api, &store, &CancellationToken::new())
            .await
            .unwrap();

        // The first page arrives one short after decoding but is still full.
        assert_eq!(n, 119);
        assert_eq!(api.timeline_calls().len(), 3);
        assert_eq!(store.latest_status().await.unwrap().unwrap().sid, 120);
    }

    #[tokio::test]
    async fn test_rerun_adds_no_duplicates() {
        let ctx = test_context();
        let api = FakeFeedApi::default().with_timeline(1..=130);
        let store = SqliteFeedStore::open_in_memory().unwrap();
        let token = CancellationToken::new();

        sync_backward(&ctx, &api, &store, &token).await.unwrap();
        sync_forward(&ctx, &api, &store, &token).await.unwrap();
        let count = store.status_count().await.unwrap();

        let again_back = sync_backward(&ctx, &api, &store, &token).await.unwrap();
        let again_fwd = sync_forward(&ctx, &api, &store, &token).await.unwrap();

        assert_eq!(count, 130);
        assert_eq!(again_back, 0);
        assert_eq!(again_fwd, 0);
        assert_eq!(store.status_count().await.unwrap(), 130);
    }

    #[tokio::test]
    async fn test_cancel_between_pages_keeps_completed_pages() {
        let ctx = test_context();
        let token = CancellationToken::new();
        // Five full pages newer than the anchor.
        let api = FakeFeedApi::default()
            .with_timeline(0..=300)
            .cancel_after_timeline_calls(2, token.clone());
        let store = seeded_store([0]).await;

        let n = sync_forward(&ctx, &api, &store, &token).await.unwrap();

        assert_eq!(n, 120);
        assert_eq!(api.timeline_calls().len(), 2);
        assert_eq!(store.status_count().await.unwrap(), 121);
        assert_eq!(store.latest_status().await.unwrap().unwrap().sid, 120);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_fetches_nothing() {
        let ctx = test_context();
        let token = CancellationToken::new();
        token.cancel();
        let api = FakeFeedApi::default().with_timeline(1..=10);
        let store = SqliteFeedStore::open_in_memory().unwrap();

        let n = sync_backward(&ctx, &api, &store, &token).await.unwrap();

        assert_eq!(n, 0);
        assert!(api.timeline_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let mut ctx = test_context();
        ctx.retry = RetryConfig::default();
        let api = FakeFeedApi::default()
            .with_timeline(1..=10)
            .failing_timeline(2);
        let store = SqliteFeedStore::open_in_memory().unwrap();

        let n = sync_backward(&ctx, &api, &store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(n, 10);
        assert_eq!(api.timeline_calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_abort_pass_and_keep_earlier_pages() {
        let mut ctx = test_context();
        ctx.retry = RetryConfig::default();
        let store = seeded_store(61..=120).await;
        let api = FakeFeedApi::default()
            .with_timeline(1..=120)
            .failing_timeline(3);

        let err = sync_backward(&ctx, &api, &store, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("connection reset"));
        assert_eq!(api.timeline_calls().len(), 3);
        assert_eq!(store.status_count().await.unwrap(), 60);
    }

    #[test]
    fn test_retain_beyond_cursor() {
        let mut page: Vec<_> = [12, 10, 8].into_iter().map(status).collect();
        retain_beyond_cursor(&mut page, TimelineCursor::SinceId(10));
        assert_eq!(page.iter().map(|s| s.sid).collect::<Vec<_>>(), vec![12]);

        let mut page: Vec<_> = [12, 10, 8].into_iter().map(status).collect();
        retain_beyond_cursor(&mut page, TimelineCursor::MaxId(10));
        assert_eq!(page.iter().map(|s| s.sid).collect::<Vec<_>>(), vec![8]);

        let mut page: Vec<_> = [12, 10].into_iter().map(status).collect();
        retain_beyond_cursor(&mut page, TimelineCursor::Unbounded);
        assert_eq!(page.len(), 2);
    }
}
