//! Full refresh of the target's friend profiles.
//!
//! The friends listing has no stable increasing id to use as a cursor, so
//! every run walks it by page index from the start and overwrites what the
//! store holds.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use super::RunContext;
use crate::api::{self, FeedApi};
use crate::retry;
use crate::state::FeedStore;

pub async fn sync_followings(
    ctx: &RunContext,
    api: &dyn FeedApi,
    store: &dyn FeedStore,
    token: &CancellationToken,
) -> Result<u64> {
    let mut total: u64 = 0;
    let mut page: u32 = 0;

    while !token.is_cancelled() {
        let users = retry::retry_with_backoff(&ctx.retry, token, api::error::classify, || {
            api.get_friends(&ctx.target, page, ctx.friends_page_size)
        })
        .await
        .with_context(|| format!("Fetching friends of {} (page {})", ctx.target, page))?;

        if users.is_empty() {
            break;
        }
        let count = users.len() as u64;
        tracing::info!("Saving profiles {}-{}...", total, total + count);
        store.upsert_users(&users).await?;
        total += count;
        page += 1;

        if users.len() < ctx.friends_page_size as usize {
            break;
        }
        tokio::time::sleep(ctx.page_delay).await;
    }

    if token.is_cancelled() {
        tracing::info!("Shutdown requested, stopped friends refresh after {} profiles", total);
    }
    Ok(total)
}
