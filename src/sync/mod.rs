//! Backup run orchestration.
//!
//! A run resolves the target user, opens that user's store, then runs the
//! stages strictly in order: newer statuses, older statuses, photos (opt-in),
//! friend profiles (opt-in). Stages share nothing but the store, the API
//! client and the cancellation token; their counts are folded into a
//! [`BackupSummary`].

pub mod followings;
pub mod timeline;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::api::{self, ApiError, FeedApi};
use crate::download::{self, paths, PhotoPoolConfig, PhotoStats};
use crate::retry::{self, RetryConfig};
use crate::state::{FeedStore, SqliteFeedStore, StatusRecord, SyncRunStats};

/// Statuses per timeline page.
pub const DEFAULT_PAGE_SIZE: u32 = 60;
/// Profiles per friends page.
pub const DEFAULT_FRIENDS_PAGE_SIZE: u32 = 100;
pub const DEFAULT_PHOTO_WORKERS: usize = 8;

/// Immutable settings for one backup run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub target: String,
    pub output: PathBuf,
    pub include_photos: bool,
    pub include_followings: bool,
    pub page_size: u32,
    pub friends_page_size: u32,
    /// Pause between pages, for the API's rate limit.
    pub page_delay: Duration,
    pub retry: RetryConfig,
    pub photo_workers: usize,
    pub no_progress_bar: bool,
}

impl RunContext {
    pub fn db_path(&self) -> PathBuf {
        paths::db_path(&self.output, &self.target)
    }

    pub fn photo_dir(&self) -> PathBuf {
        paths::photo_dir(&self.output, &self.target)
    }

    fn pool_config(&self) -> PhotoPoolConfig {
        PhotoPoolConfig {
            directory: self.photo_dir(),
            workers: self.photo_workers,
            retry: self.retry,
            no_progress_bar: self.no_progress_bar,
        }
    }
}

/// What a run accomplished, for the driver to report.
#[derive(Debug, Clone, Default)]
pub struct BackupSummary {
    pub statuses: u64,
    pub photos: PhotoStats,
    pub users: u64,
    pub interrupted: bool,
}

impl BackupSummary {
    fn run_stats(&self) -> SyncRunStats {
        SyncRunStats {
            statuses_fetched: self.statuses,
            photos_downloaded: self.photos.downloaded,
            users_fetched: self.users,
            interrupted: self.interrupted,
        }
    }
}

/// Run one complete backup of `ctx.target`.
///
/// Fails before touching the store when the target can't be resolved.
/// A failing stage aborts the run; statuses stored by earlier pages stay in
/// place and the next run resumes from them.
pub async fn run_backup(
    ctx: &RunContext,
    api: Arc<dyn FeedApi>,
    token: CancellationToken,
) -> Result<BackupSummary> {
    let user = match retry::retry_with_backoff(&ctx.retry, &token, api::error::classify, || {
        api.get_user(&ctx.target)
    })
    .await
    {
        Ok(user) => user,
        Err(ApiError::NotFound(_)) => anyhow::bail!("User {} does not exist", ctx.target),
        Err(e) => {
            return Err(e).with_context(|| format!("Cannot fetch user {}", ctx.target));
        }
    };
    tracing::info!(
        "User {} has {} statuses and {} friends",
        user.id,
        user.statuses_count.unwrap_or(0),
        user.friends_count.unwrap_or(0)
    );

    tokio::fs::create_dir_all(&ctx.output)
        .await
        .with_context(|| format!("Creating output directory {}", ctx.output.display()))?;
    let db_path = ctx.db_path();
    let store = SqliteFeedStore::open(&db_path).await?;
    tracing::info!("Backing up {} into {}", ctx.target, ctx.output.display());

    let existing = store.status_count().await?;
    if existing > 0 {
        let friends = store.user_count().await?;
        tracing::info!(
            "Store already holds {} statuses and {} friends",
            existing,
            friends
        );
    }

    let run_id = store.start_sync_run().await?;
    let mut summary = BackupSummary::default();
    let outcome = run_stages(ctx, &api, &store, &token, &mut summary).await;

    summary.interrupted = outcome.is_err() || token.is_cancelled();
    if let Err(e) = store.complete_sync_run(run_id, &summary.run_stats()).await {
        tracing::warn!("Failed to record sync run: {}", e);
    }
    outcome?;

    Ok(summary)
}

async fn run_stages(
    ctx: &RunContext,
    api: &Arc<dyn FeedApi>,
    store: &dyn FeedStore,
    token: &CancellationToken,
    summary: &mut BackupSummary,
) -> Result<()> {
    summary.statuses += timeline::sync_forward(ctx, api.as_ref(), store, token).await?;
    summary.statuses += timeline::sync_backward(ctx, api.as_ref(), store, token).await?;

    if ctx.include_photos && !token.is_cancelled() {
        let refs: Vec<_> = store
            .photo_statuses()
            .await?
            .iter()
            .filter_map(StatusRecord::photo)
            .collect();
        if refs.is_empty() {
            tracing::info!("No photos in {}'s timeline", ctx.target);
        } else {
            summary.photos =
                download::download_all(Arc::clone(api), refs, &ctx.pool_config(), token.clone())
                    .await;
        }
    }

    if ctx.include_followings && !token.is_cancelled() {
        tracing::info!("Refreshing {}'s friends...", ctx.target);
        summary.users = followings::sync_followings(ctx, api.as_ref(), store, token).await?;
    }

    Ok(())
}
