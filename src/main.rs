//! fanfou-backup: incremental local backup of a Fanfou user's timeline.
//!
//! Each run extends a per-user SQLite store in both directions: statuses
//! newer than the newest stored one, then statuses older than the oldest.
//! Photos attached to stored statuses and the user's friend profiles can be
//! mirrored too. Re-running is always safe; only missing data is fetched.

#![warn(clippy::all)]

mod api;
mod cli;
mod config;
mod download;
pub mod retry;
mod shutdown;
mod state;
mod sync;
#[cfg(test)]
mod testutil;
mod types;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use state::FeedStore;

/// Run the status command.
async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let (target, output) = config::resolve_store(&args.store)?;
    let db_path = download::paths::db_path(&output, &target);

    if !db_path.exists() {
        println!("No backup found at {}", db_path.display());
        println!("Run a sync first to create it.");
        return Ok(());
    }

    let store = state::SqliteFeedStore::open(&db_path).await?;
    let summary = store.get_summary().await?;

    println!("Backup of {}: {}", target, store.path().display());
    println!();
    println!("Statuses:");
    println!("  Total:       {}", summary.statuses);
    println!("  With photos: {}", summary.photo_statuses);
    if let (Some(newest), Some(oldest)) = (summary.newest_sid, summary.oldest_sid) {
        println!("  Range:       {} .. {}", oldest, newest);
    }
    println!("Friends:       {}", summary.users);
    println!();

    if let Some(started) = &summary.last_sync_started {
        println!(
            "Last sync started:   {}",
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(completed) = &summary.last_sync_completed {
        println!(
            "Last sync completed: {}{}",
            completed.format("%Y-%m-%d %H:%M:%S UTC"),
            if summary.last_sync_interrupted {
                " (interrupted)"
            } else {
                ""
            }
        );
    }

    if args.recent > 0 && summary.statuses > 0 {
        println!();
        println!("Newest statuses:");
        for status in store.all_statuses().await?.iter().take(args.recent) {
            let text = status
                .raw
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or("");
            println!(
                "  {} [{}] {}",
                status.sid,
                status.created_at.as_deref().unwrap_or("?"),
                text
            );
        }
    }

    Ok(())
}

async fn run_sync(args: cli::SyncArgs) -> anyhow::Result<()> {
    let config = config::Config::from_cli(args)?;
    tracing::debug!(?config, "Resolved configuration");
    tracing::info!(
        concurrency = config.threads_num,
        "Starting fanfou-backup for {}",
        config.target
    );

    let api = api::HttpFeedApi::new(
        &config.api_base,
        config.authorization.as_deref(),
        config.timeout,
    )?;
    let ctx = config.run_context();
    let shutdown_token = shutdown::install_signal_handler();

    let summary = sync::run_backup(&ctx, Arc::new(api), shutdown_token).await?;

    let photos = &summary.photos;
    let verb = if summary.interrupted {
        "stopped early"
    } else {
        "completed"
    };
    tracing::info!(
        statuses = summary.statuses,
        photos_downloaded = photos.downloaded,
        photos_skipped = photos.skipped,
        photos_failed = photos.failed,
        friends = summary.users,
        "Backup of {} {}",
        ctx.target,
        verb
    );
    if photos.failed > 0 {
        tracing::warn!(
            "{} photos failed to download; the next run retries them",
            photos.failed
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.effective_command() {
        Command::Status(args) => run_status(args).await,
        Command::Sync(args) => run_sync(args).await,
    }
}
