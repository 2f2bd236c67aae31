//! Photo download pool: a fixed number of workers draining a shared,
//! pre-computed task queue. Files already on disk are skipped, the photo
//! directory is created once on first need, and a cancelled token stops
//! workers from taking new tasks while in-flight downloads finish.

pub mod error;
pub mod file;
pub mod paths;

use std::collections::{HashSet, VecDeque};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::api::FeedApi;
use crate::retry::RetryConfig;
use crate::state::PhotoRef;

pub use error::DownloadError;

/// Subset of the run context consumed by the pool.
#[derive(Debug, Clone)]
pub struct PhotoPoolConfig {
    pub directory: PathBuf,
    pub workers: usize,
    pub retry: RetryConfig,
    pub no_progress_bar: bool,
}

/// Outcome counts of one pool run. `handled` counts both fresh downloads
/// and files that were already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhotoStats {
    pub handled: u64,
    pub downloaded: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl std::ops::AddAssign for PhotoStats {
    fn add_assign(&mut self, rhs: Self) {
        self.handled += rhs.handled;
        self.downloaded += rhs.downloaded;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
    }
}

/// A unit of work: one remote photo and where it lands locally.
#[derive(Debug, Clone)]
struct PhotoTask {
    url: String,
    download_path: PathBuf,
}

/// Build the task list, keeping the first reference for each file name.
fn build_tasks(directory: &std::path::Path, refs: Vec<PhotoRef>) -> Vec<PhotoTask> {
    let mut seen = HashSet::new();
    refs.into_iter()
        .filter_map(|photo| {
            let name = photo.file_name();
            if !seen.insert(name.clone()) {
                tracing::debug!(sid = photo.sid, "Duplicate photo file name {}, skipping", name);
                return None;
            }
            Some(PhotoTask {
                download_path: directory.join(name),
                url: photo.url,
            })
        })
        .collect()
}

/// Create a progress bar with a consistent template.
///
/// Hidden when disabled or stdout is not a TTY.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("valid template")
        .progress_chars("=> "),
    );
    pb
}

/// State shared by all workers of one pool run.
struct Shared {
    api: Arc<dyn FeedApi>,
    queue: Mutex<VecDeque<PhotoTask>>,
    directory: PathBuf,
    dir_ready: OnceCell<()>,
    retry: RetryConfig,
    token: CancellationToken,
    pb: ProgressBar,
}

impl Shared {
    fn next_task(&self) -> Option<PhotoTask> {
        if self.token.is_cancelled() {
            return None;
        }
        self.queue.lock().ok()?.pop_front()
    }

    /// Create the photo directory exactly once per run. Losing a creation
    /// race to another process still counts as success.
    async fn ensure_directory(&self) -> std::io::Result<()> {
        self.dir_ready
            .get_or_try_init(|| async {
                match tokio::fs::create_dir_all(&self.directory).await {
                    Err(e) if e.kind() != std::io::ErrorKind::AlreadyExists => Err(e),
                    _ => {
                        tracing::debug!("Photo directory ready: {}", self.directory.display());
                        Ok(())
                    }
                }
            })
            .await
            .map(|_| ())
    }

    async fn process(&self, task: &PhotoTask) -> Result<bool, DownloadError> {
        if tokio::fs::try_exists(&task.download_path).await? {
            tracing::debug!("Photo exists: {}", task.download_path.display());
            return Ok(false);
        }
        self.ensure_directory().await?;
        let bytes = file::download_file(
            self.api.as_ref(),
            &task.url,
            &task.download_path,
            &self.retry,
            &self.token,
        )
        .await?;
        tracing::debug!(bytes, "Downloaded {}", task.download_path.display());
        Ok(true)
    }
}

async fn worker(shared: Arc<Shared>) -> PhotoStats {
    let mut stats = PhotoStats::default();
    while let Some(task) = shared.next_task() {
        match shared.process(&task).await {
            Ok(true) => {
                stats.downloaded += 1;
                stats.handled += 1;
            }
            Ok(false) => {
                stats.skipped += 1;
                stats.handled += 1;
            }
            Err(e) => {
                shared.pb.suspend(|| {
                    tracing::error!("Download failed: {}: {}", task.download_path.display(), e);
                });
                stats.failed += 1;
            }
        }
        if let Some(name) = task.download_path.file_name() {
            shared.pb.set_message(name.to_string_lossy().into_owned());
        }
        shared.pb.inc(1);
    }
    stats
}

/// Download every referenced photo that is not already on disk.
///
/// Runs `config.workers` workers over the task queue and waits for all of
/// them. Per-file failures are logged and counted; they never abort the pool.
pub async fn download_all(
    api: Arc<dyn FeedApi>,
    refs: Vec<PhotoRef>,
    config: &PhotoPoolConfig,
    token: CancellationToken,
) -> PhotoStats {
    let started = Instant::now();
    let tasks = build_tasks(&config.directory, refs);
    if tasks.is_empty() {
        return PhotoStats::default();
    }

    let total = tasks.len();
    let worker_count = config.workers.clamp(1, total);
    let shared = Arc::new(Shared {
        api,
        queue: Mutex::new(tasks.into()),
        directory: config.directory.clone(),
        dir_ready: OnceCell::new(),
        retry: config.retry,
        token: token.clone(),
        pb: create_progress_bar(config.no_progress_bar, total as u64),
    });

    tracing::info!(
        workers = worker_count,
        "Checking {} photos in {}",
        total,
        config.directory.display()
    );

    let mut workers = JoinSet::new();
    for _ in 0..worker_count {
        workers.spawn(worker(Arc::clone(&shared)));
    }

    let mut stats = PhotoStats::default();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(worker_stats) => stats += worker_stats,
            Err(e) => tracing::error!("Photo worker panicked: {}", e),
        }
    }
    shared.pb.finish_and_clear();

    if token.is_cancelled() {
        tracing::info!(
            "Photo download interrupted: {} of {} handled",
            stats.handled,
            total
        );
    }
    tracing::info!(
        downloaded = stats.downloaded,
        skipped = stats.skipped,
        failed = stats.failed,
        "Photos done in {}s",
        started.elapsed().as_secs()
    );
    stats
}
