use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::error::DownloadError;
use crate::api::FeedApi;
use crate::retry::{self, RetryAction, RetryConfig};

/// `<final name>.part`, next to the destination.
fn temp_download_path(download_path: &Path) -> PathBuf {
    let mut name = download_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    download_path.with_file_name(name)
}

/// Stream `url` into `download_path` via a `.part` temp file.
///
/// The destination only ever appears fully written: the body goes to the
/// `.part` file, which is renamed into place once the stream ends. Each
/// attempt starts the `.part` file from scratch. Transient fetch errors are
/// retried per `retry_config`.
pub async fn download_file(
    api: &dyn FeedApi,
    url: &str,
    download_path: &Path,
    retry_config: &RetryConfig,
    token: &CancellationToken,
) -> Result<u64, DownloadError> {
    let part_path = temp_download_path(download_path);

    let result = retry::retry_with_backoff(
        retry_config,
        token,
        |e: &DownloadError| {
            if e.is_retryable() {
                RetryAction::Retry
            } else {
                RetryAction::Abort
            }
        },
        || async {
            let _ = fs::remove_file(&part_path).await;
            attempt_download(api, url, download_path, &part_path).await
        },
    )
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&part_path).await;
    }
    result
}

async fn attempt_download(
    api: &dyn FeedApi,
    url: &str,
    download_path: &Path,
    part_path: &Path,
) -> Result<u64, DownloadError> {
    let fetch_err = |source| DownloadError::Fetch {
        url: url.to_string(),
        source,
    };
    let mut stream = api.fetch_file(url).await.map_err(fetch_err)?;

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part_path)
        .await?;

    let mut bytes_written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::warn!(
                "Body error for {} after {} bytes: {}",
                download_path.display(),
                bytes_written,
                e
            );
            fetch_err(e)
        })?;
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    fs::rename(part_path, download_path).await?;

    Ok(bytes_written)
}
