use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Linear backoff configuration for remote calls.
///
/// The wait before attempt `n` (0-indexed) is `n * step_secs`, so the first
/// call goes out immediately and later attempts wait 5s, 10s, ...
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub step_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step_secs: 5,
        }
    }
}

impl RetryConfig {
    /// Delay before the given attempt (0-indexed).
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.step_secs.saturating_mul(attempt as u64))
    }
}

/// Retry an async operation with linear backoff.
///
/// - `config`: retry configuration
/// - `token`: checked before every retry; a cancelled run stops retrying
/// - `classifier`: inspects an error and returns `Retry` or `Abort`
/// - `operation`: the async closure to retry
///
/// Returns the first `Ok` result, or the last error if attempts are exhausted,
/// the classifier returns `Abort`, or the token is cancelled.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    token: &CancellationToken,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };
        if classifier(&err) == RetryAction::Abort {
            return Err(err);
        }
        attempt += 1;
        if attempt >= total_attempts {
            tracing::warn!("Giving up after {} attempts: {}", total_attempts, err);
            return Err(err);
        }
        if token.is_cancelled() {
            tracing::debug!("Shutdown requested, not retrying: {}", err);
            return Err(err);
        }
        let delay = config.delay_before_attempt(attempt);
        tracing::warn!(
            "Connection failed (attempt {}/{}), retrying in {}s: {}",
            attempt,
            total_attempts,
            delay.as_secs(),
            err
        );
        tokio::time::sleep(delay).await;
    }
}
