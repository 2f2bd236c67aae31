use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{StoreArgs, SyncArgs};
use crate::retry::RetryConfig;
use crate::sync::{RunContext, DEFAULT_FRIENDS_PAGE_SIZE};

/// Resolved settings for a `sync` run.
pub struct Config {
    pub target: String,
    pub output: PathBuf,
    pub api_base: String,
    pub authorization: Option<String>,

    pub page_delay: Duration,
    pub timeout: Duration,
    pub retry_delay_secs: u64,

    pub page_size: u32,
    pub max_retries: u32,
    pub threads_num: u16,

    pub include_followings: bool,
    pub include_photos: bool,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("target", &self.target)
            .field("output", &self.output)
            .field("api_base", &self.api_base)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<redacted>"),
            )
            .field("include_followings", &self.include_followings)
            .field("include_photos", &self.include_photos)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Target id and output root, validated.
pub fn resolve_store(args: &StoreArgs) -> anyhow::Result<(String, PathBuf)> {
    let target = match args.target.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => anyhow::bail!("--target is required"),
    };
    Ok((target, expand_tilde(&args.output)))
}

impl Config {
    pub fn from_cli(cli: SyncArgs) -> anyhow::Result<Self> {
        let (target, output) = resolve_store(&cli.store)?;

        let authorization = cli
            .authorization
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        Ok(Self {
            target,
            output,
            api_base: cli.api_base,
            authorization,
            page_delay: Duration::from_secs(cli.page_delay_secs),
            timeout: Duration::from_secs(cli.timeout_secs),
            retry_delay_secs: cli.retry_delay,
            page_size: cli.page_size,
            max_retries: cli.max_retries,
            threads_num: cli.threads_num,
            include_followings: cli.include_user,
            include_photos: cli.include_photo,
            no_progress_bar: cli.no_progress_bar,
        })
    }

    pub fn run_context(&self) -> RunContext {
        RunContext {
            target: self.target.clone(),
            output: self.output.clone(),
            include_photos: self.include_photos,
            include_followings: self.include_followings,
            page_size: self.page_size,
            friends_page_size: DEFAULT_FRIENDS_PAGE_SIZE,
            page_delay: self.page_delay,
            retry: RetryConfig {
                max_attempts: self.max_retries,
                step_secs: self.retry_delay_secs,
            },
            photo_workers: self.threads_num as usize,
            no_progress_bar: self.no_progress_bar,
        }
    }
}
