use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "fanfou-backup",
    about = "Incrementally back up a Fanfou timeline, its photos and friends"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments for the default `sync` command
    #[command(flatten)]
    pub sync: SyncArgs,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch new and older statuses, then photos and friends (default)
    Sync(SyncArgs),
    /// Show what a backup store holds
    Status(StatusArgs),
}

impl Cli {
    /// The subcommand to run; a bare invocation means `sync`.
    pub fn effective_command(self) -> Command {
        self.command.unwrap_or(Command::Sync(self.sync))
    }
}

/// Where a backup lives. Shared by every command.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// User id whose timeline is backed up
    #[arg(short = 't', long)]
    pub target: Option<String>,

    /// Root directory for the store and photos
    #[arg(short = 'o', long, default_value = "output")]
    pub output: String,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Also refresh the target's friend profiles
    #[arg(short = 's', long = "include-user")]
    pub include_user: bool,

    /// Also download photos attached to statuses
    #[arg(short = 'i', long = "include-photo")]
    pub include_photo: bool,

    /// Statuses requested per timeline page
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=60))]
    pub page_size: u32,

    /// Seconds to wait between pages
    #[arg(long, default_value_t = 1)]
    pub page_delay_secs: u64,

    /// Concurrent photo downloads
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u16).range(1..))]
    pub threads_num: u16,

    /// Attempts per request, including the first
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_retries: u32,

    /// Seconds added to the wait before each further attempt
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,

    /// API root
    #[arg(long, default_value = "http://api.fanfou.com")]
    pub api_base: String,

    /// Pre-signed Authorization header value sent with API calls.
    /// Prefer the environment variable; flags show up in process listings.
    #[arg(long, env = "FANFOU_AUTHORIZATION", hide_env_values = true)]
    pub authorization: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Also list the N newest stored statuses
    #[arg(long, default_value_t = 0)]
    pub recent: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().effective_command()
    }

    #[test]
    fn test_bare_invocation_is_sync() {
        match parse(&["fanfou-backup", "-t", "alice", "-i"]) {
            Command::Sync(args) => {
                assert_eq!(args.store.target.as_deref(), Some("alice"));
                assert!(args.include_photo);
                assert!(!args.include_user);
                assert_eq!(args.page_size, 60);
                assert_eq!(args.threads_num, 8);
                assert_eq!(args.max_retries, 3);
                assert_eq!(args.retry_delay, 5);
            }
            other => panic!("expected sync, got {:?}", other),
        }
    }

    #[test]
    fn test_status_subcommand() {
        match parse(&["fanfou-backup", "status", "-t", "bob", "-o", "/tmp/b"]) {
            Command::Status(args) => {
                assert_eq!(args.store.target.as_deref(), Some("bob"));
                assert_eq!(args.store.output, "/tmp/b");
            }
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[test]
    fn test_log_level_is_global() {
        let cli = Cli::try_parse_from(["fanfou-backup", "status", "--log-level", "warn"]).unwrap();
        assert_eq!(cli.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_page_size_is_capped() {
        assert!(Cli::try_parse_from(["fanfou-backup", "--page-size", "61"]).is_err());
        assert!(Cli::try_parse_from(["fanfou-backup", "--page-size", "0"]).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(Cli::try_parse_from(["fanfou-backup", "--threads-num", "0"]).is_err());
    }
}
