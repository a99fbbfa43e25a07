//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "platewatch")]
#[command(about = "License plate availability crawler")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "PLATEWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Shard label; omit for a full run
    #[arg(short, long, global = true, env = "PLATEWATCH_SHARD")]
    pub shard: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Subcommand)]
pub enum Commands {
    /// Crawl the selected stations and publish the results (default)
    #[default]
    Run,

    /// Wait for shard workers, then swap production
    Finalize {
        /// Shard labels to wait for, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        shards: Vec<String>,
        /// Give up after this many seconds
        #[arg(long, default_value = "3600")]
        wait_secs: u64,
        /// Seconds between metadata polls
        #[arg(long, default_value = "30")]
        poll_secs: u64,
    },

    /// Print the current sync status and the latest run summary
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_is_default() {
        let cli = Cli::try_parse_from(["platewatch", "--shard", "north"]).unwrap();
        assert_eq!(cli.shard.as_deref(), Some("north"));
        assert_eq!(cli.command.unwrap_or_default(), Commands::Run);
    }

    #[test]
    fn test_finalize_splits_shards() {
        let cli =
            Cli::try_parse_from(["platewatch", "finalize", "--shards", "a,b,c", "--wait-secs", "60"])
                .unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Finalize {
                shards: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                wait_secs: 60,
                poll_secs: 30,
            })
        );
    }

    #[test]
    fn test_finalize_requires_shards() {
        assert!(Cli::try_parse_from(["platewatch", "finalize"]).is_err());
    }

    #[test]
    fn test_status_accepts_global_shard() {
        let cli = Cli::try_parse_from(["platewatch", "status", "--shard", "south"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Status));
        assert_eq!(cli.shard.as_deref(), Some("south"));
    }
}
