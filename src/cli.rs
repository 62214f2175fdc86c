//! Command-line arguments for `distribute`

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::checksum::ChecksumType;
use crate::config::{LogFormat, SyncConfig};

/// Push a directory tree to every node in the cluster, copying only new or
/// changed files.
#[derive(Clone, Debug, Parser)]
#[command(name = "distribute", author, version, about)]
pub struct Args {
    /// Local directory to distribute
    pub source: PathBuf,

    /// Destination directory on every node
    pub destination: String,

    /// SSH user on the nodes (default: support)
    pub user: Option<String>,

    /// Number of nodes synced in parallel (default: 4, 0 = one per CPU)
    pub max_workers: Option<usize>,

    /// TOML configuration file; command-line flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Compare checksums and report what would change, but copy nothing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Sync to this node instead of running the inventory command (repeatable)
    #[arg(long = "host", action = ArgAction::Append)]
    pub hosts: Vec<String>,

    /// Checksum algorithm used to detect changes
    #[arg(long, value_enum)]
    pub checksum: Option<ChecksumType>,

    /// Timeout in seconds for directory checks, mkdir and remote checksums
    #[arg(long = "timeout")]
    pub command_timeout: Option<u64>,

    /// Timeout in seconds for each file transfer
    #[arg(long)]
    pub transfer_timeout: Option<u64>,

    /// Attempts per remote operation (1 = no retry)
    #[arg(long)]
    pub retries: Option<u32>,

    /// Write directly to the final path instead of temp file + rename
    #[arg(long)]
    pub no_atomic: bool,

    /// Append the decision log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Decision log format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Do not write a decision log
    #[arg(long, conflicts_with = "log_file")]
    pub no_log: bool,

    /// Exclude files matching patterns
    #[arg(long = "xf", action = ArgAction::Append)]
    pub exclude_files: Vec<String>,

    /// Exclude directories matching patterns
    #[arg(long = "xd", action = ArgAction::Append)]
    pub exclude_dirs: Vec<String>,

    /// No per-file console output
    #[arg(short, long)]
    pub quiet: bool,

    /// Also print files that were already identical
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Layer the command line over `config`
    pub fn apply(&self, config: &mut SyncConfig) {
        if let Some(user) = &self.user {
            config.user = user.clone();
        }
        if let Some(n) = self.max_workers {
            config.max_workers = n;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if !self.hosts.is_empty() {
            config.hosts = self.hosts.clone();
        }
        if let Some(c) = self.checksum {
            config.checksum = c;
        }
        if let Some(t) = self.command_timeout {
            config.command_timeout_secs = t;
        }
        if let Some(t) = self.transfer_timeout {
            config.transfer_timeout_secs = t;
        }
        if let Some(r) = self.retries {
            config.retry.attempts = r;
        }
        if self.no_atomic {
            config.atomic_transfer = false;
        }
        if self.no_log {
            config.log_file = None;
        } else if let Some(p) = &self.log_file {
            config.log_file = Some(p.clone());
        }
        if let Some(f) = self.log_format {
            config.log_format = f;
        }
        config.exclude_files.extend(self.exclude_files.iter().cloned());
        config.exclude_dirs.extend(self.exclude_dirs.iter().cloned());
    }
}
