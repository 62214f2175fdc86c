//! Run configuration
//!
//! One [`SyncConfig`] value is built in `main` (defaults, then an optional
//! TOML file, then CLI flags) and handed to the coordinator.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::checksum::ChecksumType;
use crate::error::{ConfigError, TransportError};
use crate::fs_enum::FileFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Jsonl,
}

/// Longest uninterrupted sleep while backing off
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// How often a failed remote operation is attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay before the second attempt; doubles each time
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }

    /// Run `op` until it succeeds, attempts run out, or `cancel` is set.
    /// Only the last attempt's error is returned.
    pub fn run<T>(
        &self,
        cancel: &AtomicBool,
        mut op: impl FnMut() -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= attempts || cancel.load(Ordering::SeqCst) => return Err(e),
                Err(e) => {
                    if !Self::wait(self.backoff(attempt), cancel) {
                        return Err(e);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Sleep for `delay` in short steps; false if `cancel` was set meanwhile
    fn wait(delay: Duration, cancel: &AtomicBool) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if cancel.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// SSH login on every node
    pub user: String,
    /// Targets synced concurrently; 0 = one per CPU
    pub max_workers: usize,
    /// Prints the cluster's node addresses, whitespace separated
    pub inventory_command: Vec<String>,
    /// Prints this node's own addresses
    pub local_address_command: Vec<String>,
    /// Extra addresses that refer to this node
    pub local_addresses: Vec<String>,
    /// Fixed target list; when non-empty, discovery is skipped
    pub hosts: Vec<String>,
    pub ssh_program: String,
    pub ssh_options: Vec<String>,
    /// Probe, mkdir and digest timeout
    pub command_timeout_secs: u64,
    /// Per-file transfer timeout
    pub transfer_timeout_secs: u64,
    pub checksum: ChecksumType,
    /// Write to a temporary name and rename into place
    pub atomic_transfer: bool,
    pub retry: RetryPolicy,
    pub dry_run: bool,
    pub log_file: Option<PathBuf>,
    pub log_format: LogFormat,
    pub exclude_files: Vec<String>,
    pub exclude_dirs: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            user: "support".to_string(),
            max_workers: 4,
            inventory_command: vec!["hostips".to_string()],
            local_address_command: vec!["hostname".to_string(), "-I".to_string()],
            local_addresses: Vec::new(),
            hosts: Vec::new(),
            ssh_program: "ssh".to_string(),
            ssh_options: [
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-o",
                "BatchMode=yes",
                "-o",
                "LogLevel=ERROR",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            command_timeout_secs: 10,
            transfer_timeout_secs: 300,
            checksum: ChecksumType::Sha256,
            atomic_transfer: true,
            retry: RetryPolicy::default(),
            dry_run: false,
            log_file: Some(PathBuf::from("distribute.log")),
            log_format: LogFormat::Text,
            exclude_files: Vec::new(),
            exclude_dirs: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(data: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user.trim().is_empty() {
            return Err(ConfigError::Invalid("user must not be empty".into()));
        }
        if self.hosts.is_empty() && self.inventory_command.is_empty() {
            return Err(ConfigError::Invalid(
                "either hosts or inventory_command must be set".into(),
            ));
        }
        if self.command_timeout_secs == 0 || self.transfer_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least 1 second".into()));
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid("retry.attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        if self.max_workers == 0 {
            num_cpus::get()
        } else {
            self.max_workers
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn filter(&self) -> FileFilter {
        FileFilter {
            exclude_files: self.exclude_files.clone(),
            exclude_dirs: self.exclude_dirs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_defaults_validate() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.user, "support");
        assert_eq!(cfg.worker_count(), 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = SyncConfig::from_toml(
            r#"
            user = "admin"
            checksum = "blake3"
            hosts = ["10.0.0.1", "10.0.0.2"]

            [retry]
            attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.user, "admin");
        assert_eq!(cfg.checksum, ChecksumType::Blake3);
        assert_eq!(cfg.hosts.len(), 2);
        assert_eq!(cfg.retry.attempts, 3);
        assert_eq!(cfg.retry.backoff_ms, 500);
        assert_eq!(cfg.max_workers, 4);
        assert!(cfg.atomic_transfer);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(SyncConfig::from_toml("max_wrokers = 3").is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let err = SyncConfig::load(Path::new("/nonexistent/fanout.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fanout.toml"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = SyncConfig::default();
        cfg.command_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SyncConfig::default();
        cfg.inventory_command.clear();
        assert!(cfg.validate().is_err());
        cfg.hosts.push("10.0.0.9".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_means_cpus() {
        let cfg = SyncConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert!(cfg.worker_count() >= 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            attempts: 4,
            backoff_ms: 10,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
    }

    fn flaky_error() -> TransportError {
        TransportError::Io {
            op: "transfer",
            source: std::io::Error::new(std::io::ErrorKind::Other, "flaky"),
        }
    }

    #[test]
    fn test_retry_until_success() {
        let policy = RetryPolicy {
            attempts: 3,
            backoff_ms: 1,
        };
        let calls = Cell::new(0);
        let result = policy.run(&AtomicBool::new(false), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(flaky_error())
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_retry_gives_up() {
        let policy = RetryPolicy {
            attempts: 2,
            backoff_ms: 1,
        };
        let calls = Cell::new(0);
        let result: Result<(), _> = policy.run(&AtomicBool::new(false), || {
            calls.set(calls.get() + 1);
            Err(flaky_error())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_retry_stops_on_cancel() {
        let policy = RetryPolicy {
            attempts: 5,
            backoff_ms: 1,
        };
        let calls = Cell::new(0);
        let result: Result<(), _> = policy.run(&AtomicBool::new(true), || {
            calls.set(calls.get() + 1);
            Err(flaky_error())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_cancel_cuts_backoff_short() {
        let policy = RetryPolicy {
            attempts: 3,
            backoff_ms: 60_000,
        };
        let cancel = std::sync::Arc::new(AtomicBool::new(false));
        let setter = {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                cancel.store(true, Ordering::SeqCst);
            })
        };

        let started = Instant::now();
        let calls = Cell::new(0);
        let result: Result<(), _> = policy.run(&cancel, || {
            calls.set(calls.get() + 1);
            Err(flaky_error())
        });
        setter.join().unwrap();

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
