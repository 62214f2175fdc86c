//! Error types for the distributor
//!
//! Only [`DiscoveryError`] (and configuration problems) abort a run. Every
//! other failure is folded into a per-file outcome by the target worker.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure to run a local process (ssh, inventory command, ...)
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` failed while running: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` timed out after {:.1}s", .timeout.as_secs_f64())]
    Timeout { program: String, timeout: Duration },

    #[error("cannot open stdin file {path}: {source}")]
    Stdin {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start process runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Node inventory could not be obtained; fatal for the whole run
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("inventory command is empty")]
    EmptyCommand,

    #[error("inventory command unavailable: {0}")]
    Exec(#[from] ExecError),

    #[error("inventory command `{program}` exited with status {code}: {stderr}")]
    NonZeroExit {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("inventory command `{program}` killed by signal {signal}")]
    Killed { program: String, signal: i32 },
}

/// A remote operation against one target failed
#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("{op} on {address} exited with status {code}: {stderr}")]
    Remote {
        op: &'static str,
        address: String,
        code: i32,
        stderr: String,
    },

    #[error("{op} on {address} killed by signal {signal}")]
    Killed {
        op: &'static str,
        address: String,
        signal: i32,
    },

    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected {op} output from {address}: {output:?}")]
    Protocol {
        op: &'static str,
        address: String,
        output: String,
    },
}

/// Local source file problems discovered while fingerprinting
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("local file missing: {}", .0.display())]
    Missing(PathBuf),

    #[error("cannot read {}: {message}", .path.display())]
    Unreadable { path: PathBuf, message: String },
}

impl SourceError {
    pub fn from_io(path: PathBuf, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            SourceError::Missing(path)
        } else {
            SourceError::Unreadable {
                path,
                message: err.to_string(),
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that stop a distribution run before any target is touched
#[derive(Error, Debug)]
pub enum DistributeError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
