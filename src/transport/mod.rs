//! Remote operations against one destination node
//!
//! The worker only talks to a [`Transport`]; [`SshTransport`] drives the real
//! cluster, [`LocalTransport`] maps every target to a local directory.

mod local;
mod ssh;

pub use local::LocalTransport;
pub use ssh::{SshSettings, SshTransport};

use serde::Serialize;
use std::path::Path;

use crate::checksum::{ChecksumType, RemoteDigest};
use crate::error::TransportError;

/// One destination node for a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Target {
    pub address: String,
    pub user: String,
    /// Destination root directory on the node
    pub root: String,
}

impl Target {
    pub fn new(address: impl Into<String>, user: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user: user.into(),
            root: root.into(),
        }
    }

    /// `user@address` as understood by ssh
    pub fn login(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }

    /// Absolute destination path for a slash-separated relative path
    pub fn remote_path(&self, rel: &str) -> String {
        if rel.is_empty() {
            return self.root.clone();
        }
        let root = self.root.trim_end_matches('/');
        if root.is_empty() && self.root.starts_with('/') {
            format!("/{}", rel)
        } else if root.is_empty() {
            rel.to_string()
        } else {
            format!("{}/{}", root, rel)
        }
    }
}

/// Result of making sure a directory exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirStatus {
    Existed,
    Created,
    /// Exists now; the transport cannot tell whether it was just created
    Ensured,
}

pub trait Transport: Send + Sync {
    fn dir_exists(&self, target: &Target, path: &str) -> Result<bool, TransportError>;

    /// Create a directory and any missing parents. Must be idempotent.
    fn create_dir(&self, target: &Target, path: &str) -> Result<DirStatus, TransportError>;

    /// Digest of the file at `path`, or [`RemoteDigest::Absent`] if there is none
    fn remote_digest(
        &self,
        target: &Target,
        path: &str,
        kind: ChecksumType,
    ) -> Result<RemoteDigest, TransportError>;

    /// Write `local` to `path` on the target, returning bytes sent.
    /// With `atomic`, a failure must never leave a partial file at `path`.
    fn put_file(
        &self,
        target: &Target,
        local: &Path,
        path: &str,
        atomic: bool,
    ) -> Result<u64, TransportError>;

    /// Probe first, create only when missing
    fn ensure_dir(&self, target: &Target, path: &str) -> Result<DirStatus, TransportError> {
        if self.dir_exists(target, path)? {
            Ok(DirStatus::Existed)
        } else {
            self.create_dir(target, path)
        }
    }
}

/// Name for the in-flight copy of `path`, in the same directory
pub(crate) fn temp_name(path: &str) -> String {
    let (dir, file) = match path.rfind('/') {
        Some(i) => (&path[..=i], &path[i + 1..]),
        None => ("", path),
    };
    format!("{}.{}.fanout-{}.part", dir, file, uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_path_joins() {
        let t = Target::new("10.0.0.1", "support", "/home/support/bin/");
        assert_eq!(t.remote_path("sub/b.txt"), "/home/support/bin/sub/b.txt");
        assert_eq!(t.remote_path(""), "/home/support/bin/");

        let root = Target::new("10.0.0.1", "support", "/");
        assert_eq!(root.remote_path("etc/x"), "/etc/x");

        let relative = Target::new("10.0.0.1", "support", "");
        assert_eq!(relative.remote_path("x"), "x");
    }

    #[test]
    fn test_login() {
        let t = Target::new("node-3", "admin", "/srv");
        assert_eq!(t.login(), "admin@node-3");
    }

    #[test]
    fn test_temp_name_stays_in_directory() {
        let tmp = temp_name("/srv/app/config.yml");
        assert!(tmp.starts_with("/srv/app/.config.yml.fanout-"));
        assert!(tmp.ends_with(".part"));
        assert_ne!(tmp, temp_name("/srv/app/config.yml"));
        assert!(temp_name("bare").starts_with(".bare.fanout-"));
    }
}
