//! Directory-backed transport
//!
//! Target `addr` with root `/dest` lives at `<base>/addr/dest`. Used to stage
//! a distribution on one machine and by the test suite.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::checksum::{digest_file, ChecksumType, RemoteDigest};
use crate::error::TransportError;

use super::{DirStatus, Target, Transport};

pub struct LocalTransport {
    base: PathBuf,
}

impl LocalTransport {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Where `path` on `target` lives on the local filesystem
    pub fn resolve(&self, target: &Target, path: &str) -> PathBuf {
        self.base
            .join(&target.address)
            .join(path.trim_start_matches('/'))
    }

    fn io_err(op: &'static str) -> impl FnOnce(io::Error) -> TransportError {
        move |source| TransportError::Io { op, source }
    }
}

impl Transport for LocalTransport {
    fn dir_exists(&self, target: &Target, path: &str) -> Result<bool, TransportError> {
        Ok(self.resolve(target, path).is_dir())
    }

    fn create_dir(&self, target: &Target, path: &str) -> Result<DirStatus, TransportError> {
        let dir = self.resolve(target, path);
        if dir.is_dir() {
            return Ok(DirStatus::Existed);
        }
        fs::create_dir_all(&dir).map_err(Self::io_err("mkdir"))?;
        Ok(DirStatus::Created)
    }

    fn remote_digest(
        &self,
        target: &Target,
        path: &str,
        kind: ChecksumType,
    ) -> Result<RemoteDigest, TransportError> {
        let file = self.resolve(target, path);
        match digest_file(&file, kind) {
            Ok(d) => Ok(RemoteDigest::Present(d)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RemoteDigest::Absent),
            Err(e) => Err(TransportError::Io {
                op: "remote digest",
                source: e,
            }),
        }
    }

    fn put_file(
        &self,
        target: &Target,
        local: &Path,
        path: &str,
        atomic: bool,
    ) -> Result<u64, TransportError> {
        let dst = self.resolve(target, path);
        let mut reader = BufReader::new(File::open(local).map_err(Self::io_err("open source"))?);

        if !atomic {
            let mut writer = BufWriter::new(File::create(&dst).map_err(Self::io_err("create"))?);
            let bytes = io::copy(&mut reader, &mut writer).map_err(Self::io_err("transfer"))?;
            writer.flush().map_err(Self::io_err("transfer"))?;
            return Ok(bytes);
        }

        // The parent is not created here: a missing directory is a failure,
        // exactly as it is for a remote node.
        let parent = dst.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(Self::io_err("create temp"))?;
        let bytes = io::copy(&mut reader, &mut tmp).map_err(Self::io_err("transfer"))?;
        tmp.flush().map_err(Self::io_err("transfer"))?;
        tmp.persist(&dst)
            .map_err(|e| TransportError::Io {
                op: "rename",
                source: e.error,
            })?;
        Ok(bytes)
    }
}
