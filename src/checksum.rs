//! Checksum and hashing utilities
//!
//! Fingerprints are computed by streaming the file in fixed-size chunks, so
//! memory use does not depend on file size. The same algorithm is run on the
//! remote node through its coreutils-style `*sum` command.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read size for streaming digests
const CHUNK_SIZE: usize = 64 * 1024;

/// Available checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    #[default]
    Sha256,
    Blake3,
    Md5, // For nodes without sha256sum; not collision resistant
}

impl ChecksumType {
    /// Command run on the target to hash a file
    pub fn remote_program(self) -> &'static str {
        match self {
            ChecksumType::Sha256 => "sha256sum",
            ChecksumType::Blake3 => "b3sum",
            ChecksumType::Md5 => "md5sum",
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            ChecksumType::Sha256 | ChecksumType::Blake3 => 32,
            ChecksumType::Md5 => 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChecksumType::Sha256 => "sha256",
            ChecksumType::Blake3 => "blake3",
            ChecksumType::Md5 => "md5",
        }
    }
}

/// Content fingerprint of one file
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    kind: ChecksumType,
    bytes: Vec<u8>,
}

impl Digest {
    pub fn kind(&self) -> ChecksumType {
        self.kind
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Parse a lowercase or uppercase hex string of the right length
    pub fn from_hex(kind: ChecksumType, hex: &str) -> Option<Self> {
        if hex.len() != kind.digest_len() * 2 || !hex.is_ascii() {
            return None;
        }
        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
            .collect::<Option<Vec<u8>>>()?;
        Some(Self { kind, bytes })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.name(), self.to_hex())
    }
}

/// Fingerprint of the destination copy of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDigest {
    /// No such file at the destination
    Absent,
    Present(Digest),
}

impl RemoteDigest {
    pub fn matches(&self, local: &Digest) -> bool {
        matches!(self, RemoteDigest::Present(d) if d == local)
    }
}

enum StreamHasher {
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
    Md5(md5::Context),
}

impl StreamHasher {
    fn new(kind: ChecksumType) -> Self {
        use sha2::Digest as _;
        match kind {
            ChecksumType::Sha256 => StreamHasher::Sha256(sha2::Sha256::new()),
            ChecksumType::Blake3 => StreamHasher::Blake3(Box::new(blake3::Hasher::new())),
            ChecksumType::Md5 => StreamHasher::Md5(md5::Context::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        use sha2::Digest as _;
        match self {
            StreamHasher::Sha256(h) => h.update(data),
            StreamHasher::Blake3(h) => {
                h.update(data);
            }
            StreamHasher::Md5(h) => h.consume(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        use sha2::Digest as _;
        match self {
            StreamHasher::Sha256(h) => h.finalize().to_vec(),
            StreamHasher::Blake3(h) => h.finalize().as_bytes().to_vec(),
            StreamHasher::Md5(h) => h.compute().0.to_vec(),
        }
    }
}

/// Hash everything a reader yields, one chunk at a time
pub fn digest_reader<R: Read>(mut reader: R, kind: ChecksumType) -> io::Result<Digest> {
    let mut hasher = StreamHasher::new(kind);
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Digest {
        kind,
        bytes: hasher.finalize(),
    })
}

pub fn digest_file(path: &Path, kind: ChecksumType) -> io::Result<Digest> {
    digest_reader(File::open(path)?, kind)
}

/// Parse `sha256sum`-style output: `<hex>  <path>`
pub fn parse_digest_output(stdout: &str, kind: ChecksumType) -> Option<Digest> {
    let token = stdout.split_whitespace().next()?;
    // GNU coreutils prefixes the line with '\' when the file name was escaped
    let token = token.strip_prefix('\\').unwrap_or(token);
    Digest::from_hex(kind, token)
}
