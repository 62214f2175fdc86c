//! Source tree enumeration
//!
//! Symlinks are never followed; they are skipped and reported as warnings,
//! as are unreadable directories and non-UTF-8 names.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use crate::checksum::{digest_file, ChecksumType, Digest};
use crate::error::SourceError;

/// A regular file under the source root
#[derive(Debug)]
pub struct FileEntry {
    /// Slash-separated path relative to the source root; the sync key
    pub rel: String,
    pub source: PathBuf,
    checksum: ChecksumType,
    fingerprint: OnceLock<Result<Digest, SourceError>>,
}

impl FileEntry {
    pub fn new(rel: impl Into<String>, source: PathBuf, checksum: ChecksumType) -> Self {
        Self {
            rel: rel.into(),
            source,
            checksum,
            fingerprint: OnceLock::new(),
        }
    }

    /// Content digest, computed on first use and cached for the rest of the run
    pub fn fingerprint(&self) -> Result<&Digest, SourceError> {
        self.fingerprint
            .get_or_init(|| {
                digest_file(&self.source, self.checksum)
                    .map_err(|e| SourceError::from_io(self.source.clone(), &e))
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn is_fingerprinted(&self) -> bool {
        self.fingerprint.get().is_some()
    }
}

/// A directory that must exist at the destination
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    pub rel: String,
}

impl DirEntry {
    pub fn depth(&self) -> usize {
        self.rel.split('/').count()
    }
}

/// File filter options (robocopy compatibility)
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    pub exclude_files: Vec<String>,
    pub exclude_dirs: Vec<String>,
}

impl FileFilter {
    /// Check if a file should be included
    fn should_include_file(&self, rel: &Path) -> bool {
        let filename = rel.file_name().unwrap_or_default().to_string_lossy();
        !self
            .exclude_files
            .iter()
            .any(|pattern| glob_match(pattern, &filename))
    }

    /// Check if a directory should be included
    fn should_include_dir(&self, rel: &Path) -> bool {
        // Any path component matching excludes the whole subtree (like rsync/robocopy)
        for pattern in &self.exclude_dirs {
            for component in rel.components() {
                if let Some(component_str) = component.as_os_str().to_str() {
                    if glob_match(pattern, component_str) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

/// Simple glob matching (supports * wildcards)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if pattern.contains('*') {
        if pattern.len() > 1 && pattern.starts_with('*') && pattern.ends_with('*') {
            let middle = &pattern[1..pattern.len() - 1];
            return text.contains(middle);
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            return text.ends_with(suffix);
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            return text.starts_with(prefix);
        }
    }

    pattern == text
}

/// Everything one run will push: files in enumeration order, directories
/// ordered so that no directory precedes its parent.
#[derive(Debug, Default)]
pub struct SourceTree {
    pub root: PathBuf,
    pub files: Vec<FileEntry>,
    pub dirs: Vec<DirEntry>,
    pub warnings: Vec<String>,
}

impl SourceTree {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    /// Enumerate `root` recursively. A missing or empty root yields an empty
    /// tree with a warning rather than an error.
    pub fn scan(root: &Path, filter: &FileFilter, checksum: ChecksumType) -> SourceTree {
        use walkdir::WalkDir;

        let mut tree = SourceTree {
            root: root.to_path_buf(),
            ..Default::default()
        };

        if !root.is_dir() {
            let why = if root.exists() {
                "is not a directory"
            } else {
                "does not exist"
            };
            tree.warnings
                .push(format!("Source {} {}; nothing to sync", root.display(), why));
            return tree;
        }

        let mut dirs = BTreeSet::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                // Skip excluded directories entirely - this prevents walking into them
                if e.file_type().is_dir() {
                    e.path()
                        .strip_prefix(root)
                        .map(|rel| filter.should_include_dir(rel))
                        .unwrap_or(true)
                } else {
                    true
                }
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let at = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    tree.warnings.push(format!("Skipping unreadable entry {}: {}", at, e));
                    continue;
                }
            };

            let path = entry.path();
            let Ok(rel_path) = path.strip_prefix(root) else {
                continue;
            };
            let Some(rel) = relative_key(rel_path) else {
                tree.warnings
                    .push(format!("Skipping non UTF-8 path {}", path.display()));
                continue;
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                tree.warnings
                    .push(format!("Skipping symbolic link {}", path.display()));
            } else if file_type.is_dir() {
                dirs.insert(rel);
            } else if file_type.is_file() {
                if !filter.should_include_file(rel_path) {
                    continue;
                }
                tree.files
                    .push(FileEntry::new(rel, path.to_path_buf(), checksum));
            } else {
                tree.warnings
                    .push(format!("Skipping special file {}", path.display()));
            }
        }

        for file in &tree.files {
            dirs.extend(ancestor_dirs(&file.rel).into_iter().map(str::to_string));
        }

        let mut dirs: Vec<DirEntry> = dirs.into_iter().map(|rel| DirEntry { rel }).collect();
        dirs.sort_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.rel.cmp(&b.rel)));
        tree.dirs = dirs;

        if tree.is_empty() {
            tree.warnings.push(format!(
                "No files or directories found in {}",
                root.display()
            ));
        }

        tree
    }
}

/// Slash-joined relative path, or `None` for non UTF-8 components
fn relative_key(rel: &Path) -> Option<String> {
    let parts = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_str()),
            _ => None,
        })
        .collect::<Option<Vec<&str>>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Every proper ancestor directory of a relative path, outermost first
pub fn ancestor_dirs(rel: &str) -> Vec<&str> {
    rel.match_indices('/').map(|(i, _)| &rel[..i]).collect()
}
