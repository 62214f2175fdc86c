//! Per-target sync workflow
//!
//! A worker is strictly sequential: destination root, then every directory in
//! parent-first order, then each file in enumeration order. Each file ends in
//! exactly one [`SyncOutcome`]; no error escapes the worker.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::checksum::RemoteDigest;
use crate::config::SyncConfig;
use crate::fs_enum::{ancestor_dirs, FileEntry, SourceTree};
use crate::observer::{Progress, SyncObserver};
use crate::report::{DirOutcome, SyncOutcome, SyncResult, TargetReport};
use crate::transport::{Target, Transport};

pub const ABANDONED: &str = "abandoned (interrupted)";

pub struct TargetWorker<'a> {
    pub target: &'a Target,
    pub tree: &'a SourceTree,
    pub transport: &'a dyn Transport,
    pub observer: &'a dyn SyncObserver,
    pub config: &'a SyncConfig,
    pub cancel: &'a AtomicBool,
}

impl<'a> TargetWorker<'a> {
    pub fn run(self) -> TargetReport {
        let mut report = TargetReport::new(self.target.address.clone());
        let total = self.tree.files.len();
        self.observer.target_started(self.target, total);

        // Interrupted while this target was still queued: leave it untouched
        if self.cancel.load(Ordering::SeqCst) {
            return self.fail_all(report, ABANDONED);
        }

        let failed_dirs = match self.prepare_root(&mut report) {
            Ok(()) => self.prepare_dirs(&mut report),
            Err(reason) => return self.fail_all(report, &reason),
        };

        for (i, entry) in self.tree.files.iter().enumerate() {
            let progress = Progress { index: i + 1, total };

            if self.cancel.load(Ordering::SeqCst) {
                self.finish(
                    &mut report,
                    entry,
                    SyncOutcome::FailedTransfer,
                    Some(ABANDONED.to_string()),
                    progress,
                );
                continue;
            }

            if let Some(dir) = ancestor_dirs(&entry.rel)
                .into_iter()
                .find(|d| failed_dirs.contains(*d))
            {
                self.finish(
                    &mut report,
                    entry,
                    SyncOutcome::FailedTransfer,
                    Some(format!("directory {} unavailable", dir)),
                    progress,
                );
                continue;
            }

            let (outcome, detail) = self.sync_file(entry);
            self.finish(&mut report, entry, outcome, detail, progress);
        }

        self.observer.target_finished(self.target, &report.summary);
        report
    }

    /// Record every file as failed-transfer with `reason` and close the target
    fn fail_all(&self, mut report: TargetReport, reason: &str) -> TargetReport {
        let total = self.tree.files.len();
        for (i, entry) in self.tree.files.iter().enumerate() {
            self.finish(
                &mut report,
                entry,
                SyncOutcome::FailedTransfer,
                Some(reason.to_string()),
                Progress { index: i + 1, total },
            );
        }
        self.observer.target_finished(self.target, &report.summary);
        report
    }

    fn finish(
        &self,
        report: &mut TargetReport,
        entry: &FileEntry,
        outcome: SyncOutcome,
        detail: Option<String>,
        progress: Progress,
    ) {
        let result = SyncResult {
            target: self.target.address.clone(),
            path: entry.rel.clone(),
            outcome,
            detail,
        };
        self.observer.file_result(self.target, &result, progress);
        report.push_result(result);
    }

    /// Make sure the destination root exists. Err carries the reason every
    /// file on this target fails.
    fn prepare_root(&self, report: &mut TargetReport) -> Result<(), String> {
        let root = &self.target.root;
        let outcome = match self
            .config
            .retry
            .run(self.cancel, || self.transport.dir_exists(self.target, root))
        {
            Ok(true) => DirOutcome::Ready(crate::transport::DirStatus::Existed),
            Ok(false) if self.config.dry_run => DirOutcome::Planned,
            Ok(false) => match self
                .config
                .retry
                .run(self.cancel, || self.transport.create_dir(self.target, root))
            {
                Ok(status) => DirOutcome::Ready(status),
                Err(e) => DirOutcome::Failed(e.to_string()),
            },
            Err(e) => DirOutcome::Failed(e.to_string()),
        };

        let failure = match &outcome {
            DirOutcome::Failed(msg) => Some(format!("destination root {} unavailable: {}", root, msg)),
            _ => None,
        };
        self.observer.dir_result(self.target, "", &outcome);
        report.push_dir("", outcome);
        match failure {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Ensure every directory, parents first. Returns the relative paths that
    /// failed; directories skipped by an interrupt are not among them.
    fn prepare_dirs(&self, report: &mut TargetReport) -> HashSet<String> {
        let mut failed: HashSet<String> = HashSet::new();

        for dir in &self.tree.dirs {
            let blocked = ancestor_dirs(&dir.rel)
                .into_iter()
                .any(|a| failed.contains(a));

            let outcome = if blocked {
                DirOutcome::BlockedByParent
            } else if self.cancel.load(Ordering::SeqCst) {
                DirOutcome::Abandoned
            } else if self.config.dry_run {
                DirOutcome::Planned
            } else {
                let path = self.target.remote_path(&dir.rel);
                match self
                    .config
                    .retry
                    .run(self.cancel, || self.transport.create_dir(self.target, &path))
                {
                    Ok(status) => DirOutcome::Ready(status),
                    Err(e) => DirOutcome::Failed(e.to_string()),
                }
            };

            if outcome.is_failure() {
                failed.insert(dir.rel.clone());
            }
            self.observer.dir_result(self.target, &dir.rel, &outcome);
            report.push_dir(dir.rel.clone(), outcome);
        }

        failed
    }

    /// Decide and, unless dry-running, act on one file
    fn sync_file(&self, entry: &FileEntry) -> (SyncOutcome, Option<String>) {
        if !entry.source.exists() {
            return (
                SyncOutcome::FailedMissingSource,
                Some(format!("local file missing: {}", entry.source.display())),
            );
        }

        let local = match entry.fingerprint() {
            Ok(d) => d,
            Err(e) => return (SyncOutcome::FailedMissingSource, Some(e.to_string())),
        };

        let remote_path = self.target.remote_path(&entry.rel);
        let remote = match self.config.retry.run(self.cancel, || {
            self.transport
                .remote_digest(self.target, &remote_path, self.config.checksum)
        }) {
            Ok(r) => r,
            Err(e) => return (SyncOutcome::FailedTransfer, Some(e.to_string())),
        };

        let success = match remote {
            ref r if r.matches(local) => return (SyncOutcome::SkippedIdentical, None),
            RemoteDigest::Absent => SyncOutcome::Copied,
            RemoteDigest::Present(_) => SyncOutcome::Updated,
        };

        if self.config.dry_run {
            return (success, Some("dry run".to_string()));
        }

        match self.config.retry.run(self.cancel, || {
            self.transport.put_file(
                self.target,
                &entry.source,
                &remote_path,
                self.config.atomic_transfer,
            )
        }) {
            Ok(_) => (success, None),
            Err(e) => (SyncOutcome::FailedTransfer, Some(e.to_string())),
        }
    }
}
