//! Outcomes, per-target tallies and the final summary

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::transport::DirStatus;

/// Terminal state of one file on one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncOutcome {
    Copied,
    Updated,
    SkippedIdentical,
    FailedMissingSource,
    FailedTransfer,
}

impl SyncOutcome {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            SyncOutcome::FailedMissingSource | SyncOutcome::FailedTransfer
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            SyncOutcome::Copied => "copied",
            SyncOutcome::Updated => "updated",
            SyncOutcome::SkippedIdentical => "skipped-identical",
            SyncOutcome::FailedMissingSource => "failed-missing-source",
            SyncOutcome::FailedTransfer => "failed-transfer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub target: String,
    /// Relative path of the file
    pub path: String,
    pub outcome: SyncOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// What happened to one destination directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status", content = "detail")]
pub enum DirOutcome {
    Ready(DirStatus),
    /// Dry run: would be ensured
    Planned,
    Failed(String),
    /// Not attempted because an ancestor failed
    BlockedByParent,
    /// Not attempted because the run was interrupted
    Abandoned,
}

impl DirOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, DirOutcome::Failed(_) | DirOutcome::BlockedByParent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirReport {
    pub path: String,
    pub outcome: DirOutcome,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
    pub copied: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed_missing_source: usize,
    pub failed_transfer: usize,
    pub dirs_failed: usize,
}

impl TargetSummary {
    pub fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Copied => self.copied += 1,
            SyncOutcome::Updated => self.updated += 1,
            SyncOutcome::SkippedIdentical => self.skipped += 1,
            SyncOutcome::FailedMissingSource => self.failed_missing_source += 1,
            SyncOutcome::FailedTransfer => self.failed_transfer += 1,
        }
    }

    pub fn failed(&self) -> usize {
        self.failed_missing_source + self.failed_transfer
    }

    pub fn files(&self) -> usize {
        self.copied + self.updated + self.skipped + self.failed()
    }
}

/// Everything one target worker produced
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub target: String,
    pub summary: TargetSummary,
    pub dirs: Vec<DirReport>,
    pub results: Vec<SyncResult>,
}

impl TargetReport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            summary: TargetSummary::default(),
            dirs: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn push_result(&mut self, result: SyncResult) {
        self.summary.record(result.outcome);
        self.results.push(result);
    }

    pub fn push_dir(&mut self, path: impl Into<String>, outcome: DirOutcome) {
        if outcome.is_failure() {
            self.summary.dirs_failed += 1;
        }
        self.dirs.push(DirReport {
            path: path.into(),
            outcome,
        });
    }

    pub fn outcome_of(&self, path: &str) -> Option<SyncOutcome> {
        self.results.iter().find(|r| r.path == path).map(|r| r.outcome)
    }
}

/// Aggregate of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub dry_run: bool,
    pub source: PathBuf,
    pub dest_root: String,
    pub targets: BTreeMap<String, TargetReport>,
    pub skipped_local: Vec<String>,
    pub warnings: Vec<String>,
    pub elapsed_secs: f64,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>, source: PathBuf, dest_root: impl Into<String>, dry_run: bool) -> Self {
        Self {
            run_id: run_id.into(),
            dry_run,
            source,
            dest_root: dest_root.into(),
            targets: BTreeMap::new(),
            skipped_local: Vec::new(),
            warnings: Vec::new(),
            elapsed_secs: 0.0,
        }
    }

    pub fn total_failed(&self) -> usize {
        self.targets.values().map(|t| t.summary.failed()).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// One block per target, in address order
    pub fn render(&self) -> String {
        let mut out = String::new();
        let title = if self.dry_run {
            "Sync Summary Report (dry run)"
        } else {
            "Sync Summary Report"
        };
        let _ = writeln!(out, "{}", title);

        for address in &self.skipped_local {
            let _ = writeln!(out, "\nNode: {} (local node, skipped)", address);
        }

        if self.targets.is_empty() && self.skipped_local.is_empty() {
            let _ = writeln!(out, "\nNo targets were synced.");
        }

        for (address, report) in &self.targets {
            let s = &report.summary;
            let _ = writeln!(out, "\nNode: {}", address);
            let _ = writeln!(out, "  Copied:  {}", s.copied);
            let _ = writeln!(out, "  Updated: {}", s.updated);
            let _ = writeln!(out, "  Skipped: {}", s.skipped);
            let _ = writeln!(out, "  Failed:  {}", s.failed());
            if s.dirs_failed > 0 {
                let _ = writeln!(out, "  Directories failed: {}", s.dirs_failed);
            }
        }

        let _ = writeln!(out, "\nCompleted in {:.1}s", self.elapsed_secs);
        out
    }
}
