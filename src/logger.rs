use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::observer::{Progress, RunInfo, SyncObserver};
use crate::report::{DirOutcome, RunReport, SyncResult, TargetSummary};
use crate::transport::Target;

/// Append-only plain text decision log, one timestamped line per event
pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, level: &str, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {} {}", Utc::now().to_rfc3339(), level, s);
    }
}

impl SyncObserver for TextLogger {
    fn run_started(&self, run: &RunInfo) {
        self.line(
            "INFO",
            &format!(
                "START run={} src={} dst={} dry_run={}",
                run.run_id,
                run.source.display(),
                run.dest_root,
                run.dry_run
            ),
        );
    }

    fn warning(&self, message: &str) {
        self.line("WARN", message);
    }

    fn local_node_skipped(&self, address: &str) {
        self.line("INFO", &format!("SKIP_LOCAL node={}", address));
    }

    fn target_started(&self, target: &Target, files: usize) {
        self.line(
            "INFO",
            &format!("PUSH node={} user={} files={}", target.address, target.user, files),
        );
    }

    fn dir_result(&self, target: &Target, dir: &str, outcome: &DirOutcome) {
        let (level, what) = match outcome {
            DirOutcome::Ready(status) => ("INFO", format!("{:?}", status).to_lowercase()),
            DirOutcome::Planned => ("INFO", "planned".to_string()),
            DirOutcome::Failed(msg) => ("ERROR", format!("failed msg={}", msg)),
            DirOutcome::BlockedByParent => ("ERROR", "blocked-by-parent".to_string()),
            DirOutcome::Abandoned => ("WARN", "abandoned".to_string()),
        };
        let dir = if dir.is_empty() { "." } else { dir };
        self.line(level, &format!("DIR node={} path={} {}", target.address, dir, what));
    }

    fn file_result(&self, target: &Target, result: &SyncResult, _progress: Progress) {
        let level = if result.outcome.is_failure() {
            "ERROR"
        } else {
            "INFO"
        };
        let mut msg = format!(
            "FILE node={} path={} outcome={}",
            target.address,
            result.path,
            result.outcome.label()
        );
        if let Some(detail) = &result.detail {
            msg.push_str(&format!(" msg={}", detail));
        }
        self.line(level, &msg);
    }

    fn target_finished(&self, target: &Target, s: &TargetSummary) {
        self.line(
            "INFO",
            &format!(
                "SUMMARY node={} copied={} updated={} skipped={} failed={}",
                target.address,
                s.copied,
                s.updated,
                s.skipped,
                s.failed()
            ),
        );
    }

    fn run_finished(&self, report: &RunReport) {
        self.line(
            "INFO",
            &format!(
                "DONE run={} targets={} failed={} seconds={:.3}",
                report.run_id,
                report.targets.len(),
                report.total_failed(),
                report.elapsed_secs
            ),
        );
    }
}
