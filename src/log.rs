use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::observer::{Progress, RunInfo, SyncObserver};
use crate::report::{DirOutcome, RunReport, SyncResult, TargetSummary};
use crate::transport::Target;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    RunStarted {
        source: PathBuf,
        destination: String,
        dry_run: bool,
    },
    Warning {
        message: String,
    },
    LocalNodeSkipped {
        node: String,
    },
    TargetStarted {
        node: String,
        user: String,
        files: usize,
    },
    Directory {
        node: String,
        path: String,
        failed: bool,
        detail: String,
    },
    File {
        node: String,
        path: String,
        outcome: String,
        detail: Option<String>,
    },
    TargetFinished {
        node: String,
        copied: usize,
        updated: usize,
        skipped: usize,
        failed: usize,
    },
    RunFinished {
        targets: usize,
        failed: usize,
        seconds: f64,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: String,
    pub run_id: String,
    #[serde(flatten)]
    pub event: LogEvent,
}

/// Append-only JSON Lines decision log
pub struct JsonlLog {
    log_file_path: PathBuf,
    run_id: Mutex<String>,
    file: Mutex<File>,
}

impl JsonlLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let log_file_path = path.as_ref().to_path_buf();
        if let Some(parent) = log_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file_path)
            .context("Failed to open transfer log file")?;
        Ok(JsonlLog {
            log_file_path,
            run_id: Mutex::new(String::new()),
            file: Mutex::new(file),
        })
    }

    pub fn add_entry(&self, event: LogEvent) -> Result<()> {
        let record = LogRecord {
            timestamp: Utc::now().to_rfc3339(),
            run_id: self.run_id.lock().clone(),
            event,
        };
        let mut file = self.file.lock();
        let mut writer = BufWriter::new(&mut *file);
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<Vec<LogRecord>> {
        read_log(&self.log_file_path)
    }
}

pub fn read_log(path: &Path) -> Result<Vec<LogRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).context("Failed to open transfer log file for reading")?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: LogRecord = serde_json::from_str(&line)?;
        entries.push(entry);
    }
    Ok(entries)
}

impl SyncObserver for JsonlLog {
    fn run_started(&self, run: &RunInfo) {
        *self.run_id.lock() = run.run_id.clone();
        let _ = self.add_entry(LogEvent::RunStarted {
            source: run.source.clone(),
            destination: run.dest_root.clone(),
            dry_run: run.dry_run,
        });
    }

    fn warning(&self, message: &str) {
        let _ = self.add_entry(LogEvent::Warning {
            message: message.to_string(),
        });
    }

    fn local_node_skipped(&self, address: &str) {
        let _ = self.add_entry(LogEvent::LocalNodeSkipped {
            node: address.to_string(),
        });
    }

    fn target_started(&self, target: &Target, files: usize) {
        let _ = self.add_entry(LogEvent::TargetStarted {
            node: target.address.clone(),
            user: target.user.clone(),
            files,
        });
    }

    fn dir_result(&self, target: &Target, dir: &str, outcome: &DirOutcome) {
        let detail = match outcome {
            DirOutcome::Ready(status) => format!("{:?}", status).to_lowercase(),
            DirOutcome::Planned => "planned".to_string(),
            DirOutcome::Failed(msg) => msg.clone(),
            DirOutcome::BlockedByParent => "blocked by failed parent".to_string(),
            DirOutcome::Abandoned => "abandoned (interrupted)".to_string(),
        };
        let _ = self.add_entry(LogEvent::Directory {
            node: target.address.clone(),
            path: dir.to_string(),
            failed: outcome.is_failure(),
            detail,
        });
    }

    fn file_result(&self, target: &Target, result: &SyncResult, _progress: Progress) {
        let _ = self.add_entry(LogEvent::File {
            node: target.address.clone(),
            path: result.path.clone(),
            outcome: result.outcome.label().to_string(),
            detail: result.detail.clone(),
        });
    }

    fn target_finished(&self, target: &Target, s: &TargetSummary) {
        let _ = self.add_entry(LogEvent::TargetFinished {
            node: target.address.clone(),
            copied: s.copied,
            updated: s.updated,
            skipped: s.skipped,
            failed: s.failed(),
        });
    }

    fn run_finished(&self, report: &RunReport) {
        let _ = self.add_entry(LogEvent::RunFinished {
            targets: report.targets.len(),
            failed: report.total_failed(),
            seconds: report.elapsed_secs,
        });
    }
}
