//! Event hooks for everything a run decides
//!
//! The coordinator and workers report through [`SyncObserver`]; console
//! progress, the log file and tests are all just observers. Methods are
//! called concurrently from worker threads.

use std::path::PathBuf;
use std::sync::Arc;

use crate::report::{DirOutcome, RunReport, SyncResult, TargetSummary};
use crate::transport::Target;

#[derive(Debug, Clone)]
pub struct RunInfo {
    pub run_id: String,
    pub source: PathBuf,
    pub dest_root: String,
    pub dry_run: bool,
}

/// Position of a file within its target's file list (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub index: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            100.0 * self.index as f64 / self.total as f64
        }
    }
}

pub trait SyncObserver: Send + Sync {
    fn run_started(&self, _run: &RunInfo) {}
    fn warning(&self, _message: &str) {}
    fn local_node_skipped(&self, _address: &str) {}
    fn target_started(&self, _target: &Target, _files: usize) {}
    fn dir_result(&self, _target: &Target, _dir: &str, _outcome: &DirOutcome) {}
    fn file_result(&self, _target: &Target, _result: &SyncResult, _progress: Progress) {}
    fn target_finished(&self, _target: &Target, _summary: &TargetSummary) {}
    fn run_finished(&self, _report: &RunReport) {}
}

pub struct NoopObserver;
impl SyncObserver for NoopObserver {}

/// Forwards every event to each member in order
#[derive(Default)]
pub struct ObserverSet {
    members: Vec<Arc<dyn SyncObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: Arc<dyn SyncObserver>) {
        self.members.push(observer);
    }
}

impl SyncObserver for ObserverSet {
    fn run_started(&self, run: &RunInfo) {
        self.members.iter().for_each(|o| o.run_started(run));
    }
    fn warning(&self, message: &str) {
        self.members.iter().for_each(|o| o.warning(message));
    }
    fn local_node_skipped(&self, address: &str) {
        self.members.iter().for_each(|o| o.local_node_skipped(address));
    }
    fn target_started(&self, target: &Target, files: usize) {
        self.members.iter().for_each(|o| o.target_started(target, files));
    }
    fn dir_result(&self, target: &Target, dir: &str, outcome: &DirOutcome) {
        self.members.iter().for_each(|o| o.dir_result(target, dir, outcome));
    }
    fn file_result(&self, target: &Target, result: &SyncResult, progress: Progress) {
        self.members
            .iter()
            .for_each(|o| o.file_result(target, result, progress));
    }
    fn target_finished(&self, target: &Target, summary: &TargetSummary) {
        self.members
            .iter()
            .for_each(|o| o.target_finished(target, summary));
    }
    fn run_finished(&self, report: &RunReport) {
        self.members.iter().for_each(|o| o.run_finished(report));
    }
}
