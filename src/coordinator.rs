//! Fan-out across targets
//!
//! Each target gets one [`TargetWorker`], run on a rayon pool sized to
//! `max_workers`; surplus targets wait for a free thread. Workers share only
//! read-only state and return their own [`TargetReport`], which is merged
//! into the [`RunReport`] after all of them have joined.

use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use crate::config::SyncConfig;
use crate::discovery::LocalIdentity;
use crate::error::DistributeError;
use crate::fs_enum::SourceTree;
use crate::observer::{RunInfo, SyncObserver};
use crate::report::{RunReport, TargetReport};
use crate::transport::{Target, Transport};
use crate::worker::TargetWorker;

pub struct Distributor {
    config: Arc<SyncConfig>,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn SyncObserver>,
    cancel: Arc<AtomicBool>,
}

impl Distributor {
    pub fn new(
        config: Arc<SyncConfig>,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn SyncObserver>,
    ) -> Self {
        Self {
            config,
            transport,
            observer,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set to stop after each worker's current file; the rest are reported
    /// as abandoned.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Push `source` to `dest_root` on every address except this node's own.
    pub fn run(
        &self,
        source: &Path,
        dest_root: &str,
        mut addresses: Vec<String>,
        local: &LocalIdentity,
    ) -> Result<RunReport, DistributeError> {
        let mut seen = HashSet::new();
        addresses.retain(|a| !a.trim().is_empty() && seen.insert(a.clone()));

        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut report = RunReport::new(
            run_id.clone(),
            source.to_path_buf(),
            dest_root,
            self.config.dry_run,
        );

        self.observer.run_started(&RunInfo {
            run_id,
            source: source.to_path_buf(),
            dest_root: dest_root.to_string(),
            dry_run: self.config.dry_run,
        });

        let (remote, local_nodes) = local.partition(addresses);
        for address in local_nodes {
            self.observer.local_node_skipped(&address);
            report.skipped_local.push(address);
        }

        let tree = SourceTree::scan(source, &self.config.filter(), self.config.checksum);
        for warning in &tree.warnings {
            self.observer.warning(warning);
        }
        report.warnings.extend(tree.warnings.iter().cloned());

        if tree.is_empty() || remote.is_empty() {
            if remote.is_empty() && !tree.is_empty() {
                let msg = "No remote targets to sync".to_string();
                self.observer.warning(&msg);
                report.warnings.push(msg);
            }
            report.elapsed_secs = start.elapsed().as_secs_f64();
            self.observer.run_finished(&report);
            return Ok(report);
        }

        let targets: Vec<Target> = remote
            .into_iter()
            .map(|address| Target::new(address, self.config.user.clone(), dest_root))
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_count().min(targets.len()).max(1))
            .thread_name(|i| format!("fanout-worker-{}", i))
            .build()?;

        let per_target: Vec<TargetReport> = pool.install(|| {
            targets
                .par_iter()
                .map(|target| {
                    TargetWorker {
                        target,
                        tree: &tree,
                        transport: self.transport.as_ref(),
                        observer: self.observer.as_ref(),
                        config: &self.config,
                        cancel: &self.cancel,
                    }
                    .run()
                })
                .collect()
        });

        for target_report in per_target {
            report
                .targets
                .insert(target_report.target.clone(), target_report);
        }

        report.elapsed_secs = start.elapsed().as_secs_f64();
        self.observer.run_finished(&report);
        Ok(report)
    }
}
