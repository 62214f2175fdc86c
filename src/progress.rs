//! Console progress
//!
//! One bar per target, stacked with indicatif's `MultiProgress`; per-file
//! status lines scroll above the bars. When stderr is not a terminal the
//! bars hide themselves and only the final report is printed.

use crossterm::style::{Color, Stylize};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;
use unicode_width::UnicodeWidthStr;

use crate::observer::{Progress, RunInfo, SyncObserver};
use crate::report::{DirOutcome, SyncOutcome, SyncResult, TargetSummary};
use crate::transport::Target;

/// Column the status text is aligned to
const PATH_WIDTH: usize = 50;

pub struct ConsoleProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    verbose: bool,
}

impl ConsoleProgress {
    /// With `verbose`, skipped files get a status line too
    pub fn new(verbose: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            verbose,
        }
    }

    fn print(&self, line: String) {
        let _ = self.multi.println(line);
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("Sync to {prefix:<15} [{bar:40.green/white}] {pos}/{len} ({percent}%) {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }
}

/// Colored status text for a file outcome
pub fn status_text(outcome: SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Copied => format!("{}", "✔ Copied".with(Color::Green)),
        SyncOutcome::Updated => format!("{}", "✔ Updated".with(Color::Green)),
        SyncOutcome::SkippedIdentical => format!("{}", "➜ Skipped (identical)".with(Color::Yellow)),
        SyncOutcome::FailedMissingSource => format!("{}", "✖ Local file missing".with(Color::Red).bold()),
        SyncOutcome::FailedTransfer => format!("{}", "✖ Failed".with(Color::Red).bold()),
    }
}

/// Pad `path` to [`PATH_WIDTH`] display columns
fn pad_path(path: &str) -> String {
    let width = UnicodeWidthStr::width(path);
    if width >= PATH_WIDTH {
        path.to_string()
    } else {
        format!("{}{}", path, " ".repeat(PATH_WIDTH - width))
    }
}

impl SyncObserver for ConsoleProgress {
    fn run_started(&self, run: &RunInfo) {
        if run.dry_run {
            self.print(format!("{}", "DRY RUN MODE - No files will be copied".with(Color::Yellow).bold()));
        }
    }

    fn warning(&self, message: &str) {
        self.print(format!("{} {}", "warning:".with(Color::Yellow).bold(), message));
    }

    fn local_node_skipped(&self, address: &str) {
        self.print(format!("{}", format!("Skipping local node {}", address).with(Color::Yellow)));
    }

    fn target_started(&self, target: &Target, files: usize) {
        self.print(format!(
            "{}",
            format!("Pushing files to {} as {}...", target.address, target.user).with(Color::Cyan)
        ));
        let bar = self.multi.add(ProgressBar::new(files as u64));
        bar.set_style(Self::bar_style());
        bar.set_prefix(target.address.clone());
        self.bars.lock().insert(target.address.clone(), bar);
    }

    fn dir_result(&self, target: &Target, dir: &str, outcome: &DirOutcome) {
        let dir = if dir.is_empty() { "." } else { dir };
        match outcome {
            DirOutcome::Failed(msg) => self.print(format!(
                "{}",
                format!("  Failed to create directory {} on {}: {}", dir, target.address, msg)
                    .with(Color::Red)
            )),
            DirOutcome::BlockedByParent if self.verbose => self.print(format!(
                "  Skipping directory {} on {} (parent unavailable)",
                dir, target.address
            )),
            DirOutcome::Abandoned if self.verbose => self.print(format!(
                "  Skipping directory {} on {} (interrupted)",
                dir, target.address
            )),
            _ => {}
        }
    }

    fn file_result(&self, target: &Target, result: &SyncResult, progress: Progress) {
        if let Some(bar) = self.bars.lock().get(&target.address) {
            bar.set_position(progress.index as u64);
            bar.set_message(result.path.clone());
        }

        if result.outcome == SyncOutcome::SkippedIdentical && !self.verbose {
            return;
        }
        let mut line = format!(
            "Sync to {} {}/{} ({:.1}%) | {} {}",
            target.address,
            progress.index,
            progress.total,
            progress.percent(),
            pad_path(&result.path),
            status_text(result.outcome)
        );
        if let Some(detail) = &result.detail {
            if result.outcome.is_failure() {
                line.push_str(&format!(" ({})", detail));
            }
        }
        self.print(line);
    }

    fn target_finished(&self, target: &Target, summary: &TargetSummary) {
        if let Some(bar) = self.bars.lock().remove(&target.address) {
            let msg = if summary.failed() > 0 {
                format!("{}", format!("done, {} failed", summary.failed()).with(Color::Red))
            } else {
                format!("{}", "done".with(Color::Green))
            };
            bar.finish_with_message(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_path_uses_display_width() {
        assert_eq!(pad_path("a.txt").len(), PATH_WIDTH);
        // Two columns per CJK character
        let wide = "データ.txt";
        assert_eq!(UnicodeWidthStr::width(pad_path(wide).as_str()), PATH_WIDTH);
        let long = "x".repeat(60);
        assert_eq!(pad_path(&long), long);
    }

    #[test]
    fn test_status_text_names_outcome() {
        assert!(status_text(SyncOutcome::SkippedIdentical).contains("Skipped (identical)"));
        assert!(status_text(SyncOutcome::FailedMissingSource).contains("Local file missing"));
    }
}
