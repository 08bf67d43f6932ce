use dupedex_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// indicatif progress for the CLI.
///
/// - Bucket walk: spinner, since the file count is not known upfront
/// - Compare: progress bar over the expanded source files
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.slot();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.slot().take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(message: String) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(TICK_CHARS),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }
}

impl ProgressReporter for CliReporter {
    fn on_bucket_start(&self, bucket: &str) {
        self.set_bar(Self::spinner(format!("Scanning {}...", bucket)));
    }

    fn on_file_processed(&self, files_processed: usize, _current_path: &str) {
        if let Some(pb) = self.slot().as_ref() {
            pb.set_message(format!("Scanning... {} files", files_processed));
        }
    }

    fn on_bucket_complete(&self, bucket: &str, files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m {}: {} files in {:.2}s",
            bucket, files, duration_secs
        );
    }

    fn on_compare_start(&self, sources: usize) {
        let pb = ProgressBar::new(sources as u64);
        pb.set_style(
            ProgressStyle::with_template(concat!(
                "  {spinner:.cyan} Comparing [{bar:30.cyan/dim}] ",
                "{pos}/{len} files ({eta} remaining)"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─")
            .tick_chars(TICK_CHARS),
        );
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_compare_progress(&self, files_compared: usize, total_files: usize) {
        if let Some(pb) = self.slot().as_ref() {
            if pb.length() != Some(total_files as u64) {
                pb.set_length(total_files as u64);
            }
            pb.set_position(files_compared as u64);
        }
    }

    fn on_compare_complete(&self, matches: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Compare complete: {} duplicates in {:.2}s",
            matches, duration_secs
        );
    }
}
