/// Trait for reporting scan and compare progress.
///
/// The CLI implements it with indicatif. All methods have default no-op
/// implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_bucket_start(&self, _bucket: &str) {}
    fn on_file_processed(&self, _files_processed: usize, _current_path: &str) {}
    fn on_bucket_complete(&self, _bucket: &str, _files: usize, _duration_secs: f64) {}
    fn on_compare_start(&self, _sources: usize) {}
    fn on_compare_progress(&self, _files_compared: usize, _total_files: usize) {}
    fn on_compare_complete(&self, _matches: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation and tests.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
