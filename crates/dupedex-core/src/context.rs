use crate::bucket::Bucket;
use crate::compare::ChecksumMap;
use crate::error::Error;
use crate::platform;
use crate::progress::{ProgressReporter, SilentReporter};
use ahash::AHashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// State threaded through one logical operation. Never persisted.
pub struct ScanContext {
    /// Items being checked, resolved to absolute paths. The walker never
    /// indexes these, so a file is never compared against itself.
    pub sources: Vec<PathBuf>,
    pub buckets: Vec<Bucket>,
    pub checksums: ChecksumMap,
    pub files_processed: usize,
    /// Collect every written key in `ScanReport::written`.
    pub verbose: bool,
    /// Suppresses live progress and prompts.
    pub test_mode: bool,
    source_keys: AHashSet<String>,
    reporter: Arc<dyn ProgressReporter>,
}

impl ScanContext {
    pub fn new(sources: &[PathBuf], buckets: Vec<Bucket>) -> Result<Self, Error> {
        let mut resolved = Vec::with_capacity(sources.len());
        let mut source_keys = AHashSet::new();
        for source in sources {
            let path = match fs::canonicalize(source) {
                Ok(path) => platform::strip_verbatim_prefix(path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(Error::PathNotFound(source.clone()));
                }
                Err(e) => return Err(e.into()),
            };
            source_keys.insert(platform::fold_case(&path.to_string_lossy()));
            resolved.push(path);
        }

        Ok(ScanContext {
            sources: resolved,
            buckets,
            checksums: ChecksumMap::new(),
            files_processed: 0,
            verbose: false,
            test_mode: false,
            source_keys,
            reporter: Arc::new(SilentReporter),
        })
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn reporter(&self) -> &dyn ProgressReporter {
        if self.test_mode {
            &SilentReporter
        } else {
            self.reporter.as_ref()
        }
    }

    /// Whether `path` is one of the sources or lies beneath a source directory.
    pub fn is_source(&self, path: &Path) -> bool {
        self.is_source_key(&path.to_string_lossy())
    }

    pub fn is_source_key(&self, key: &str) -> bool {
        if self.source_keys.is_empty() {
            return false;
        }
        let folded = platform::fold_case(key);
        if self.source_keys.contains(&folded) {
            return true;
        }
        let candidate = Path::new(&folded);
        self.source_keys
            .iter()
            .any(|source| candidate.starts_with(Path::new(source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_source_is_path_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let result = ScanContext::new(&[tmp.path().join("missing")], Vec::new());
        assert!(matches!(result, Err(Error::PathNotFound(_))));
    }

    #[test]
    fn test_source_membership_covers_directory_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("incoming");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("x.txt"), b"x").unwrap();

        let ctx = ScanContext::new(&[dir.clone()], Vec::new()).unwrap();
        let canonical = fs::canonicalize(&dir).unwrap();
        assert!(ctx.is_source(&canonical));
        assert!(ctx.is_source(&canonical.join("x.txt")));
        assert!(!ctx.is_source(&canonical.with_file_name("incoming-other")));
    }
}
