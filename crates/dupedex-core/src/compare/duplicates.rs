use super::checksum_map::ChecksumMap;
use crate::error::Error;
use crate::hasher::{hash_file, Digest};
use crate::platform;
use crate::progress::ProgressReporter;
use crate::scanner::SkipPolicy;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    pub source: PathBuf,
    /// Representative path recorded for the digest.
    pub matched: String,
    pub digest: Digest,
}

#[derive(Debug, Default)]
pub struct CompareReport {
    /// In discovery order.
    pub matches: Vec<DuplicateMatch>,
    pub compared: usize,
    pub errors: Vec<(PathBuf, Error)>,
}

impl CompareReport {
    /// Matches ordered by source path.
    pub fn sorted(&self) -> Vec<&DuplicateMatch> {
        let mut matches: Vec<&DuplicateMatch> = self.matches.iter().collect();
        matches.sort_by(|a, b| a.source.cmp(&b.source));
        matches
    }
}

/// Digest comparison of source items against a loaded [`ChecksumMap`].
pub struct Comparator<'a> {
    policy: &'a SkipPolicy,
}

impl<'a> Comparator<'a> {
    pub fn new(policy: &'a SkipPolicy) -> Self {
        Comparator { policy }
    }

    /// Expand directories into the regular files beneath them, applying the
    /// skip policy. Files named directly are always kept.
    pub fn expand(
        &self,
        sources: &[PathBuf],
    ) -> Result<(Vec<PathBuf>, Vec<(PathBuf, Error)>), Error> {
        let mut files = Vec::new();
        let mut errors = Vec::new();

        for source in sources {
            let metadata = match fs::metadata(source) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(Error::PathNotFound(source.clone()));
                }
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_dir() {
                files.push(source.clone());
                continue;
            }

            let walker = WalkDir::new(source)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| {
                    !(entry.file_type().is_dir()
                        && self.policy.skip_dir(entry.path(), entry.depth() == 0))
                });
            for item in walker {
                match item {
                    Ok(entry) => {
                        if entry.file_type().is_file() && !self.policy.skip_file(entry.path()) {
                            files.push(entry.into_path());
                        }
                    }
                    Err(err) => {
                        let path = err
                            .path()
                            .map(Path::to_path_buf)
                            .unwrap_or_else(|| source.clone());
                        let denied = err.io_error().map(|e| e.kind())
                            == Some(io::ErrorKind::PermissionDenied);
                        if denied {
                            debug!("Access denied: {}", path.display());
                        } else {
                            errors.push((path, Error::Io(err.into())));
                        }
                    }
                }
            }
        }

        Ok((files, errors))
    }

    /// Hash each source file and report the ones whose digest is already in
    /// `checksums` under a different path.
    pub fn compare(
        &self,
        sources: &[PathBuf],
        checksums: &ChecksumMap,
        reporter: &dyn ProgressReporter,
    ) -> Result<CompareReport, Error> {
        let started = Instant::now();
        let (files, errors) = self.expand(sources)?;
        let mut report = CompareReport {
            errors,
            ..CompareReport::default()
        };
        reporter.on_compare_start(files.len());

        for (i, file) in files.iter().enumerate() {
            match hash_file(file) {
                Ok(digest) => {
                    report.compared += 1;
                    if let Some(matched) = checksums.get(&digest) {
                        if !same_path(file, matched) {
                            report.matches.push(DuplicateMatch {
                                source: file.clone(),
                                matched: matched.to_string(),
                                digest,
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to hash {}: {}", file.display(), e);
                    report.errors.push((file.clone(), e.into()));
                }
            }
            reporter.on_compare_progress(i + 1, files.len());
        }

        let duration = started.elapsed();
        info!(
            "Compared {} files in {:.2}s, {} duplicates",
            report.compared,
            duration.as_secs_f64(),
            report.matches.len()
        );
        reporter.on_compare_complete(report.matches.len(), duration.as_secs_f64());
        Ok(report)
    }
}

fn same_path(source: &Path, key: &str) -> bool {
    platform::fold_case(&source.to_string_lossy()) == platform::fold_case(key)
}
