use super::skip::SkipPolicy;
use crate::archive::ArchiveInspector;
use crate::bucket::Bucket;
use crate::context::ScanContext;
use crate::error::Error;
use crate::hasher::hash_file;
use crate::storage::Index;
use ahash::AHashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Re-hash files that already have a digest in the bucket.
    pub rescan: bool,
    /// Hash the members of recognised archives as well.
    pub archives: bool,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub bucket: String,
    /// Regular files reached by the walk.
    pub visited: usize,
    /// Digests written to the index (new or changed).
    pub hashed: usize,
    /// Files whose stored digest was reused.
    pub unchanged: usize,
    pub skipped: usize,
    pub archives: usize,
    pub members: usize,
    /// Digests taken from the index for keys the walk did not reach.
    pub loaded: usize,
    /// Keys whose digest was written, collected only for verbose contexts.
    pub written: Vec<String>,
    pub errors: Vec<(PathBuf, Error)>,
}

/// Brings buckets up to date with the file system, one file per transaction,
/// and fills the context's checksum map as it goes.
pub struct Walker<'a> {
    index: &'a Index,
    policy: &'a SkipPolicy,
    inspector: &'a ArchiveInspector,
    index_root: Option<PathBuf>,
}

impl<'a> Walker<'a> {
    pub fn new(index: &'a Index, policy: &'a SkipPolicy, inspector: &'a ArchiveInspector) -> Self {
        let index_root = fs::canonicalize(index.path()).ok();
        Walker {
            index,
            policy,
            inspector,
            index_root,
        }
    }

    /// Walk every bucket in `ctx.buckets`.
    ///
    /// A bucket whose directory is gone is not fatal: if the index knows it,
    /// its stored digests are used as they are; otherwise it is skipped with
    /// a warning.
    pub fn scan_buckets(
        &self,
        ctx: &mut ScanContext,
        opts: ScanOptions,
    ) -> Result<Vec<ScanReport>, Error> {
        let buckets = ctx.buckets.clone();
        let mut reports = Vec::with_capacity(buckets.len());

        for bucket in &buckets {
            match self.scan_bucket_or_record(ctx, bucket, opts) {
                Ok(report) => reports.push(report),
                Err(Error::PathNotFound(root)) => {
                    if self.index.bucket_exists(bucket) {
                        warn!(
                            "{} not found on disk, using its indexed digests",
                            root.display()
                        );
                        let loaded = self.load_digests(ctx, bucket, &AHashSet::new())?;
                        reports.push(ScanReport {
                            bucket: bucket.to_string(),
                            loaded,
                            ..ScanReport::default()
                        });
                    } else {
                        warn!("Skipping {}: not indexed and not found on disk", bucket);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(reports)
    }

    /// [`Walker::scan_bucket`], except that an I/O failure on the bucket root
    /// ends only this bucket's walk. The failure is recorded in the report and
    /// the bucket's stored digests are still loaded.
    pub fn scan_bucket_or_record(
        &self,
        ctx: &mut ScanContext,
        bucket: &Bucket,
        opts: ScanOptions,
    ) -> Result<ScanReport, Error> {
        match self.scan_bucket(ctx, bucket, opts) {
            Err(Error::Io(e)) => {
                error!("Cannot walk {}: {}", bucket, e);
                let loaded = self.load_digests(ctx, bucket, &AHashSet::new())?;
                Ok(ScanReport {
                    bucket: bucket.to_string(),
                    loaded,
                    errors: vec![(bucket.to_path_buf(), Error::Io(e))],
                    ..ScanReport::default()
                })
            }
            other => other,
        }
    }

    pub fn scan_bucket(
        &self,
        ctx: &mut ScanContext,
        bucket: &Bucket,
        opts: ScanOptions,
    ) -> Result<ScanReport, Error> {
        let root = bucket.path();
        let metadata = match fs::metadata(root) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::PathNotFound(root.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_dir() {
            return Err(Error::NotADirectory(root.to_path_buf()));
        }

        let started = Instant::now();
        info!("Scanning {}", bucket);
        ctx.reporter().on_bucket_start(bucket.as_str());

        let mut report = ScanReport {
            bucket: bucket.to_string(),
            ..ScanReport::default()
        };
        let mut visited: AHashSet<String> = AHashSet::new();

        let entries = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir() && self.skip_dir(entry.path(), entry.depth() == 0))
            });

        for item in entries {
            let entry = match item {
                Ok(entry) => entry,
                Err(err) => {
                    if err.depth() == 0 {
                        return Err(Error::Io(err.into()));
                    }
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf());
                    if err.io_error().map(|e| e.kind()) == Some(io::ErrorKind::PermissionDenied) {
                        debug!("Access denied: {}", path.display());
                        report.skipped += 1;
                    } else {
                        warn!("Error walking {}: {}", path.display(), err);
                        report.errors.push((path, Error::Io(err.into())));
                    }
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            let path = entry.path();
            if !file_type.is_file() {
                trace!("Skipping non-regular entry {}", path.display());
                report.skipped += 1;
                continue;
            }
            if self.policy.skip_file(path) || ctx.is_source(path) {
                report.skipped += 1;
                continue;
            }

            // Keys must name the file exactly; a lossy key would look stale to `clean`.
            let Some(key) = path.to_str().map(str::to_owned) else {
                warn!("Skipping {}: name is not valid UTF-8", path.display());
                report
                    .errors
                    .push((path.to_path_buf(), Error::NonUtf8Path(path.to_path_buf())));
                continue;
            };
            report.visited += 1;
            match self.index_file(ctx, bucket, path, &key, opts.rescan) {
                Ok(true) => {
                    report.hashed += 1;
                    if ctx.verbose {
                        report.written.push(key.clone());
                    }
                }
                Ok(false) => report.unchanged += 1,
                Err(e) => {
                    warn!("Failed to index {}: {}", path.display(), e);
                    report.errors.push((path.to_path_buf(), e));
                }
            }

            if opts.archives {
                self.index_archive(ctx, bucket, path, &mut visited, &mut report)?;
            }

            ctx.files_processed += 1;
            ctx.reporter().on_file_processed(ctx.files_processed, &key);
            visited.insert(key);
        }

        report.loaded = self.load_digests(ctx, bucket, &visited)?;

        let duration = started.elapsed();
        info!(
            "Scanned {} in {:.2}s: {} files, {} hashed, {} unchanged, {} errors",
            bucket,
            duration.as_secs_f64(),
            report.visited,
            report.hashed,
            report.unchanged,
            report.errors.len(),
        );
        ctx.reporter()
            .on_bucket_complete(bucket.as_str(), report.visited, duration.as_secs_f64());
        Ok(report)
    }

    fn skip_dir(&self, path: &Path, is_root: bool) -> bool {
        if self.index_root.as_deref() == Some(path) {
            return true;
        }
        self.policy.skip_dir(path, is_root)
    }

    /// Returns `true` if a digest was written.
    fn index_file(
        &self,
        ctx: &mut ScanContext,
        bucket: &Bucket,
        path: &Path,
        key: &str,
        rescan: bool,
    ) -> Result<bool, Error> {
        let existing = self.index.view(|tx| tx.lookup(bucket, key))?;
        if let (Some(digest), false) = (existing, rescan) {
            ctx.checksums.insert(digest, key);
            return Ok(false);
        }

        let digest = hash_file(path)?;
        let changed = existing != Some(digest);
        if changed {
            self.index.update(|tx| tx.put(bucket, key, digest))?;
        }
        trace!("{} {}", digest, path.display());
        ctx.checksums.insert(digest, key);
        Ok(changed)
    }

    /// Members are always re-hashed so additions to an archive are picked up.
    /// A broken or unsupported archive is logged and left as a plain file.
    fn index_archive(
        &self,
        ctx: &mut ScanContext,
        bucket: &Bucket,
        path: &Path,
        visited: &mut AHashSet<String>,
        report: &mut ScanReport,
    ) -> Result<(), Error> {
        let Some(format) = self.inspector.detect(path) else {
            return Ok(());
        };
        report.archives += 1;

        let inspected = match self.inspector.inspect(path, format) {
            Ok(inspected) => inspected,
            Err(e) => {
                warn!("Skipping archive {}: {}", path.display(), e);
                report.errors.push((path.to_path_buf(), e));
                return Ok(());
            }
        };
        for rejected in inspected.rejected {
            report.errors.push((path.to_path_buf(), rejected));
        }

        let members = inspected.members;
        let written = self.index.update(|tx| {
            let mut written = Vec::new();
            for member in &members {
                if tx.get(bucket, &member.key)? != Some(member.digest) {
                    tx.put(bucket, &member.key, member.digest)?;
                    written.push(member.key.clone());
                }
            }
            Ok(written)
        })?;
        debug!(
            "Archive {} ({}): {} members, {} written",
            path.display(),
            format,
            members.len(),
            written.len()
        );

        report.members += members.len();
        report.hashed += written.len();
        if ctx.verbose {
            report.written.extend(written.iter().cloned());
        }
        for member in members {
            ctx.checksums.insert(member.digest, member.key.clone());
            visited.insert(member.key);
        }
        Ok(())
    }

    /// Add the bucket's stored digests for keys outside `visited` to the map.
    fn load_digests(
        &self,
        ctx: &mut ScanContext,
        bucket: &Bucket,
        visited: &AHashSet<String>,
    ) -> Result<usize, Error> {
        if !self.index.bucket_exists(bucket) {
            return Ok(0);
        }
        let mut checksums = std::mem::take(&mut ctx.checksums);
        let loaded = self.index.view(|tx| {
            checksums.load_bucket(tx, bucket, |key| {
                visited.contains(key) || ctx.is_source_key(key)
            })
        });
        ctx.checksums = checksums;
        loaded
    }
}
