use crate::archive::ArchiveInspector;
use crate::bucket::{Bucket, BucketManager, CleanReport, IndexStats};
use crate::compare::{search_names, CompareReport, Comparator, NameMatch, NameQuery};
use crate::config::AppConfig;
use crate::context::ScanContext;
use crate::error::Error;
use crate::export::{self, ImportReport};
use crate::hasher::Digest;
use crate::progress::{ProgressReporter, SilentReporter};
use crate::scanner::{ScanOptions, ScanReport, SkipPolicy, Walker};
use crate::storage::{self, Index, IndexStatus, OpenMode};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Top-level operations over one opened index. Each call builds its own
/// [`ScanContext`]; nothing carries over between calls.
pub struct Engine {
    config: AppConfig,
    index: Index,
    policy: SkipPolicy,
    inspector: ArchiveInspector,
    reporter: Arc<dyn ProgressReporter>,
    test_mode: bool,
}

#[derive(Debug)]
pub struct DupesResult {
    pub scans: Vec<ScanReport>,
    pub compare: CompareReport,
    /// Distinct digests the sources were compared against.
    pub checksum_count: usize,
    pub scan_duration: Duration,
    pub compare_duration: Duration,
}

impl Engine {
    pub fn open(config: AppConfig, mode: OpenMode) -> Result<Self, Error> {
        let index = Index::open(&config.index_path, mode, config.lock_timeout())?;
        let policy = SkipPolicy::from_config(&config);
        Ok(Engine {
            config,
            index,
            policy,
            inspector: ArchiveInspector::new(),
            reporter: Arc::new(SilentReporter),
            test_mode: false,
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn buckets(&self) -> BucketManager<'_> {
        BucketManager::new(&self.index)
    }

    /// Check the index location without opening it, recreating a zero-byte
    /// or empty index.
    pub fn verify(config: &AppConfig) -> Result<IndexStatus, Error> {
        storage::verify(&config.index_path)
    }

    fn context(&self, sources: &[PathBuf], buckets: Vec<Bucket>) -> Result<ScanContext, Error> {
        Ok(ScanContext::new(sources, buckets)?
            .with_verbose(self.config.verbose)
            .with_test_mode(self.test_mode)
            .with_reporter(self.reporter.clone()))
    }

    fn walker(&self) -> Walker<'_> {
        Walker::new(&self.index, &self.policy, &self.inspector)
    }

    /// Bring buckets up to date with their directories.
    ///
    /// Named directories must exist. With no directories every indexed bucket
    /// is rescanned and vanished ones are only warned about.
    pub fn scan(&self, dirs: &[PathBuf], opts: ScanOptions) -> Result<Vec<ScanReport>, Error> {
        let started = Instant::now();
        let reports = if dirs.is_empty() {
            let buckets = self.index.list_buckets()?;
            let mut ctx = self.context(&[], buckets)?;
            self.walker().scan_buckets(&mut ctx, opts)?
        } else {
            let buckets = dirs
                .iter()
                .map(Bucket::canonicalize)
                .collect::<Result<Vec<_>, _>>()?;
            let mut ctx = self.context(&[], buckets.clone())?;
            let walker = self.walker();
            let mut reports = Vec::with_capacity(buckets.len());
            for bucket in &buckets {
                reports.push(walker.scan_bucket_or_record(&mut ctx, bucket, opts)?);
            }
            reports
        };

        debug!(
            "Scan of {} buckets completed in {:.2}s",
            reports.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(reports)
    }

    /// Update `bucket_names` (all buckets if empty) from disk, then report
    /// which files under `sources` already exist in them.
    pub fn find_duplicates<S: AsRef<str>>(
        &self,
        sources: &[PathBuf],
        bucket_names: &[S],
        opts: ScanOptions,
    ) -> Result<DupesResult, Error> {
        let buckets = self.buckets().resolve(bucket_names)?;
        let mut ctx = self.context(sources, buckets)?;

        info!("Updating {} buckets...", ctx.buckets.len());
        let scan_start = Instant::now();
        let scans = self.walker().scan_buckets(&mut ctx, opts)?;
        let scan_duration = scan_start.elapsed();
        debug!(
            "Buckets updated in {:.2}s, {} distinct digests",
            scan_duration.as_secs_f64(),
            ctx.checksums.len()
        );

        info!("Comparing {} sources...", ctx.sources.len());
        let compare_start = Instant::now();
        let compare = Comparator::new(&self.policy).compare(
            &ctx.sources,
            &ctx.checksums,
            ctx.reporter(),
        )?;
        let compare_duration = compare_start.elapsed();
        debug!(
            "Compare completed in {:.2}s, {} matches",
            compare_duration.as_secs_f64(),
            compare.matches.len()
        );

        Ok(DupesResult {
            scans,
            compare,
            checksum_count: ctx.checksums.len(),
            scan_duration,
            compare_duration,
        })
    }

    /// Compare against what is already indexed, without touching the
    /// buckets. Works on a read-only index.
    pub fn compare_indexed<S: AsRef<str>>(
        &self,
        sources: &[PathBuf],
        bucket_names: &[S],
    ) -> Result<DupesResult, Error> {
        let buckets = self.buckets().resolve(bucket_names)?;
        let mut ctx = self.context(sources, buckets)?;

        let load_start = Instant::now();
        let mut checksums = std::mem::take(&mut ctx.checksums);
        self.index.view(|tx| {
            for bucket in &ctx.buckets {
                if !tx.bucket_exists(bucket) {
                    warn!("Bucket not indexed: {}", bucket);
                    continue;
                }
                checksums.load_bucket(tx, bucket, |key| ctx.is_source_key(key))?;
            }
            Ok(())
        })?;
        ctx.checksums = checksums;
        let scan_duration = load_start.elapsed();

        let compare_start = Instant::now();
        let compare = Comparator::new(&self.policy).compare(
            &ctx.sources,
            &ctx.checksums,
            ctx.reporter(),
        )?;

        Ok(DupesResult {
            scans: Vec::new(),
            compare,
            checksum_count: ctx.checksums.len(),
            scan_duration,
            compare_duration: compare_start.elapsed(),
        })
    }

    pub fn search<S: AsRef<str>>(
        &self,
        bucket_names: &[S],
        query: &NameQuery,
    ) -> Result<Vec<NameMatch>, Error> {
        let buckets = self.buckets().resolve(bucket_names)?;
        search_names(&self.index, &buckets, query)
    }

    pub fn list(&self, name: &str) -> Result<(Bucket, Vec<(String, Digest)>), Error> {
        let bucket = Bucket::canonicalize(name)?;
        let entries = self.buckets().list_entries(&bucket)?;
        Ok((bucket, entries))
    }

    pub fn add_bucket(&self, dir: &Path) -> Result<(Bucket, bool), Error> {
        self.buckets().add(dir)
    }

    pub fn clean<S: AsRef<str>>(&self, bucket_names: &[S]) -> Result<CleanReport, Error> {
        self.buckets().clean(bucket_names)
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<usize, Error> {
        self.buckets().rename(old, new)
    }

    pub fn remove(&self, name: &str) -> Result<usize, Error> {
        self.buckets().remove(name)
    }

    pub fn stats(&self) -> Result<IndexStats, Error> {
        self.buckets().stats()
    }

    pub fn compact(&self) -> Result<(u64, u64), Error> {
        self.index.compact()
    }

    /// Checkpoint the index into `dir`, or the configured backup directory.
    pub fn backup(&self, dir: Option<&Path>) -> Result<PathBuf, Error> {
        let dir = dir.map(Path::to_path_buf).unwrap_or_else(|| self.config.backup_dir());
        self.index.backup(&dir)
    }

    pub fn export<W: Write>(&self, name: &str, writer: W) -> Result<usize, Error> {
        let bucket = Bucket::canonicalize(name)?;
        export::export_bucket(&self.index, &bucket, writer)
    }

    /// Import a dump into `target`, or into the bucket its header names.
    pub fn import<R: BufRead>(
        &self,
        reader: R,
        target: Option<&str>,
    ) -> Result<ImportReport, Error> {
        let target = target.map(Bucket::canonicalize).transpose()?;
        export::import_bucket(&self.index, reader, target.as_ref())
    }
}
