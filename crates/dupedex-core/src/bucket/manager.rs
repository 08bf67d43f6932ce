use super::Bucket;
use crate::error::Error;
use crate::hasher::Digest;
use crate::storage::Index;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct CleanReport {
    pub examined: usize,
    pub removed: usize,
    /// Buckets that could not be cleaned, by the name they were given as.
    pub bucket_errors: Vec<(String, Error)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketStats {
    pub bucket: Bucket,
    pub items: usize,
    pub stored_bytes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub bucket_count: usize,
    pub buckets: Vec<BucketStats>,
    pub size_on_disk: u64,
}

/// Creates, renames, removes and cleans buckets of one [`Index`].
pub struct BucketManager<'a> {
    index: &'a Index,
}

impl<'a> BucketManager<'a> {
    pub fn new(index: &'a Index) -> Self {
        BucketManager { index }
    }

    /// Canonicalize `names`; no names means every bucket in the index.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Bucket>, Error> {
        if names.is_empty() {
            return self.index.list_buckets();
        }
        names
            .iter()
            .map(|name| Bucket::canonicalize(name.as_ref()))
            .collect()
    }

    /// Register `dir` as an empty bucket. Returns the bucket and whether it
    /// is new.
    pub fn add(&self, dir: &Path) -> Result<(Bucket, bool), Error> {
        match fs::metadata(dir) {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(Error::NotADirectory(dir.to_path_buf()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::PathNotFound(dir.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        }
        let bucket = Bucket::canonicalize(dir)?;
        let created = self.index.update(|tx| tx.create_bucket(&bucket))?;
        if created {
            info!("Added bucket {}", bucket);
        }
        Ok((bucket, created))
    }

    pub fn count(&self, bucket: &Bucket) -> Result<usize, Error> {
        self.index.view(|tx| tx.count(bucket))
    }

    /// Sum of entry counts. Fails on the first name that cannot be resolved.
    pub fn total<S: AsRef<str>>(&self, names: &[S]) -> Result<usize, Error> {
        let buckets = self.resolve(names)?;
        self.index.view(|tx| {
            buckets
                .iter()
                .try_fold(0usize, |sum, bucket| -> Result<usize, Error> {
                    Ok(sum + tx.count(bucket)?)
                })
        })
    }

    pub fn list_entries(&self, bucket: &Bucket) -> Result<Vec<(String, Digest)>, Error> {
        self.index.view(|tx| tx.entries(bucket))
    }

    /// Drop entries whose file is gone. A bucket that fails is recorded and
    /// the remaining buckets are still cleaned.
    pub fn clean<S: AsRef<str>>(&self, names: &[S]) -> Result<CleanReport, Error> {
        let targets: Vec<(String, Result<Bucket, Error>)> = if names.is_empty() {
            self.index
                .list_buckets()?
                .into_iter()
                .map(|bucket| (bucket.to_string(), Ok(bucket)))
                .collect()
        } else {
            names
                .iter()
                .map(|name| (name.as_ref().to_string(), Bucket::canonicalize(name.as_ref())))
                .collect()
        };

        let mut report = CleanReport::default();
        for (name, bucket) in targets {
            match bucket.and_then(|bucket| self.clean_bucket(&bucket)) {
                Ok((examined, removed)) => {
                    report.examined += examined;
                    report.removed += removed;
                }
                Err(e) => {
                    warn!("Could not clean {}: {}", name, e);
                    report.bucket_errors.push((name, e));
                }
            }
        }
        Ok(report)
    }

    fn clean_bucket(&self, bucket: &Bucket) -> Result<(usize, usize), Error> {
        let started = Instant::now();
        let entries = self.list_entries(bucket)?;

        let stale: Vec<&str> = entries
            .par_iter()
            .filter(|(key, _)| is_stale(Path::new(key)))
            .map(|(key, _)| key.as_str())
            .collect();

        if !stale.is_empty() {
            self.index.update(|tx| {
                for key in &stale {
                    tx.delete(bucket, key)?;
                }
                Ok(())
            })?;
        }

        info!(
            "Cleaned {} in {:.2}s: {} examined, {} removed",
            bucket,
            started.elapsed().as_secs_f64(),
            entries.len(),
            stale.len()
        );
        Ok((entries.len(), stale.len()))
    }

    /// Move every entry of `old` into the new bucket `new` and drop `old`, in
    /// one transaction. Returns the number of entries moved.
    pub fn rename(&self, old: &str, new: &str) -> Result<usize, Error> {
        let from = Bucket::canonicalize(old)?;
        let to = Bucket::canonicalize(new)?;
        if from == to {
            return Err(Error::SameName(from.to_string()));
        }

        let moved = self.index.update(|tx| {
            if !tx.bucket_exists(&from) {
                return Err(Error::BucketNotFound(from.to_string()));
            }
            if tx.bucket_exists(&to) {
                return Err(Error::BucketExists(to.to_string()));
            }
            let entries = tx.reader().entries(&from)?;
            tx.create_bucket(&to)?;
            for (key, digest) in &entries {
                tx.put(&to, key, *digest)?;
            }
            tx.drop_bucket(&from)?;
            Ok(entries.len())
        })?;

        info!("Renamed {} to {} ({} entries)", from, to, moved);
        Ok(moved)
    }

    /// Returns the number of entries the bucket held.
    pub fn remove(&self, name: &str) -> Result<usize, Error> {
        let bucket = Bucket::canonicalize(name)?;
        let removed = self.index.update(|tx| {
            let count = tx.reader().count(&bucket)?;
            tx.drop_bucket(&bucket)?;
            Ok(count)
        })?;
        info!("Removed bucket {} ({} entries)", bucket, removed);
        Ok(removed)
    }

    pub fn stats(&self) -> Result<IndexStats, Error> {
        let buckets = self.index.list_buckets()?;
        let per_bucket = self.index.view(|tx| {
            buckets
                .iter()
                .map(|bucket| {
                    Ok(BucketStats {
                        bucket: bucket.clone(),
                        items: tx.count(bucket)?,
                        stored_bytes: tx.stored_bytes(bucket)?,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()
        })?;

        Ok(IndexStats {
            bucket_count: per_bucket.len(),
            buckets: per_bucket,
            size_on_disk: self.index.size_on_disk()?,
        })
    }
}

/// An entry is stale when its path is gone. If the nearest existing ancestor
/// is a non-empty regular file the key names something inside that file (an
/// archive member, or a directory now shadowed by a file) and is kept.
/// Errors other than not-found keep the entry.
fn is_stale(path: &Path) -> bool {
    let err = match fs::symlink_metadata(path) {
        Ok(_) => return false,
        Err(e) => e,
    };

    let ancestor = path
        .ancestors()
        .skip(1)
        .find_map(|ancestor| fs::metadata(ancestor).ok());
    match ancestor {
        Some(metadata) if metadata.is_file() => metadata.len() == 0,
        _ => {
            if err.kind() != io::ErrorKind::NotFound {
                debug!("Keeping {}: {}", path.display(), err);
                return false;
            }
            true
        }
    }
}
