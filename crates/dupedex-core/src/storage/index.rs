use super::txn::{ReadTxn, WriteTxn};
use super::verify;
use crate::bucket::Bucket;
use crate::error::Error;
use chrono::Local;
use rocksdb::checkpoint::Checkpoint;
use rocksdb::{DBWithThreadMode, MultiThreaded, Options, DEFAULT_COLUMN_FAMILY_NAME};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// RocksDB in multi-threaded column family mode, so buckets can be created
/// and dropped through a shared reference.
pub type Store = DBWithThreadMode<MultiThreaded>;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// The on-disk index: one column family per bucket, keys are absolute file
/// paths and values are raw 32-byte SHA-256 digests.
pub struct Index {
    db: Store,
    path: PathBuf,
    mode: OpenMode,
    writer: Mutex<()>,
}

impl Index {
    /// Open (creating if absent) the index at `path`.
    ///
    /// Read-write access waits up to `lock_timeout` for another process to
    /// release RocksDB's `LOCK` file and then fails with [`Error::Locked`].
    pub fn open(path: &Path, mode: OpenMode, lock_timeout: Duration) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let status = verify::verify(path)?;
        if !status.exists && mode == OpenMode::ReadOnly {
            // Read-only mode cannot create a store; make an empty one first.
            drop(Self::open(path, OpenMode::ReadWrite, lock_timeout)?);
        }

        let opts = store_options();
        let column_families = existing_column_families(&opts, path);
        let db = match mode {
            OpenMode::ReadOnly => {
                Store::open_cf_for_read_only(&opts, path, &column_families, false)
                    .map_err(|e| classify_open_error(path, e))?
            }
            OpenMode::ReadWrite => open_with_retry(&opts, path, &column_families, lock_timeout)?,
        };
        debug!(
            "Opened index {} ({:?}, {} column families)",
            path.display(),
            mode,
            column_families.len()
        );

        Ok(Index {
            db,
            path: path.to_path_buf(),
            mode,
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Run `f` against a read handle.
    pub fn view<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&ReadTxn<'_>) -> Result<T, Error>,
    {
        let txn = ReadTxn::new(&self.db);
        f(&txn)
    }

    /// Run `f` inside a write transaction. Writes become visible only if `f`
    /// returns `Ok`; an error or a panic inside `f` leaves the store as it was.
    pub fn update<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut WriteTxn<'_>) -> Result<T, Error>,
    {
        if self.mode == OpenMode::ReadOnly {
            return Err(Error::ReadOnly);
        }
        // A panic in an earlier transaction poisons the mutex but never
        // committed anything, so the guard is still usable.
        let _guard = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut txn = WriteTxn::new(&self.db);
        let value = f(&mut txn)?;
        txn.commit()?;
        Ok(value)
    }

    pub fn list_buckets(&self) -> Result<Vec<Bucket>, Error> {
        let mut names = Store::list_cf(&Options::default(), &self.path)?;
        names.retain(|name| name != DEFAULT_COLUMN_FAMILY_NAME);
        names.sort();
        Ok(names.into_iter().map(Bucket::from_canonical).collect())
    }

    pub fn bucket_exists(&self, bucket: &Bucket) -> bool {
        self.db.cf_handle(bucket.as_str()).is_some()
    }

    /// Full-range compaction of every column family. RocksDB rewrites the
    /// live data into fresh table files and swaps them in atomically.
    /// Returns the on-disk size before and after.
    pub fn compact(&self) -> Result<(u64, u64), Error> {
        if self.mode == OpenMode::ReadOnly {
            return Err(Error::ReadOnly);
        }
        let before = verify::dir_size(&self.path)?;
        self.db.flush()?;
        self.db.compact_range(None::<&[u8]>, None::<&[u8]>);
        for bucket in self.list_buckets()? {
            if let Some(cf) = self.db.cf_handle(bucket.as_str()) {
                trace!("Compacting {}", bucket);
                self.db.flush_cf(&cf)?;
                self.db.compact_range_cf(&cf, None::<&[u8]>, None::<&[u8]>);
            }
        }
        let after = verify::dir_size(&self.path)?;
        info!("Compacted index {}: {} -> {} bytes", self.path.display(), before, after);
        Ok((before, after))
    }

    /// Write a consistent checkpoint of the whole index into a new,
    /// timestamped directory under `backup_dir`.
    pub fn backup(&self, backup_dir: &Path) -> Result<PathBuf, Error> {
        fs::create_dir_all(backup_dir)?;
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let mut target = backup_dir.join(format!("index-{}", stamp));
        let mut suffix = 1;
        while target.exists() {
            target = backup_dir.join(format!("index-{}-{}", stamp, suffix));
            suffix += 1;
        }

        let checkpoint = Checkpoint::new(&self.db)?;
        checkpoint.create_checkpoint(&target)?;
        info!("Backed up index to {}", target.display());
        Ok(target)
    }

    pub fn size_on_disk(&self) -> Result<u64, Error> {
        Ok(verify::dir_size(&self.path)?)
    }
}

pub(crate) fn store_options() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);
    opts
}

fn existing_column_families(opts: &Options, path: &Path) -> Vec<String> {
    match Store::list_cf(opts, path) {
        Ok(names) => names,
        Err(_) => vec![DEFAULT_COLUMN_FAMILY_NAME.to_string()],
    }
}

fn open_with_retry(
    opts: &Options,
    path: &Path,
    column_families: &[String],
    lock_timeout: Duration,
) -> Result<Store, Error> {
    let deadline = Instant::now() + lock_timeout;
    loop {
        match Store::open_cf(opts, path, column_families) {
            Ok(db) => return Ok(db),
            Err(e) if is_lock_error(&e) => {
                if Instant::now() >= deadline {
                    debug!("Gave up waiting for index lock: {}", e);
                    return Err(Error::Locked(path.to_path_buf()));
                }
                trace!("Index {} is locked, retrying", path.display());
                thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(e) => return Err(classify_open_error(path, e)),
        }
    }
}

fn is_lock_error(e: &rocksdb::Error) -> bool {
    if e.kind() != rocksdb::ErrorKind::IOError {
        return false;
    }
    let message = e.to_string();
    message.contains("lock file") || message.contains("lock hold")
}

fn classify_open_error(path: &Path, e: rocksdb::Error) -> Error {
    match e.kind() {
        rocksdb::ErrorKind::Corruption => Error::Corrupt(path.to_path_buf(), e.to_string()),
        _ => Error::Database(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_bytes;

    fn bucket_in(tmp: &Path, name: &str) -> Bucket {
        let dir = tmp.join(name);
        fs::create_dir_all(&dir).unwrap();
        Bucket::canonicalize(&dir).unwrap()
    }

    fn open_rw(path: &Path) -> Index {
        Index::open(path, OpenMode::ReadWrite, Duration::ZERO).unwrap()
    }

    #[test]
    fn test_update_commits_and_view_reads() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open_rw(&tmp.path().join("index"));
        let bucket = bucket_in(tmp.path(), "docs");
        let digest = hash_bytes(b"hello");

        index
            .update(|tx| tx.put(&bucket, "/docs/a.txt", digest))
            .unwrap();

        let stored = index.view(|tx| tx.get(&bucket, "/docs/a.txt")).unwrap();
        assert_eq!(stored, Some(digest));
        assert_eq!(index.list_buckets().unwrap(), vec![bucket]);
    }

    #[test]
    fn test_failed_update_rolls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open_rw(&tmp.path().join("index"));
        let bucket = bucket_in(tmp.path(), "docs");

        let result: Result<(), Error> = index.update(|tx| {
            tx.put(&bucket, "/docs/a.txt", hash_bytes(b"a"))?;
            Err(Error::Other("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(!index.bucket_exists(&bucket));
        assert!(index.list_buckets().unwrap().is_empty());
    }

    #[test]
    fn test_panicking_update_rolls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open_rw(&tmp.path().join("index"));
        let bucket = bucket_in(tmp.path(), "docs");
        index
            .update(|tx| tx.put(&bucket, "/docs/keep.txt", hash_bytes(b"keep")))
            .unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = index.update(|tx| -> Result<(), Error> {
                tx.put(&bucket, "/docs/lost.txt", hash_bytes(b"lost"))?;
                panic!("decoder blew up");
            });
        }));
        assert!(outcome.is_err());

        let count = index.view(|tx| tx.count(&bucket)).unwrap();
        assert_eq!(count, 1);
        // The writer mutex was poisoned but the index stays writable.
        index
            .update(|tx| tx.put(&bucket, "/docs/after.txt", hash_bytes(b"after")))
            .unwrap();
    }

    #[test]
    fn test_second_writer_is_locked_out() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index");
        let _first = open_rw(&path);
        let second = Index::open(&path, OpenMode::ReadWrite, Duration::from_millis(120));
        assert!(matches!(second, Err(Error::Locked(_))));
    }

    #[test]
    fn test_damaged_store_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index");
        drop(open_rw(&path));
        fs::write(path.join("CURRENT"), b"MANIFEST-999999").unwrap();

        let result = Index::open(&path, OpenMode::ReadWrite, Duration::ZERO);
        assert!(matches!(result, Err(Error::Corrupt(..))));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index");
        let index = Index::open(&path, OpenMode::ReadOnly, Duration::ZERO).unwrap();
        let bucket = bucket_in(tmp.path(), "docs");
        let result = index.update(|tx| tx.put(&bucket, "/docs/x", hash_bytes(b"x")));
        assert!(matches!(result, Err(Error::ReadOnly)));
    }

    #[test]
    fn test_backup_creates_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open_rw(&tmp.path().join("index"));
        let bucket = bucket_in(tmp.path(), "docs");
        index
            .update(|tx| tx.put(&bucket, "/docs/a", hash_bytes(b"a")))
            .unwrap();

        let target = index.backup(&tmp.path().join("backups")).unwrap();
        assert!(target.join("CURRENT").exists());

        let restored = Index::open(&target, OpenMode::ReadOnly, Duration::ZERO).unwrap();
        assert_eq!(restored.view(|tx| tx.count(&bucket)).unwrap(), 1);
    }
}
