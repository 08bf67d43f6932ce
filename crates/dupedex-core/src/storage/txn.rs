use super::index::Store;
use crate::bucket::Bucket;
use crate::error::Error;
use crate::hasher::Digest;
use rocksdb::{BoundColumnFamily, IteratorMode, Options, WriteBatch};
use std::sync::Arc;
use tracing::{trace, warn};

/// Read handle over the committed state of the index.
pub struct ReadTxn<'a> {
    db: &'a Store,
}

impl<'a> ReadTxn<'a> {
    pub(crate) fn new(db: &'a Store) -> Self {
        ReadTxn { db }
    }

    fn handle(&self, bucket: &Bucket) -> Result<Arc<BoundColumnFamily<'a>>, Error> {
        self.db
            .cf_handle(bucket.as_str())
            .ok_or_else(|| Error::BucketNotFound(bucket.to_string()))
    }

    pub fn bucket_exists(&self, bucket: &Bucket) -> bool {
        self.db.cf_handle(bucket.as_str()).is_some()
    }

    /// Digest stored for `key`. Fails with `BucketNotFound` if the bucket is absent.
    pub fn get(&self, bucket: &Bucket, key: &str) -> Result<Option<Digest>, Error> {
        let cf = self.handle(bucket)?;
        match self.db.get_cf(&cf, key.as_bytes())? {
            Some(value) => Ok(Some(Digest::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Like [`ReadTxn::get`] but an absent bucket simply has no entries.
    pub fn lookup(&self, bucket: &Bucket, key: &str) -> Result<Option<Digest>, Error> {
        if !self.bucket_exists(bucket) {
            return Ok(None);
        }
        self.get(bucket, key)
    }

    /// Visit every entry of `bucket` in key order.
    pub fn for_each<F>(&self, bucket: &Bucket, mut f: F) -> Result<(), Error>
    where
        F: FnMut(&str, Digest) -> Result<(), Error>,
    {
        let cf = self.handle(bucket)?;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            let key = String::from_utf8_lossy(&key);
            let digest = Digest::from_slice(&value)?;
            f(&key, digest)?;
        }
        Ok(())
    }

    pub fn entries(&self, bucket: &Bucket) -> Result<Vec<(String, Digest)>, Error> {
        let mut entries = Vec::new();
        self.for_each(bucket, |key, digest| {
            entries.push((key.to_string(), digest));
            Ok(())
        })?;
        Ok(entries)
    }

    pub fn count(&self, bucket: &Bucket) -> Result<usize, Error> {
        let cf = self.handle(bucket)?;
        let mut count = 0usize;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Bytes of keys plus values held by `bucket`.
    pub fn stored_bytes(&self, bucket: &Bucket) -> Result<u64, Error> {
        let cf = self.handle(bucket)?;
        let mut total = 0u64;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            total += (key.len() + value.len()) as u64;
        }
        Ok(total)
    }
}

/// Write handle. Puts and deletes are staged in a `WriteBatch` and applied
/// atomically on commit. Reads through a `WriteTxn` see committed state only.
///
/// Bucket creation cannot be batched in RocksDB, so buckets created inside a
/// transaction are dropped again if it does not commit. Bucket drops are
/// deferred until after the batch is written.
pub struct WriteTxn<'a> {
    db: &'a Store,
    batch: WriteBatch,
    created: Vec<String>,
    dropped: Vec<String>,
    committed: bool,
}

impl<'a> WriteTxn<'a> {
    pub(crate) fn new(db: &'a Store) -> Self {
        WriteTxn {
            db,
            batch: WriteBatch::default(),
            created: Vec::new(),
            dropped: Vec::new(),
            committed: false,
        }
    }

    pub fn reader(&self) -> ReadTxn<'a> {
        ReadTxn::new(self.db)
    }

    pub fn get(&self, bucket: &Bucket, key: &str) -> Result<Option<Digest>, Error> {
        self.reader().lookup(bucket, key)
    }

    pub fn bucket_exists(&self, bucket: &Bucket) -> bool {
        self.reader().bucket_exists(bucket)
    }

    /// Returns `true` if the bucket did not exist before.
    pub fn create_bucket(&mut self, bucket: &Bucket) -> Result<bool, Error> {
        if self.bucket_exists(bucket) {
            return Ok(false);
        }
        self.db.create_cf(bucket.as_str(), &Options::default())?;
        self.created.push(bucket.to_string());
        trace!("Created bucket {}", bucket);
        Ok(true)
    }

    /// Stage `key -> digest`, creating the bucket on first write.
    pub fn put(&mut self, bucket: &Bucket, key: &str, digest: Digest) -> Result<(), Error> {
        self.create_bucket(bucket)?;
        let cf = self.reader().handle(bucket)?;
        self.batch.put_cf(&cf, key.as_bytes(), digest.as_bytes());
        Ok(())
    }

    pub fn delete(&mut self, bucket: &Bucket, key: &str) -> Result<(), Error> {
        let cf = self.reader().handle(bucket)?;
        self.batch.delete_cf(&cf, key.as_bytes());
        Ok(())
    }

    pub fn drop_bucket(&mut self, bucket: &Bucket) -> Result<(), Error> {
        if !self.bucket_exists(bucket) {
            return Err(Error::BucketNotFound(bucket.to_string()));
        }
        self.dropped.push(bucket.to_string());
        Ok(())
    }

    /// Number of staged puts and deletes.
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    pub(crate) fn commit(mut self) -> Result<(), Error> {
        let batch = std::mem::take(&mut self.batch);
        if !batch.is_empty() {
            self.db.write(batch)?;
        }
        self.committed = true;
        for name in std::mem::take(&mut self.dropped) {
            self.db.drop_cf(&name)?;
            trace!("Dropped bucket {}", name);
        }
        Ok(())
    }
}

impl Drop for WriteTxn<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for name in self.created.drain(..) {
            if let Err(e) = self.db.drop_cf(&name) {
                warn!("Failed to roll back bucket {}: {}", name, e);
            }
        }
    }
}
