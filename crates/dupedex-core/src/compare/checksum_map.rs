use crate::bucket::Bucket;
use crate::error::Error;
use crate::hasher::Digest;
use crate::storage::ReadTxn;
use ahash::AHashMap;

/// Digest -> representative path for one operation.
///
/// The first path recorded for a digest is kept; later paths with the same
/// digest are ignored, so a match always names the earliest copy seen.
#[derive(Debug, Default, Clone)]
pub struct ChecksumMap {
    entries: AHashMap<Digest, String>,
}

impl ChecksumMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `path` became the representative for `digest`.
    pub fn insert(&mut self, digest: Digest, path: impl Into<String>) -> bool {
        match self.entries.entry(digest) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(path.into());
                true
            }
        }
    }

    pub fn get(&self, digest: &Digest) -> Option<&str> {
        self.entries.get(digest).map(String::as_str)
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.entries.contains_key(digest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pull every entry of `bucket` whose key is not rejected by `skip`.
    /// Returns how many digests were new to the map.
    pub fn load_bucket<F>(
        &mut self,
        txn: &ReadTxn<'_>,
        bucket: &Bucket,
        skip: F,
    ) -> Result<usize, Error>
    where
        F: Fn(&str) -> bool,
    {
        let mut added = 0usize;
        txn.for_each(bucket, |key, digest| {
            if !skip(key) && self.insert(digest, key) {
                added += 1;
            }
            Ok(())
        })?;
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_bytes;

    #[test]
    fn test_first_path_wins() {
        let mut map = ChecksumMap::new();
        let digest = hash_bytes(b"duplicate content");
        assert!(map.insert(digest, "/a"));
        assert!(!map.insert(digest, "/b"));
        assert_eq!(map.get(&digest), Some("/a"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_distinct_digests_are_kept() {
        let mut map = ChecksumMap::new();
        map.insert(hash_bytes(b"one"), "/one");
        map.insert(hash_bytes(b"two"), "/two");
        assert_eq!(map.len(), 2);
        assert!(map.contains(&hash_bytes(b"two")));
        assert!(!map.contains(&hash_bytes(b"three")));
    }
}
