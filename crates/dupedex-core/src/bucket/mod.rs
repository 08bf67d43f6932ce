mod manager;

pub use manager::{BucketManager, BucketStats, CleanReport, IndexStats};

use crate::error::Error;
use crate::platform;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A canonical absolute directory path naming one partition of the index.
///
/// The only public constructor is [`Bucket::canonicalize`], so two buckets
/// compare equal exactly when their canonical spellings are byte-equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bucket(String);

impl Bucket {
    /// Resolve `name` to an absolute path, lower-cased on case-insensitive
    /// file systems. Existing paths are resolved through the file system
    /// (symlinks included); missing ones are made absolute lexically so that
    /// buckets of vanished directories can still be addressed.
    pub fn canonicalize<P: AsRef<Path>>(name: P) -> Result<Bucket, Error> {
        let name = name.as_ref();
        if name.as_os_str().is_empty() {
            return Err(Error::EmptyName);
        }

        let resolved = match fs::canonicalize(name) {
            Ok(path) => platform::strip_verbatim_prefix(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let absolute = if name.is_absolute() {
                    name.to_path_buf()
                } else {
                    env::current_dir()?.join(name)
                };
                platform::normalize_lexically(&absolute)
            }
            Err(e) => return Err(e.into()),
        };

        let name = resolved
            .to_str()
            .ok_or_else(|| Error::NonUtf8Path(resolved.clone()))?;
        Ok(Bucket(platform::fold_case(name)))
    }

    /// Wrap a name that was already canonical when it was stored.
    pub(crate) fn from_canonical(name: String) -> Bucket {
        Bucket(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.0)
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for Bucket {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}
