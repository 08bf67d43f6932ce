use super::index::{store_options, Store};
use crate::error::Error;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStatus {
    pub exists: bool,
    pub size_bytes: u64,
    /// An empty or headless store was discarded and recreated.
    pub recreated: bool,
}

/// Check the store at `path` before it is opened.
///
/// A store with no data (a zero-byte file, an empty directory, or a
/// directory whose `CURRENT` pointer is missing or empty) is never used as
/// is: it is deleted and an empty store is created in its place. A non-empty
/// regular file where the store should be is reported as corrupt.
pub fn verify(path: &Path) -> Result<IndexStatus, Error> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(IndexStatus {
                exists: false,
                size_bytes: 0,
                recreated: false,
            });
        }
        Err(e) => return Err(e.into()),
    };

    if metadata.is_file() {
        if metadata.len() > 0 {
            return Err(Error::Corrupt(
                path.to_path_buf(),
                "expected an index directory, found a file".to_string(),
            ));
        }
        warn!("Index {} is a zero-byte file, recreating", path.display());
        fs::remove_file(path)?;
        return recreate(path);
    }

    let current = path.join("CURRENT");
    let headless = match fs::metadata(&current) {
        Ok(current) => current.len() == 0,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => return Err(e.into()),
    };
    if headless {
        if !only_store_files(path)? {
            return Err(Error::Corrupt(
                path.to_path_buf(),
                "directory has no CURRENT file and holds files that are not part of an index"
                    .to_string(),
            ));
        }
        warn!("Index {} has no valid CURRENT file, recreating", path.display());
        fs::remove_dir_all(path)?;
        return recreate(path);
    }

    let size_bytes = dir_size(path)?;
    debug!("Index {} verified, {} bytes", path.display(), size_bytes);
    Ok(IndexStatus {
        exists: true,
        size_bytes,
        recreated: false,
    })
}

/// Whether every entry directly under `path` is something RocksDB writes.
fn only_store_files(path: &Path) -> Result<bool, Error> {
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            return Ok(false);
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let known = matches!(name.as_ref(), "CURRENT" | "IDENTITY" | "LOCK" | "LOG")
            || name.starts_with("MANIFEST-")
            || name.starts_with("OPTIONS-")
            || name.starts_with("LOG.old")
            || name.ends_with(".sst")
            || name.ends_with(".log")
            || name.ends_with(".dbtmp");
        if !known {
            return Ok(false);
        }
    }
    Ok(true)
}

fn recreate(path: &Path) -> Result<IndexStatus, Error> {
    drop(Store::open(&store_options(), path)?);
    Ok(IndexStatus {
        exists: true,
        size_bytes: dir_size(path)?,
        recreated: true,
    })
}

/// Total size of the regular files under `path`.
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(path) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
