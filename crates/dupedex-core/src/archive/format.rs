use ahash::AHashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::RwLock;
use tracing::trace;

/// Bytes read from the head of a file when sniffing for a signature. Enough
/// to reach the `ustar` magic at offset 257.
const SNIFF_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    TarZst,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
    Zip,
    SevenZ,
    Rar,
    Cab,
    Iso,
}

/// Suffix lookup order. Compound suffixes come before their last component
/// so `.tar.gz` is never read as plain gzip.
const EXTENSION_TABLE: &[(&str, ArchiveFormat)] = &[
    (".tar.gz", ArchiveFormat::TarGz),
    (".tar.bz2", ArchiveFormat::TarBz2),
    (".tar.xz", ArchiveFormat::TarXz),
    (".tar.zst", ArchiveFormat::TarZst),
    (".tgz", ArchiveFormat::TarGz),
    (".tbz2", ArchiveFormat::TarBz2),
    (".tbz", ArchiveFormat::TarBz2),
    (".txz", ArchiveFormat::TarXz),
    (".tzst", ArchiveFormat::TarZst),
    (".tar", ArchiveFormat::Tar),
    (".gz", ArchiveFormat::Gzip),
    (".bz2", ArchiveFormat::Bzip2),
    (".xz", ArchiveFormat::Xz),
    (".zst", ArchiveFormat::Zstd),
    (".zip", ArchiveFormat::Zip),
    (".jar", ArchiveFormat::Zip),
    (".7z", ArchiveFormat::SevenZ),
    (".rar", ArchiveFormat::Rar),
    (".cab", ArchiveFormat::Cab),
    (".iso", ArchiveFormat::Iso),
];

impl ArchiveFormat {
    /// Whether members of this format can be read. The rest are recognised
    /// only so they can be reported.
    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            ArchiveFormat::Rar | ArchiveFormat::Cab | ArchiveFormat::Iso
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::TarXz => "tar.xz",
            ArchiveFormat::TarZst => "tar.zst",
            ArchiveFormat::Gzip => "gzip",
            ArchiveFormat::Bzip2 => "bzip2",
            ArchiveFormat::Xz => "xz",
            ArchiveFormat::Zstd => "zstd",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::SevenZ => "7z",
            ArchiveFormat::Rar => "rar",
            ArchiveFormat::Cab => "cab",
            ArchiveFormat::Iso => "iso",
        }
    }

    /// Match a lower-cased suffix such as `.tar.gz` against the table.
    pub fn from_suffix(suffix: &str) -> Option<ArchiveFormat> {
        EXTENSION_TABLE
            .iter()
            .find(|(ext, _)| suffix.ends_with(ext))
            .map(|(_, format)| *format)
    }

    /// Identify a container from its leading bytes.
    pub fn from_signature(head: &[u8]) -> Option<ArchiveFormat> {
        let kind = infer::get(head)?;
        let format = match kind.extension() {
            "tar" => ArchiveFormat::Tar,
            "gz" => ArchiveFormat::Gzip,
            "bz2" => ArchiveFormat::Bzip2,
            "xz" => ArchiveFormat::Xz,
            "zst" => ArchiveFormat::Zstd,
            "zip" | "jar" => ArchiveFormat::Zip,
            "7z" => ArchiveFormat::SevenZ,
            "rar" => ArchiveFormat::Rar,
            "cab" => ArchiveFormat::Cab,
            _ => return None,
        };
        trace!("Signature {} -> {}", kind.mime_type(), format);
        Some(format)
    }

    pub fn sniff(path: &Path) -> io::Result<Option<ArchiveFormat>> {
        let mut head = Vec::with_capacity(SNIFF_LEN);
        File::open(path)?
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut head)?;
        Ok(Self::from_signature(&head))
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lower-cased suffix made of at most the last two extensions of the file
/// name, e.g. `.tar.gz` for `Backup.TAR.GZ`.
pub(crate) fn suffix_key(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 2 {
        return None;
    }
    let keep = if parts.len() >= 3 { 2 } else { 1 };
    let tail = &parts[parts.len() - keep..];
    Some(format!(".{}", tail.join(".")))
}

/// Suffix -> format memo shared across walker threads of one process.
/// Lookups take the read lock; the write lock is held only to insert.
#[derive(Debug, Default)]
pub struct FormatCache {
    by_suffix: RwLock<AHashMap<String, Option<ArchiveFormat>>>,
}

impl FormatCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, path: &Path) -> Option<ArchiveFormat> {
        let key = suffix_key(path)?;
        {
            let cache = self
                .by_suffix
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(format) = cache.get(&key) {
                return *format;
            }
        }

        let format = ArchiveFormat::from_suffix(&key);
        self.by_suffix
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, format);
        format
    }

    pub fn len(&self) -> usize {
        self.by_suffix
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_compound_suffix_wins() {
        assert_eq!(ArchiveFormat::from_suffix(".tar.gz"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_suffix(".gz"), Some(ArchiveFormat::Gzip));
        assert_eq!(ArchiveFormat::from_suffix(".backup.zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_suffix(".txt"), None);
    }

    #[test]
    fn test_suffix_key() {
        assert_eq!(
            suffix_key(Path::new("/data/Backup.TAR.GZ")).as_deref(),
            Some(".tar.gz")
        );
        assert_eq!(suffix_key(Path::new("/data/a.zip")).as_deref(), Some(".zip"));
        assert_eq!(suffix_key(Path::new("/data/README")), None);
    }

    #[test]
    fn test_cache_records_misses_once() {
        let cache = FormatCache::new();
        let paths: Vec<PathBuf> = ["a.txt", "b.txt", "c.TXT", "d.7z"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let found: Vec<_> = paths.iter().map(|p| cache.lookup(p)).collect();
        assert_eq!(found, vec![None, None, None, Some(ArchiveFormat::SevenZ)]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_signature_detection() {
        let gzip = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(ArchiveFormat::from_signature(&gzip), Some(ArchiveFormat::Gzip));
        let zip = [b'P', b'K', 0x03, 0x04, 0x14, 0x00, 0x00, 0x00];
        assert_eq!(ArchiveFormat::from_signature(&zip), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_signature(b"plain text"), None);
    }

    #[test]
    fn test_unsupported_formats_are_recognised() {
        assert_eq!(ArchiveFormat::from_suffix(".rar"), Some(ArchiveFormat::Rar));
        assert!(!ArchiveFormat::Rar.is_supported());
        assert!(ArchiveFormat::SevenZ.is_supported());
    }
}
