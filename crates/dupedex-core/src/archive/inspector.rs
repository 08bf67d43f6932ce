use super::format::{ArchiveFormat, FormatCache};
use super::readers;
use super::safe_path::member_key;
use crate::error::Error;
use crate::hasher::{hash_reader, Digest};
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Name as stored in the archive.
    pub name: String,
    /// `<archive path>/<name>`, normalised.
    pub key: String,
    pub digest: Digest,
}

#[derive(Debug, Default)]
pub struct InspectReport {
    pub members: Vec<ArchiveMember>,
    /// Members refused by the path check or for a name that is not UTF-8.
    /// The rest of the archive is still read.
    pub rejected: Vec<Error>,
}

#[derive(Debug, Default)]
pub struct ArchiveInspector {
    cache: FormatCache,
}

impl ArchiveInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extension table first, then the file's signature. `None` means the
    /// file is not a container and is hashed like any other file.
    pub fn detect(&self, path: &Path) -> Option<ArchiveFormat> {
        if let Some(format) = self.cache.lookup(path) {
            return Some(format);
        }
        match ArchiveFormat::sniff(path) {
            Ok(format) => format,
            Err(e) => {
                debug!("Could not sniff {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Hash every member of the archive at `path`.
    ///
    /// Any failure to read the container, including formats that are only
    /// recognised, comes back as [`Error::Unsupported`]. Nothing is returned
    /// for a container that fails part way through.
    pub fn inspect(&self, path: &Path, format: ArchiveFormat) -> Result<InspectReport, Error> {
        let mut report = InspectReport::default();

        let result = readers::visit_members(
            path,
            format,
            &mut |raw: &[u8], content: &mut dyn Read| -> Result<(), Error> {
                let checked = match std::str::from_utf8(raw) {
                    Ok(name) => member_key(path, name).map(|key| (name, key)),
                    Err(_) => Err(Error::NonUtf8Path(
                        path.join(String::from_utf8_lossy(raw).as_ref()),
                    )),
                };
                match checked {
                    Ok((name, key)) => {
                        let digest = hash_reader(content)?;
                        report.members.push(ArchiveMember {
                            name: name.to_string(),
                            key,
                            digest,
                        });
                    }
                    Err(e) => {
                        warn!("{}", e);
                        // Solid formats need the stream consumed to reach the next member.
                        io::copy(content, &mut io::sink())?;
                        report.rejected.push(e);
                    }
                }
                Ok(())
            },
        );

        match result {
            Ok(()) => Ok(report),
            Err(e @ Error::Unsupported(..)) => Err(e),
            Err(e) => Err(Error::Unsupported(path.to_path_buf(), e.to_string())),
        }
    }
}
