use super::format::ArchiveFormat;
use crate::error::Error;
use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use sevenz_rust::{Password, SevenZReader};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use xz2::read::XzDecoder;

/// Called once per regular member with its raw name bytes and a stream over
/// its uncompressed content.
pub(crate) type MemberVisitor<'v> = dyn FnMut(&[u8], &mut dyn Read) -> Result<(), Error> + 'v;

/// Stream every regular member of the archive at `path` through `visit`.
/// Directories and links are skipped. An error from `visit` stops the walk.
pub(crate) fn visit_members(
    path: &Path,
    format: ArchiveFormat,
    visit: &mut MemberVisitor<'_>,
) -> Result<(), Error> {
    match format {
        ArchiveFormat::Tar => visit_tar(open(path)?, visit),
        ArchiveFormat::TarGz => visit_tar(MultiGzDecoder::new(open(path)?), visit),
        ArchiveFormat::TarBz2 => visit_tar(BzDecoder::new(open(path)?), visit),
        ArchiveFormat::TarXz => visit_tar(XzDecoder::new(open(path)?), visit),
        ArchiveFormat::TarZst => visit_tar(zstd_decoder(path)?, visit),
        ArchiveFormat::Gzip => visit_single(path, MultiGzDecoder::new(open(path)?), visit),
        ArchiveFormat::Bzip2 => visit_single(path, BzDecoder::new(open(path)?), visit),
        ArchiveFormat::Xz => visit_single(path, XzDecoder::new(open(path)?), visit),
        ArchiveFormat::Zstd => visit_single(path, zstd_decoder(path)?, visit),
        ArchiveFormat::Zip => visit_zip(path, visit),
        ArchiveFormat::SevenZ => visit_seven_z(path, visit),
        ArchiveFormat::Rar | ArchiveFormat::Cab | ArchiveFormat::Iso => Err(Error::Unsupported(
            path.to_path_buf(),
            format!("{} members cannot be read", format),
        )),
    }
}

fn open(path: &Path) -> Result<BufReader<File>, Error> {
    Ok(BufReader::new(File::open(path)?))
}

type ZstdReader = zstd::stream::read::Decoder<'static, BufReader<File>>;

fn zstd_decoder(path: &Path) -> Result<ZstdReader, Error> {
    Ok(zstd::stream::read::Decoder::new(File::open(path)?)?)
}

fn visit_tar<R: Read>(reader: R, visit: &mut MemberVisitor<'_>) -> Result<(), Error> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        // Raw bytes: `Entry::path` would already reject some names, and the
        // traversal check has to see them all.
        let name = entry.path_bytes().into_owned();
        visit(&name, &mut entry)?;
    }
    Ok(())
}

/// Compressed single files hold one member named after the file stem,
/// e.g. `notes.txt` for `notes.txt.gz`.
fn visit_single<R: Read>(
    path: &Path,
    mut reader: R,
    visit: &mut MemberVisitor<'_>,
) -> Result<(), Error> {
    let name = path
        .file_stem()
        .map(|stem| stem.as_encoded_bytes().to_vec())
        .unwrap_or_default();
    visit(&name, &mut reader)
}

fn visit_zip(path: &Path, visit: &mut MemberVisitor<'_>) -> Result<(), Error> {
    let unsupported =
        |e: zip::result::ZipError| Error::Unsupported(path.to_path_buf(), e.to_string());

    let mut archive = zip::ZipArchive::new(open(path)?).map_err(unsupported)?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(unsupported)?;
        if file.is_dir() {
            continue;
        }
        // `name` decodes CP437 entries, so it is always valid UTF-8.
        let name = file.name().to_string();
        visit(name.as_bytes(), &mut file)?;
    }
    Ok(())
}

fn visit_seven_z(path: &Path, visit: &mut MemberVisitor<'_>) -> Result<(), Error> {
    let unsupported =
        |e: sevenz_rust::Error| Error::Unsupported(path.to_path_buf(), e.to_string());

    let mut reader = SevenZReader::open(path, Password::empty()).map_err(unsupported)?;
    // The decoder's callback has its own error type; park ours and stop.
    let mut failure: Option<Error> = None;
    reader
        .for_each_entries(|entry, content| {
            if entry.is_directory() {
                return Ok(true);
            }
            match visit(entry.name().as_bytes(), content) {
                Ok(()) => Ok(true),
                Err(e) => {
                    failure = Some(e);
                    Ok(false)
                }
            }
        })
        .map_err(unsupported)?;

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
