use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

use dupedex_core::archive::{ArchiveFormat, ArchiveInspector};
use dupedex_core::hasher::{hash_bytes, hash_file};
use dupedex_core::scanner::ScanOptions;
use dupedex_core::{AppConfig, Bucket, Engine, Error, OpenMode};
use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sevenz_rust::{SevenZArchiveEntry, SevenZWriter};
use xz2::write::XzEncoder;

const PAYLOAD: &[u8] = b"the same bytes inside and outside an archive";

fn engine(dir: &Path) -> Engine {
    let config = AppConfig {
        index_path: dir.join("index"),
        ..AppConfig::default()
    };
    Engine::open(config, OpenMode::ReadWrite)
        .unwrap()
        .with_test_mode(true)
}

fn archives() -> ScanOptions {
    ScanOptions {
        rescan: false,
        archives: true,
    }
}

/// Append a regular file whose name is written into the header verbatim,
/// bypassing the builder's own path checks.
fn append_raw<W: Write, N: AsRef<[u8]>>(builder: &mut tar::Builder<W>, name: N, data: &[u8]) {
    let name = name.as_ref();
    let mut header = tar::Header::new_old();
    let field = &mut header.as_old_mut().name;
    field[..name.len()].copy_from_slice(name);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, data).unwrap();
}

/// Write a tar stream into `writer` and hand the writer back so a
/// compressor can be finished.
fn tar_into<W: Write>(writer: W, members: &[(&str, &[u8])]) -> W {
    let mut builder = tar::Builder::new(writer);
    for (name, data) in members {
        append_raw(&mut builder, name, data);
    }
    builder.into_inner().unwrap()
}

fn write_tar(path: &Path, members: &[(&str, &[u8])]) {
    tar_into(File::create(path).unwrap(), members);
}

fn write_tar_gz(path: &Path, members: &[(&str, &[u8])]) {
    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    tar_into(encoder, members).finish().unwrap();
}

fn bz2(file: File) -> BzEncoder<File> {
    BzEncoder::new(file, bzip2::Compression::default())
}

fn xz(file: File) -> XzEncoder<File> {
    XzEncoder::new(file, 6)
}

fn zst(file: File) -> zstd::stream::write::Encoder<'static, File> {
    zstd::stream::write::Encoder::new(file, 0).unwrap()
}

/// Each member is copied from a real file, since the writer takes entry
/// metadata from disk.
fn write_seven_z(dir: &Path, path: &Path, members: &[(&str, &[u8])]) {
    let mut writer = SevenZWriter::create(path).unwrap();
    for (i, (name, data)) in members.iter().enumerate() {
        let source = dir.join(format!("7z-source-{}", i));
        fs::write(&source, data).unwrap();
        let entry = SevenZArchiveEntry::from_path(&source, name.to_string());
        writer
            .push_archive_entry(entry, Some(File::open(&source).unwrap()))
            .unwrap();
    }
    writer.finish().unwrap();
}

fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, data) in members {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn test_member_digest_equals_file_digest() {
    let tmp = tempdir().unwrap();
    let plain = tmp.path().join("plain.bin");
    fs::write(&plain, PAYLOAD).unwrap();
    let tar_path = tmp.path().join("bundle.tar");
    write_tar(&tar_path, &[("docs/payload.bin", PAYLOAD)]);
    let tgz_path = tmp.path().join("bundle.tgz");
    write_tar_gz(&tgz_path, &[("payload.bin", PAYLOAD)]);
    let zip_path = tmp.path().join("bundle.zip");
    write_zip(&zip_path, &[("nested/payload.bin", PAYLOAD)]);

    let expected = hash_file(&plain).unwrap();
    assert_eq!(expected, hash_bytes(PAYLOAD));

    let inspector = ArchiveInspector::new();
    for (path, format) in [
        (&tar_path, ArchiveFormat::Tar),
        (&tgz_path, ArchiveFormat::TarGz),
        (&zip_path, ArchiveFormat::Zip),
    ] {
        assert_eq!(inspector.detect(path), Some(format));
        let report = inspector.inspect(path, format).unwrap();
        assert_eq!(report.members.len(), 1, "{}", format);
        assert_eq!(report.members[0].digest, expected, "{}", format);
        assert!(report.rejected.is_empty());
    }
}

#[test]
fn test_compressed_tar_member_digests() {
    let tmp = tempdir().unwrap();
    let members: &[(&str, &[u8])] = &[("docs/payload.bin", PAYLOAD), ("x.txt", &b"x"[..])];

    let tbz = tmp.path().join("bundle.tar.bz2");
    tar_into(bz2(File::create(&tbz).unwrap()), members)
        .finish()
        .unwrap();
    let txz = tmp.path().join("bundle.tar.xz");
    tar_into(xz(File::create(&txz).unwrap()), members)
        .finish()
        .unwrap();
    let tzst = tmp.path().join("bundle.tar.zst");
    tar_into(zst(File::create(&tzst).unwrap()), members)
        .finish()
        .unwrap();

    let inspector = ArchiveInspector::new();
    for (path, format) in [
        (&tbz, ArchiveFormat::TarBz2),
        (&txz, ArchiveFormat::TarXz),
        (&tzst, ArchiveFormat::TarZst),
    ] {
        assert_eq!(inspector.detect(path), Some(format));
        let report = inspector.inspect(path, format).unwrap();
        assert_eq!(report.members.len(), 2, "{}", format);
        assert_eq!(report.members[0].name, "docs/payload.bin");
        assert_eq!(report.members[0].digest, hash_bytes(PAYLOAD), "{}", format);
        assert_eq!(
            Path::new(&report.members[0].key),
            path.join("docs").join("payload.bin")
        );
        assert_eq!(report.members[1].digest, hash_bytes(b"x"), "{}", format);
    }
}

#[test]
fn test_single_file_compressors_hold_one_member_named_by_stem() {
    let tmp = tempdir().unwrap();
    let plain = tmp.path().join("payload.bin");
    fs::write(&plain, PAYLOAD).unwrap();
    let expected = hash_file(&plain).unwrap();

    let bz = tmp.path().join("payload.bin.bz2");
    let mut encoder = bz2(File::create(&bz).unwrap());
    encoder.write_all(PAYLOAD).unwrap();
    encoder.finish().unwrap();

    let xzp = tmp.path().join("payload.bin.xz");
    let mut encoder = xz(File::create(&xzp).unwrap());
    encoder.write_all(PAYLOAD).unwrap();
    encoder.finish().unwrap();

    let zstp = tmp.path().join("payload.bin.zst");
    let mut encoder = zst(File::create(&zstp).unwrap());
    encoder.write_all(PAYLOAD).unwrap();
    encoder.finish().unwrap();

    let inspector = ArchiveInspector::new();
    for (path, format) in [
        (&bz, ArchiveFormat::Bzip2),
        (&xzp, ArchiveFormat::Xz),
        (&zstp, ArchiveFormat::Zstd),
    ] {
        assert_eq!(inspector.detect(path), Some(format));
        let report = inspector.inspect(path, format).unwrap();
        assert_eq!(report.members.len(), 1, "{}", format);
        assert_eq!(report.members[0].name, "payload.bin", "{}", format);
        assert_eq!(report.members[0].digest, expected, "{}", format);
    }
}

#[test]
fn test_seven_z_member_digest_equals_file_digest() {
    let tmp = tempdir().unwrap();
    let archive = tmp.path().join("bundle.7z");
    write_seven_z(
        tmp.path(),
        &archive,
        &[("inner/payload.bin", PAYLOAD), ("note.txt", &b"note"[..])],
    );

    let inspector = ArchiveInspector::new();
    assert_eq!(inspector.detect(&archive), Some(ArchiveFormat::SevenZ));
    let report = inspector.inspect(&archive, ArchiveFormat::SevenZ).unwrap();
    assert!(report.rejected.is_empty());
    assert_eq!(report.members.len(), 2);
    let payload = report
        .members
        .iter()
        .find(|m| m.name == "inner/payload.bin")
        .unwrap();
    assert_eq!(payload.digest, hash_bytes(PAYLOAD));
    assert_eq!(
        Path::new(&payload.key),
        archive.join("inner").join("payload.bin")
    );
}

#[test]
fn test_seven_z_traversal_is_rejected() {
    let tmp = tempdir().unwrap();
    let archive = tmp.path().join("evil.7z");
    write_seven_z(
        tmp.path(),
        &archive,
        &[("../../evil", &b"escaped"[..]), ("good.txt", &b"good"[..])],
    );

    let report = ArchiveInspector::new()
        .inspect(&archive, ArchiveFormat::SevenZ)
        .unwrap();
    assert_eq!(report.members.len(), 1);
    assert_eq!(report.members[0].name, "good.txt");
    assert_eq!(report.members[0].digest, hash_bytes(b"good"));
    assert_eq!(report.rejected.len(), 1);
    assert!(matches!(report.rejected[0], Error::PathTraversal { .. }));
}

#[test]
fn test_non_utf8_member_name_is_rejected() {
    let tmp = tempdir().unwrap();
    let tar_path = tmp.path().join("latin.tar");
    let mut builder = tar::Builder::new(File::create(&tar_path).unwrap());
    append_raw(&mut builder, b"caf\xe9.txt", b"cafe");
    append_raw(&mut builder, "plain.txt", b"plain");
    builder.finish().unwrap();

    let report = ArchiveInspector::new()
        .inspect(&tar_path, ArchiveFormat::Tar)
        .unwrap();
    assert_eq!(report.members.len(), 1);
    assert_eq!(report.members[0].name, "plain.txt");
    assert_eq!(report.rejected.len(), 1);
    assert!(matches!(report.rejected[0], Error::NonUtf8Path(_)));
}

#[test]
fn test_archive_scan_records_members_under_archive_path() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("loose.bin"), PAYLOAD).unwrap();
    write_zip(
        &root.join("bundle.zip"),
        &[("inner/payload.bin", PAYLOAD), ("other.txt", &b"other"[..])],
    );

    let engine = engine(tmp.path());
    let reports = engine.scan(&[root.clone()], archives()).unwrap();
    assert_eq!(reports[0].archives, 1);
    assert_eq!(reports[0].members, 2);
    assert!(reports[0].errors.is_empty());

    let bucket = Bucket::canonicalize(&root).unwrap();
    let (_, entries) = engine.list(bucket.as_str()).unwrap();
    let member_key = bucket
        .path()
        .join("bundle.zip")
        .join("inner")
        .join("payload.bin")
        .to_string_lossy()
        .into_owned();
    let member = entries.iter().find(|(k, _)| *k == member_key).unwrap();
    assert_eq!(member.1, hash_bytes(PAYLOAD));
    // loose.bin, bundle.zip itself, two members
    assert_eq!(entries.len(), 4);

    // Without archive scanning the members still come back from the index.
    let incoming = tmp.path().join("incoming");
    fs::create_dir(&incoming).unwrap();
    fs::write(incoming.join("other-copy.txt"), b"other").unwrap();
    let result = engine
        .find_duplicates(&[incoming], &[bucket.as_str()], ScanOptions::default())
        .unwrap();
    assert_eq!(result.compare.matches.len(), 1);
    assert!(result.compare.matches[0].matched.ends_with("other.txt"));
}

#[test]
fn test_traversal_member_is_rejected_and_rest_indexed() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir(&root).unwrap();
    let tar_path = root.join("evil.tar");
    write_tar(
        &tar_path,
        &[
            ("../../evil", &b"escaped"[..]),
            ("/etc/passwd", &b"absolute"[..]),
            ("good.txt", &b"good"[..]),
        ],
    );

    let report = ArchiveInspector::new()
        .inspect(&tar_path, ArchiveFormat::Tar)
        .unwrap();
    assert_eq!(report.members.len(), 1);
    assert_eq!(report.members[0].name, "good.txt");
    assert_eq!(report.rejected.len(), 2);
    assert!(report
        .rejected
        .iter()
        .all(|e| matches!(e, Error::PathTraversal { .. })));

    let engine = engine(tmp.path());
    let reports = engine.scan(&[root.clone()], archives()).unwrap();
    let traversals = reports[0]
        .errors
        .iter()
        .filter(|(_, e)| matches!(e, Error::PathTraversal { .. }))
        .count();
    assert_eq!(traversals, 2);

    let bucket = Bucket::canonicalize(&root).unwrap();
    let archive_dir = bucket.path().join("evil.tar");
    let (_, entries) = engine.list(bucket.as_str()).unwrap();
    assert_eq!(entries.len(), 2);
    for (key, _) in &entries {
        let key = Path::new(key);
        assert!(
            key == archive_dir || key.starts_with(&archive_dir),
            "{}",
            key.display()
        );
    }
}

#[test]
fn test_zip_traversal_is_rejected() {
    let tmp = tempdir().unwrap();
    let zip_path = tmp.path().join("evil.zip");
    write_zip(&zip_path, &[("../../evil", &b"escaped"[..]), ("ok.txt", &b"ok"[..])]);

    let report = ArchiveInspector::new()
        .inspect(&zip_path, ArchiveFormat::Zip)
        .unwrap();
    assert_eq!(report.members.len(), 1);
    assert_eq!(report.rejected.len(), 1);
}

#[test]
fn test_malformed_archive_does_not_stop_the_scan() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("broken.zip"), b"PK\x03\x04 this is not really a zip").unwrap();
    fs::write(root.join("broken.tar.gz"), b"\x1f\x8b\x08 truncated").unwrap();
    fs::write(root.join("after.txt"), b"still indexed").unwrap();

    let engine = engine(tmp.path());
    let reports = engine.scan(&[root.clone()], archives()).unwrap();
    let report = &reports[0];
    assert_eq!(report.visited, 3);
    assert_eq!(report.archives, 2);
    assert_eq!(report.members, 0);
    assert_eq!(
        report
            .errors
            .iter()
            .filter(|(_, e)| matches!(e, Error::Unsupported(..)))
            .count(),
        2
    );

    // The containers are still hashed as ordinary files.
    let (_, entries) = engine.list(&root.to_string_lossy()).unwrap();
    assert_eq!(entries.len(), 3);
}

#[test]
fn test_archive_rescan_updates_members() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir(&root).unwrap();
    let tar_path = root.join("bundle.tar");
    write_tar(&tar_path, &[("a.txt", &b"a"[..])]);

    let engine = engine(tmp.path());
    engine.scan(&[root.clone()], archives()).unwrap();

    write_tar(&tar_path, &[("a.txt", &b"a"[..]), ("b.txt", &b"b"[..])]);
    let reports = engine.scan(&[root.clone()], archives()).unwrap();
    assert_eq!(reports[0].members, 2);

    let (_, entries) = engine.list(&root.to_string_lossy()).unwrap();
    assert!(entries.iter().any(|(k, _)| k.ends_with("b.txt")));
}
