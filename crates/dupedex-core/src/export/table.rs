use crate::bucket::Bucket;
use crate::error::Error;
use crate::hasher::Digest;
use crate::platform::{normalize_lexically, to_host_separators};
use crate::storage::Index;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{info, warn};

pub const HEADER_TOKEN: &str = "DUPEDEX-BUCKET";

#[derive(Debug)]
pub struct ImportReport {
    pub bucket: Bucket,
    pub imported: usize,
    /// One error per rejected row.
    pub errors: Vec<Error>,
}

/// Write `bucket` to `writer`. Returns the number of rows written.
pub fn export_bucket<W: Write>(
    index: &Index,
    bucket: &Bucket,
    mut writer: W,
) -> Result<usize, Error> {
    let entries = index.view(|tx| tx.entries(bucket))?;

    writeln!(writer, "{}#{}", HEADER_TOKEN, bucket)?;
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    for (key, digest) in &entries {
        let relative = Path::new(key)
            .strip_prefix(bucket.path())
            .map(|rel| rel.to_string_lossy())
            .unwrap_or_else(|_| key.as_str().into());
        csv_writer.write_record([digest.to_hex().as_str(), &*relative])?;
    }
    csv_writer.flush()?;

    info!("Exported {} entries from {}", entries.len(), bucket);
    Ok(entries.len())
}

/// Read a dump produced by [`export_bucket`] into `target`, or into the
/// bucket named in the header when no target is given.
///
/// Bad rows are collected in the report and the rest are imported in a
/// single transaction. A missing header fails the whole import.
pub fn import_bucket<R: BufRead>(
    index: &Index,
    mut reader: R,
    target: Option<&Bucket>,
) -> Result<ImportReport, Error> {
    let mut header = String::new();
    reader.read_line(&mut header)?;
    let named = header
        .trim_end_matches(['\r', '\n'])
        .strip_prefix(HEADER_TOKEN)
        .and_then(|rest| rest.strip_prefix('#'))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::InvalidRow {
            line: 1,
            reason: format!("expected '{}#<bucket>' header", HEADER_TOKEN),
        })?;
    let bucket = match target {
        Some(bucket) => bucket.clone(),
        None => Bucket::canonicalize(to_host_separators(named))?,
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows: Vec<(String, Digest)> = Vec::new();
    let mut errors = Vec::new();
    for record in csv_reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                let line = e.position().map(|p| p.line() + 1).unwrap_or(0);
                errors.push(Error::InvalidRow {
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        // Header is line 1 of the file but not of the csv stream.
        let line = record.position().map(|p| p.line() + 1).unwrap_or(0);
        match parse_row(&bucket, &record) {
            Ok(row) => rows.push(row),
            Err(reason) => {
                warn!("Skipping row {}: {}", line, reason);
                errors.push(Error::InvalidRow { line, reason });
            }
        }
    }

    let imported = index.update(|tx| {
        tx.create_bucket(&bucket)?;
        for (key, digest) in &rows {
            tx.put(&bucket, key, *digest)?;
        }
        Ok(rows.len())
    })?;

    info!(
        "Imported {} entries into {} ({} rejected)",
        imported,
        bucket,
        errors.len()
    );
    Ok(ImportReport {
        bucket,
        imported,
        errors,
    })
}

fn parse_row(bucket: &Bucket, record: &csv::StringRecord) -> Result<(String, Digest), String> {
    if record.len() != 2 {
        return Err(format!("expected 2 fields, found {}", record.len()));
    }
    let digest = Digest::from_hex(&record[0]).map_err(|e| e.to_string())?;

    let relative = to_host_separators(&record[1]);
    if relative.is_empty() {
        return Err("empty path".to_string());
    }
    let relative = Path::new(&relative);
    // Export writes keys outside the bucket root as full paths, so an
    // absolute row is kept as it is. Relative rows must stay inside.
    let joined = if relative.is_absolute() {
        normalize_lexically(relative)
    } else {
        let joined = normalize_lexically(&bucket.path().join(relative));
        if joined == bucket.path() || !joined.starts_with(bucket.path()) {
            return Err(format!("{} escapes {}", relative.display(), bucket));
        }
        joined
    };
    Ok((joined.to_string_lossy().into_owned(), digest))
}
