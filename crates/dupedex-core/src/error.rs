use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rocksdb::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Index {} is locked by another process", .0.display())]
    Locked(PathBuf),

    #[error("Index {} is corrupt: {1}", .0.display())]
    Corrupt(PathBuf, String),

    #[error("Bucket name is empty")]
    EmptyName,

    #[error("Source and destination bucket are the same: {0}")]
    SameName(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Bucket already exists: {0}")]
    BucketExists(String),

    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("Archive member '{member}' escapes {}", .archive.display())]
    PathTraversal { archive: PathBuf, member: String },

    #[error("Unsupported archive {}: {1}", .0.display())]
    Unsupported(PathBuf, String),

    #[error("Invalid digest '{0}': expected 64 hex characters")]
    InvalidDigest(String),

    #[error("Invalid row {line}: {reason}")]
    InvalidRow { line: u64, reason: String },

    #[error("Index was opened read-only")]
    ReadOnly,

    #[error("{0}")]
    Other(String),
}

/// Coarse classification handed to callers that map failures to exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Locked,
    Corrupt,
    InvalidInput,
    Unsupported,
    Io,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            Error::Io(_) => ErrorKind::Io,
            Error::BucketNotFound(_) | Error::PathNotFound(_) => ErrorKind::NotFound,
            Error::Locked(_) => ErrorKind::Locked,
            Error::Corrupt(..) => ErrorKind::Corrupt,
            Error::Database(e) => match e.kind() {
                rocksdb::ErrorKind::Corruption => ErrorKind::Corrupt,
                rocksdb::ErrorKind::IOError => ErrorKind::Io,
                _ => ErrorKind::Other,
            },
            Error::EmptyName
            | Error::SameName(_)
            | Error::BucketExists(_)
            | Error::NotADirectory(_)
            | Error::NonUtf8Path(_)
            | Error::PathTraversal { .. }
            | Error::InvalidDigest(_)
            | Error::InvalidRow { .. }
            | Error::Csv(_)
            | Error::Config(_) => ErrorKind::InvalidInput,
            Error::Unsupported(..) => ErrorKind::Unsupported,
            Error::ReadOnly | Error::Other(_) => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::EmptyName.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            Error::Locked(PathBuf::from("/tmp/idx")).kind(),
            ErrorKind::Locked
        );
        assert_eq!(
            Error::BucketNotFound("/x".to_string()).kind(),
            ErrorKind::NotFound
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from(io).kind(), ErrorKind::NotFound);
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert_eq!(Error::from(denied).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_database_errors_by_rocksdb_kind() {
        let tmp = tempfile::tempdir().unwrap();

        let broken = tmp.path().join("broken");
        std::fs::create_dir(&broken).unwrap();
        std::fs::write(broken.join("CURRENT"), b"no newline here").unwrap();
        let err = rocksdb::DB::open_default(&broken).unwrap_err();
        assert_eq!(Error::from(err).kind(), ErrorKind::Corrupt);

        let file = tmp.path().join("plain-file");
        std::fs::write(&file, b"x").unwrap();
        let err = rocksdb::DB::open_default(file.join("db")).unwrap_err();
        assert_eq!(Error::from(err).kind(), ErrorKind::Io);

        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(false);
        let err = rocksdb::DB::open(&opts, tmp.path().join("absent")).unwrap_err();
        assert_eq!(Error::from(err).kind(), ErrorKind::Other);
    }

    #[test]
    fn test_traversal_message_names_member() {
        let err = Error::PathTraversal {
            archive: PathBuf::from("/data/a.zip"),
            member: "../../evil".to_string(),
        };
        assert!(err.to_string().contains("../../evil"));
    }
}
