use crate::error::Error;
use crate::platform::normalize_lexically;
use std::path::Path;

/// Index key for `member` inside `archive`: the archive path joined with the
/// member name, normalised.
///
/// Fails with [`Error::PathTraversal`] for empty or absolute names, drive
/// prefixes, and anything that normalises outside the archive's own path.
/// Every reader goes through this before a member reaches the index.
pub fn member_key(archive: &Path, member: &str) -> Result<String, Error> {
    let traversal = || Error::PathTraversal {
        archive: archive.to_path_buf(),
        member: member.to_string(),
    };

    let name = member.replace('\\', "/");
    let name = name.trim_end_matches('/');
    if name.is_empty() || name.starts_with('/') || has_drive_prefix(name) {
        return Err(traversal());
    }

    let root = normalize_lexically(archive);
    let joined = normalize_lexically(&root.join(name));
    if joined == root || !joined.starts_with(&root) {
        return Err(traversal());
    }
    joined
        .to_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::NonUtf8Path(joined.clone()))
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
