#[cfg(target_os = "windows")]
pub mod windows;

use std::path::{Component, Path, PathBuf};

/// Whether the host file system compares names case-insensitively.
pub const CASE_INSENSITIVE_FS: bool = cfg!(any(target_os = "windows", target_os = "macos"));

pub const HOST_SEPARATOR: char = std::path::MAIN_SEPARATOR;

#[cfg(target_os = "windows")]
const FOREIGN_SEPARATOR: char = '/';
#[cfg(not(target_os = "windows"))]
const FOREIGN_SEPARATOR: char = '\\';

/// Prefix that marks hidden or system directories on this platform.
#[cfg(target_os = "windows")]
pub const HIDDEN_PREFIX: char = '$';
#[cfg(not(target_os = "windows"))]
pub const HIDDEN_PREFIX: char = '.';

/// Rewrite separators of the other platform family into host separators.
/// A UNC prefix `\\server\share` becomes `//server/share` on POSIX hosts.
pub fn to_host_separators(path: &str) -> String {
    path.replace(FOREIGN_SEPARATOR, &HOST_SEPARATOR.to_string())
}

/// Resolve `.` and `..` without touching the file system. `..` never climbs
/// above a root or prefix component.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                );
                if at_root {
                    if !out.has_root() {
                        out.push("..");
                    }
                } else if out.ends_with("..") {
                    out.push("..");
                } else {
                    out.pop();
                }
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// Lower-case `path` where the file system ignores case, so equal paths
/// compare equal as strings.
pub fn fold_case(path: &str) -> String {
    if CASE_INSENSITIVE_FS {
        path.to_lowercase()
    } else {
        path.to_string()
    }
}

#[cfg(target_os = "windows")]
pub fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    windows::strip_verbatim_prefix(path)
}

#[cfg(not(target_os = "windows"))]
pub fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    path
}
