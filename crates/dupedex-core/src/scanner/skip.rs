use crate::config::AppConfig;
use crate::platform;
use glob::Pattern;
use std::path::Path;
use tracing::error;

/// Version control, cache and package-manager metadata directories.
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".bzr",
    "_darcs",
    "CVS",
    ".cache",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".tox",
    ".venv",
    "node_modules",
    "bower_components",
    ".npm",
    ".yarn",
    ".gradle",
    ".m2",
    ".cargo",
    ".Trash",
    ".Trashes",
    ".Spotlight-V100",
    ".fseventsd",
    "$RECYCLE.BIN",
    "System Volume Information",
];

/// Thumbnail caches, folder settings and similar OS artifacts.
const SKIP_FILES: &[&str] = &[
    ".DS_Store",
    ".localized",
    ".directory",
    "Thumbs.db",
    "ehthumbs.db",
    "ehthumbs_vista.db",
    "desktop.ini",
    "Icon\r",
];

/// Editor swap files.
const SKIP_FILE_SUFFIXES: &[&str] = &[".swp", ".swo", ".swx"];

/// AppleDouble resource forks and Office lock files.
const SKIP_FILE_PREFIXES: &[&str] = &["._", "~$"];

/// Which directories and files a walk leaves alone.
#[derive(Debug, Clone, Default)]
pub struct SkipPolicy {
    extra_dirs: Vec<String>,
    ignore_patterns: Vec<Pattern>,
}

impl SkipPolicy {
    /// Invalid glob patterns are logged and dropped.
    pub fn new(extra_dirs: &[String], ignore_globs: &[String]) -> Self {
        let ignore_patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        SkipPolicy {
            extra_dirs: extra_dirs.to_vec(),
            ignore_patterns,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.extra_skip_dirs, &config.ignore_patterns)
    }

    /// The walk root itself is never skipped for its name.
    pub fn skip_dir(&self, path: &Path, is_root: bool) -> bool {
        if is_root {
            return false;
        }
        let name = file_name(path);
        name.starts_with(platform::HIDDEN_PREFIX)
            || SKIP_DIRS.iter().any(|skip| same_name(skip, name))
            || self.extra_dirs.iter().any(|skip| same_name(skip, name))
            || self.is_ignored(path)
    }

    pub fn skip_file(&self, path: &Path) -> bool {
        let name = file_name(path);
        SKIP_FILES.iter().any(|skip| same_name(skip, name))
            || SKIP_FILE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
            || SKIP_FILE_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
            || self.is_ignored(path)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

fn same_name(a: &str, b: &str) -> bool {
    if platform::CASE_INSENSITIVE_FS {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_listed_directories() {
        let policy = SkipPolicy::default();
        assert!(policy.skip_dir(Path::new("/src/project/node_modules"), false));
        assert!(policy.skip_dir(Path::new("/src/project/__pycache__"), false));
        assert!(!policy.skip_dir(Path::new("/src/project/photos"), false));
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_hidden_directories_except_root() {
        let policy = SkipPolicy::default();
        assert!(policy.skip_dir(Path::new("/home/me/.config"), false));
        assert!(!policy.skip_dir(Path::new("/home/me/.config"), true));
    }

    #[test]
    fn test_os_artifacts_and_swap_files() {
        let policy = SkipPolicy::default();
        assert!(policy.skip_file(Path::new("/pics/.DS_Store")));
        assert!(policy.skip_file(Path::new("/pics/Thumbs.db")));
        assert!(policy.skip_file(Path::new("/src/.main.rs.swp")));
        assert!(policy.skip_file(Path::new("/docs/~$report.docx")));
        assert!(!policy.skip_file(Path::new("/docs/report.docx")));
    }

    #[test]
    fn test_extra_dirs_and_globs() {
        let policy = SkipPolicy::new(
            &["build".to_string()],
            &["*.tmp".to_string(), "[".to_string()],
        );
        assert!(policy.skip_dir(Path::new("/p/build"), false));
        assert!(policy.skip_file(Path::new("/p/scratch.tmp")));
        assert!(!policy.skip_file(Path::new("/p/scratch.txt")));
    }
}
