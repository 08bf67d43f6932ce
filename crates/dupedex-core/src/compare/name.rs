use crate::bucket::Bucket;
use crate::error::Error;
use crate::storage::Index;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    Exact,
    Substring,
}

/// Filename pattern tested against stored keys. Archive members are keys
/// like any other, so they are searched too.
#[derive(Debug, Clone)]
pub struct NameQuery {
    pub pattern: String,
    pub mode: MatchMode,
    pub case_sensitive: bool,
    /// Match against the whole key instead of its last component.
    pub full_path: bool,
}

impl NameQuery {
    pub fn new(pattern: impl Into<String>) -> Self {
        NameQuery {
            pattern: pattern.into(),
            mode: MatchMode::Exact,
            case_sensitive: true,
            full_path: false,
        }
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn full_path(mut self, full_path: bool) -> Self {
        self.full_path = full_path;
        self
    }

    pub fn matches(&self, key: &str) -> bool {
        let haystack = if self.full_path { key } else { base_name(key) };
        if self.case_sensitive {
            self.test(haystack, &self.pattern)
        } else {
            self.test(&haystack.to_lowercase(), &self.pattern.to_lowercase())
        }
    }

    fn test(&self, haystack: &str, needle: &str) -> bool {
        match self.mode {
            MatchMode::Exact => haystack == needle,
            MatchMode::Substring => haystack.contains(needle),
        }
    }
}

/// Last segment of a key. Both separators count, since member names keep
/// whatever separator their archive used.
fn base_name(key: &str) -> &str {
    key.rsplit(['/', '\\']).next().unwrap_or(key)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameMatch {
    pub bucket: Bucket,
    pub path: String,
}

/// Linear scan over the keys of `buckets`, in bucket then key order.
pub fn search_names(
    index: &Index,
    buckets: &[Bucket],
    query: &NameQuery,
) -> Result<Vec<NameMatch>, Error> {
    index.view(|tx| {
        let mut found = Vec::new();
        for bucket in buckets {
            tx.for_each(bucket, |key, _| {
                if query.matches(key) {
                    found.push(NameMatch {
                        bucket: bucket.clone(),
                        path: key.to_string(),
                    });
                }
                Ok(())
            })?;
        }
        Ok(found)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_base_name() {
        let query = NameQuery::new("report.pdf");
        assert!(query.matches("/docs/2020/report.pdf"));
        assert!(!query.matches("/docs/2020/report.pdf.bak"));
        assert!(!query.matches("/docs/Report.pdf"));
    }

    #[test]
    fn test_case_insensitive_substring() {
        let query = NameQuery::new("REPORT")
            .with_mode(MatchMode::Substring)
            .case_sensitive(false);
        assert!(query.matches("/docs/annual-report.pdf"));
        assert!(!query.matches("/report/summary.txt"));
    }

    #[test]
    fn test_full_path() {
        let query = NameQuery::new("/2020/")
            .with_mode(MatchMode::Substring)
            .full_path(true);
        assert!(query.matches("/docs/2020/report.pdf"));
        let plain = NameQuery::new("/2020/").with_mode(MatchMode::Substring);
        assert!(!plain.matches("/docs/2020/report.pdf"));
    }

    #[test]
    fn test_archive_member_base_name() {
        let query = NameQuery::new("beach.jpg");
        assert!(query.matches("/backups/photos.zip/2019\\beach.jpg"));
    }
}
