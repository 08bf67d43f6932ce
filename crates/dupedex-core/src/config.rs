use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "dupedex";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Location of the RocksDB index directory.
    pub index_path: PathBuf,
    /// How long a writer waits for another process to release the index.
    pub lock_timeout_secs: u64,
    /// Glob patterns skipped by the walker and the comparator.
    pub ignore_patterns: Vec<String>,
    /// Directory names added to the built-in skip list.
    pub extra_skip_dirs: Vec<String>,
    /// Where `backup` writes checkpoints. Defaults to a sibling of the index.
    pub backup_dir: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            lock_timeout_secs: 5,
            ignore_patterns: Vec::new(),
            extra_skip_dirs: Vec::new(),
            backup_dir: None,
            verbose: false,
        }
    }
}

impl AppConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup_dir {
            Some(dir) => dir.clone(),
            None => self
                .index_path
                .parent()
                .map(|p| p.join("backups"))
                .unwrap_or_else(|| PathBuf::from("backups")),
        }
    }
}

/// Per-user configuration directory, falling back to the working directory.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR)))
}

pub fn default_index_path() -> PathBuf {
    user_config_dir().join("index")
}

/// Layered load: defaults, `Config.toml`, the per-user config file, then
/// `DUPEDEX_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let user_file = user_config_dir().join("config.toml");
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(ConfigFile::from(user_file).required(false))
        .add_source(
            Environment::with_prefix("DUPEDEX")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ignore_patterns")
                .with_list_parse_key("extra_skip_dirs"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.lock_timeout_secs, 5);
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
        assert!(config.index_path.ends_with("index"));
        assert!(config.ignore_patterns.is_empty());
    }

    #[test]
    fn test_backup_dir_defaults_to_index_sibling() {
        let config = AppConfig {
            index_path: PathBuf::from("/var/lib/dupedex/index"),
            ..AppConfig::default()
        };
        assert_eq!(config.backup_dir(), PathBuf::from("/var/lib/dupedex/backups"));

        let config = AppConfig {
            backup_dir: Some(PathBuf::from("/mnt/backups")),
            ..config
        };
        assert_eq!(config.backup_dir(), PathBuf::from("/mnt/backups"));
    }
}
