//! Tagtrace Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.tagtrace/config.toml`
//! - Local config: `.tagtrace/config.toml` (in the project root)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TraceConfig {
    /// Where the store, flat index, backups and reports live
    pub storage: StorageConfig,

    /// Migration engine defaults
    pub migration: MigrationConfig,

    /// Directory scanning
    pub scan: ScanConfig,

    /// File watching
    pub watch: WatchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Storage locations, relative to the data directory unless absolute.
///
/// # Example TOML
///
/// ```toml
/// [storage]
/// data_dir = ".tagtrace"
/// database = "tags.db"
/// flat_index = "tags.json"
/// busy_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory (default: `.tagtrace`)
    pub data_dir: PathBuf,

    /// SQLite database file
    pub database: PathBuf,

    /// Flat JSON index file
    pub flat_index: PathBuf,

    /// Backup directory
    pub backup_dir: PathBuf,

    /// Migration report directory
    pub reports_dir: PathBuf,

    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".tagtrace"),
            database: PathBuf::from("tags.db"),
            flat_index: PathBuf::from("tags.json"),
            backup_dir: PathBuf::from("backups"),
            reports_dir: PathBuf::from("reports"),
            busy_timeout_ms: 5000,
        }
    }
}

/// Migration defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Abort on any structural validation error
    pub strict: bool,

    /// Back up files before overwriting them
    pub create_backup: bool,

    /// Keys per progress batch
    pub batch_size: usize,

    /// Shortest identifier accepted by strict validation
    pub min_identifier_length: usize,

    /// Backups kept per file (None = keep all)
    pub keep_backups: Option<usize>,

    /// Write a JSON report per run
    pub write_reports: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            strict: false,
            create_backup: true,
            batch_size: 500,
            min_identifier_length: 2,
            keep_backups: Some(10),
            write_reports: true,
        }
    }
}

/// Directory scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Maximum file size to read (in KB)
    pub max_file_size_kb: u64,

    /// Extra glob patterns to exclude
    pub exclude_patterns: Vec<String>,

    /// Skip hidden files and directories
    pub exclude_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_file_size_kb: 1024,
            exclude_patterns: Vec::new(),
            exclude_hidden: true,
        }
    }
}

impl ScanConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_kb.saturating_mul(1024)
    }
}

/// File watching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Start watching when the adapter is created
    pub enabled: bool,

    /// Poll interval of the event consumer in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_ms: 200,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::invalid_value(
                "logging.format",
                format!("unknown format '{s}', expected text or json"),
            )),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// CLI overrides for configuration values.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override data directory
    pub data_dir: Option<PathBuf>,

    /// Override database file
    pub database: Option<PathBuf>,

    /// Override flat index file
    pub flat_index: Option<PathBuf>,

    /// Force strict migration
    pub strict: Option<bool>,

    /// Enable or disable backups
    pub create_backup: Option<bool>,

    /// Override log level
    pub log_level: Option<String>,
}

impl TraceConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref dir) = overrides.data_dir {
            self.storage.data_dir = dir.clone();
        }
        if let Some(ref db) = overrides.database {
            self.storage.database = db.clone();
        }
        if let Some(ref flat) = overrides.flat_index {
            self.storage.flat_index = flat.clone();
        }
        if let Some(strict) = overrides.strict {
            self.migration.strict = strict;
        }
        if let Some(create_backup) = overrides.create_backup {
            self.migration.create_backup = create_backup;
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!("'{}' is not one of {}", self.logging.level, LOG_LEVELS.join(", ")),
            ));
        }

        ConfigError::check_minimum("migration.batch_size", self.migration.batch_size as u64, 1)?;
        ConfigError::check_minimum(
            "migration.min_identifier_length",
            self.migration.min_identifier_length as u64,
            1,
        )?;
        if let Some(keep) = self.migration.keep_backups {
            ConfigError::check_minimum("migration.keep_backups", keep as u64, 1)?;
        }
        ConfigError::check_minimum("scan.max_file_size_kb", self.scan.max_file_size_kb, 1)?;
        ConfigError::check_minimum("watch.poll_interval_ms", self.watch.poll_interval_ms, 10)?;

        for pattern in &self.scan.exclude_patterns {
            glob::Pattern::new(pattern).map_err(|source| ConfigError::ExcludePattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        // Relative to any root, equal relative paths collide
        let root = Path::new("");
        let storage = [
            ("database", self.database_path(root)),
            ("flat_index", self.flat_index_path(root)),
            ("backup_dir", self.backup_dir(root)),
            ("reports_dir", self.reports_dir(root)),
        ];
        for (i, (first, path)) in storage.iter().enumerate() {
            if let Some((second, _)) = storage[i + 1..].iter().find(|(_, other)| other == path) {
                return Err(ConfigError::StorageCollision {
                    first: *first,
                    second: *second,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Effective data directory for a project.
    pub fn data_dir(&self, project_root: &Path) -> PathBuf {
        if self.storage.data_dir.is_absolute() {
            self.storage.data_dir.clone()
        } else {
            project_root.join(&self.storage.data_dir)
        }
    }

    pub fn database_path(&self, project_root: &Path) -> PathBuf {
        self.in_data_dir(project_root, &self.storage.database)
    }

    pub fn flat_index_path(&self, project_root: &Path) -> PathBuf {
        self.in_data_dir(project_root, &self.storage.flat_index)
    }

    pub fn backup_dir(&self, project_root: &Path) -> PathBuf {
        self.in_data_dir(project_root, &self.storage.backup_dir)
    }

    pub fn reports_dir(&self, project_root: &Path) -> PathBuf {
        self.in_data_dir(project_root, &self.storage.reports_dir)
    }

    fn in_data_dir(&self, project_root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir(project_root).join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = TraceConfig::default();
        assert_eq!(config.storage.data_dir, PathBuf::from(".tagtrace"));
        assert_eq!(config.migration.batch_size, 500);
        assert_eq!(config.migration.min_identifier_length, 2);
        assert!(config.migration.create_backup);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_paths_resolve_under_data_dir() {
        let config = TraceConfig::default();
        let root = Path::new("/work/project");
        assert_eq!(
            config.database_path(root),
            PathBuf::from("/work/project/.tagtrace/tags.db")
        );
        assert_eq!(
            config.flat_index_path(root),
            PathBuf::from("/work/project/.tagtrace/tags.json")
        );
    }

    #[test]
    fn test_absolute_paths_kept() {
        let mut config = TraceConfig::default();
        config.storage.database = PathBuf::from("/var/lib/tags.db");
        assert_eq!(
            config.database_path(Path::new("/work")),
            PathBuf::from("/var/lib/tags.db")
        );
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = TraceConfig::default();
        config.apply_overrides(&ConfigOverrides {
            strict: Some(true),
            log_level: Some("debug".into()),
            data_dir: Some(PathBuf::from("meta")),
            ..Default::default()
        });
        assert!(config.migration.strict);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.data_dir(Path::new("/p")), PathBuf::from("/p/meta"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TraceConfig::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = TraceConfig::default();
        config.migration.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = TraceConfig::default();
        config.migration.keep_backups = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BelowMinimum { min: 1, .. })
        ));
    }

    #[test]
    fn test_validate_exclude_patterns() {
        let mut config = TraceConfig::default();
        config.scan.exclude_patterns = vec!["*.snap".into(), "fixtures/**".into()];
        assert!(config.validate().is_ok());

        config.scan.exclude_patterns.push("[broken".into());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ExcludePattern { ref pattern, .. } if pattern == "[broken"));
    }

    #[test]
    fn test_validate_storage_collision() {
        let mut config = TraceConfig::default();
        config.storage.flat_index = config.storage.database.clone();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::StorageCollision {
                first: "database",
                second: "flat_index",
                ..
            }
        ));

        let mut config = TraceConfig::default();
        config.watch.poll_interval_ms = 1;
        assert_eq!(config.validate().unwrap_err().key(), Some("watch.poll_interval_ms"));
    }

    #[test]
    fn test_partial_toml() {
        let config: TraceConfig = toml::from_str(
            r#"
            [migration]
            strict = true

            [scan]
            exclude_patterns = ["*.lock"]
            "#,
        )
        .unwrap();
        assert!(config.migration.strict);
        assert_eq!(config.migration.batch_size, 500);
        assert_eq!(config.scan.exclude_patterns, vec!["*.lock"]);
        assert_eq!(config.scan.max_file_size_bytes(), 1024 * 1024);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
