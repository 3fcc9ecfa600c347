//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.tagtrace/config.toml`
//! 2. Local config: `.tagtrace/config.toml` (in the project root)
//! 3. CLI overrides
//!
//! Files are merged as TOML tables before deserializing, so a later file only
//! overrides the keys it actually sets. Arrays are replaced, not appended.

use crate::error::ConfigError;
use crate::{ConfigOverrides, TraceConfig};
use std::path::{Path, PathBuf};
use toml::Value;
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global and local configuration directory name.
const CONFIG_DIR: &str = ".tagtrace";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.tagtrace`)
    global_config_dir: Option<PathBuf>,

    /// Cached raw global config
    global_config: Option<Value>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader rooted at `~/.tagtrace`.
    pub fn new() -> Self {
        Self {
            global_config_dir: dirs::home_dir().map(|h| h.join(CONFIG_DIR)),
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    pub fn local_config_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a project with optional CLI overrides.
    ///
    /// Merges config in order: global → local → overrides, then validates.
    pub fn load(
        &mut self,
        project_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<TraceConfig, ConfigError> {
        let mut merged = Value::Table(Default::default());

        if let Some(global) = self.load_global()? {
            merge_values(&mut merged, global);
        }
        if let Some(local) = self.load_local(project_root)? {
            merge_values(&mut merged, local);
        }

        let mut config: TraceConfig = merged
            .try_into()
            .map_err(ConfigError::Merge)?;

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load a single explicit config file, skipping global and local lookup.
    pub fn load_file(
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<TraceConfig, ConfigError> {
        debug!("Loading config from {:?}", path);
        let value = read_config_value(path)?;
        let mut config: TraceConfig = value
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::parse(path, e))?;

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }
        config.validate()?;
        Ok(config)
    }

    /// Raw global configuration, cached after the first read.
    pub fn load_global(&mut self) -> Result<Option<Value>, ConfigError> {
        if let Some(ref value) = self.global_config {
            return Ok(Some(value.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };
        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let value = read_config_value(&global_path)?;
        self.global_config = Some(value.clone());
        Ok(Some(value))
    }

    /// Raw local configuration for a project.
    pub fn load_local(&self, project_root: &Path) -> Result<Option<Value>, ConfigError> {
        let local_path = self.local_config_path(project_root);
        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        read_config_value(&local_path).map(Some)
    }

    pub fn save_local(&self, project_root: &Path, config: &TraceConfig) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(project_root), config)
    }

    /// Write a default `.tagtrace/config.toml` unless one exists.
    pub fn init_local(&self, project_root: &Path) -> Result<PathBuf, ConfigError> {
        let config_path = self.local_config_path(project_root);
        if !config_path.exists() {
            save_config_file(&config_path, &TraceConfig::default())?;
        }
        Ok(config_path)
    }

    /// Write a default global config unless one exists.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let config_path = self.global_config_path().ok_or(ConfigError::NoHomeDir)?;
        if !config_path.exists() {
            save_config_file(&config_path, &TraceConfig::default())?;
        }
        Ok(config_path)
    }

    /// Forget the cached global config.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

fn read_config_value(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;
    let value: Value = toml::from_str(&content).map_err(|e| ConfigError::parse(path, e))?;

    // Reject unknown types early, with the offending file in the message
    value
        .clone()
        .try_into::<TraceConfig>()
        .map_err(|e| ConfigError::parse(path, e))?;
    Ok(value)
}

fn save_config_file(path: &Path, config: &TraceConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write(path, e))
}

/// Recursively merge `overlay` into `base`. Tables merge key by key; any
/// other value replaces what was there.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base), Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_local(dir: &Path, content: &str) {
        let config_dir = dir.join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join(CONFIG_FILE_NAME), content).unwrap();
    }

    fn write_global(dir: &Path, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILE_NAME), content).unwrap();
    }

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config = loader.load(temp.path(), None).unwrap();
        assert_eq!(config, TraceConfig::default());
    }

    #[test]
    fn test_local_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");
        write_global(
            &global_dir,
            r#"
            [logging]
            level = "debug"

            [migration]
            batch_size = 50
            "#,
        );
        write_local(
            temp.path(),
            r#"
            [migration]
            batch_size = 75
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.migration.batch_size, 75);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_local_can_restore_default_value() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");
        write_global(&global_dir, "[migration]\ncreate_backup = false\n");
        write_local(temp.path(), "[migration]\ncreate_backup = true\n");

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        assert!(loader.load(temp.path(), None).unwrap().migration.create_backup);
    }

    #[test]
    fn test_cli_overrides_all() {
        let temp = TempDir::new().unwrap();
        write_local(temp.path(), "[migration]\nstrict = false\n");

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let overrides = ConfigOverrides {
            strict: Some(true),
            log_level: Some("trace".to_string()),
            ..Default::default()
        };
        let config = loader.load(temp.path(), Some(&overrides)).unwrap();

        assert!(config.migration.strict);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(&path, "[scan]\nmax_file_size_kb = 64\n").unwrap();

        let overrides = ConfigOverrides {
            strict: Some(true),
            ..Default::default()
        };
        let config = ConfigLoader::load_file(&path, Some(&overrides)).unwrap();
        assert_eq!(config.scan.max_file_size_kb, 64);
        assert!(config.migration.strict);
        assert_eq!(config.storage, TraceConfig::default().storage);
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        write_local(temp.path(), "[migration]\nbatch_size = \"many\"\n");

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let err = loader.load(temp.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_invalid_value_rejected() {
        let temp = TempDir::new().unwrap();
        write_local(temp.path(), "[logging]\nlevel = \"chatty\"\n");

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        assert!(matches!(
            loader.load(temp.path(), None),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_save_and_init_local() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let path = loader.init_local(temp.path()).unwrap();
        assert!(path.ends_with(".tagtrace/config.toml"));

        let mut config = TraceConfig::default();
        config.scan.exclude_patterns = vec!["*.snap".into()];
        loader.save_local(temp.path(), &config).unwrap();

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let loaded = loader.load(temp.path(), None).unwrap();
        assert_eq!(loaded.scan.exclude_patterns, vec!["*.snap"]);
    }

    #[test]
    fn test_cache_clearing() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");
        write_global(&global_dir, "[logging]\nlevel = \"debug\"\n");

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        loader.load_global().unwrap();
        assert!(loader.global_config.is_some());

        loader.clear_cache();
        assert!(loader.global_config.is_none());
    }

    #[test]
    fn test_merge_values_nested() {
        let mut base: Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: Value = toml::from_str("[a]\ny = 3\n[b]\nz = 4\n").unwrap();
        merge_values(&mut base, overlay);

        assert_eq!(base["a"]["x"].as_integer(), Some(1));
        assert_eq!(base["a"]["y"].as_integer(), Some(3));
        assert_eq!(base["b"]["z"].as_integer(), Some(4));
    }
}
