//! File backups with JSON metadata sidecars.
//!
//! A backup is a byte copy `<id>.bak` plus `<id>.meta.json` describing where
//! it came from. Restoring copies the bytes back over the original path.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

const DATA_EXT: &str = "bak";
const META_SUFFIX: &str = ".meta.json";

/// Errors that can occur during backup operations
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Source file does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("No backup found for {0}")]
    NotFound(String),
}

/// Metadata describing one backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub backup_id: String,
    pub source_path: PathBuf,
    pub backup_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub description: Option<String>,
}

/// Creates, lists, restores and prunes backups in one directory.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
}

impl BackupManager {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Copy `source` into the backup directory and write its sidecar.
    pub fn create_backup(
        &self,
        source: &Path,
        description: Option<&str>,
    ) -> Result<BackupInfo, BackupError> {
        if !source.is_file() {
            return Err(BackupError::SourceMissing(source.to_path_buf()));
        }
        fs::create_dir_all(&self.backup_dir)?;

        let created_at = Utc::now();
        let stem = source
            .file_name()
            .map(|n| n.to_string_lossy().replace('.', "_"))
            .unwrap_or_else(|| "file".to_string());
        let base_id = format!("{stem}-{}", created_at.format("%Y%m%dT%H%M%S%.6f"));

        let mut backup_id = base_id.clone();
        let mut n = 1;
        while self.data_path(&backup_id).exists() {
            backup_id = format!("{base_id}-{n}");
            n += 1;
        }

        let backup_path = self.data_path(&backup_id);
        let size_bytes = fs::copy(source, &backup_path)?;

        let info = BackupInfo {
            backup_id,
            source_path: absolute(source),
            backup_path,
            created_at,
            size_bytes,
            description: description.map(str::to_string),
        };
        fs::write(
            self.meta_path(&info.backup_id),
            serde_json::to_string_pretty(&info)?,
        )?;

        info!(
            backup_id = %info.backup_id,
            source = %source.display(),
            size_bytes,
            "Created backup"
        );
        Ok(info)
    }

    /// All backups with readable metadata, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, BackupError> {
        if !self.backup_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            let is_meta = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(META_SUFFIX));
            if !is_meta {
                continue;
            }
            match fs::read(&path)
                .map_err(BackupError::from)
                .and_then(|b| serde_json::from_slice::<BackupInfo>(&b).map_err(BackupError::from))
            {
                Ok(info) => backups.push(info),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable backup metadata"),
            }
        }

        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.backup_id.cmp(&a.backup_id))
        });
        Ok(backups)
    }

    /// Backups of one source file, newest first.
    pub fn backups_for(&self, source: &Path) -> Result<Vec<BackupInfo>, BackupError> {
        let source = absolute(source);
        Ok(self
            .list_backups()?
            .into_iter()
            .filter(|b| b.source_path == source)
            .collect())
    }

    pub fn latest_for(&self, source: &Path) -> Result<Option<BackupInfo>, BackupError> {
        Ok(self.backups_for(source)?.into_iter().next())
    }

    /// Copy a backup back over its source path.
    pub fn restore(&self, info: &BackupInfo) -> Result<(), BackupError> {
        self.restore_to(info, &info.source_path)
    }

    pub fn restore_to(&self, info: &BackupInfo, target: &Path) -> Result<(), BackupError> {
        if !info.backup_path.is_file() {
            return Err(BackupError::NotFound(info.backup_id.clone()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&info.backup_path, target)?;
        info!(backup_id = %info.backup_id, target = %target.display(), "Restored backup");
        Ok(())
    }

    /// Restore the newest backup of `source`.
    pub fn rollback(&self, source: &Path) -> Result<BackupInfo, BackupError> {
        let info = self
            .latest_for(source)?
            .ok_or_else(|| BackupError::NotFound(source.display().to_string()))?;
        self.restore(&info)?;
        Ok(info)
    }

    /// Keep the `keep` newest backups (per source if given). Returns how many were removed.
    pub fn prune(&self, source: Option<&Path>, keep: usize) -> Result<usize, BackupError> {
        let backups = match source {
            Some(s) => self.backups_for(s)?,
            None => self.list_backups()?,
        };

        let mut removed = 0;
        for info in backups.into_iter().skip(keep) {
            remove_if_exists(&info.backup_path)?;
            remove_if_exists(&self.meta_path(&info.backup_id))?;
            debug!(backup_id = %info.backup_id, "Pruned backup");
            removed += 1;
        }
        Ok(removed)
    }

    fn data_path(&self, backup_id: &str) -> PathBuf {
        self.backup_dir.join(format!("{backup_id}.{DATA_EXT}"))
    }

    fn meta_path(&self, backup_id: &str) -> PathBuf {
        self.backup_dir.join(format!("{backup_id}{META_SUFFIX}"))
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}
