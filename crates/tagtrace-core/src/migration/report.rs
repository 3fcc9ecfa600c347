//! Post-migration verification and reporting.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::engine::MigrationResult;
use super::flat::FlatIndex;
use crate::store::{Result as StoreResult, TagStore};

/// Timing for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub duration_ms: u128,
    pub tags_per_second: f64,
    pub references_per_second: f64,
}

impl PerformanceMetrics {
    pub fn from_run(elapsed: Duration, tags: usize, references: usize) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = |n: usize| if secs > 0.0 { n as f64 / secs } else { 0.0 };
        Self {
            duration_ms: elapsed.as_millis(),
            tags_per_second: rate(tags),
            references_per_second: rate(references),
        }
    }
}

/// Key-set comparison between a flat index and the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationVerification {
    pub flat_keys: usize,
    pub store_keys: usize,
    pub missing_in_store: Vec<String>,
    pub extra_in_store: Vec<String>,
}

impl MigrationVerification {
    pub fn is_consistent(&self) -> bool {
        self.missing_in_store.is_empty() && self.extra_in_store.is_empty()
    }
}

/// Compare the keys of `flat` with the keys currently stored.
pub fn verify_migration(flat: &FlatIndex, store: &TagStore) -> StoreResult<MigrationVerification> {
    let flat_keys: BTreeSet<String> = flat.keys();
    let store_keys = store.tag_keys()?;

    Ok(MigrationVerification {
        flat_keys: flat_keys.len(),
        store_keys: store_keys.len(),
        missing_in_store: flat_keys.difference(&store_keys).cloned().collect(),
        extra_in_store: store_keys.difference(&flat_keys).cloned().collect(),
    })
}

/// Writes JSON reports and renders text summaries.
#[derive(Debug, Clone)]
pub struct MigrationReporter {
    reports_dir: PathBuf,
}

impl MigrationReporter {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Write `migration-<timestamp>.json` and return its path.
    pub fn write_report(&self, result: &MigrationResult) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.reports_dir)?;
        let name = format!("migration-{}.json", Utc::now().format("%Y%m%dT%H%M%S%.6f"));
        let path = self.reports_dir.join(name);
        let json = serde_json::to_string_pretty(result).map_err(std::io::Error::from)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Human-readable summary.
    pub fn render_summary(result: &MigrationResult) -> String {
        let mut out = String::new();
        let status = match (result.success, result.is_clean()) {
            (true, true) => "succeeded",
            (true, false) => "succeeded with errors",
            (false, _) => "FAILED",
        };
        let _ = writeln!(out, "Migration ({}, {:?}) {status}", result.direction, result.mode);
        let _ = writeln!(out, "  tags migrated:       {}", result.tags_migrated);
        let _ = writeln!(out, "  tags preserved:      {}", result.tags_preserved);
        let _ = writeln!(out, "  references migrated: {}", result.references_migrated);
        if result.references_skipped > 0 {
            let _ = writeln!(out, "  references skipped:  {}", result.references_skipped);
        }
        if let Some(backup) = &result.backup {
            let _ = writeln!(out, "  backup:              {}", backup.backup_path.display());
        }
        if result.rolled_back {
            let _ = writeln!(out, "  output restored from backup");
        }
        if let Some(m) = &result.metrics {
            let _ = writeln!(out, "  duration:            {} ms", m.duration_ms);
        }
        if !result.validation_errors.is_empty() {
            let _ = writeln!(out, "  validation errors ({}):", result.validation_errors.len());
            for e in &result.validation_errors {
                let _ = writeln!(out, "    - {e}");
            }
        }
        if !result.errors.is_empty() {
            let _ = writeln!(out, "  errors ({}):", result.errors.len());
            for e in &result.errors {
                let _ = writeln!(out, "    - {e}");
            }
        }
        out
    }
}
