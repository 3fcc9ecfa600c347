//! Flat index ↔ relational store migration.
//!
//! - [`flat`] - the JSON interchange model
//! - [`validate`] - strict structural checks on raw documents
//! - [`backup`] - file backups and rollback
//! - [`engine`] - the import/export runs
//! - [`report`] - verification, metrics, reports

pub mod backup;
pub mod engine;
pub mod flat;
pub mod report;
pub mod validate;

pub use backup::{BackupError, BackupInfo, BackupManager};
pub use engine::{
    build_flat_index, MigrationDirection, MigrationEngine, MigrationError, MigrationMode,
    MigrationOptions, MigrationProgress, MigrationResult, MigrationStage, ProgressFn,
};
pub use flat::{FlatEntry, FlatIndex, FlatStatistics, FLAT_INDEX_VERSION};
pub use report::{verify_migration, MigrationReporter, MigrationVerification, PerformanceMetrics};
pub use validate::{FlatIndexValidator, ValidationError, ValidationErrorKind};
