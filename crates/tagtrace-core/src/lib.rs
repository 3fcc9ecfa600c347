//! Tagtrace Core - traceability tags from text to a queryable store
//!
//! This crate provides the core functionality for tag traceability:
//! - Tag grammar, taxonomy and parsing of `@CATEGORY:IDENTIFIER` annotations
//! - Chain, cycle, orphan and naming analysis over parsed tags
//! - SQLite storage with a per-thread connection pool
//! - Search, statistics and traceability chain traversal
//! - Flat JSON index ↔ relational store migration with backups
//! - Parallel directory scanning

pub mod migration;
pub mod parser;
pub mod scanner;
pub mod search;
pub mod store;
pub mod tags;
pub mod validator;

// Taxonomy and grammar re-exports
pub use tags::{
    format_tag_key, is_canonical_identifier, is_parser_category, is_storage_category,
    parse_tag_key, CategoryFamily, DuplicateTagInfo, Position, TagChain, TagKey, TagMatch,
    CHAIN_SEPARATOR, PARSER_CATEGORIES, PRIMARY_CHAIN, STORAGE_CATEGORIES,
};
pub use parser::{
    extract_tags, extract_tags_with_positions, find_duplicate_tags, parse_tag_chains,
    validate_tag_format,
};
pub use validator::{
    analyze, calculate_tag_coverage, check_naming_consistency, detect_circular_references,
    detect_self_references, find_orphaned_tags, validate_primary_chain,
    validate_reference_integrity, AnalysisReport, BrokenReference, ChainValidation,
    ConsistencyViolation,
};

// Storage re-exports
pub use store::{
    NewTag, StoreError, StoreLocation, StoreStats, StoredReference, StoredTag, TagPatch, TagStore,
    STORE_SCHEMA_VERSION,
};

// Search re-exports
pub use search::{
    ChainNode, ChainRelation, Direction, SearchEngine, TagQuery, TagStatistics, TraceabilityChain,
};

// Migration re-exports
pub use migration::{
    BackupManager, FlatIndex, FlatIndexValidator, MigrationEngine, MigrationMode,
    MigrationOptions, MigrationResult, MigrationReporter,
};

// Scanner re-exports
pub use scanner::{compute_file_hash, ExclusionFilter, FileTags, ScanError, ScanReport, TagScanner};
