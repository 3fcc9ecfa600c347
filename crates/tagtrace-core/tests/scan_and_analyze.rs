//! Scanning real directory trees and analysing the resulting tag graph.

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use tagtrace_core::{analyze, CategoryFamily, ExclusionFilter, TagScanner};

#[test]
fn analysis_of_scanned_project() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(
        root.join("plan.md"),
        "@REQ:LOOP-1 → @DESIGN:LOOP-1 → @REQ:LOOP-1\n\
         @TASK:LONELY_ONE\n\
         @TEST:SELF-1 → @TEST:SELF-1\n",
    )
    .unwrap();

    let report = TagScanner::default().scan(root).unwrap();
    let graph = report.tag_graph();
    let analysis = analyze(&graph);

    assert_eq!(analysis.total_tags, 4);
    assert!(!analysis.is_healthy());
    assert_eq!(analysis.cycles.len(), 2);
    assert_eq!(analysis.self_references, vec!["TEST:SELF-1"]);
    assert_eq!(analysis.orphans, vec!["TASK:LONELY_ONE"]);
    assert_eq!(analysis.naming_violations.len(), 1);
    assert_eq!(
        analysis.naming_violations[0].suggestion.as_deref(),
        Some("LONELY-ONE")
    );
    assert_eq!(analysis.coverage[&CategoryFamily::Primary], 1.0);
}

#[test]
fn ignore_file_and_custom_patterns() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("generated")).unwrap();
    fs::write(root.join(".tagtraceignore"), "generated/\n").unwrap();
    fs::write(root.join("generated/out.md"), "@REQ:GEN-1\n").unwrap();
    fs::write(root.join("notes.draft.md"), "@REQ:DRAFT-1\n").unwrap();
    fs::write(root.join("notes.md"), "@REQ:KEEP-1\n").unwrap();

    let scanner = TagScanner::new(ExclusionFilter::new(&["*.draft.md"], true), 1024 * 1024);
    let report = scanner.scan(root).unwrap();

    let paths: Vec<&str> = report.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["notes.md"]);
}

#[test]
fn oversized_and_binary_files_are_skipped() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("big.md"), format!("@REQ:BIG-1 {}\n", "x".repeat(200))).unwrap();
    fs::write(root.join("blob.txt"), [0xff, 0xfe, 0x00, 0x40]).unwrap();
    fs::write(root.join("ok.md"), "@REQ:OK-1\n").unwrap();

    let report = TagScanner::new(ExclusionFilter::default(), 100)
        .scan(root)
        .unwrap();

    assert_eq!(report.files_scanned, 3);
    assert_eq!(report.files_skipped, 2);
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].path, "ok.md");
}
