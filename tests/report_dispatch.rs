//! Integration tests for report generation and format dispatch.

use jarcov_core::report::{self, DispatchMode, ReportOptions};
use jarcov_core::store::{ClassRecord, CoverageStore};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Project {
    _dir: TempDir,
    root: PathBuf,
}

impl Project {
    /// A metadata file with one Java class and one ActionScript-backed class.
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();

        let java = root.join("src/main/java/com/acme");
        fs::create_dir_all(&java).unwrap();
        fs::write(
            java.join("Service.java"),
            "package com.acme;\nclass Service {\n  int f(int x) {\n    if (x > 0 && x < 9) { return 1; }\n    return 0;\n  }\n}\n",
        )
        .unwrap();
        let flex = root.join("src/main/flex/com/acme/ui");
        fs::create_dir_all(&flex).unwrap();
        fs::write(flex.join("Panel.as"), "package com.acme.ui {\n}\n").unwrap();

        let mut service = ClassRecord::new("com.acme.Service")
            .with_source_file("Service.java")
            .with_lines([3, 4, 5])
            .with_branches([(4, 0), (4, 1)]);
        service.lines[0].hits = 2;
        service.lines[1].hits = 2;
        service.branches[0].taken = true;
        let panel = ClassRecord::new("com.acme.ui.Panel").with_lines([1]);
        let store: CoverageStore = [service, panel].into_iter().collect();
        store.save(&root.join("target/jarcov/coverage.dat")).unwrap();

        Self { _dir: dir, root }
    }

    fn options(&self, formats: &[&str], dispatch: DispatchMode) -> ReportOptions {
        ReportOptions {
            metadata_file: self.root.join("target/jarcov/coverage.dat"),
            source_roots: vec![
                self.root.join("src/main/java"),
                self.root.join("src/main/flex"),
            ],
            output_dir: self.root.join("site"),
            formats: formats.iter().map(|f| (*f).to_string()).collect(),
            dispatch,
            ..ReportOptions::default()
        }
    }
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_default_formats_in_all_mode() {
    let project = Project::new();
    let written = report::run(&project.options(&[], DispatchMode::All)).unwrap();

    assert_eq!(
        file_names(&written),
        vec!["index.html", "coverage.xml", "coverage.txt"]
    );

    let xml = fs::read_to_string(project.root.join("site/coverage.xml")).unwrap();
    assert!(xml.contains(r#"lines-covered="2" lines-valid="4""#));
    assert!(xml.contains(r#"filename="com/acme/ui/Panel.as""#));

    let txt = fs::read_to_string(project.root.join("site/coverage.txt")).unwrap();
    assert!(txt.contains("com.acme.Service"));
    assert!(txt.contains("com/acme/ui/Panel.as"));
}

#[test]
fn test_all_mode_renders_every_requested_format() {
    let project = Project::new();
    let written = report::run(&project.options(
        &["txt", "summaryXml", "HTML", "xml"],
        DispatchMode::All,
    ))
    .unwrap();

    assert_eq!(written.len(), 4);
    assert_eq!(
        listing(&project.root.join("site")),
        vec![
            "coverage-summary.xml",
            "coverage.txt",
            "coverage.xml",
            "index.html"
        ]
    );
}

#[test]
fn test_first_match_mode_renders_one_format() {
    let project = Project::new();

    let written = report::run(&project.options(
        &["summaryXml", "xml", "txt"],
        DispatchMode::FirstMatch,
    ))
    .unwrap();
    assert_eq!(file_names(&written), vec!["coverage.xml"]);
    assert_eq!(listing(&project.root.join("site")), vec!["coverage.xml"]);

    let txt_only = report::run(&project.options(&["txt"], DispatchMode::FirstMatch)).unwrap();
    assert!(txt_only.is_empty());
}

#[test]
fn test_unknown_format_writes_nothing() {
    let project = Project::new();
    let err = report::run(&project.options(&["html", "pdf"], DispatchMode::All)).unwrap_err();

    assert_eq!(err.name(), "ConfigError");
    assert!(!project.root.join("site").exists());
}

#[test]
fn test_missing_metadata_writes_nothing() {
    let project = Project::new();
    let mut options = project.options(&["html"], DispatchMode::All);
    options.metadata_file = project.root.join("nowhere.dat");

    assert!(report::run(&options).unwrap().is_empty());
    assert!(!project.root.join("site").exists());
}
