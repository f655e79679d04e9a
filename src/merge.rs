//! Combining coverage stores.
//!
//! Stores meet in two places: workers of one instrumentation run fold their
//! private stores together, and metadata files written by separate runs are
//! aggregated after the fact. Both go through [`CoverageStore::merge`].

use crate::error::{JarcovError, Result};
use crate::file_utils::discover_files_named;
use crate::store::CoverageStore;
use std::path::{Path, PathBuf};

/// Result of [`aggregate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No metadata file was found under the search root; nothing was written.
    NothingToMerge,
    /// `files` metadata files were merged into a store of `classes` classes.
    Merged { files: usize, classes: usize },
}

/// Folds in-memory stores into one.
///
/// # Errors
/// Returns [`JarcovError::MergeConflict`] if two stores disagree on the
/// counter layout of a class.
pub fn fold_stores<I>(stores: I) -> Result<CoverageStore>
where
    I: IntoIterator<Item = CoverageStore>,
{
    let mut merged = CoverageStore::new();
    for store in stores {
        if merged.is_empty() {
            merged = store;
        } else {
            merged.merge(&store)?;
        }
    }
    Ok(merged)
}

/// Loads and merges the metadata files at `paths`, ignoring missing ones.
///
/// # Errors
/// Returns an error if an existing file is unreadable or corrupt, or if two
/// files disagree on the layout of a class.
pub fn merge_files(paths: &[PathBuf]) -> Result<CoverageStore> {
    let mut merged = CoverageStore::new();
    for path in paths {
        match CoverageStore::load(path)? {
            Some(store) => {
                tracing::debug!(path = %path.display(), classes = store.len(), "Merging metadata file");
                merged.merge(&store)?;
            }
            None => tracing::debug!(path = %path.display(), "Metadata file not found, ignored"),
        }
    }
    Ok(merged)
}

/// Finds every file named `file_name` under `search_root`, merges them and
/// saves the result atomically to `output`.
///
/// # Errors
/// Returns [`JarcovError::ConfigError`] if `search_root` is not a directory,
/// and propagates load, merge and save failures.
#[tracing::instrument(level = "debug", skip_all, fields(root = %search_root.display(), file_name = %file_name))]
pub fn aggregate(search_root: &Path, file_name: &str, output: &Path) -> Result<MergeOutcome> {
    if !search_root.is_dir() {
        return Err(JarcovError::config_error_with_path(
            "Search path is not a directory",
            search_root.to_path_buf(),
        ));
    }

    let mut found = discover_files_named(search_root, file_name)?;
    // An earlier aggregate written under the search root must not count twice.
    found.retain(|p| !same_file(p, output));

    if found.is_empty() {
        tracing::warn!(
            "No files named {} found under {}",
            file_name,
            search_root.display()
        );
        return Ok(MergeOutcome::NothingToMerge);
    }

    let merged = merge_files(&found)?;
    merged.save(output)?;

    tracing::info!(
        files = found.len(),
        classes = merged.len(),
        "Merged coverage metadata into {}",
        output.display()
    );
    Ok(MergeOutcome::Merged {
        files: found.len(),
        classes: merged.len(),
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ClassRecord;
    use tempfile::TempDir;

    fn store_with(names: &[&str]) -> CoverageStore {
        names
            .iter()
            .map(|n| ClassRecord::new(*n).with_lines([1, 2]))
            .collect()
    }

    #[test]
    fn test_fold_stores_unions_classes() {
        let merged =
            fold_stores(vec![store_with(&["a.A"]), store_with(&["b.B"]), store_with(&["a.A"])])
                .unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_fold_stores_empty_input() {
        assert!(fold_stores(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_merge_files_ignores_missing() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("one.dat");
        store_with(&["a.A"]).save(&present).unwrap();

        let merged = merge_files(&[present, dir.path().join("missing.dat")]).unwrap();
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_aggregate_rejects_non_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        let err = aggregate(&file, "coverage.dat", &dir.path().join("out.dat")).unwrap_err();
        assert_eq!(err.name(), "ConfigError");
    }

    #[test]
    fn test_aggregate_nothing_found() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out/merged.dat");

        let outcome = aggregate(dir.path(), "coverage.dat", &output).unwrap();
        assert_eq!(outcome, MergeOutcome::NothingToMerge);
        assert!(!output.exists());
    }

    #[test]
    fn test_aggregate_skips_previous_output() {
        let dir = TempDir::new().unwrap();
        store_with(&["a.A"]).save(&dir.path().join("m1/coverage.dat")).unwrap();
        let output = dir.path().join("coverage.dat");

        aggregate(dir.path(), "coverage.dat", &output).unwrap();
        let again = aggregate(dir.path(), "coverage.dat", &output).unwrap();

        assert_eq!(again, MergeOutcome::Merged { files: 1, classes: 1 });
    }
}
