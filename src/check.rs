//! Minimum coverage gate.

use crate::error::{JarcovError, Result};
use crate::merge::merge_files;
use crate::store::CoverageStore;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOptions {
    pub metadata_file: PathBuf,
    /// Additional metadata files merged in before checking. Missing ones are ignored.
    pub data_files: Vec<PathBuf>,
    /// Minimum line coverage in percent.
    pub min_line: Option<u8>,
    /// Minimum branch coverage in percent.
    pub min_branch: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// No coverage data was found, nothing was checked.
    Skipped,
    /// Every configured minimum was reached. Percentages are rounded.
    Passed { line: u32, branch: u32 },
}

/// Rounds a 0.0–1.0 rate to a whole percentage.
#[must_use]
pub fn percent(rate: f64) -> u32 {
    (rate * 100.0).round().clamp(0.0, 100.0) as u32
}

/// Compares `store` against the configured minimums.
///
/// # Errors
/// Returns [`JarcovError::ThresholdError`] for the first minimum that is not
/// reached, line coverage first.
pub fn check_store(store: &CoverageStore, min_line: Option<u8>, min_branch: Option<u8>) -> Result<CheckOutcome> {
    let line = percent(store.line_rate());
    let branch = percent(store.branch_rate());
    tracing::info!(line, branch, "Coverage: line {}%, branch {}%", line, branch);

    if let Some(min) = min_line {
        if line < u32::from(min) {
            return Err(JarcovError::threshold_error("line", min, line));
        }
    }
    if let Some(min) = min_branch {
        if branch < u32::from(min) {
            return Err(JarcovError::threshold_error("branch", min, branch));
        }
    }
    Ok(CheckOutcome::Passed { line, branch })
}

/// Loads the metadata, merges any extra data files and checks the minimums.
///
/// # Errors
/// Returns a configuration error for a minimum above 100, a load or merge
/// error for unreadable data, or a threshold error.
#[tracing::instrument(level = "debug", skip_all, fields(metadata = %options.metadata_file.display()))]
pub fn run(options: &CheckOptions) -> Result<CheckOutcome> {
    for (name, min) in [("line", options.min_line), ("branch", options.min_branch)] {
        if let Some(min) = min {
            if min > 100 {
                return Err(JarcovError::config_error(format!(
                    "Minimum {} coverage must be between 0 and 100, got {}",
                    name, min
                )));
            }
        }
    }

    let mut files = vec![options.metadata_file.clone()];
    files.extend(options.data_files.iter().cloned());
    let store = merge_files(&files)?;

    if store.is_empty() {
        tracing::warn!("No coverage data found, skipping check");
        return Ok(CheckOutcome::Skipped);
    }

    check_store(&store, options.min_line, options.min_branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ClassRecord, LineCounter};
    use tempfile::TempDir;

    /// A store whose line rate is `covered / total`.
    fn store_with_line_rate(covered: u32, total: u32) -> CoverageStore {
        let mut record = ClassRecord::new("a.A").with_lines(1..=total);
        for counter in record.lines.iter_mut().take(covered as usize) {
            *counter = LineCounter {
                line: counter.line,
                hits: 1,
            };
        }
        [record].into_iter().collect()
    }

    #[test]
    fn test_percent_rounds() {
        assert_eq!(percent(0.754), 75);
        assert_eq!(percent(0.756), 76);
        assert_eq!(percent(1.0), 100);
        assert_eq!(percent(0.0), 0);
    }

    #[test]
    fn test_threshold_boundary() {
        let store = store_with_line_rate(754, 1000);

        assert_eq!(
            check_store(&store, Some(75), None).unwrap(),
            CheckOutcome::Passed { line: 75, branch: 100 }
        );

        let err = check_store(&store, Some(76), None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected a line coverage of at least 76% but got 75%"
        );
    }

    #[test]
    fn test_branch_threshold() {
        let mut record = ClassRecord::new("a.A").with_branches([(1, 0), (1, 1)]);
        record.branches[0].taken = true;
        let store: CoverageStore = [record].into_iter().collect();

        let err = check_store(&store, None, Some(60)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected a branch coverage of at least 60% but got 50%"
        );
    }

    #[test]
    fn test_run_skips_when_no_data() {
        let dir = TempDir::new().unwrap();
        let options = CheckOptions {
            metadata_file: dir.path().join("coverage.dat"),
            min_line: Some(90),
            ..CheckOptions::default()
        };
        assert_eq!(run(&options).unwrap(), CheckOutcome::Skipped);
    }

    #[test]
    fn test_run_merges_extra_data_files() {
        let dir = TempDir::new().unwrap();
        let metadata = dir.path().join("coverage.dat");
        let extra = dir.path().join("it/coverage.dat");
        store_with_line_rate(0, 4).save(&metadata).unwrap();
        store_with_line_rate(4, 4).save(&extra).unwrap();

        let options = CheckOptions {
            metadata_file: metadata,
            data_files: vec![extra, dir.path().join("absent.dat")],
            min_line: Some(100),
            min_branch: None,
        };
        assert_eq!(
            run(&options).unwrap(),
            CheckOutcome::Passed { line: 100, branch: 100 }
        );
    }

    #[test]
    fn test_run_rejects_minimum_above_100() {
        let options = CheckOptions {
            min_branch: Some(101),
            ..CheckOptions::default()
        };
        assert_eq!(run(&options).unwrap_err().name(), "ConfigError");
    }
}
