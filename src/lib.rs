//! # Jarcov - offline coverage for JVM class artifacts
//!
//! Jarcov rewrites compiled classes so they record execution counts, keeps
//! the per-class counter layouts in a metadata file, and turns merged
//! metadata into reports. It provides:
//!
//! - **Instrumentation**: rewrites classes inside jar/war/ear/zip archives and
//!   class directories through a pluggable class rewriter
//! - **Merging**: folds any number of metadata files into one store
//! - **Threshold checks**: fails a build when line or branch coverage is too low
//! - **Reporting**: HTML, Cobertura-style XML, summary XML and plain text
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line argument parsing and command dispatch
//! - [`config`] - Configuration file loading and merging with CLI arguments
//! - [`error`] - Centralized error types for the crate
//! - [`store`] - Coverage records, the mergeable store and its metadata file
//! - [`rewriter`] - The class rewriter seam and its external-program implementation
//! - [`archive`] - Crash-safe in-place rewriting of archives
//! - [`directory`] - Rewriting of class directory trees
//! - [`instrument`] - Target collection and parallel instrumentation
//! - [`merge`] - Aggregation of metadata files
//! - [`check`] - Coverage thresholds
//! - [`source_resolver`] - Class to source file resolution
//! - [`report`] - Report formats, dispatch and the renderer trait
//! - [`file_utils`] - Directory walking and default excludes
//!
//! ## Usage as a Library
//!
//! ```rust,no_run
//! use jarcov_core::{CoverageStore, check_store};
//! use std::path::Path;
//!
//! # fn main() -> jarcov_core::Result<()> {
//! let store = CoverageStore::load_or_empty(Path::new(jarcov_core::DEFAULT_METADATA_FILE))?;
//! check_store(&store, Some(80), None)?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod check;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod file_utils;
pub mod html_report;
pub mod html_utils;
pub mod instrument;
pub mod merge;
pub mod report;
pub mod rewriter;
pub mod source_resolver;
pub mod store;
pub mod text_report;
pub mod xml_report;

/// Metadata file used when none is configured.
pub const DEFAULT_METADATA_FILE: &str = "target/jarcov/coverage.dat";

/// Report directory used when none is configured.
pub const DEFAULT_REPORT_DIR: &str = "target/jarcov/site";

/// Class directory instrumented when no target is configured.
pub const DEFAULT_CLASS_DIR: &str = "target/classes";

/// Where instrumented class directories go unless rewriting in place.
pub const DEFAULT_INSTRUMENTED_DIR: &str = "target/jarcov/classes";

pub use crate::archive::{ArchiveOptions, ArchiveSummary, is_archive, rewrite_archive};
pub use crate::check::{CheckOptions, CheckOutcome, check_store};
pub use crate::cli::{CheckArgs, Cli, Commands, InstrumentArgs, MergeArgs, ReportArgs};
pub use crate::config::{
    JarcovConfig, load_config, load_config_from_path, merge_check_args, merge_instrument_args,
    merge_merge_args, merge_report_args,
};
pub use crate::directory::{DirectorySummary, rewrite_directory};
pub use crate::error::{JarcovError as Error, Result};
pub use crate::instrument::{ArchiveSet, InstrumentOptions, InstrumentSummary};
pub use crate::merge::{MergeOutcome, aggregate, fold_stores, merge_files};
pub use crate::report::{DispatchMode, ReportFormat, ReportOptions, Renderer, select_formats};
pub use crate::rewriter::{ClassRewriter, CommandRewriter, RewriteOutcome};
pub use crate::source_resolver::{SourceLocation, SourceResolver};
pub use crate::store::{BranchCounter, ClassRecord, CoverageStore, LineCounter};
