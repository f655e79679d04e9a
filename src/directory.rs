//! Rewriting loose class trees.
//!
//! Every file under the source root is written to the same relative path
//! under the destination root. Class files go through the rewriter first.
//! Source and destination may be the same directory, in which case classes
//! are rewritten in place and other files are left alone.

use crate::error::{JarcovError, Result};
use crate::file_utils::{collect_files, relative_slash_path};
use crate::rewriter::{CLASS_HEADER_LEN, ClassRewriter, is_class_entry};
use crate::store::CoverageStore;
use std::fs;
use std::path::Path;

/// What happened to the files of one class directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectorySummary {
    /// Class files offered to the rewriter.
    pub classes: usize,
    /// Class files the rewriter replaced.
    pub transformed: usize,
    /// Files copied unchanged.
    pub copied: usize,
}

/// Rewrites the class tree under `src_root` into `dest_root`.
///
/// A missing `src_root` is skipped with a warning.
///
/// # Errors
///
/// Returns an error if a file cannot be read or written, or if the rewriter
/// fails on a class.
#[tracing::instrument(level = "debug", skip_all, fields(src = %src_root.display(), dest = %dest_root.display()))]
pub fn rewrite_directory(
    src_root: &Path,
    dest_root: &Path,
    rewriter: &dyn ClassRewriter,
    store: &mut CoverageStore,
) -> Result<DirectorySummary> {
    let mut summary = DirectorySummary::default();
    if !src_root.is_dir() {
        tracing::warn!("Ignored non-existing class directory {}", src_root.display());
        return Ok(summary);
    }

    let in_place = same_directory(src_root, dest_root);

    for file in collect_files(src_root)? {
        let relative = relative_slash_path(&file, src_root);
        let target = dest_root.join(&relative);

        let len = fs::metadata(&file)
            .map_err(|e| JarcovError::io_error_with_source("stat class file", file.clone(), e))?
            .len();
        let instrumentable = is_class_entry(&relative) && len > CLASS_HEADER_LEN as u64;

        if !instrumentable {
            if !in_place {
                ensure_parent(&target)?;
                fs::copy(&file, &target).map_err(|e| {
                    JarcovError::io_error_with_source("copy file", target.clone(), e)
                })?;
            }
            summary.copied += 1;
            continue;
        }

        let bytes = fs::read(&file)
            .map_err(|e| JarcovError::io_error_with_source("read class file", file.clone(), e))?;
        summary.classes += 1;
        let outcome = rewriter.rewrite(&relative, &bytes, store)?;

        if outcome.transformed {
            summary.transformed += 1;
        } else {
            summary.copied += 1;
            if in_place {
                continue;
            }
        }

        ensure_parent(&target)?;
        fs::write(&target, &outcome.bytes)
            .map_err(|e| JarcovError::io_error_with_source("write class file", target.clone(), e))?;
    }

    tracing::info!(
        classes = summary.classes,
        transformed = summary.transformed,
        "Instrumented {}",
        src_root.display()
    );
    Ok(summary)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            JarcovError::io_error_with_source("create output directory", parent.to_path_buf(), e)
        })?;
    }
    Ok(())
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
