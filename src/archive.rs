//! In-place rewriting of zip-compatible archives (jar, war, ear, zip).
//!
//! The archive is first copied to a safety file next to it. The original is
//! then rebuilt entry by entry from that copy: class entries are offered to a
//! [`ClassRewriter`], everything else is raw-copied without recompression.
//! The safety copy is deleted only once the new archive has been fully
//! written; on failure it is kept and its path is carried by the error.

use crate::error::{JarcovError, Result};
use crate::rewriter::{ClassRewriter, is_class_entry};
use crate::store::CoverageStore;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Archive suffixes recognised when scanning archive sets.
pub const ARCHIVE_SUFFIXES: &[&str] = &[".jar", ".war", ".ear", ".zip"];

/// Returns true if `path` has one of the [`ARCHIVE_SUFFIXES`].
#[must_use]
pub fn is_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| {
            let lower = name.to_ascii_lowercase();
            ARCHIVE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
        })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Raw-copy directory entries instead of dropping them.
    pub keep_directory_entries: bool,
}

/// What happened to the entries of one archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Class entries offered to the rewriter.
    pub classes: usize,
    /// Class entries the rewriter replaced.
    pub transformed: usize,
    /// Entries copied byte for byte, including untransformed classes.
    pub copied: usize,
    /// Directory entries dropped.
    pub directories_skipped: usize,
}

fn zip_error(path: &Path, operation: &str, err: zip::result::ZipError) -> JarcovError {
    JarcovError::ArchiveError {
        path: path.to_path_buf(),
        backup: None,
        message: format!("failed to {}: {}", operation, err),
        source: Some(Box::new(err)),
    }
}

fn io_error(path: &Path, operation: &str, err: std::io::Error) -> JarcovError {
    JarcovError::io_error_with_source(operation, path.to_path_buf(), err)
}

/// Rewrites the archive at `path` in place.
///
/// Records for transformed classes are merged into `store` only when the whole
/// archive was rebuilt successfully.
///
/// # Errors
///
/// Returns [`JarcovError::ArchiveError`] if the archive cannot be read or
/// written, or if the rewriter fails on one of its classes. Once the original
/// has been replaced by the copy, the error names the copy in `backup`.
#[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn rewrite_archive(
    path: &Path,
    rewriter: &dyn ClassRewriter,
    store: &mut CoverageStore,
    options: &ArchiveOptions,
) -> Result<ArchiveSummary> {
    if !path.is_file() {
        return Err(JarcovError::archive_error(
            path.to_path_buf(),
            "archive does not exist or is not a regular file",
        ));
    }

    let backup = create_safety_copy(path)?;

    let mut staged = CoverageStore::new();
    let result = rebuild(path, &backup, rewriter, &mut staged, options)
        .and_then(|summary| store.merge(&staged).map(|()| summary));

    match result {
        Ok(summary) => {
            backup
                .close()
                .map_err(|e| io_error(path, "remove archive safety copy", e))?;
            tracing::info!(
                classes = summary.classes,
                transformed = summary.transformed,
                "Instrumented {}",
                path.display()
            );
            Ok(summary)
        }
        Err(err) => {
            let kept = keep_safety_copy(backup);
            if let Some(kept) = &kept {
                tracing::error!(
                    backup = %kept.display(),
                    "Rewriting {} failed; original archive preserved",
                    path.display()
                );
            }
            Err(match kept {
                Some(kept) => err.with_backup(path.to_path_buf(), kept),
                None => err,
            })
        }
    }
}

/// Copies the archive next to itself and removes the original.
fn create_safety_copy(path: &Path) -> Result<tempfile::TempPath> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let copy = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".orig")
        .tempfile_in(&parent)
        .map_err(|e| io_error(&parent, "create archive safety copy", e))?
        .into_temp_path();

    fs::copy(path, &copy).map_err(|e| io_error(path, "copy archive", e))?;
    if let Err(e) = fs::remove_file(path) {
        // The original is still intact; the copy is dropped with `copy`.
        return Err(io_error(path, "remove original archive", e));
    }
    Ok(copy)
}

fn keep_safety_copy(copy: tempfile::TempPath) -> Option<PathBuf> {
    match copy.keep() {
        Ok(kept) => Some(kept),
        Err(e) => {
            tracing::error!(error = %e.error, "Failed to keep archive safety copy");
            None
        }
    }
}

fn rebuild(
    path: &Path,
    source: &Path,
    rewriter: &dyn ClassRewriter,
    store: &mut CoverageStore,
    options: &ArchiveOptions,
) -> Result<ArchiveSummary> {
    let reader = File::open(source).map_err(|e| io_error(source, "open archive copy", e))?;
    let mut archive = ZipArchive::new(reader).map_err(|e| zip_error(path, "read archive", e))?;

    let out = File::create(path).map_err(|e| io_error(path, "create archive", e))?;
    let mut writer = ZipWriter::new(BufWriter::new(out));

    let mut summary = ArchiveSummary::default();

    for index in 0..archive.len() {
        let (name, is_dir) = {
            let entry = archive
                .by_index_raw(index)
                .map_err(|e| zip_error(path, "read entry", e))?;
            (entry.name().to_string(), entry.is_dir())
        };

        if is_dir {
            if options.keep_directory_entries {
                copy_raw(&mut archive, &mut writer, index, path)?;
                summary.copied += 1;
            } else {
                summary.directories_skipped += 1;
            }
            continue;
        }

        if !is_class_entry(&name) {
            copy_raw(&mut archive, &mut writer, index, path)?;
            summary.copied += 1;
            continue;
        }

        let (bytes, file_options) = {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| zip_error(path, "open class entry", e))?;
            let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| io_error(path, "read class entry", e))?;

            let method = match entry.compression() {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let mut file_options = SimpleFileOptions::default().compression_method(method);
            if let Some(modified) = entry.last_modified() {
                file_options = file_options.last_modified_time(modified);
            }
            if let Some(mode) = entry.unix_mode() {
                file_options = file_options.unix_permissions(mode);
            }
            (bytes, file_options)
        };

        summary.classes += 1;
        let outcome = rewriter.rewrite(&name, &bytes, store)?;

        if outcome.transformed {
            let large = u32::try_from(outcome.bytes.len()).is_err();
            writer
                .start_file(name.as_str(), file_options.large_file(large))
                .map_err(|e| zip_error(path, "start entry", e))?;
            writer
                .write_all(&outcome.bytes)
                .map_err(|e| io_error(path, "write class entry", e))?;
            summary.transformed += 1;
        } else {
            copy_raw(&mut archive, &mut writer, index, path)?;
            summary.copied += 1;
        }
    }

    let mut out = writer
        .finish()
        .map_err(|e| zip_error(path, "finish archive", e))?;
    out.flush()
        .and_then(|()| out.get_ref().sync_all())
        .map_err(|e| io_error(path, "flush archive", e))?;

    Ok(summary)
}

fn copy_raw(
    archive: &mut ZipArchive<File>,
    writer: &mut ZipWriter<BufWriter<File>>,
    index: usize,
    path: &Path,
) -> Result<()> {
    let entry = archive
        .by_index_raw(index)
        .map_err(|e| zip_error(path, "read entry", e))?;
    writer
        .raw_copy_file(entry)
        .map_err(|e| zip_error(path, "copy entry", e))
}
