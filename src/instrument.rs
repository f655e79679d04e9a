//! The instrumentation pipeline.
//!
//! Collects targets (archives, archive sets, class directories), runs the
//! matching rewrite engine on each, and persists the records produced.
//! With more than one job, targets are spread over scoped worker threads;
//! every worker fills a private store and the stores are folded at the end.

use crate::archive::{ArchiveOptions, is_archive, rewrite_archive};
use crate::directory::rewrite_directory;
use crate::error::{JarcovError, Result};
use crate::file_utils::collect_matching;
use crate::merge::fold_stores;
use crate::rewriter::ClassRewriter;
use crate::store::CoverageStore;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// A directory scanned for archives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSet {
    /// Directory searched recursively. Required.
    pub base_dir: Option<PathBuf>,
}

/// Everything the pipeline needs besides the rewriter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentOptions {
    pub archives: Vec<PathBuf>,
    pub archive_sets: Vec<ArchiveSet>,
    pub class_dirs: Vec<PathBuf>,
    /// Destination for rewritten class directories; `None` rewrites in place.
    pub output_dir: Option<PathBuf>,
    pub metadata_file: PathBuf,
    /// Merge new records into an existing metadata file instead of replacing it.
    pub merge: bool,
    pub keep_directory_entries: bool,
    /// Worker threads; `0` means one per CPU.
    pub jobs: usize,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        Self {
            archives: Vec::new(),
            archive_sets: Vec::new(),
            class_dirs: Vec::new(),
            output_dir: None,
            metadata_file: PathBuf::from(crate::DEFAULT_METADATA_FILE),
            merge: true,
            keep_directory_entries: false,
            jobs: 1,
        }
    }
}

/// One unit of instrumentation work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Archive(PathBuf),
    Directory(PathBuf),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstrumentSummary {
    pub archives: usize,
    pub directories: usize,
    pub classes: usize,
    pub transformed: usize,
}

impl InstrumentSummary {
    fn add(&mut self, other: &InstrumentSummary) {
        self.archives += other.archives;
        self.directories += other.directories;
        self.classes += other.classes;
        self.transformed += other.transformed;
    }
}

/// Resolves the configured inputs into concrete targets.
///
/// Missing archives and non-existing archive set directories are skipped with
/// a warning; missing class directories are left to the directory engine,
/// which warns as well. Paths naming the same file system entry are kept
/// once, under the first spelling seen.
///
/// # Errors
/// Returns [`JarcovError::ConfigError`] for an archive set without a base
/// directory, or a traversal error while scanning a set.
pub fn collect_targets(options: &InstrumentOptions) -> Result<Vec<Target>> {
    let mut targets: Vec<Target> = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut push = |target: Target| {
        let path = match &target {
            Target::Archive(path) | Target::Directory(path) => path,
        };
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.clone());
        if seen.insert(key) {
            targets.push(target);
        }
    };

    for archive in &options.archives {
        if archive.is_file() {
            push(Target::Archive(archive.clone()));
        } else {
            tracing::warn!("Ignored non-existing archive {}", archive.display());
        }
    }

    for set in &options.archive_sets {
        let base = set
            .base_dir
            .as_ref()
            .ok_or_else(|| JarcovError::config_error("Missing base directory for archive set"))?;
        if !base.is_dir() {
            tracing::warn!("Ignored non-existing archive set directory {}", base.display());
            continue;
        }
        for archive in collect_matching(base, is_archive)? {
            push(Target::Archive(archive));
        }
    }

    for dir in &options.class_dirs {
        push(Target::Directory(dir.clone()));
    }

    Ok(targets)
}

/// Runs the whole pipeline: collect, rewrite, persist.
///
/// # Errors
/// Returns the first configuration, rewrite or I/O error encountered.
#[tracing::instrument(level = "debug", skip_all)]
pub fn run(options: &InstrumentOptions, rewriter: &dyn ClassRewriter) -> Result<InstrumentSummary> {
    let targets = collect_targets(options)?;
    if targets.is_empty() {
        tracing::warn!("Nothing found to instrument!");
        return Ok(InstrumentSummary::default());
    }

    let jobs = effective_jobs(options.jobs, targets.len());
    tracing::debug!(targets = targets.len(), jobs, "Instrumenting");

    let (store, summary) = if jobs <= 1 {
        let all: Vec<&Target> = targets.iter().collect();
        instrument_targets(&all, options, rewriter)?
    } else {
        instrument_parallel(&targets, options, rewriter, jobs)?
    };

    persist(&store, &options.metadata_file, options.merge)?;

    tracing::info!(
        archives = summary.archives,
        directories = summary.directories,
        classes = summary.classes,
        transformed = summary.transformed,
        "Instrumentation finished, metadata in {}",
        options.metadata_file.display()
    );
    Ok(summary)
}

fn effective_jobs(requested: usize, targets: usize) -> usize {
    let jobs = if requested == 0 {
        num_cpus::get()
    } else {
        requested
    };
    jobs.clamp(1, targets.max(1))
}

fn instrument_target(
    target: &Target,
    options: &InstrumentOptions,
    rewriter: &dyn ClassRewriter,
    store: &mut CoverageStore,
    summary: &mut InstrumentSummary,
) -> Result<()> {
    match target {
        Target::Archive(path) => {
            let archive_options = ArchiveOptions {
                keep_directory_entries: options.keep_directory_entries,
            };
            let s = rewrite_archive(path, rewriter, store, &archive_options)?;
            summary.archives += 1;
            summary.classes += s.classes;
            summary.transformed += s.transformed;
        }
        Target::Directory(path) => {
            let dest = options.output_dir.as_deref().unwrap_or(path);
            let s = rewrite_directory(path, dest, rewriter, store)?;
            summary.directories += 1;
            summary.classes += s.classes;
            summary.transformed += s.transformed;
        }
    }
    Ok(())
}

fn instrument_targets(
    targets: &[&Target],
    options: &InstrumentOptions,
    rewriter: &dyn ClassRewriter,
) -> Result<(CoverageStore, InstrumentSummary)> {
    let mut store = CoverageStore::new();
    let mut summary = InstrumentSummary::default();
    for target in targets {
        instrument_target(target, options, rewriter, &mut store, &mut summary)?;
    }
    Ok((store, summary))
}

fn instrument_parallel(
    targets: &[Target],
    options: &InstrumentOptions,
    rewriter: &dyn ClassRewriter,
    jobs: usize,
) -> Result<(CoverageStore, InstrumentSummary)> {
    let mut buckets: Vec<Vec<&Target>> = vec![Vec::new(); jobs];
    for (i, target) in targets.iter().enumerate() {
        buckets[i % jobs].push(target);
    }

    let results: Vec<Result<(CoverageStore, InstrumentSummary)>> = std::thread::scope(|scope| {
        let handles: Vec<_> = buckets
            .iter()
            .map(|bucket| scope.spawn(move || instrument_targets(bucket, options, rewriter)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(JarcovError::io_error("instrumentation worker panicked")))
            })
            .collect()
    });

    let mut stores = Vec::with_capacity(results.len());
    let mut summary = InstrumentSummary::default();
    for result in results {
        let (store, s) = result?;
        stores.push(store);
        summary.add(&s);
    }
    Ok((fold_stores(stores)?, summary))
}

/// Saves `store` to `path`, merging it into the existing file when `merge` is
/// set. Returns the store that was written.
///
/// # Errors
/// Returns an error if the existing file is corrupt, has conflicting records,
/// or the new file cannot be written.
pub fn persist(store: &CoverageStore, path: &Path, merge: bool) -> Result<CoverageStore> {
    let to_save = if merge {
        match CoverageStore::load(path)? {
            Some(mut existing) => {
                tracing::debug!(
                    existing = existing.len(),
                    new = store.len(),
                    "Merging into existing metadata file"
                );
                existing.merge(store)?;
                existing
            }
            None => store.clone(),
        }
    } else {
        store.clone()
    };
    to_save.save(path)?;
    Ok(to_save)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewriter::RewriteOutcome;
    use crate::source_resolver::class_name_from_entry;
    use crate::store::ClassRecord;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn recording(entry: &str, bytes: &[u8], store: &mut CoverageStore) -> Result<RewriteOutcome> {
        store.insert(ClassRecord::new(class_name_from_entry(entry).unwrap()).with_lines([1]))?;
        Ok(RewriteOutcome::transformed(bytes.to_vec()))
    }

    fn write_class(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, [0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 0x34, 1]).unwrap();
    }

    #[test]
    fn test_effective_jobs() {
        assert_eq!(effective_jobs(4, 2), 2);
        assert_eq!(effective_jobs(1, 10), 1);
        assert!(effective_jobs(0, 1000) >= 1);
        assert_eq!(effective_jobs(3, 0), 1);
    }

    #[test]
    fn test_archive_set_without_base_dir_is_config_error() {
        let options = InstrumentOptions {
            archive_sets: vec![ArchiveSet { base_dir: None }],
            ..InstrumentOptions::default()
        };
        let err = collect_targets(&options).unwrap_err();
        assert_eq!(err.name(), "ConfigError");
    }

    #[test]
    fn test_collect_targets_skips_missing_and_dedupes() {
        let dir = TempDir::new().unwrap();
        let libs = dir.path().join("libs");
        fs::create_dir_all(libs.join("nested")).unwrap();
        fs::write(libs.join("a.jar"), b"").unwrap();
        fs::write(libs.join("nested/b.war"), b"").unwrap();
        fs::write(libs.join("notes.txt"), b"").unwrap();

        let options = InstrumentOptions {
            archives: vec![libs.join("a.jar"), dir.path().join("missing.jar")],
            archive_sets: vec![
                ArchiveSet {
                    base_dir: Some(libs.clone()),
                },
                ArchiveSet {
                    base_dir: Some(dir.path().join("no-such-dir")),
                },
            ],
            class_dirs: vec![dir.path().join("classes")],
            ..InstrumentOptions::default()
        };

        let targets = collect_targets(&options).unwrap();
        assert_eq!(
            targets,
            vec![
                Target::Archive(libs.join("a.jar")),
                Target::Archive(libs.join("nested/b.war")),
                Target::Directory(dir.path().join("classes")),
            ]
        );
    }

    #[test]
    fn test_collect_targets_dedupes_equivalent_spellings() {
        let dir = TempDir::new().unwrap();
        let lib = dir.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        let jar = lib.join("a.jar");
        let mut zip = ZipWriter::new(fs::File::create(&jar).unwrap());
        zip.start_file("com/acme/A.class", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 0x34]).unwrap();
        zip.finish().unwrap();

        let options = InstrumentOptions {
            archives: vec![jar.clone(), dir.path().join("lib/../lib/a.jar")],
            archive_sets: vec![ArchiveSet {
                base_dir: Some(dir.path().join("./lib")),
            }],
            metadata_file: dir.path().join("coverage.dat"),
            jobs: 2,
            ..InstrumentOptions::default()
        };

        assert_eq!(collect_targets(&options).unwrap(), vec![Target::Archive(jar)]);

        let summary = run(&options, &recording).unwrap();
        assert_eq!(summary.archives, 1);
        assert_eq!(summary.transformed, 1);
        let saved = CoverageStore::load(&options.metadata_file).unwrap().unwrap();
        assert_eq!(saved.len(), 1);
    }

    #[test]
    fn test_run_with_nothing_to_instrument_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let options = InstrumentOptions {
            metadata_file: dir.path().join("coverage.dat"),
            ..InstrumentOptions::default()
        };

        let summary = run(&options, &recording).unwrap();

        assert_eq!(summary, InstrumentSummary::default());
        assert!(!options.metadata_file.exists());
    }

    #[test]
    fn test_parallel_run_folds_worker_stores() {
        let dir = TempDir::new().unwrap();
        let mut class_dirs = Vec::new();
        for i in 0..4 {
            let root = dir.path().join(format!("module{i}/classes"));
            write_class(&root, &format!("m{i}/Main.class"));
            class_dirs.push(root);
        }
        let options = InstrumentOptions {
            class_dirs,
            output_dir: Some(dir.path().join("instrumented")),
            metadata_file: dir.path().join("coverage.dat"),
            jobs: 3,
            ..InstrumentOptions::default()
        };

        let summary = run(&options, &recording).unwrap();

        assert_eq!(summary.directories, 4);
        assert_eq!(summary.transformed, 4);
        let saved = CoverageStore::load(&options.metadata_file).unwrap().unwrap();
        assert_eq!(saved.len(), 4);
        assert!(dir.path().join("instrumented/m2/Main.class").is_file());
    }

    #[test]
    fn test_persist_merge_and_replace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coverage.dat");
        let first: CoverageStore = [ClassRecord::new("a.A").with_lines([1])].into_iter().collect();
        let second: CoverageStore = [ClassRecord::new("b.B").with_lines([1])].into_iter().collect();

        persist(&first, &path, true).unwrap();
        let merged = persist(&second, &path, true).unwrap();
        assert_eq!(merged.len(), 2);

        let replaced = persist(&second, &path, false).unwrap();
        assert_eq!(replaced.len(), 1);
        assert_eq!(CoverageStore::load(&path).unwrap().unwrap(), replaced);
    }
}
