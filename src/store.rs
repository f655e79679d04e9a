//! Coverage metadata store.
//!
//! The store is the aggregate root of all coverage data produced by a build:
//! one [`ClassRecord`] per fully-qualified class name. Stores are built up
//! during instrumentation, persisted to a metadata file, and later folded
//! together with [`CoverageStore::merge`].
//!
//! # File Format
//!
//! ```text
//! +----------------+---------------------+--------------------+
//! | magic (8 B)    | SHA-256 of payload  | bincode payload    |
//! | "JARCOV\0\x01" | (32 B)              | (CoverageStore)    |
//! +----------------+---------------------+--------------------+
//! ```
//!
//! Writes go to a temporary file in the destination directory which is then
//! renamed over the target, so readers only ever observe a complete file.

use crate::error::{JarcovError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Default metadata file name.
pub const DEFAULT_METADATA_FILE_NAME: &str = "coverage.dat";

/// Leading bytes of every metadata file; the last byte is the format version.
const MAGIC: &[u8; 8] = b"JARCOV\0\x01";

/// Length of the SHA-256 digest stored after the magic.
const DIGEST_LEN: usize = 32;

/// Hit counter for one instrumented source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCounter {
    pub line: u32,
    pub hits: u64,
}

impl LineCounter {
    #[must_use]
    pub const fn new(line: u32) -> Self {
        Self { line, hits: 0 }
    }
}

/// Execution flag for one arm of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCounter {
    pub line: u32,
    pub arm: u32,
    pub taken: bool,
}

impl BranchCounter {
    #[must_use]
    pub const fn new(line: u32, arm: u32) -> Self {
        Self {
            line,
            arm,
            taken: false,
        }
    }
}

/// Coverage data for a single class.
///
/// Counter order is significant: two records for the same class can only be
/// merged when they were derived from identical bytecode, i.e. their counter
/// sequences line up index by index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    /// Fully-qualified class name, e.g. `com.acme.Foo`.
    pub name: String,
    /// Source file name recorded in the class file, e.g. `Foo.java`.
    pub source_file: Option<String>,
    #[serde(default)]
    pub lines: Vec<LineCounter>,
    #[serde(default)]
    pub branches: Vec<BranchCounter>,
}

impl ClassRecord {
    /// Creates an empty record for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_file: None,
            lines: Vec::new(),
            branches: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    #[must_use]
    pub fn with_lines(mut self, lines: impl IntoIterator<Item = u32>) -> Self {
        self.lines = lines.into_iter().map(LineCounter::new).collect();
        self
    }

    #[must_use]
    pub fn with_branches(mut self, branches: impl IntoIterator<Item = (u32, u32)>) -> Self {
        self.branches = branches
            .into_iter()
            .map(|(line, arm)| BranchCounter::new(line, arm))
            .collect();
        self
    }

    /// Package part of the class name, `""` for the default package.
    #[must_use]
    pub fn package_name(&self) -> &str {
        self.name.rsplit_once('.').map_or("", |(pkg, _)| pkg)
    }

    #[must_use]
    pub fn lines_covered(&self) -> usize {
        self.lines.iter().filter(|l| l.hits > 0).count()
    }

    #[must_use]
    pub fn branches_covered(&self) -> usize {
        self.branches.iter().filter(|b| b.taken).count()
    }

    #[must_use]
    pub fn line_rate(&self) -> f64 {
        rate(self.lines_covered(), self.lines.len())
    }

    #[must_use]
    pub fn branch_rate(&self) -> f64 {
        rate(self.branches_covered(), self.branches.len())
    }

    /// Checks that `other` has the same counter layout as `self`.
    fn check_shape(&self, other: &ClassRecord) -> Result<()> {
        if self.lines.len() != other.lines.len() {
            return Err(JarcovError::merge_conflict(
                &self.name,
                format!(
                    "line counter count {} != {}",
                    self.lines.len(),
                    other.lines.len()
                ),
            ));
        }
        if self.branches.len() != other.branches.len() {
            return Err(JarcovError::merge_conflict(
                &self.name,
                format!(
                    "branch counter count {} != {}",
                    self.branches.len(),
                    other.branches.len()
                ),
            ));
        }
        for (idx, (a, b)) in self.lines.iter().zip(&other.lines).enumerate() {
            if a.line != b.line {
                return Err(JarcovError::merge_conflict(
                    &self.name,
                    format!("line counter {} maps to line {} vs {}", idx, a.line, b.line),
                ));
            }
        }
        for (idx, (a, b)) in self.branches.iter().zip(&other.branches).enumerate() {
            if (a.line, a.arm) != (b.line, b.arm) {
                return Err(JarcovError::merge_conflict(
                    &self.name,
                    format!(
                        "branch counter {} maps to {}:{} vs {}:{}",
                        idx, a.line, a.arm, b.line, b.arm
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Adds the counters of a shape-compatible record into this one.
    fn absorb(&mut self, other: &ClassRecord) {
        for (a, b) in self.lines.iter_mut().zip(&other.lines) {
            a.hits = a.hits.saturating_add(b.hits);
        }
        for (a, b) in self.branches.iter_mut().zip(&other.branches) {
            a.taken |= b.taken;
        }
        // Keep the smaller hint so the result does not depend on merge order.
        self.source_file = match (self.source_file.take(), &other.source_file) {
            (Some(a), Some(b)) => Some(if *b < a { b.clone() } else { a }),
            (Some(a), None) => Some(a),
            (None, b) => b.clone(),
        };
    }
}

/// The mergeable aggregate of all class records of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageStore {
    classes: BTreeMap<String, ClassRecord>,
}

impl CoverageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    #[must_use]
    pub fn get(&self, class_name: &str) -> Option<&ClassRecord> {
        self.classes.get(class_name)
    }

    #[must_use]
    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }

    /// Iterates records in class name order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassRecord> {
        self.classes.values()
    }

    /// Registers the record produced by instrumenting a class.
    ///
    /// Re-registering a class whose record already exists merges counters in,
    /// exactly as [`merge`](Self::merge) would.
    ///
    /// # Errors
    ///
    /// Returns [`JarcovError::MergeConflict`] if an existing record for the
    /// same class has a different counter layout.
    pub fn insert(&mut self, record: ClassRecord) -> Result<()> {
        match self.classes.get_mut(&record.name) {
            Some(existing) => {
                existing.check_shape(&record)?;
                existing.absorb(&record);
            }
            None => {
                self.classes.insert(record.name.clone(), record);
            }
        }
        Ok(())
    }

    /// Merges every record of `other` into this store.
    ///
    /// Classes only present in `other` are copied; classes present on both
    /// sides have their hit counts summed and branch flags OR-ed. The operation
    /// is commutative and associative. Merging a store with itself doubles hit
    /// counts.
    ///
    /// All overlapping records are validated before anything is modified, so
    /// on error `self` is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`JarcovError::MergeConflict`] if a class has incompatible
    /// counter layouts on the two sides.
    pub fn merge(&mut self, other: &CoverageStore) -> Result<()> {
        for (name, theirs) in &other.classes {
            if let Some(ours) = self.classes.get(name) {
                ours.check_shape(theirs)?;
            }
        }
        for (name, theirs) in &other.classes {
            match self.classes.get_mut(name) {
                Some(ours) => ours.absorb(theirs),
                None => {
                    self.classes.insert(name.clone(), theirs.clone());
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn total_lines(&self) -> usize {
        self.classes.values().map(|c| c.lines.len()).sum()
    }

    #[must_use]
    pub fn lines_covered(&self) -> usize {
        self.classes.values().map(ClassRecord::lines_covered).sum()
    }

    #[must_use]
    pub fn total_branches(&self) -> usize {
        self.classes.values().map(|c| c.branches.len()).sum()
    }

    #[must_use]
    pub fn branches_covered(&self) -> usize {
        self.classes.values().map(ClassRecord::branches_covered).sum()
    }

    /// Fraction of instrumented lines executed at least once, over the whole store.
    #[must_use]
    pub fn line_rate(&self) -> f64 {
        rate(self.lines_covered(), self.total_lines())
    }

    /// Fraction of branch arms taken at least once, over the whole store.
    #[must_use]
    pub fn branch_rate(&self) -> f64 {
        rate(self.branches_covered(), self.total_branches())
    }

    /// Loads a store from `path`.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`JarcovError::MetadataError`] if the file exists but is not a
    /// valid metadata file, or an IO error if it cannot be read.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(path).map_err(|e| {
            JarcovError::io_error_with_source("read coverage metadata", path.to_path_buf(), e)
        })?;

        Self::decode(&bytes)
            .map(Some)
            .map_err(|message| JarcovError::metadata_error(path.to_path_buf(), message))
    }

    /// Loads a store from `path`, treating a missing file as an empty store.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load), minus the not-found case.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        Ok(Self::load(path)?.unwrap_or_default())
    }

    /// Atomically writes the store to `path`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created or synced, or
    /// the file cannot be written or renamed into place.
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.display(), classes = self.len()))]
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| {
            JarcovError::io_error_with_source("create metadata directory", parent.clone(), e)
        })?;

        let bytes = self.encode()?;

        let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| {
            JarcovError::io_error_with_source("create temporary metadata file", parent.clone(), e)
        })?;
        tmp.write_all(&bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| {
                JarcovError::io_error_with_source(
                    "write temporary metadata file",
                    tmp.path().to_path_buf(),
                    e,
                )
            })?;
        tmp.persist(path).map_err(|e| {
            JarcovError::io_error_with_source("replace metadata file", path.to_path_buf(), e.error)
        })?;
        fsync_parent_dir(&parent)?;

        tracing::debug!("Coverage metadata saved");
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let digest = Sha256::digest(&payload);

        let mut bytes = Vec::with_capacity(MAGIC.len() + DIGEST_LEN + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(digest.as_slice());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let header_len = MAGIC.len() + DIGEST_LEN;
        if bytes.len() < header_len {
            return Err(format!("file is {} bytes, shorter than the header", bytes.len()));
        }
        let (magic, rest) = bytes.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err("not a jarcov metadata file (bad magic)".to_string());
        }
        let (digest, payload) = rest.split_at(DIGEST_LEN);
        if Sha256::digest(payload).as_slice() != digest {
            return Err("checksum mismatch, the file is truncated or damaged".to_string());
        }
        let store: Self = bincode::deserialize(payload)
            .map_err(|e| format!("Failed to decode coverage data: {}", e))?;
        for (key, record) in &store.classes {
            if *key != record.name {
                return Err(format!(
                    "record stored under '{}' is for class '{}'",
                    key, record.name
                ));
            }
        }
        Ok(store)
    }
}

impl FromIterator<ClassRecord> for CoverageStore {
    /// Builds a store from records, keeping the last record for a duplicated name.
    fn from_iter<I: IntoIterator<Item = ClassRecord>>(iter: I) -> Self {
        Self {
            classes: iter.into_iter().map(|r| (r.name.clone(), r)).collect(),
        }
    }
}

fn rate(covered: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        covered as f64 / total as f64
    }
}

/// Flushes the directory entry left by a rename.
#[cfg(unix)]
fn fsync_parent_dir(parent: &Path) -> Result<()> {
    fs::File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| {
            JarcovError::io_error_with_source("sync metadata directory", parent.to_path_buf(), e)
        })
}

#[cfg(not(unix))]
fn fsync_parent_dir(_parent: &Path) -> Result<()> {
    Ok(())
}
