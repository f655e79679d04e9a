//! Mapping class names back to source files.
//!
//! Classes are not always compiled from `.java` sources: generated or
//! cross-compiled classes may come from other source dialects that share the
//! same package layout. The resolver therefore tries the canonical name first
//! and then each alternate extension in turn, across every search root in the
//! order the roots were added.

use crate::store::ClassRecord;
use std::path::PathBuf;

/// Extension of the canonical source file name derived from a class name.
pub const PRIMARY_EXTENSION: &str = ".java";

/// Alternate extensions tried, in order, when the primary one is not found.
pub const DEFAULT_ALTERNATE_EXTENSIONS: &[&str] = &[".as", ".mxml"];

/// A source file found under one of the search roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// The search root the file was found under.
    pub root: PathBuf,
    /// Path of the file relative to `root`, with `/` separators.
    pub relative: String,
}

impl SourceLocation {
    /// Full path of the source file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.relative)
    }
}

/// Ordered search path of source roots with extension fallback.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    roots: Vec<PathBuf>,
    primary_extension: String,
    alternate_extensions: Vec<String>,
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceResolver {
    /// Creates a resolver with no roots, `.java` as primary extension and the
    /// default alternates.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            primary_extension: PRIMARY_EXTENSION.to_string(),
            alternate_extensions: DEFAULT_ALTERNATE_EXTENSIONS
                .iter()
                .map(|e| (*e).to_string())
                .collect(),
        }
    }

    /// Replaces the alternate extensions, keeping their order as priority.
    #[must_use]
    pub fn with_alternate_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternate_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Appends a search root. Roots added earlier win.
    pub fn add_search_root(&mut self, root: impl Into<PathBuf>) {
        self.roots.push(root.into());
    }

    #[must_use]
    pub fn search_roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Resolves a fully-qualified class name such as `com.acme.Foo$Inner`.
    #[must_use]
    pub fn resolve(&self, class_name: &str) -> Option<SourceLocation> {
        self.resolve_file(&canonical_file_name(class_name, &self.primary_extension))
    }

    /// Resolves a class record, preferring the source file name it carries.
    ///
    /// The hint must be a plain file name; hints with path separators or
    /// `..` are ignored so lookups stay inside the package directory.
    #[must_use]
    pub fn resolve_record(&self, record: &ClassRecord) -> Option<SourceLocation> {
        if let Some(hint) = record.source_file.as_deref().filter(|h| is_plain_file_name(h)) {
            let package_dir = record.package_name().replace('.', "/");
            let hinted = if package_dir.is_empty() {
                hint.to_string()
            } else {
                format!("{}/{}", package_dir, hint)
            };
            if let Some(found) = self.resolve_file(&hinted) {
                return Some(found);
            }
        }
        self.resolve(&record.name)
    }

    /// Resolves a root-relative file name, falling back to alternate extensions.
    #[must_use]
    pub fn resolve_file(&self, file_name: &str) -> Option<SourceLocation> {
        self.candidates(file_name)
            .into_iter()
            .find_map(|candidate| self.find_in_roots(&candidate))
    }

    /// Candidate names in priority order: the name itself, then each
    /// alternate substituted for a trailing primary extension.
    fn candidates(&self, file_name: &str) -> Vec<String> {
        let mut names = vec![file_name.to_string()];
        if let Some(stem) = file_name.strip_suffix(self.primary_extension.as_str()) {
            names.extend(
                self.alternate_extensions
                    .iter()
                    .map(|ext| format!("{}{}", stem, ext)),
            );
        }
        names
    }

    fn find_in_roots(&self, relative: &str) -> Option<SourceLocation> {
        self.roots.iter().find_map(|root| {
            let candidate = root.join(relative);
            if candidate.is_file() {
                tracing::trace!(path = %candidate.display(), "Resolved source file");
                Some(SourceLocation {
                    root: root.clone(),
                    relative: relative.to_string(),
                })
            } else {
                None
            }
        })
    }
}

/// Derives the root-relative source file name for a class name.
///
/// Nested classes map to their outermost class's file.
///
/// Examples:
/// - `com.acme.Foo`        → `com/acme/Foo.java`
/// - `com.acme.Foo$Inner`  → `com/acme/Foo.java`
/// - `Foo`                 → `Foo.java`
#[must_use]
pub fn canonical_file_name(class_name: &str, extension: &str) -> String {
    let outer = class_name.split('$').next().unwrap_or(class_name);
    format!("{}{}", outer.replace('.', "/"), extension)
}

/// Class name for a class file path inside an archive or class directory.
///
/// `com/acme/Foo.class` → `com.acme.Foo`. Returns `None` for non-class files.
#[must_use]
pub fn class_name_from_entry(entry_name: &str) -> Option<String> {
    let stem = entry_name.strip_suffix(".class")?;
    let stem = stem.trim_start_matches('/');
    if stem.is_empty() {
        return None;
    }
    Some(stem.replace(['/', '\\'], "."))
}

/// Keeps existing directories, warning about and dropping the rest.
#[must_use]
pub fn existing_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    roots
        .iter()
        .filter(|root| {
            let ok = root.is_dir();
            if !ok {
                tracing::warn!(path = %root.display(), "Ignored non-existing source directory");
            }
            ok
        })
        .cloned()
        .collect()
}

/// Builds a resolver over `roots`, skipping the ones that do not exist.
#[must_use]
pub fn resolver_for_roots(roots: &[PathBuf]) -> SourceResolver {
    let mut resolver = SourceResolver::new();
    for root in existing_roots(roots) {
        resolver.add_search_root(root);
    }
    resolver
}

fn is_plain_file_name(hint: &str) -> bool {
    !hint.is_empty() && !hint.contains(['/', '\\']) && !hint.contains("..")
}
