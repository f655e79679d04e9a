use crate::error::Result;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Names always left out of directory scans: version-control metadata and
/// editor/OS droppings.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    ".gitignore",
    ".gitattributes",
    ".svn",
    ".hg",
    ".hgignore",
    ".bzr",
    ".bzrignore",
    "_darcs",
    "CVS",
    ".cvsignore",
    "SCCS",
    "RCS",
    "vssver.scc",
    ".arch-ids",
    "{arch}",
    ".DS_Store",
];

/// Returns true if a file or directory named `name` is excluded from scans.
///
/// Besides [`DEFAULT_EXCLUDES`] this matches editor backups (`foo~`, `#foo#`,
/// `.#foo`, `%foo%`) and macOS resource forks (`._foo`).
pub fn is_default_excluded(name: &str) -> bool {
    DEFAULT_EXCLUDES.contains(&name)
        || name.ends_with('~')
        || name.starts_with(".#")
        || name.starts_with("._")
        || (name.len() > 1 && name.starts_with('#') && name.ends_with('#'))
        || (name.len() > 1 && name.starts_with('%') && name.ends_with('%'))
}

fn is_excluded_entry(entry: &DirEntry) -> bool {
    // Never exclude the root itself, whatever it is called.
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(is_default_excluded)
}

/// Recursively collects every regular file under `root`, skipping excluded
/// names. Results are sorted by path.
///
/// # Errors
/// Returns an error if directory traversal fails.
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    collect_matching(root, |_| true)
}

/// Recursively collects the files under `root` whose file name is exactly
/// `file_name`.
///
/// # Errors
/// Returns an error if directory traversal fails.
pub fn discover_files_named(root: &Path, file_name: &str) -> Result<Vec<PathBuf>> {
    collect_matching(root, |path| {
        path.file_name().is_some_and(|n| n == file_name)
    })
}

/// Recursively collects the files under `root` accepted by `keep`.
///
/// # Errors
/// Returns an error if directory traversal fails.
pub fn collect_matching(root: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut out_files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded_entry(e));
    for entry_result in walker {
        let entry = entry_result?;
        if entry.file_type().is_file() && keep(entry.path()) {
            out_files.push(entry.into_path());
        }
    }
    Ok(out_files)
}

/// Given a file under `root`, returns its root-relative path with `/`
/// separators, e.g. `com/acme/Foo.class`.
///
/// Paths outside `root` are returned whole.
pub fn relative_slash_path(file_path: &Path, root: &Path) -> String {
    let rel = file_path.strip_prefix(root).unwrap_or(file_path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
