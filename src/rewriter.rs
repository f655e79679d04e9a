//! The class rewriter seam.
//!
//! Inserting coverage counters into bytecode is not done by jarcov itself. The engines
//! call a [`ClassRewriter`] for every class file they encounter and only deal
//! with what comes back: new bytes, and whether the class was actually
//! transformed. A rewriter that transforms a class also registers its
//! [`ClassRecord`] in the store it is handed.
//!
//! Two implementations ship with the crate:
//!
//! - any `Fn(&str, &[u8], &mut CoverageStore) -> Result<RewriteOutcome>`
//!   closure, for embedding and tests;
//! - [`CommandRewriter`], which delegates to an external program.

use crate::error::{JarcovError, Result};
use crate::source_resolver::class_name_from_entry;
use crate::store::{ClassRecord, CoverageStore};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Smallest class file the engines will hand to a rewriter: magic plus
/// minor/major version.
pub const CLASS_HEADER_LEN: usize = 8;

/// Suffix identifying instrumentable entries.
pub const CLASS_SUFFIX: &str = ".class";

/// Environment variable carrying the entry name for [`CommandRewriter`].
pub const ENTRY_ENV: &str = "JARCOV_ENTRY";

/// Environment variable carrying the record file path for [`CommandRewriter`].
pub const RECORD_ENV: &str = "JARCOV_RECORD";

/// Exit code a rewriter program uses to report "left unchanged".
pub const SKIPPED_EXIT_CODE: i32 = 3;

/// Result of offering one class to a rewriter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub bytes: Vec<u8>,
    pub transformed: bool,
}

impl RewriteOutcome {
    /// The class was instrumented and `bytes` replace the original.
    #[must_use]
    pub fn transformed(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            transformed: true,
        }
    }

    /// The class was left alone, e.g. because it is already instrumented.
    #[must_use]
    pub fn unchanged(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            transformed: false,
        }
    }
}

/// Bytecode transformer capability.
///
/// Implementations must be safe to call on any entry whose name ends in
/// `.class`, including classes they instrumented in an earlier run; those
/// should come back with `transformed == false` and no record registered.
pub trait ClassRewriter: Send + Sync {
    /// Rewrites `bytes` of the class file `entry_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the class cannot be processed. Engines treat this
    /// as fatal for the current target.
    fn rewrite(
        &self,
        entry_name: &str,
        bytes: &[u8],
        store: &mut CoverageStore,
    ) -> Result<RewriteOutcome>;
}

impl<F> ClassRewriter for F
where
    F: Fn(&str, &[u8], &mut CoverageStore) -> Result<RewriteOutcome> + Send + Sync,
{
    fn rewrite(
        &self,
        entry_name: &str,
        bytes: &[u8],
        store: &mut CoverageStore,
    ) -> Result<RewriteOutcome> {
        self(entry_name, bytes, store)
    }
}

/// Returns true if `name` designates a class file.
#[must_use]
pub fn is_class_entry(name: &str) -> bool {
    name.ends_with(CLASS_SUFFIX)
}

/// Runs an external program for every class.
///
/// Protocol:
///
/// - the class bytes are written to the program's stdin;
/// - `JARCOV_ENTRY` holds the entry name, `JARCOV_RECORD` a file path;
/// - exit code 0: stdout holds the rewritten class and the record file holds
///   the class's coverage record as JSON;
/// - exit code 3: the class was left unchanged;
/// - anything else is a failure.
#[derive(Debug, Clone)]
pub struct CommandRewriter {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandRewriter {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    fn read_record(&self, entry_name: &str, record_path: &std::path::Path) -> Result<ClassRecord> {
        let raw = std::fs::read(record_path).map_err(|e| {
            JarcovError::io_error_with_source("read rewriter record", record_path.to_path_buf(), e)
        })?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(JarcovError::rewrite_error(
                entry_name,
                "rewriter reported success but wrote no coverage record",
            ));
        }
        let mut record: ClassRecord = serde_json::from_slice(&raw).map_err(|e| {
            JarcovError::rewrite_error(entry_name, format!("invalid coverage record: {}", e))
        })?;
        if record.name.is_empty() {
            record.name = class_name_from_entry(entry_name).ok_or_else(|| {
                JarcovError::rewrite_error(entry_name, "cannot derive class name from entry")
            })?;
        }
        Ok(record)
    }
}

impl ClassRewriter for CommandRewriter {
    fn rewrite(
        &self,
        entry_name: &str,
        bytes: &[u8],
        store: &mut CoverageStore,
    ) -> Result<RewriteOutcome> {
        let record_file = tempfile::NamedTempFile::new()
            .map_err(|e| JarcovError::io_error_with_source("create record file", std::env::temp_dir(), e))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(ENTRY_ENV, entry_name)
            .env(RECORD_ENV, record_file.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    JarcovError::rewrite_error(
                        entry_name,
                        format!(
                            "rewriter program '{}' not found. Please ensure it is installed and in your PATH.",
                            self.program.display()
                        ),
                    )
                } else {
                    JarcovError::rewrite_error(
                        entry_name,
                        format!("failed to start '{}': {}", self.program.display(), e),
                    )
                }
            })?;

        // stdin is fed from its own thread while stdout is drained. A child
        // that exits without reading its input closes the pipe early.
        let stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            let writer = scope.spawn(move || -> std::io::Result<()> {
                let Some(mut stdin) = stdin else {
                    return Ok(());
                };
                match stdin.write_all(bytes) {
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }
            });
            let output = child.wait_with_output();
            let written = writer.join().unwrap_or_else(|_| {
                Err(std::io::Error::other("stdin writer thread panicked"))
            });
            output.and_then(|o| written.map(|()| o))
        })
        .map_err(|e| JarcovError::rewrite_error(entry_name, format!("I/O with rewriter failed: {}", e)))?;

        match output.status.code() {
            Some(0) => {
                let record = self.read_record(entry_name, record_file.path())?;
                tracing::trace!(entry = entry_name, class = %record.name, "Class instrumented");
                store.insert(record)?;
                Ok(RewriteOutcome::transformed(output.stdout))
            }
            Some(SKIPPED_EXIT_CODE) => {
                tracing::trace!(entry = entry_name, "Rewriter left class unchanged");
                Ok(RewriteOutcome::unchanged(bytes))
            }
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(JarcovError::rewrite_error(
                    entry_name,
                    format!("rewriter exited with {}: {}", output.status, stderr.trim()),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_class_entry() {
        assert!(is_class_entry("com/acme/Foo.class"));
        assert!(!is_class_entry("com/acme/Foo.java"));
        assert!(!is_class_entry("META-INF/"));
    }

    #[test]
    fn test_closure_rewriter_registers_records() {
        let rewriter = |entry: &str, bytes: &[u8], store: &mut CoverageStore| -> Result<RewriteOutcome> {
            let name = class_name_from_entry(entry).unwrap();
            store.insert(ClassRecord::new(name).with_lines([1, 2]))?;
            let mut out = bytes.to_vec();
            out.push(0);
            Ok(RewriteOutcome::transformed(out))
        };
        let mut store = CoverageStore::new();

        let outcome = rewriter
            .rewrite("a/B.class", &[1, 2, 3], &mut store)
            .expect("closure rewriter should succeed");

        assert!(outcome.transformed);
        assert_eq!(outcome.bytes, vec![1, 2, 3, 0]);
        assert!(store.contains("a.B"));
    }

    #[test]
    fn test_command_rewriter_missing_program_is_rewrite_error() {
        let rewriter = CommandRewriter::new("/nonexistent/jarcov-rewriter-for-tests");
        let mut store = CoverageStore::new();

        let err = rewriter
            .rewrite("a/B.class", &[0xCA, 0xFE, 0xBA, 0xBE], &mut store)
            .expect_err("missing program should fail");

        assert_eq!(err.name(), "RewriteError");
        assert!(store.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_rewriter_skip_exit_code_leaves_bytes() {
        let rewriter = CommandRewriter::new("sh").with_args(vec![
            "-c".to_string(),
            "cat > /dev/null; exit 3".to_string(),
        ]);
        let mut store = CoverageStore::new();

        let outcome = rewriter
            .rewrite("a/B.class", b"original", &mut store)
            .expect("skip should succeed");

        assert!(!outcome.transformed);
        assert_eq!(outcome.bytes, b"original".to_vec());
        assert!(store.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_rewriter_reads_record_and_stdout() {
        let script = r#"cat > /dev/null; printf '{"name":"","source_file":"B.java","lines":[{"line":3,"hits":0}],"branches":[]}' > "$JARCOV_RECORD"; printf 'rewritten'"#;
        let rewriter =
            CommandRewriter::new("sh").with_args(vec!["-c".to_string(), script.to_string()]);
        let mut store = CoverageStore::new();

        let outcome = rewriter
            .rewrite("a/B.class", b"original", &mut store)
            .expect("rewrite should succeed");

        assert!(outcome.transformed);
        assert_eq!(outcome.bytes, b"rewritten".to_vec());
        let record = store.get("a.B").expect("record should be registered");
        assert_eq!(record.source_file.as_deref(), Some("B.java"));
        assert_eq!(record.lines.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_rewriter_failure_exit_code() {
        let rewriter = CommandRewriter::new("sh").with_args(vec![
            "-c".to_string(),
            "cat > /dev/null; echo boom >&2; exit 1".to_string(),
        ]);
        let mut store = CoverageStore::new();

        let err = rewriter
            .rewrite("a/B.class", b"x", &mut store)
            .expect_err("exit 1 should fail");

        assert!(err.to_string().contains("boom"));
    }
}
