//! Error types for jarcov.
//!
//! This module defines the error type shared by every stage of the pipeline.
//! Each variant names the failure domain so callers can tell a stale metadata
//! file apart from a transient I/O fault or an unmet coverage threshold.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// The main error type for jarcov operations.
#[derive(Debug)]
pub enum JarcovError {
    /// An error occurred during file system operations.
    IoError {
        /// The operation being performed.
        operation: String,
        /// The path involved in the error.
        path: Option<PathBuf>,
        /// The underlying IO error.
        source: Option<io::Error>,
    },

    /// An archive could not be rewritten.
    ArchiveError {
        /// The archive being rewritten.
        path: PathBuf,
        /// Where the untouched copy of the archive was left, if anywhere.
        backup: Option<PathBuf>,
        /// Description of what went wrong.
        message: String,
        /// The underlying error.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A persisted metadata file is unreadable or corrupt.
    MetadataError {
        /// The metadata file.
        path: Option<PathBuf>,
        /// Description of the problem.
        message: String,
        /// The underlying error.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Two records for the same class have incompatible counter layouts.
    MergeConflict {
        /// The class whose records disagree.
        class_name: String,
        /// Which part of the layout differs.
        message: String,
    },

    /// The external class rewriter failed on an entry.
    RewriteError {
        /// The entry being rewritten.
        entry: String,
        /// Description of what went wrong.
        message: String,
        /// The underlying error.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An error occurred while loading or validating configuration.
    ConfigError {
        /// Description of the configuration issue.
        message: String,
        /// The config file path, if applicable.
        path: Option<PathBuf>,
        /// The underlying error.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A configured minimum coverage was not reached.
    ThresholdError {
        /// The metric that failed, e.g. "line" or "branch".
        metric: String,
        /// The configured minimum percentage.
        expected: u8,
        /// The measured percentage, rounded.
        actual: u32,
    },
}

impl JarcovError {
    /// Creates a new `IoError` with the given operation description.
    pub fn io_error(operation: impl Into<String>) -> Self {
        Self::IoError {
            operation: operation.into(),
            path: None,
            source: None,
        }
    }

    /// Creates a new `IoError` with a path and underlying error.
    ///
    /// # Arguments
    /// * `operation` - A description of the IO operation being performed.
    /// * `path` - The path involved in the error.
    /// * `source` - The underlying IO error.
    pub fn io_error_with_source(
        operation: impl Into<String>,
        path: PathBuf,
        source: io::Error,
    ) -> Self {
        Self::IoError {
            operation: operation.into(),
            path: Some(path),
            source: Some(source),
        }
    }

    /// Creates a new `ArchiveError` for the given archive.
    pub fn archive_error(path: PathBuf, message: impl Into<String>) -> Self {
        Self::ArchiveError {
            path,
            backup: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the location of the preserved archive copy to an `ArchiveError`.
    ///
    /// Any other error is first wrapped into an `ArchiveError` for `path`.
    pub fn with_backup(self, path: PathBuf, backup: PathBuf) -> Self {
        match self {
            Self::ArchiveError {
                path,
                message,
                source,
                ..
            } => Self::ArchiveError {
                path,
                backup: Some(backup),
                message,
                source,
            },
            other => Self::ArchiveError {
                path,
                backup: Some(backup),
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Creates a new `MetadataError` for a file.
    pub fn metadata_error(path: PathBuf, message: impl Into<String>) -> Self {
        Self::MetadataError {
            path: Some(path),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `MergeConflict` for a class.
    pub fn merge_conflict(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MergeConflict {
            class_name: class_name.into(),
            message: message.into(),
        }
    }

    /// Creates a new `RewriteError` for an entry.
    pub fn rewrite_error(entry: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RewriteError {
            entry: entry.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `ConfigError` with the given message.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Creates a new `ConfigError` with a file path.
    pub fn config_error_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::ConfigError {
            message: message.into(),
            path: Some(path),
            source: None,
        }
    }

    /// Creates a new `ThresholdError`.
    pub fn threshold_error(metric: impl Into<String>, expected: u8, actual: u32) -> Self {
        Self::ThresholdError {
            metric: metric.into(),
            expected,
            actual,
        }
    }

    /// Returns the name of the error variant.
    pub fn name(&self) -> &'static str {
        match self {
            Self::IoError { .. } => "IoError",
            Self::ArchiveError { .. } => "ArchiveError",
            Self::MetadataError { .. } => "MetadataError",
            Self::MergeConflict { .. } => "MergeConflict",
            Self::RewriteError { .. } => "RewriteError",
            Self::ConfigError { .. } => "ConfigError",
            Self::ThresholdError { .. } => "ThresholdError",
        }
    }

    /// Returns suggested recovery actions for the error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::IoError { operation, .. } => {
                let mut s = vec![
                    "Check that the path exists and is accessible".to_string(),
                    "Verify you have the necessary permissions".to_string(),
                ];
                if operation.contains("read") || operation.contains("open") {
                    s.push("Ensure the file is not locked by another process".to_string());
                }
                s
            }
            Self::ArchiveError { backup, .. } => {
                let mut s = vec!["Check that the archive is a valid zip/jar file".to_string()];
                if let Some(backup) = backup {
                    s.push(format!(
                        "The original archive was preserved at '{}'; copy it back before retrying",
                        backup.display()
                    ));
                }
                s
            }
            Self::MetadataError { .. } => vec![
                "Delete the metadata file and re-run instrumentation".to_string(),
                "Ensure the file was written by a compatible jarcov version".to_string(),
            ],
            Self::MergeConflict { class_name, .. } => vec![
                format!(
                    "Metadata for '{}' was produced from different bytecode",
                    class_name
                ),
                "Remove stale metadata files and instrument again".to_string(),
            ],
            Self::RewriteError { .. } => vec![
                "Check that the class rewriter program is installed and executable".to_string(),
                "Run the rewriter on the entry by hand to see its diagnostics".to_string(),
            ],
            Self::ConfigError { .. } => vec![
                "Check the configuration file syntax".to_string(),
                "Verify all required fields are present".to_string(),
                "Ensure the file is valid TOML format".to_string(),
            ],
            Self::ThresholdError { metric, .. } => vec![
                format!("Add tests that exercise uncovered {} paths", metric),
                "Lower the configured minimum if the target is unrealistic".to_string(),
            ],
        }
    }
}

impl fmt::Display for JarcovError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError {
                operation,
                path,
                source,
            } => {
                match path {
                    Some(p) => write!(f, "IO error during '{}' at '{}'", operation, p.display())?,
                    None => write!(f, "IO error during '{}'", operation)?,
                }
                if let Some(source) = source {
                    write!(f, ": {}", source)?;
                }
                Ok(())
            }
            Self::ArchiveError {
                path,
                backup,
                message,
                ..
            } => {
                write!(
                    f,
                    "Failed to rewrite archive '{}': {}",
                    path.display(),
                    message
                )?;
                if let Some(backup) = backup {
                    write!(f, " (original preserved at '{}')", backup.display())?;
                }
                Ok(())
            }
            Self::MetadataError { path, message, .. } => {
                if let Some(p) = path {
                    write!(f, "Corrupt coverage metadata '{}': {}", p.display(), message)
                } else {
                    write!(f, "Corrupt coverage metadata: {}", message)
                }
            }
            Self::MergeConflict {
                class_name,
                message,
            } => {
                write!(
                    f,
                    "Cannot merge coverage records for class '{}': {}",
                    class_name, message
                )
            }
            Self::RewriteError { entry, message, .. } => {
                write!(f, "Class rewriter failed on '{}': {}", entry, message)
            }
            Self::ConfigError { message, path, .. } => {
                if let Some(p) = path {
                    write!(f, "Configuration error in '{}': {}", p.display(), message)
                } else {
                    write!(f, "Configuration error: {}", message)
                }
            }
            Self::ThresholdError {
                metric,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Expected a {} coverage of at least {}% but got {}%",
                    metric, expected, actual
                )
            }
        }
    }
}

impl std::error::Error for JarcovError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError { source, .. } => source.as_ref().map(|e| e as _),
            Self::ArchiveError { source, .. } => source.as_ref().map(|s| s.as_ref() as _),
            Self::MetadataError { source, .. } => source.as_ref().map(|s| s.as_ref() as _),
            Self::RewriteError { source, .. } => source.as_ref().map(|s| s.as_ref() as _),
            Self::ConfigError { source, .. } => source.as_ref().map(|s| s.as_ref() as _),
            Self::MergeConflict { .. } | Self::ThresholdError { .. } => None,
        }
    }
}

// Implement From conversions for common error types

impl From<io::Error> for JarcovError {
    fn from(err: io::Error) -> Self {
        Self::IoError {
            operation: "file operation".to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<toml::de::Error> for JarcovError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError {
            message: format!("Failed to parse TOML: {}", err),
            path: None,
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for JarcovError {
    fn from(err: serde_json::Error) -> Self {
        Self::MetadataError {
            path: None,
            message: format!("Failed to parse/serialize JSON: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<bincode::Error> for JarcovError {
    fn from(err: bincode::Error) -> Self {
        let message = format!("Failed to encode/decode coverage data: {}", err);
        let source: Box<dyn std::error::Error + Send + Sync> = err;
        Self::MetadataError {
            path: None,
            message,
            source: Some(source),
        }
    }
}

impl From<walkdir::Error> for JarcovError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(PathBuf::from);
        Self::IoError {
            operation: "directory traversal".to_string(),
            path,
            source: err.into_io_error(),
        }
    }
}

/// A type alias for `Result<T, JarcovError>`.
pub type Result<T> = std::result::Result<T, JarcovError>;
