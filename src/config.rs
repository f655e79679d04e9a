//! Configuration file support for jarcov.
//!
//! This module loads configuration from TOML files and merges it with
//! command-line arguments. CLI arguments take precedence over config file
//! values, which take precedence over built-in defaults.
//!
//! ```toml
//! [general]
//! metadata_file = "build/jarcov/coverage.dat"
//!
//! [instrument]
//! rewriter = "jarcov-asm"
//! class_dirs = ["target/classes"]
//! archive_sets = [{ base_dir = "target/lib" }]
//! jobs = 4
//!
//! [check]
//! min_line = 80
//!
//! [report]
//! source_roots = ["src/main/java", "src/main/flex"]
//! formats = ["html", "xml"]
//! ```

use crate::check::CheckOptions;
use crate::error::{JarcovError, Result};
use crate::instrument::{ArchiveSet, InstrumentOptions};
use crate::report::{DEFAULT_ENCODING, DispatchMode, ReportOptions};
use crate::rewriter::CommandRewriter;
use crate::source_resolver::DEFAULT_ALTERNATE_EXTENSIONS;
use crate::store::DEFAULT_METADATA_FILE_NAME;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file names to search for.
const DEFAULT_CONFIG_FILES: &[&str] = &["Jarcov.toml", ".jarcov.toml", "jarcov.toml"];

/// Main configuration structure representing a jarcov configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct JarcovConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub instrument: InstrumentConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// Settings shared by every command.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Coverage metadata file read and written by all commands.
    pub metadata_file: Option<PathBuf>,

    /// Enable debug logging.
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArchiveSetConfig {
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InstrumentConfig {
    /// Program implementing the rewriter protocol.
    pub rewriter: Option<PathBuf>,

    /// Arguments passed to the rewriter program.
    #[serde(default)]
    pub rewriter_args: Vec<String>,

    #[serde(default)]
    pub archives: Vec<PathBuf>,

    #[serde(default)]
    pub archive_sets: Vec<ArchiveSetConfig>,

    #[serde(default)]
    pub class_dirs: Vec<PathBuf>,

    /// Where rewritten class directories are written.
    pub output_dir: Option<PathBuf>,

    /// Rewrite class directories in place instead of into `output_dir`.
    pub in_place: Option<bool>,

    /// Merge into an existing metadata file (default true).
    pub merge: Option<bool>,

    pub keep_directory_entries: Option<bool>,

    /// Worker threads, 0 for one per CPU.
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    pub search_path: Option<PathBuf>,
    pub file_name: Option<String>,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CheckConfig {
    pub min_line: Option<u8>,
    pub min_branch: Option<u8>,
    #[serde(default)]
    pub data_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    #[serde(default)]
    pub source_roots: Vec<PathBuf>,
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub formats: Vec<String>,
    pub encoding: Option<String>,
    /// `all` or `first-match`.
    pub dispatch: Option<String>,
    /// Source extensions tried after `.java`, in order.
    pub alternate_extensions: Option<Vec<String>>,
}

/// Load configuration from a specific file path.
///
/// Returns `Ok(None)` if the file doesn't exist and an error if it exists but
/// cannot be parsed.
pub fn load_config_from_path(path: &Path) -> Result<Option<JarcovConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        JarcovError::io_error_with_source("read config file", path.to_path_buf(), e)
    })?;

    let config: JarcovConfig = toml::from_str(&content).map_err(|e| JarcovError::ConfigError {
        message: format!("Invalid configuration: {}", e.message()),
        path: Some(path.to_path_buf()),
        source: Some(Box::new(e)),
    })?;

    Ok(Some(config))
}

/// Searches the current directory and its parents for a default config file.
pub fn discover_and_load_config() -> Result<Option<(PathBuf, JarcovConfig)>> {
    let mut current_dir = std::env::current_dir()?;

    loop {
        for config_name in DEFAULT_CONFIG_FILES {
            let config_path = current_dir.join(config_name);
            if let Some(config) = load_config_from_path(&config_path)? {
                return Ok(Some((config_path, config)));
            }
        }

        if !current_dir.pop() {
            break;
        }
    }

    Ok(None)
}

/// Loads `config_path` if given, otherwise discovers a default config file.
///
/// An explicitly given path that does not exist is an error.
pub fn load_config(config_path: Option<&Path>) -> Result<Option<(PathBuf, JarcovConfig)>> {
    if let Some(path) = config_path {
        match load_config_from_path(path)? {
            Some(config) => Ok(Some((path.to_path_buf(), config))),
            None => Err(JarcovError::config_error_with_path(
                "Configuration file not found",
                path.to_path_buf(),
            )),
        }
    } else {
        discover_and_load_config()
    }
}

fn metadata_file(cli: &Option<PathBuf>, config: &JarcovConfig) -> PathBuf {
    cli.clone()
        .or_else(|| config.general.metadata_file.clone())
        .unwrap_or_else(|| PathBuf::from(crate::DEFAULT_METADATA_FILE))
}

/// Merge instrument CLI args with config file values.
///
/// List options (archives, sets, class directories) from the CLI replace the
/// config lists rather than extending them. When no target of any kind is
/// configured, the default class directory is used.
///
/// # Errors
/// Returns a configuration error if no rewriter program is configured.
pub fn merge_instrument_args(
    cli: &crate::cli::InstrumentArgs,
    config: &JarcovConfig,
) -> Result<(InstrumentOptions, CommandRewriter)> {
    let section = &config.instrument;

    let program = cli
        .rewriter
        .clone()
        .or_else(|| section.rewriter.clone())
        .ok_or_else(|| {
            JarcovError::config_error(
                "No class rewriter configured. Pass --rewriter or set instrument.rewriter",
            )
        })?;
    let rewriter_args = if cli.rewriter_args.is_empty() {
        section.rewriter_args.clone()
    } else {
        cli.rewriter_args.clone()
    };

    let cli_has_targets =
        !cli.archives.is_empty() || !cli.archive_sets.is_empty() || !cli.class_dirs.is_empty();
    let (archives, archive_sets, mut class_dirs) = if cli_has_targets {
        (
            cli.archives.clone(),
            cli.archive_sets
                .iter()
                .map(|dir| ArchiveSet {
                    base_dir: Some(dir.clone()),
                })
                .collect::<Vec<_>>(),
            cli.class_dirs.clone(),
        )
    } else {
        (
            section.archives.clone(),
            section
                .archive_sets
                .iter()
                .map(|set| ArchiveSet {
                    base_dir: set.base_dir.clone(),
                })
                .collect(),
            section.class_dirs.clone(),
        )
    };
    if archives.is_empty() && archive_sets.is_empty() && class_dirs.is_empty() {
        class_dirs.push(PathBuf::from(crate::DEFAULT_CLASS_DIR));
    }

    let in_place = cli.in_place || section.in_place.unwrap_or(false);
    let output_dir = if in_place {
        None
    } else {
        Some(
            cli.output_dir
                .clone()
                .or_else(|| section.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(crate::DEFAULT_INSTRUMENTED_DIR)),
        )
    };

    let options = InstrumentOptions {
        archives,
        archive_sets,
        class_dirs,
        output_dir,
        metadata_file: metadata_file(&cli.metadata_file, config),
        merge: !cli.no_merge && section.merge.unwrap_or(true),
        keep_directory_entries: cli.keep_directory_entries
            || section.keep_directory_entries.unwrap_or(false),
        jobs: cli.jobs.or(section.jobs).unwrap_or(1),
    };

    Ok((options, CommandRewriter::new(program).with_args(rewriter_args)))
}

/// Settings for the `merge` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSettings {
    pub search_path: PathBuf,
    pub file_name: String,
    pub output: PathBuf,
}

/// Merge merge-command CLI args with config file values.
pub fn merge_merge_args(cli: &crate::cli::MergeArgs, config: &JarcovConfig) -> MergeSettings {
    let section = &config.merge;
    MergeSettings {
        search_path: cli
            .search_path
            .clone()
            .or_else(|| section.search_path.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
        file_name: cli
            .file_name
            .clone()
            .or_else(|| section.file_name.clone())
            .unwrap_or_else(|| DEFAULT_METADATA_FILE_NAME.to_string()),
        output: cli
            .output
            .clone()
            .or_else(|| section.output.clone())
            .unwrap_or_else(|| metadata_file(&None, config)),
    }
}

/// Merge check CLI args with config file values.
pub fn merge_check_args(cli: &crate::cli::CheckArgs, config: &JarcovConfig) -> CheckOptions {
    let section = &config.check;
    CheckOptions {
        metadata_file: metadata_file(&cli.metadata_file, config),
        data_files: if cli.data_files.is_empty() {
            section.data_files.clone()
        } else {
            cli.data_files.clone()
        },
        min_line: cli.min_line.or(section.min_line),
        min_branch: cli.min_branch.or(section.min_branch),
    }
}

/// Merge report CLI args with config file values.
///
/// # Errors
/// Returns a configuration error for an unknown dispatch mode.
pub fn merge_report_args(cli: &crate::cli::ReportArgs, config: &JarcovConfig) -> Result<ReportOptions> {
    let section = &config.report;
    let defaults = ReportOptions::default();

    let dispatch = match cli.dispatch.as_deref().or(section.dispatch.as_deref()) {
        Some(mode) => mode.parse::<DispatchMode>()?,
        None => DispatchMode::default(),
    };

    let source_roots = if !cli.source_roots.is_empty() {
        cli.source_roots.clone()
    } else if !section.source_roots.is_empty() {
        section.source_roots.clone()
    } else {
        defaults.source_roots
    };

    Ok(ReportOptions {
        metadata_file: metadata_file(&cli.metadata_file, config),
        source_roots,
        output_dir: cli
            .output_dir
            .clone()
            .or_else(|| section.output_dir.clone())
            .unwrap_or(defaults.output_dir),
        formats: if cli.formats.is_empty() {
            section.formats.clone()
        } else {
            cli.formats.clone()
        },
        encoding: cli
            .encoding
            .clone()
            .or_else(|| section.encoding.clone())
            .unwrap_or_else(|| DEFAULT_ENCODING.to_string()),
        alternate_extensions: section.alternate_extensions.clone().unwrap_or_else(|| {
            DEFAULT_ALTERNATE_EXTENSIONS
                .iter()
                .map(|e| (*e).to_string())
                .collect()
        }),
        dispatch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{CheckArgs, InstrumentArgs, MergeArgs, ReportArgs};
    use tempfile::TempDir;

    fn parse(toml_src: &str) -> JarcovConfig {
        toml::from_str(toml_src).expect("config should parse")
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_config_from_path(&dir.path().join("Jarcov.toml")).unwrap().is_none());
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = TempDir::new().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert_eq!(err.name(), "ConfigError");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Jarcov.toml");
        fs::write(&path, "[check]\nmin_lines = 3\n").unwrap();

        let err = load_config_from_path(&path).unwrap_err();
        assert_eq!(err.name(), "ConfigError");
    }

    #[test]
    fn test_full_config_parses() {
        let config = parse(
            r#"
            [general]
            metadata_file = "build/cov.dat"
            verbose = true

            [instrument]
            rewriter = "jarcov-asm"
            rewriter_args = ["--quiet"]
            archive_sets = [{ base_dir = "lib" }, {}]
            jobs = 0

            [merge]
            file_name = "cobertura.ser"

            [check]
            min_line = 80
            min_branch = 60

            [report]
            formats = ["html"]
            dispatch = "first-match"
            alternate_extensions = [".kt"]
            "#,
        );
        assert_eq!(config.general.metadata_file, Some(PathBuf::from("build/cov.dat")));
        assert_eq!(config.instrument.archive_sets.len(), 2);
        assert_eq!(config.instrument.archive_sets[1].base_dir, None);
        assert_eq!(config.check.min_branch, Some(60));
    }

    #[test]
    fn test_merge_instrument_requires_rewriter() {
        let err = merge_instrument_args(&InstrumentArgs::default(), &JarcovConfig::default())
            .unwrap_err();
        assert_eq!(err.name(), "ConfigError");
    }

    #[test]
    fn test_merge_instrument_defaults() {
        let config = parse("[instrument]\nrewriter = \"rw\"\n");
        let (options, _) = merge_instrument_args(&InstrumentArgs::default(), &config).unwrap();

        assert_eq!(options.class_dirs, vec![PathBuf::from(crate::DEFAULT_CLASS_DIR)]);
        assert_eq!(options.output_dir, Some(PathBuf::from(crate::DEFAULT_INSTRUMENTED_DIR)));
        assert_eq!(options.metadata_file, PathBuf::from(crate::DEFAULT_METADATA_FILE));
        assert!(options.merge);
        assert_eq!(options.jobs, 1);
    }

    #[test]
    fn test_merge_instrument_cli_wins() {
        let config = parse(
            "[general]\nmetadata_file = \"cfg.dat\"\n[instrument]\nrewriter = \"rw\"\njobs = 4\nclass_dirs = [\"cfg/classes\"]\n",
        );
        let cli = InstrumentArgs {
            archives: vec![PathBuf::from("app.jar")],
            jobs: Some(2),
            no_merge: true,
            metadata_file: Some(PathBuf::from("cli.dat")),
            ..InstrumentArgs::default()
        };

        let (options, _) = merge_instrument_args(&cli, &config).unwrap();

        assert_eq!(options.archives, vec![PathBuf::from("app.jar")]);
        assert!(options.class_dirs.is_empty());
        assert_eq!(options.jobs, 2);
        assert!(!options.merge);
        assert_eq!(options.metadata_file, PathBuf::from("cli.dat"));
    }

    #[test]
    fn test_merge_instrument_config_values() {
        let config = parse(
            "[general]\nmetadata_file = \"cfg.dat\"\n[instrument]\nrewriter = \"rw\"\njobs = 4\nin_place = true\nmerge = false\nclass_dirs = [\"cfg/classes\"]\n",
        );
        let (options, _) = merge_instrument_args(&InstrumentArgs::default(), &config).unwrap();

        assert_eq!(options.class_dirs, vec![PathBuf::from("cfg/classes")]);
        assert_eq!(options.output_dir, None);
        assert_eq!(options.jobs, 4);
        assert!(!options.merge);
        assert_eq!(options.metadata_file, PathBuf::from("cfg.dat"));
    }

    #[test]
    fn test_merge_merge_args_defaults() {
        let settings = merge_merge_args(&MergeArgs::default(), &JarcovConfig::default());
        assert_eq!(settings.search_path, PathBuf::from("."));
        assert_eq!(settings.file_name, "coverage.dat");
        assert_eq!(settings.output, PathBuf::from(crate::DEFAULT_METADATA_FILE));
    }

    #[test]
    fn test_merge_check_args() {
        let config = parse("[check]\nmin_line = 80\nmin_branch = 50\n");
        let cli = CheckArgs {
            min_line: Some(90),
            ..CheckArgs::default()
        };
        let options = merge_check_args(&cli, &config);
        assert_eq!(options.min_line, Some(90));
        assert_eq!(options.min_branch, Some(50));
    }

    #[test]
    fn test_merge_report_args() {
        let config = parse(
            "[report]\nformats = [\"xml\"]\ndispatch = \"first-match\"\nencoding = \"ISO-8859-1\"\n",
        );
        let options = merge_report_args(&ReportArgs::default(), &config).unwrap();
        assert_eq!(options.formats, vec!["xml".to_string()]);
        assert_eq!(options.dispatch, DispatchMode::FirstMatch);
        assert_eq!(options.encoding, "ISO-8859-1");
        assert_eq!(options.source_roots, vec![PathBuf::from("src/main/java")]);
        assert_eq!(options.alternate_extensions, vec![".as".to_string(), ".mxml".to_string()]);

        let bad = parse("[report]\ndispatch = \"sometimes\"\n");
        assert_eq!(
            merge_report_args(&ReportArgs::default(), &bad).unwrap_err().name(),
            "ConfigError"
        );
    }
}
