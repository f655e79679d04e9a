use crate::config::{
    JarcovConfig, merge_check_args, merge_instrument_args, merge_merge_args, merge_report_args,
};
use crate::error::Result;
use crate::merge::{MergeOutcome, aggregate};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Coverage instrumentation, merging, checking and reporting for JVM class files.
#[derive(Parser, Debug, Clone)]
#[command(name = "jarcov", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file. Defaults to Jarcov.toml, .jarcov.toml or
    /// jarcov.toml in the current directory or a parent.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Rewrite class files in archives and class directories to record coverage.
    Instrument(InstrumentArgs),
    /// Merge every metadata file found under a directory into one.
    Merge(MergeArgs),
    /// Fail if line or branch coverage is below a minimum.
    Check(CheckArgs),
    /// Render coverage reports.
    Report(ReportArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct InstrumentArgs {
    /// Program implementing the class rewriter protocol.
    #[arg(long)]
    pub rewriter: Option<PathBuf>,

    /// Argument passed to the rewriter program. Repeatable.
    #[arg(long = "rewriter-arg", allow_hyphen_values = true)]
    pub rewriter_args: Vec<String>,

    /// Archive (jar, war, ear, zip) to instrument in place. Repeatable.
    #[arg(long = "archive")]
    pub archives: Vec<PathBuf>,

    /// Directory scanned recursively for archives. Repeatable.
    #[arg(long = "archive-set")]
    pub archive_sets: Vec<PathBuf>,

    /// Directory of compiled classes. Repeatable.
    #[arg(long = "classes")]
    pub class_dirs: Vec<PathBuf>,

    /// Where instrumented class directories are written.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Rewrite class directories in place.
    #[arg(long, conflicts_with = "output_dir")]
    pub in_place: bool,

    /// Coverage metadata file.
    #[arg(long)]
    pub metadata_file: Option<PathBuf>,

    /// Replace the metadata file instead of merging into it.
    #[arg(long)]
    pub no_merge: bool,

    /// Keep directory entries when rebuilding archives.
    #[arg(long)]
    pub keep_directory_entries: bool,

    /// Worker threads; 0 uses one per CPU.
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct MergeArgs {
    /// Directory searched recursively for metadata files.
    #[arg(long)]
    pub search_path: Option<PathBuf>,

    /// Name of the metadata files to merge.
    #[arg(long)]
    pub file_name: Option<String>,

    /// Where the merged metadata is written.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CheckArgs {
    /// Coverage metadata file.
    #[arg(long)]
    pub metadata_file: Option<PathBuf>,

    /// Additional metadata file merged in before checking. Repeatable.
    #[arg(long = "data-file")]
    pub data_files: Vec<PathBuf>,

    /// Minimum line coverage in percent.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub min_line: Option<u8>,

    /// Minimum branch coverage in percent.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub min_branch: Option<u8>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ReportArgs {
    /// Coverage metadata file.
    #[arg(long)]
    pub metadata_file: Option<PathBuf>,

    /// Source directory used to resolve classes. Repeatable, first match wins.
    #[arg(long = "source-root")]
    pub source_roots: Vec<PathBuf>,

    /// Report directory.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Report format: html, xml, summaryXml or txt. Repeatable.
    #[arg(long = "format", value_delimiter = ',')]
    pub formats: Vec<String>,

    /// Source encoding declared in HTML reports.
    #[arg(long)]
    pub encoding: Option<String>,

    /// `all` renders every requested format, `first-match` only the first of
    /// html, xml, summaryXml.
    #[arg(long)]
    pub dispatch: Option<String>,
}

/// Runs the selected command with `config` filling in unset options.
///
/// # Errors
/// Returns the command's error; the caller decides the exit code.
pub fn run(cli: &Cli, config: &JarcovConfig) -> Result<()> {
    match &cli.command {
        Commands::Instrument(args) => {
            let (options, rewriter) = merge_instrument_args(args, config)?;
            tracing::debug!(?options, "Instrument options");
            crate::instrument::run(&options, &rewriter)?;
        }
        Commands::Merge(args) => {
            let settings = merge_merge_args(args, config);
            match aggregate(&settings.search_path, &settings.file_name, &settings.output)? {
                MergeOutcome::NothingToMerge => {}
                MergeOutcome::Merged { files, classes } => {
                    println!(
                        "Merged {} metadata files ({} classes) into {}",
                        files,
                        classes,
                        settings.output.display()
                    );
                }
            }
        }
        Commands::Check(args) => {
            let options = merge_check_args(args, config);
            if let crate::check::CheckOutcome::Passed { line, branch } =
                crate::check::run(&options)?
            {
                println!("Coverage OK: line {}%, branch {}%", line, branch);
            }
        }
        Commands::Report(args) => {
            let options = merge_report_args(args, config)?;
            for path in crate::report::run(&options)? {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}
