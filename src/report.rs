//! Report generation.
//!
//! Loads the merged coverage store, maps every class back to its source file,
//! derives a small structure summary from that file, and hands the result to
//! the renderers selected by format name and [`DispatchMode`].

use crate::error::{JarcovError, Result};
use crate::html_report::HtmlRenderer;
use crate::source_resolver::{
    DEFAULT_ALTERNATE_EXTENSIONS, SourceLocation, SourceResolver, resolver_for_roots,
};
use crate::store::{ClassRecord, CoverageStore};
use crate::text_report::TextRenderer;
use crate::xml_report::{SummaryXmlRenderer, XmlRenderer};
use chrono::{DateTime, Utc};
use encoding_rs::Encoding;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Source encoding assumed when none is configured.
pub const DEFAULT_ENCODING: &str = "UTF-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReportFormat {
    Html,
    Xml,
    SummaryXml,
    Txt,
}

impl ReportFormat {
    /// Render order when every requested format is produced.
    pub const DISPATCH_ORDER: [ReportFormat; 4] = [
        ReportFormat::Html,
        ReportFormat::Xml,
        ReportFormat::SummaryXml,
        ReportFormat::Txt,
    ];

    /// Formats produced when none are requested.
    pub const DEFAULTS: [ReportFormat; 3] =
        [ReportFormat::Txt, ReportFormat::Xml, ReportFormat::Html];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Xml => "xml",
            ReportFormat::SummaryXml => "summaryXml",
            ReportFormat::Txt => "txt",
        }
    }

    /// Name of the file the format is written to inside the report directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            ReportFormat::Html => "index.html",
            ReportFormat::Xml => "coverage.xml",
            ReportFormat::SummaryXml => "coverage-summary.xml",
            ReportFormat::Txt => "coverage.txt",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = JarcovError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(ReportFormat::Html),
            "xml" => Ok(ReportFormat::Xml),
            "summaryxml" | "summary-xml" => Ok(ReportFormat::SummaryXml),
            "txt" | "text" => Ok(ReportFormat::Txt),
            _ => Err(JarcovError::config_error(format!(
                "Unknown report format '{}'. Expected one of: html, xml, summaryXml, txt",
                s
            ))),
        }
    }
}

/// How requested formats turn into rendered reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Render every requested format.
    #[default]
    All,
    /// Render only the first requested format in the order html, xml,
    /// summaryXml. A request for txt alone renders nothing.
    FirstMatch,
}

impl FromStr for DispatchMode {
    type Err = JarcovError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(DispatchMode::All),
            "first-match" | "first_match" | "firstmatch" => Ok(DispatchMode::FirstMatch),
            _ => Err(JarcovError::config_error(format!(
                "Unknown dispatch mode '{}'. Expected 'all' or 'first-match'",
                s
            ))),
        }
    }
}

/// Parses format names, falling back to [`ReportFormat::DEFAULTS`] when
/// `names` is empty.
///
/// # Errors
/// Returns [`JarcovError::ConfigError`] for an unknown name.
pub fn parse_formats(names: &[String]) -> Result<Vec<ReportFormat>> {
    if names.is_empty() {
        return Ok(ReportFormat::DEFAULTS.to_vec());
    }
    names.iter().map(|n| n.parse()).collect()
}

/// Chooses the formats to render, in render order.
#[must_use]
pub fn select_formats(requested: &[ReportFormat], mode: DispatchMode) -> Vec<ReportFormat> {
    match mode {
        DispatchMode::All => ReportFormat::DISPATCH_ORDER
            .into_iter()
            .filter(|f| requested.contains(f))
            .collect(),
        DispatchMode::FirstMatch => [ReportFormat::Html, ReportFormat::Xml, ReportFormat::SummaryXml]
            .into_iter()
            .find(|f| requested.contains(f))
            .into_iter()
            .collect(),
    }
}

/// Structure facts derived from a resolved source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStats {
    pub lines: usize,
    /// One plus the number of decision points.
    pub complexity: u32,
}

/// Per-class view handed to renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSummary {
    pub name: String,
    pub package: String,
    pub source: Option<SourceLocation>,
    pub stats: Option<SourceStats>,
    pub lines_valid: usize,
    pub lines_covered: usize,
    pub branches_valid: usize,
    pub branches_covered: usize,
}

impl ClassSummary {
    #[must_use]
    pub fn line_rate(&self) -> f64 {
        ratio(self.lines_covered, self.lines_valid)
    }

    #[must_use]
    pub fn branch_rate(&self) -> f64 {
        ratio(self.branches_covered, self.branches_valid)
    }

    /// Source path relative to its root, or the derived name when unresolved.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.source.as_ref().map_or_else(
            || crate::source_resolver::canonical_file_name(&self.name, ".java"),
            |s| s.relative.clone(),
        )
    }
}

pub(crate) fn ratio(covered: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        covered as f64 / total as f64
    }
}

/// Everything a renderer sees.
#[derive(Debug, Clone)]
pub struct ReportContext<'a> {
    pub store: &'a CoverageStore,
    pub classes: Vec<ClassSummary>,
    pub encoding: String,
    pub generated_at: DateTime<Utc>,
}

impl ReportContext<'_> {
    /// Classes grouped by package, both in name order.
    #[must_use]
    pub fn packages(&self) -> Vec<(&str, Vec<&ClassSummary>)> {
        let mut packages: BTreeMap<&str, Vec<&ClassSummary>> = BTreeMap::new();
        for class in &self.classes {
            packages.entry(class.package.as_str()).or_default().push(class);
        }
        packages.into_iter().collect()
    }

    /// Sum of the complexity estimates of every resolved source file.
    #[must_use]
    pub fn total_complexity(&self) -> u32 {
        let mut seen: HashMap<PathBuf, u32> = HashMap::new();
        for class in &self.classes {
            if let (Some(source), Some(stats)) = (&class.source, class.stats) {
                seen.insert(source.path(), stats.complexity);
            }
        }
        seen.values().sum()
    }
}

/// Produces one report document.
pub trait Renderer {
    fn format(&self) -> ReportFormat;

    /// Renders the report document.
    ///
    /// # Errors
    /// Returns an error if the document cannot be produced.
    fn render(&self, context: &ReportContext<'_>) -> Result<String>;
}

#[must_use]
pub fn renderer_for(format: ReportFormat) -> Box<dyn Renderer> {
    match format {
        ReportFormat::Html => Box::new(HtmlRenderer),
        ReportFormat::Xml => Box::new(XmlRenderer),
        ReportFormat::SummaryXml => Box::new(SummaryXmlRenderer),
        ReportFormat::Txt => Box::new(TextRenderer),
    }
}

/// Words and operators counted as decision points.
const DECISION_KEYWORDS: &[&str] = &["if", "for", "while", "case", "catch"];
const DECISION_OPERATORS: &[&str] = &["&&", "||", "?"];

/// Estimates cyclomatic complexity and counts lines of a source text.
///
/// Line comments are ignored. This is a token count, not a parse.
#[must_use]
pub fn source_stats(text: &str) -> SourceStats {
    let mut decisions = 0u32;
    let mut lines = 0usize;
    for line in text.lines() {
        lines += 1;
        let code = line.split("//").next().unwrap_or("");
        decisions += code
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|word| DECISION_KEYWORDS.contains(word))
            .count() as u32;
        decisions += DECISION_OPERATORS
            .iter()
            .map(|op| code.matches(op).count() as u32)
            .sum::<u32>();
    }
    SourceStats {
        lines,
        complexity: 1 + decisions,
    }
}

/// Builds the per-class summaries, reading each resolved source file once.
#[must_use]
pub fn summarize(store: &CoverageStore, resolver: &SourceResolver) -> Vec<ClassSummary> {
    let mut stats_cache: HashMap<PathBuf, Option<SourceStats>> = HashMap::new();
    store
        .classes()
        .map(|record| summarize_class(record, resolver, &mut stats_cache))
        .collect()
}

fn summarize_class(
    record: &ClassRecord,
    resolver: &SourceResolver,
    cache: &mut HashMap<PathBuf, Option<SourceStats>>,
) -> ClassSummary {
    let source = resolver.resolve_record(record);
    if source.is_none() {
        tracing::debug!(class = %record.name, "No source available");
    }
    let stats = source.as_ref().and_then(|location| {
        let path = location.path();
        *cache.entry(path.clone()).or_insert_with(|| match fs::read(&path) {
            Ok(bytes) => Some(source_stats(&String::from_utf8_lossy(&bytes))),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read source file");
                None
            }
        })
    });

    ClassSummary {
        name: record.name.clone(),
        package: record.package_name().to_string(),
        source,
        stats,
        lines_valid: record.lines.len(),
        lines_covered: record.lines_covered(),
        branches_valid: record.branches.len(),
        branches_covered: record.branches_covered(),
    }
}

/// Looks up the character set reports are written in.
///
/// Only encodings that can hold the ASCII markup of every format are
/// accepted, so UTF-16 and the replacement encoding are refused.
///
/// # Errors
/// Returns [`JarcovError::ConfigError`] for an unknown or unusable label.
pub fn output_encoding(label: &str) -> Result<&'static Encoding> {
    let label = label.trim();
    let label = if label.is_empty() { DEFAULT_ENCODING } else { label };
    match Encoding::for_label(label.as_bytes()) {
        Some(encoding) if encoding.output_encoding() == encoding => Ok(encoding),
        Some(_) => Err(JarcovError::config_error(format!(
            "Encoding '{}' cannot be used for reports",
            label
        ))),
        None => Err(JarcovError::config_error(format!(
            "Unknown encoding '{}'",
            label
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    pub metadata_file: PathBuf,
    pub source_roots: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// Format names; empty means [`ReportFormat::DEFAULTS`].
    pub formats: Vec<String>,
    pub encoding: String,
    /// Source extensions tried, in order, when the `.java` file is missing.
    pub alternate_extensions: Vec<String>,
    pub dispatch: DispatchMode,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            metadata_file: PathBuf::from(crate::DEFAULT_METADATA_FILE),
            source_roots: vec![PathBuf::from("src/main/java")],
            output_dir: PathBuf::from(crate::DEFAULT_REPORT_DIR),
            formats: Vec::new(),
            encoding: DEFAULT_ENCODING.to_string(),
            alternate_extensions: DEFAULT_ALTERNATE_EXTENSIONS
                .iter()
                .map(|e| (*e).to_string())
                .collect(),
            dispatch: DispatchMode::All,
        }
    }
}

/// Renders the selected reports and returns the files written.
///
/// A missing metadata file produces no reports and a warning.
///
/// # Errors
/// Returns [`JarcovError::ConfigError`] for an unknown format or encoding
/// (before any output is written), and load, render or write failures.
#[tracing::instrument(level = "debug", skip_all, fields(metadata = %options.metadata_file.display()))]
pub fn run(options: &ReportOptions) -> Result<Vec<PathBuf>> {
    let requested = parse_formats(&options.formats)?;
    output_encoding(&options.encoding)?;
    let selected = select_formats(&requested, options.dispatch);
    if selected.is_empty() {
        tracing::warn!(
            requested = ?requested,
            "No report format selected for dispatch mode {:?}",
            options.dispatch
        );
        return Ok(Vec::new());
    }

    let Some(store) = CoverageStore::load(&options.metadata_file)? else {
        tracing::warn!(
            "No coverage data found at {}, no report generated",
            options.metadata_file.display()
        );
        return Ok(Vec::new());
    };

    let resolver = resolver_for_roots(&options.source_roots)
        .with_alternate_extensions(options.alternate_extensions.iter().cloned());
    let encoding = if options.encoding.trim().is_empty() {
        DEFAULT_ENCODING.to_string()
    } else {
        options.encoding.clone()
    };
    let context = ReportContext {
        store: &store,
        classes: summarize(&store, &resolver),
        encoding,
        generated_at: Utc::now(),
    };

    render_all(&context, &selected, &options.output_dir)
}

/// Renders `formats` in order into `output_dir`, encoding every document
/// in `context.encoding`.
///
/// # Errors
/// Returns an error if the encoding is unusable, the directory cannot be
/// created or a report fails.
pub fn render_all(
    context: &ReportContext<'_>,
    formats: &[ReportFormat],
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let encoding = output_encoding(&context.encoding)?;
    fs::create_dir_all(output_dir).map_err(|e| {
        JarcovError::io_error_with_source("create report directory", output_dir.to_path_buf(), e)
    })?;

    let mut written = Vec::with_capacity(formats.len());
    for format in formats {
        let renderer = renderer_for(*format);
        let document = renderer.render(context)?;
        let path = output_dir.join(renderer.format().file_name());
        let (bytes, _, unmappable) = encoding.encode(&document);
        if unmappable {
            tracing::warn!(
                format = %renderer.format(),
                "Characters not representable in {} were written as character references",
                encoding.name()
            );
        }
        fs::write(&path, bytes)
            .map_err(|e| JarcovError::io_error_with_source("write report", path.clone(), e))?;
        tracing::info!(format = %renderer.format(), "Report written to {}", path.display());
        written.push(path);
    }
    Ok(written)
}
