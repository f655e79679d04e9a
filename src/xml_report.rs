//! Cobertura-style XML reports.
//!
//! The full report nests packages, classes and lines:
//!
//! ```xml
//! <coverage line-rate="0.75" branch-rate="0.5" ...>
//!   <sources><source>/work/src/main/java</source></sources>
//!   <packages>
//!     <package name="com.acme" line-rate="0.75" branch-rate="0.5" complexity="3">
//!       <classes>
//!         <class name="com.acme.Foo" filename="com/acme/Foo.java" ...>
//!           <lines>
//!             <line number="10" hits="5" branch="false"/>
//!           </lines>
//!         </class>
//!       </classes>
//!     </package>
//!   </packages>
//! </coverage>
//! ```
//!
//! The summary report is the root element alone.

use crate::error::Result;
use crate::report::{ClassSummary, ReportContext, ReportFormat, Renderer, ratio};
use crate::store::{ClassRecord, CoverageStore};
use std::collections::BTreeSet;
use std::fmt::Write;

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn coverage_open(context: &ReportContext<'_>, self_closing: bool) -> String {
    let store: &CoverageStore = context.store;
    format!(
        r#"<coverage line-rate="{:.4}" branch-rate="{:.4}" lines-covered="{}" lines-valid="{}" branches-covered="{}" branches-valid="{}" complexity="{}" version="{}" timestamp="{}"{}>"#,
        store.line_rate(),
        store.branch_rate(),
        store.lines_covered(),
        store.total_lines(),
        store.branches_covered(),
        store.total_branches(),
        context.total_complexity(),
        env!("CARGO_PKG_VERSION"),
        context.generated_at.timestamp_millis(),
        if self_closing { "/" } else { "" },
    )
}

fn xml_declaration(context: &ReportContext<'_>) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"{}\"?>\n",
        escape_xml(&context.encoding)
    )
}

/// Full per-line report.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlRenderer;

impl XmlRenderer {
    fn write_class(xml: &mut String, class: &ClassSummary, record: Option<&ClassRecord>) {
        let _ = writeln!(
            xml,
            r#"        <class name="{}" filename="{}" line-rate="{:.4}" branch-rate="{:.4}" complexity="{}">"#,
            escape_xml(&class.name),
            escape_xml(&class.file_name()),
            class.line_rate(),
            class.branch_rate(),
            class.stats.map_or(0, |s| s.complexity),
        );
        xml.push_str("          <lines>\n");
        if let Some(record) = record {
            let branch_lines: BTreeSet<u32> = record.branches.iter().map(|b| b.line).collect();
            for line in &record.lines {
                if branch_lines.contains(&line.line) {
                    let arms: Vec<_> = record
                        .branches
                        .iter()
                        .filter(|b| b.line == line.line)
                        .collect();
                    let taken = arms.iter().filter(|b| b.taken).count();
                    let _ = writeln!(
                        xml,
                        r#"            <line number="{}" hits="{}" branch="true" condition-coverage="{}% ({}/{})"/>"#,
                        line.line,
                        line.hits,
                        crate::check::percent(ratio(taken, arms.len())),
                        taken,
                        arms.len(),
                    );
                } else {
                    let _ = writeln!(
                        xml,
                        r#"            <line number="{}" hits="{}" branch="false"/>"#,
                        line.line, line.hits
                    );
                }
            }
        }
        xml.push_str("          </lines>\n");
        xml.push_str("        </class>\n");
    }
}

impl Renderer for XmlRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Xml
    }

    fn render(&self, context: &ReportContext<'_>) -> Result<String> {
        let mut xml = xml_declaration(context);
        xml.push_str(&coverage_open(context, false));
        xml.push('\n');

        let roots: BTreeSet<String> = context
            .classes
            .iter()
            .filter_map(|c| c.source.as_ref())
            .map(|s| s.root.display().to_string())
            .collect();
        xml.push_str("  <sources>\n");
        for root in &roots {
            let _ = writeln!(xml, "    <source>{}</source>", escape_xml(root));
        }
        xml.push_str("  </sources>\n");

        xml.push_str("  <packages>\n");
        for (package, classes) in context.packages() {
            let lines_valid: usize = classes.iter().map(|c| c.lines_valid).sum();
            let lines_covered: usize = classes.iter().map(|c| c.lines_covered).sum();
            let branches_valid: usize = classes.iter().map(|c| c.branches_valid).sum();
            let branches_covered: usize = classes.iter().map(|c| c.branches_covered).sum();
            let complexity: u32 = classes
                .iter()
                .filter_map(|c| c.stats.map(|s| s.complexity))
                .max()
                .unwrap_or(0);

            let _ = writeln!(
                xml,
                r#"    <package name="{}" line-rate="{:.4}" branch-rate="{:.4}" complexity="{}">"#,
                escape_xml(package),
                ratio(lines_covered, lines_valid),
                ratio(branches_covered, branches_valid),
                complexity,
            );
            xml.push_str("      <classes>\n");
            for class in classes {
                Self::write_class(&mut xml, class, context.store.get(&class.name));
            }
            xml.push_str("      </classes>\n");
            xml.push_str("    </package>\n");
        }
        xml.push_str("  </packages>\n");
        xml.push_str("</coverage>\n");
        Ok(xml)
    }
}

/// Totals only.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryXmlRenderer;

impl Renderer for SummaryXmlRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::SummaryXml
    }

    fn render(&self, context: &ReportContext<'_>) -> Result<String> {
        let mut xml = xml_declaration(context);
        xml.push_str(&coverage_open(context, true));
        xml.push('\n');
        Ok(xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::summarize;
    use crate::source_resolver::SourceResolver;
    use chrono::{TimeZone, Utc};

    fn sample_store() -> CoverageStore {
        let mut foo = ClassRecord::new("com.acme.Foo")
            .with_lines([10, 11])
            .with_branches([(10, 0), (10, 1)]);
        foo.lines[0].hits = 5;
        foo.branches[1].taken = true;
        [foo, ClassRecord::new("Top<T>").with_lines([1])]
            .into_iter()
            .collect()
    }

    fn render_with(renderer: &dyn Renderer, store: &CoverageStore) -> String {
        let context = ReportContext {
            store,
            classes: summarize(store, &SourceResolver::new()),
            encoding: "ISO-8859-1".to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        renderer.render(&context).unwrap()
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml(r#"<a & "b">"#), "&lt;a &amp; &quot;b&quot;&gt;");
    }

    #[test]
    fn test_full_report_structure() {
        let store = sample_store();
        let xml = render_with(&XmlRenderer, &store);

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<coverage line-rate=\"0.3333\""));
        assert!(xml.contains(r#"<package name="com.acme" line-rate="0.5000" branch-rate="0.5000" complexity="0">"#));
        assert!(xml.contains(r#"filename="com/acme/Foo.java""#));
        assert!(xml.contains(r#"<line number="10" hits="5" branch="true" condition-coverage="50% (1/2)"/>"#));
        assert!(xml.contains(r#"<line number="11" hits="0" branch="false"/>"#));
        assert!(xml.contains(r#"<class name="Top&lt;T&gt;""#));
        assert!(xml.contains(r#"timestamp="1704067200000""#));
        assert!(xml.trim_end().ends_with("</coverage>"));
    }

    #[test]
    fn test_summary_report_is_single_element() {
        let store = sample_store();
        let xml = render_with(&SummaryXmlRenderer, &store);

        assert_eq!(xml.lines().count(), 2);
        assert!(xml.contains(r#"lines-covered="1" lines-valid="3""#));
        assert!(xml.contains(r#"branches-covered="1" branches-valid="2""#));
        assert!(xml.trim_end().ends_with("/>"));
    }
}
