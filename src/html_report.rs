use crate::check::percent;
use crate::error::Result;
use crate::html_utils::{coverage_cell_style, render_explanation_list, render_html_doc};
use crate::report::{ClassSummary, ReportContext, ReportFormat, Renderer};
use maud::{Markup, html};

/// Coverage below this percentage is highlighted red.
const BAD_COVERAGE: u32 = 50;
/// Coverage at or above this percentage is highlighted green.
const GOOD_COVERAGE: u32 = 80;

/// Single-page HTML report.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

fn rate_cell(covered: usize, valid: usize, rate: f64) -> Markup {
    let pct = percent(rate);
    html! {
        td class="number" style=(coverage_cell_style(pct, BAD_COVERAGE, GOOD_COVERAGE)) {
            (pct) "% (" (covered) "/" (valid) ")"
        }
    }
}

fn class_row(class: &ClassSummary) -> Markup {
    html! {
        tr {
            td { (class.name) }
            (rate_cell(class.lines_covered, class.lines_valid, class.line_rate()))
            (rate_cell(class.branches_covered, class.branches_valid, class.branch_rate()))
            @match class.stats {
                Some(stats) => {
                    td class="number" { (stats.complexity) }
                    td class="number" { (stats.lines) }
                }
                None => {
                    td class="missing" { "-" }
                    td class="missing" { "-" }
                }
            }
            @match &class.source {
                Some(source) => {
                    td { (source.relative) }
                }
                None => {
                    td class="missing" { "no source available" }
                }
            }
        }
    }
}

impl Renderer for HtmlRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Html
    }

    fn render(&self, context: &ReportContext<'_>) -> Result<String> {
        let store = context.store;
        let body = html! {
            p class="totals" {
                "Line coverage: " strong { (percent(store.line_rate())) "%" }
                " (" (store.lines_covered()) "/" (store.total_lines()) ")"
                " · Branch coverage: " strong { (percent(store.branch_rate())) "%" }
                " (" (store.branches_covered()) "/" (store.total_branches()) ")"
            }
            p class="totals" {
                "Generated " (context.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            }
            @for (package, classes) in context.packages() {
                table {
                    caption {
                        @if package.is_empty() { "(default package)" } @else { (package) }
                    }
                    thead {
                        tr {
                            th { "Class" }
                            th { "Lines" }
                            th { "Branches" }
                            th { "Complexity" }
                            th { "Source lines" }
                            th { "Source file" }
                        }
                    }
                    tbody {
                        @for class in classes {
                            (class_row(class))
                        }
                    }
                }
            }
            (render_explanation_list(&[
                ("Lines", "instrumented lines executed at least once"),
                ("Branches", "branch arms taken at least once"),
                ("Complexity", "one plus the decision points found in the source file"),
                ("Source lines", "physical lines of the resolved source file"),
            ]))
        };
        Ok(render_html_doc("Coverage Report", &context.encoding, body))
    }
}
