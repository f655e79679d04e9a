use crate::check::percent;
use crate::error::Result;
use crate::report::{ReportContext, ReportFormat, Renderer};
use prettytable::{Cell, Row, Table, format};

/// Plain-text coverage table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

fn box_format() -> format::TableFormat {
    format::FormatBuilder::new()
        .column_separator('│')
        .borders('│')
        .separators(
            &[format::LinePosition::Top],
            format::LineSeparator::new('─', '┬', '┌', '┐'),
        )
        .separators(
            &[format::LinePosition::Title],
            format::LineSeparator::new('─', '┼', '├', '┤'),
        )
        .separators(
            &[format::LinePosition::Bottom],
            format::LineSeparator::new('─', '┴', '└', '┘'),
        )
        .padding(1, 1)
        .build()
}

fn fraction(covered: usize, valid: usize, rate: f64) -> String {
    format!("{}/{} ({}%)", covered, valid, percent(rate))
}

impl Renderer for TextRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Txt
    }

    fn render(&self, context: &ReportContext<'_>) -> Result<String> {
        let store = context.store;
        let mut table = Table::new();
        table.set_format(box_format());
        table.set_titles(Row::new(vec![
            Cell::new("Class"),
            Cell::new("Lines"),
            Cell::new("Branches"),
            Cell::new("Complexity"),
            Cell::new("Source"),
        ]));

        for class in &context.classes {
            table.add_row(Row::new(vec![
                Cell::new(&class.name),
                Cell::new(&fraction(class.lines_covered, class.lines_valid, class.line_rate())),
                Cell::new(&fraction(
                    class.branches_covered,
                    class.branches_valid,
                    class.branch_rate(),
                )),
                Cell::new(&class.stats.map_or_else(|| "-".to_string(), |s| s.complexity.to_string())),
                Cell::new(&class.source.as_ref().map_or_else(
                    || "(no source available)".to_string(),
                    |s| s.relative.clone(),
                )),
            ]));
        }

        let mut out = format!(
            "Coverage report generated {}\n\n",
            context.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        out.push_str(&table.to_string());
        out.push_str(&format!(
            "\nTotal: {} classes, lines {}, branches {}\n",
            store.len(),
            fraction(store.lines_covered(), store.total_lines(), store.line_rate()),
            fraction(
                store.branches_covered(),
                store.total_branches(),
                store.branch_rate()
            ),
        ));
        Ok(out)
    }
}
