use maud::{DOCTYPE, Markup, PreEscaped, html};

const CSS_STYLES: &str = r#"
body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif;
    margin: 0;
    background-color: #f6f7f9;
    color: #222;
    padding: 20px;
}
h1, h2 {
    text-align: center;
}
.totals {
    text-align: center;
    font-size: 1.1em;
}
table {
    width: 90%;
    margin: 20px auto;
    border-collapse: collapse;
    background-color: white;
    box-shadow: 0 2px 12px rgba(0,0,0,0.08);
}
th, td {
    border: 1px solid #ddd;
    padding: 8px 10px;
    text-align: left;
}
th {
    background-color: #2f6f4f;
    color: white;
}
tr:nth-child(even) {
    background-color: #fafafa;
}
td.number {
    text-align: right;
    font-variant-numeric: tabular-nums;
}
td.missing {
    color: #999;
    font-style: italic;
}
"#;

/// Renders a full HTML document declaring `charset` as its encoding.
pub fn render_html_doc(title_text: &str, charset: &str, body_content: Markup) -> String {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset=(charset);
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title_text) }
                style { (PreEscaped(CSS_STYLES)) }
            }
            body {
                h1 { (title_text) }
                (body_content)
            }
        }
    }
    .into_string()
}

/// Background colour for a coverage percentage: red below `bad`, yellow
/// below `good`, green otherwise.
pub fn coverage_cell_style(percent: u32, bad: u32, good: u32) -> String {
    let hue = if percent < bad {
        0
    } else if percent < good {
        60
    } else {
        120
    };
    format!("background-color: hsl({}, 100%, 85%);", hue)
}

/// Renders a definition list of column explanations.
pub fn render_explanation_list(explanations: &[(&str, &str)]) -> Markup {
    html! {
        h2 { "Columns" }
        ul {
            @for (column, explanation) in explanations {
                li {
                    strong { (column) ": " } (explanation)
                }
            }
        }
    }
}
