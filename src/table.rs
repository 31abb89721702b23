//! Plain-text, CSV and HTML table rendering for command output.
use clap::ValueEnum;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned columns with a dashed rule under the header
    #[default]
    Simple,
    Csv,
    Html,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Text(String),
    Int(usize),
    Float(f64),
    Bool(bool),
}

impl Cell {
    fn is_numeric(&self) -> bool {
        matches!(self, Cell::Int(_) | Cell::Float(_))
    }

    fn render(&self, precision: usize) -> String {
        match self {
            Cell::Text(text) => text.clone(),
            Cell::Int(value) => value.to_string(),
            Cell::Float(value) => format!("{value:.precision$}"),
            Cell::Bool(value) => (if *value { "True" } else { "False" }).to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(text: &str) -> Self {
        Cell::Text(text.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
    precision: usize,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|header| header.to_string()).collect(),
            rows: Vec::new(),
            precision: 0,
        }
    }

    /// Digits after the decimal point for float cells.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Simple => self.render_simple(),
            OutputFormat::Csv => self.render_csv(),
            OutputFormat::Html => self.render_html(),
        }
    }

    fn rendered_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.render(self.precision)).collect())
            .collect()
    }

    fn render_simple(&self) -> String {
        let rendered = self.rendered_rows();
        let columns = self.headers.len();
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &rendered {
            for (idx, text) in row.iter().enumerate().take(columns) {
                widths[idx] = widths[idx].max(text.chars().count());
            }
        }
        // A column is right-aligned when it holds numbers only.
        let numeric: Vec<bool> = (0..columns)
            .map(|idx| {
                !self.rows.is_empty()
                    && self
                        .rows
                        .iter()
                        .all(|row| row.get(idx).is_some_and(Cell::is_numeric))
            })
            .collect();

        let format_line = |cells: &[String]| {
            let padded: Vec<String> = (0..columns)
                .map(|idx| {
                    let text = cells.get(idx).map(String::as_str).unwrap_or("");
                    let width = widths[idx];
                    if numeric[idx] {
                        format!("{text:>width$}")
                    } else {
                        format!("{text:<width$}")
                    }
                })
                .collect();
            padded.join("  ").trim_end().to_string()
        };

        let mut out = String::new();
        out.push_str(&format_line(&self.headers));
        out.push('\n');
        let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
        out.push_str(&rule.join("  "));
        out.push('\n');
        for row in &rendered {
            out.push_str(&format_line(row));
            out.push('\n');
        }
        out
    }

    fn render_csv(&self) -> String {
        let mut out = String::new();
        let mut push_record = |fields: &[String]| {
            let escaped: Vec<String> = fields.iter().map(String::as_str).map(csv_field).collect();
            out.push_str(&escaped.join(","));
            out.push_str("\r\n");
        };
        push_record(&self.headers);
        for row in self.rendered_rows() {
            push_record(&row);
        }
        out
    }

    fn render_html(&self) -> String {
        let mut out = String::from("<table>\n<thead>\n<tr>");
        for header in &self.headers {
            out.push_str(&format!("<th>{}</th>", html_escape(header)));
        }
        out.push_str("</tr>\n</thead>\n<tbody>\n");
        for row in self.rendered_rows() {
            out.push_str("<tr>");
            for text in row {
                out.push_str(&format!("<td>{}</td>", html_escape(&text)));
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</tbody>\n</table>\n");
        out
    }
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
