//! Table observer for run reports.
//!
//! ```rust,ignore
//! use contese::observers::table::{TableObserver, TableStyle};
//!
//! let observer = TableObserver::new().with_style(TableStyle::Markdown);
//! println!("{}", observer.render(&reports));
//! // | Run     | Entries | Total    | Elapsed |
//! // |---------|---------|----------|---------|
//! // | locked  | 10      | 10000000 | 812.4ms |
//! // | sharded | 10      | 10000000 | 95.1ms  |
//! ```

use tabled::{settings::Style, Table, Tabled};

use crate::report::RunReport;

/// Available table styles for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStyle {
    /// ASCII table with simple characters: +, -, |
    Ascii,
    /// Modern rounded corners (default)
    #[default]
    Rounded,
    /// Sharp corners with box-drawing characters
    Sharp,
    /// GitHub-flavored Markdown table
    Markdown,
    /// No borders, just spacing
    Blank,
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Run")]
    name: String,
    #[tabled(rename = "Entries")]
    entries: usize,
    #[tabled(rename = "Total")]
    total: u64,
    #[tabled(rename = "Elapsed")]
    elapsed: String,
}

impl From<&RunReport> for ReportRow {
    fn from(report: &RunReport) -> Self {
        Self {
            name: report.name.clone(),
            entries: report.entries,
            total: report.total,
            elapsed: format!("{:.1?}", report.elapsed),
        }
    }
}

/// Renders run reports as a formatted table.
#[derive(Debug, Clone, Default)]
pub struct TableObserver {
    style: TableStyle,
    title: Option<String>,
}

impl TableObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.style = style;
        self
    }

    /// Sets a title printed above the table.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    fn apply_style(&self, table: &mut Table) {
        match self.style {
            TableStyle::Ascii => {
                table.with(Style::ascii());
            }
            TableStyle::Rounded => {
                table.with(Style::rounded());
            }
            TableStyle::Sharp => {
                table.with(Style::sharp());
            }
            TableStyle::Markdown => {
                table.with(Style::markdown());
            }
            TableStyle::Blank => {
                table.with(Style::blank());
            }
        }
    }

    pub fn render<'a>(&self, reports: impl IntoIterator<Item = &'a RunReport>) -> String {
        let rows: Vec<ReportRow> = reports.into_iter().map(ReportRow::from).collect();
        let mut table = Table::new(&rows);
        self.apply_style(&mut table);

        match &self.title {
            Some(title) => format!("{}\n{}", title, table),
            None => table.to_string(),
        }
    }
}
