//! Tabular data source abstraction.
//!
//! The pipeline never reads spreadsheet files itself. Anything that can
//! present sheets of typed cells implements [`TabularSource`]; the in-memory
//! [`Sheet`] is the implementation the rest of the workspace uses.

use std::borrow::Cow;

/// A typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Numeric(f64),
    Text(String),
    Boolean(bool),
    /// The cell exists but holds nothing.
    Blank,
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Blank)
    }

    /// The cell rendered as text, the way a sheet would display it.
    /// Whole numbers drop their fractional part. Blank cells have no text.
    pub fn display_text(&self) -> Option<Cow<'_, str>> {
        match self {
            CellValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            CellValue::Numeric(v) => Some(Cow::Owned(format_number(*v))),
            CellValue::Boolean(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            CellValue::Blank => None,
        }
    }
}

fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// One sheet row. `None` entries are cells that do not exist at all, which
/// is distinct from a present-but-blank cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub cells: Vec<Option<CellValue>>,
}

impl Row {
    pub fn new(cells: Vec<Option<CellValue>>) -> Self {
        Self { cells }
    }

    /// Build a row where every value is a present cell.
    pub fn from_values(values: impl IntoIterator<Item = CellValue>) -> Self {
        Self {
            cells: values.into_iter().map(Some).collect(),
        }
    }

    pub fn cell(&self, column: usize) -> Option<&CellValue> {
        self.cells.get(column).and_then(Option::as_ref)
    }

    /// One past the last column index this row has storage for.
    pub fn width(&self) -> usize {
        self.cells.len()
    }
}

/// Read access to a single named sheet.
pub trait TabularSource {
    fn name(&self) -> &str;

    fn is_hidden(&self) -> bool;

    /// One past the last row index.
    fn row_count(&self) -> usize;

    /// The row at `index`, or `None` when that row is physically absent.
    fn row(&self, index: usize) -> Option<&Row>;

    /// Number of rows that exist.
    fn physical_row_count(&self) -> usize {
        (0..self.row_count()).filter(|&i| self.row(i).is_some()).count()
    }

    fn cell(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.row(row).and_then(|r| r.cell(column))
    }
}

/// An in-memory sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub hidden: bool,
    pub rows: Vec<Option<Row>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Row) -> &mut Self {
        self.rows.push(Some(row));
        self
    }

    /// Append a physically absent row.
    pub fn push_gap(&mut self) -> &mut Self {
        self.rows.push(None);
        self
    }
}

impl TabularSource for Sheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index).and_then(Option::as_ref)
    }
}
