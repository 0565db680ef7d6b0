//! Serde structs for the on-disk workbook format.
//!
//! A workbook file holds a list of sheets; each sheet is a list of rows and
//! each row a list of cells. Cells are plain values (`true`, `12`, `"Sword"`)
//! or `null` for a present-but-blank cell. A row that is `null` instead of a
//! list is physically absent; a row shorter than its neighbours simply has
//! no cells past its end.
//!
//! ```json
//! { "sheets": [ { "name": "Item", "rows": [ ["", "SerialNo"], null, [1, "Sword"] ] } ] }
//! ```

use crate::loader::{DataLoadError, deserialize_file};
use serde::{Deserialize, Serialize};
use sheetforge_core::source::{CellValue, Row, Sheet};
use std::path::Path;

// ===========================================================================
// File structs
// ===========================================================================

/// One workbook file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbookData {
    #[serde(default)]
    pub sheets: Vec<SheetData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetData {
    pub name: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub rows: Vec<RowData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowData {
    Cells(Vec<CellData>),
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellData {
    Bool(bool),
    Number(f64),
    Text(String),
    Blank,
}

// ===========================================================================
// Conversion
// ===========================================================================

impl From<CellData> for CellValue {
    fn from(cell: CellData) -> Self {
        match cell {
            CellData::Bool(b) => CellValue::Boolean(b),
            CellData::Number(v) => CellValue::Numeric(v),
            CellData::Text(s) => CellValue::Text(s),
            CellData::Blank => CellValue::Blank,
        }
    }
}

impl From<SheetData> for Sheet {
    fn from(data: SheetData) -> Self {
        let mut sheet = Sheet::new(data.name);
        sheet.hidden = data.hidden;
        for row in data.rows {
            match row {
                RowData::Cells(cells) => {
                    sheet.push_row(Row::from_values(cells.into_iter().map(CellValue::from)));
                }
                RowData::Absent => {
                    sheet.push_gap();
                }
            }
        }
        sheet
    }
}

impl WorkbookData {
    /// Convert every sheet, in file order.
    pub fn into_sheets(self) -> Vec<Sheet> {
        self.sheets.into_iter().map(Sheet::from).collect()
    }
}

/// Read one workbook file in whichever format its extension names.
pub fn load_workbook(path: &Path) -> Result<WorkbookData, DataLoadError> {
    let workbook: WorkbookData = deserialize_file(path)?;
    tracing::debug!(
        file = %path.display(),
        sheets = workbook.sheets.len(),
        "loaded workbook"
    );
    Ok(workbook)
}

// ===========================================================================
// Tests
// ===========================================================================
