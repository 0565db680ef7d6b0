//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::key::EncryptionKey;
use crate::snapshot::{HeaderLayout, KEY_COLUMN_NAME, ObservedSchema, extract_snapshot};
use crate::source::{CellValue, Row, Sheet};
use crate::string_table::{StringTable, StringTableBuilder};

// ===========================================================================
// Rows
// ===========================================================================

/// A row of text cells; empty strings become missing cells.
pub fn text_row(cells: &[&str]) -> Row {
    Row::new(
        cells
            .iter()
            .map(|s| (!s.is_empty()).then(|| CellValue::text(*s)))
            .collect(),
    )
}

pub fn num(v: f64) -> CellValue {
    CellValue::Numeric(v)
}

pub fn text(s: &str) -> CellValue {
    CellValue::text(s)
}

// ===========================================================================
// Sheets
// ===========================================================================

/// A table sheet in the default header layout: a title row, a name row and
/// a type row, then `data`. The target tag sits in column 0 and the fields
/// start at column 1.
pub fn table_sheet(name: &str, target: &str, columns: &[(&str, &str)], data: Vec<Row>) -> Sheet {
    let mut names = vec![String::new()];
    let mut types = vec![target.to_string()];
    for (field, ty) in columns {
        names.push(field.to_string());
        types.push(ty.to_string());
    }
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let types: Vec<&str> = types.iter().map(String::as_str).collect();

    let mut sheet = Sheet::new(name);
    sheet
        .push_row(text_row(&[name]))
        .push_row(text_row(&names))
        .push_row(text_row(&types));
    for row in data {
        sheet.push_row(row);
    }
    sheet
}

/// Prefix a data row with the empty target column.
pub fn data_row(values: impl IntoIterator<Item = CellValue>) -> Row {
    let mut cells = vec![None];
    cells.extend(values.into_iter().map(Some));
    Row::new(cells)
}

/// The `Item` table: SerialNo, Name and Power.
pub fn item_sheet() -> Sheet {
    table_sheet(
        "Item",
        "Both",
        &[(KEY_COLUMN_NAME, "int"), ("Name", "string"), ("Power", "int")],
        vec![
            data_row([num(1.0), text("Sword"), num(10.0)]),
            data_row([num(2.0), text("Shield"), num(4.0)]),
            data_row([num(3.0), text("Sword"), CellValue::Blank]),
        ],
    )
}

/// The `Item` table after a `Rarity` column was appended.
pub fn item_sheet_with_rarity() -> Sheet {
    table_sheet(
        "Item",
        "Both",
        &[
            (KEY_COLUMN_NAME, "int"),
            ("Name", "string"),
            ("Power", "int"),
            ("Rarity", "e.Rarity"),
        ],
        vec![
            data_row([num(1.0), text("Sword"), num(10.0), text("Common")]),
            data_row([num(2.0), text("Shield"), num(4.0), text("Rare")]),
        ],
    )
}

/// Extract the snapshot of a sheet that is known to be a table.
pub fn observe(sheet: &Sheet) -> ObservedSchema {
    match extract_snapshot(sheet, &HeaderLayout::default()) {
        Ok(Some(observed)) => observed,
        other => panic!("sheet '{}' is not a table: {other:?}", sheet.name),
    }
}

// ===========================================================================
// String tables and keys
// ===========================================================================

pub fn string_table(values: &[&str]) -> StringTable {
    let mut builder = StringTableBuilder::new();
    for v in values {
        if let Err(e) = builder.add(v) {
            panic!("string table helper: {e}");
        }
    }
    builder.build()
}

pub fn test_key() -> EncryptionKey {
    EncryptionKey::from_bytes([0x42; 32])
}
