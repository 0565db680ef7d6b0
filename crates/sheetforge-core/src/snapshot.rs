//! Schema snapshot extraction from a sheet's header rows.
//!
//! A table sheet declares its contract in two header rows: one with field
//! names and one with field types. The key column (`SerialNo`) marks where
//! the fields start; `Note` columns are free-form annotations and are never
//! part of the schema. Column 0 of the type row carries the target tag.

use crate::field_type::FieldType;
use crate::schema::{SchemaTemplate, Target};
use crate::source::{Row, TabularSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Header cell naming the primary-key column.
pub const KEY_COLUMN_NAME: &str = "SerialNo";

/// Header cell naming an annotation column that is never exported.
pub const SKIP_COLUMN_NAME: &str = "Note";

/// Errors in a sheet's header rows.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnapshotError {
    #[error("sheet '{sheet}': type row {row} is missing")]
    MissingTypeRow { sheet: String, row: usize },

    #[error("sheet '{sheet}': field '{field}' at column {column} has no type")]
    MissingType {
        sheet: String,
        field: String,
        column: usize,
    },

    #[error("sheet '{sheet}': field '{field}' appears at columns {first} and {second}")]
    DuplicateField {
        sheet: String,
        field: String,
        first: usize,
        second: usize,
    },

    #[error("sheet '{sheet}': unknown target '{tag}' (expected Server, Client or Both)")]
    InvalidTarget { sheet: String, tag: String },
}

/// Where the header rows live and where data begins. Row indices are
/// zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderLayout {
    pub name_row: usize,
    pub type_row: usize,
    /// Number of leading rows that are headers; data starts at this index.
    pub header_rows: usize,
}

impl Default for HeaderLayout {
    fn default() -> Self {
        Self {
            name_row: 1,
            type_row: 2,
            header_rows: 3,
        }
    }
}

/// The schema a sheet declares right now, before any merge with storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedSchema {
    /// Fresh template: ids 1..N in column order, version 1.
    pub schema: SchemaTemplate,
    pub skip_columns: BTreeSet<usize>,
    pub start_column: usize,
}

fn header_text(row: &Row, column: usize) -> Option<String> {
    row.cell(column)
        .and_then(|c| c.display_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Read the schema a sheet declares. Returns `Ok(None)` for sheets that have
/// no key column and therefore are not tables.
pub fn extract_snapshot<S: TabularSource + ?Sized>(
    sheet: &S,
    layout: &HeaderLayout,
) -> Result<Option<ObservedSchema>, SnapshotError> {
    let Some(name_row) = sheet.row(layout.name_row) else {
        return Ok(None);
    };

    let Some(start_column) = (0..name_row.width())
        .find(|&c| header_text(name_row, c).as_deref() == Some(KEY_COLUMN_NAME))
    else {
        return Ok(None);
    };

    let skip_columns: BTreeSet<usize> = (0..name_row.width())
        .filter(|&c| header_text(name_row, c).as_deref() == Some(SKIP_COLUMN_NAME))
        .collect();

    let type_row = sheet
        .row(layout.type_row)
        .ok_or_else(|| SnapshotError::MissingTypeRow {
            sheet: sheet.name().to_string(),
            row: layout.type_row,
        })?;

    let target = if start_column > 0 {
        let tag = header_text(type_row, 0).unwrap_or_default();
        Target::from_tag(&tag).ok_or_else(|| SnapshotError::InvalidTarget {
            sheet: sheet.name().to_string(),
            tag,
        })?
    } else {
        Target::Both
    };

    let mut schema = SchemaTemplate::new(sheet.name(), target, KEY_COLUMN_NAME);

    for column in start_column..name_row.width() {
        if skip_columns.contains(&column) {
            continue;
        }
        let Some(name) = header_text(name_row, column) else {
            continue;
        };
        if let Some(existing) = schema.fields.get(&name) {
            return Err(SnapshotError::DuplicateField {
                sheet: sheet.name().to_string(),
                field: name,
                first: existing.column_index.unwrap_or_default(),
                second: column,
            });
        }
        let type_tag = header_text(type_row, column).ok_or_else(|| SnapshotError::MissingType {
            sheet: sheet.name().to_string(),
            field: name.clone(),
            column,
        })?;
        schema.push_field(name, FieldType::from(type_tag), column);
    }

    Ok(Some(ObservedSchema {
        schema,
        skip_columns,
        start_column,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::FieldId;
    use crate::source::{CellValue, Sheet};

    fn text_row(cells: &[&str]) -> Row {
        Row::new(
            cells
                .iter()
                .map(|s| {
                    if s.is_empty() {
                        None
                    } else {
                        Some(CellValue::text(*s))
                    }
                })
                .collect(),
        )
    }

    fn item_sheet() -> Sheet {
        let mut sheet = Sheet::new("Item");
        sheet
            .push_row(text_row(&["", "", "", "Item table"]))
            .push_row(text_row(&["", "", "", "SerialNo", "Name", "Note", "Power"]))
            .push_row(text_row(&["Client", "", "", "int", "string", "", "int"]));
        sheet
    }

    #[test]
    fn extracts_fields_from_key_column_on() {
        let observed = extract_snapshot(&item_sheet(), &HeaderLayout::default())
            .unwrap()
            .unwrap();
        assert_eq!(observed.start_column, 3);
        assert_eq!(observed.skip_columns, BTreeSet::from([5]));
        let schema = observed.schema;
        assert_eq!(schema.table, "Item");
        assert_eq!(schema.target, Target::Client);
        assert_eq!(schema.primary_key, "SerialNo");
        assert_eq!(schema.version, 1);
        let fields: Vec<_> = schema
            .fields
            .iter()
            .map(|(n, f)| (n.to_string(), f.id, f.column_index))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("SerialNo".to_string(), FieldId(1), Some(3)),
                ("Name".to_string(), FieldId(2), Some(4)),
                ("Power".to_string(), FieldId(3), Some(6)),
            ]
        );
    }

    #[test]
    fn sheet_without_key_column_is_not_a_table() {
        let mut sheet = Sheet::new("Readme");
        sheet
            .push_row(text_row(&["notes"]))
            .push_row(text_row(&["Id", "Name"]))
            .push_row(text_row(&["", "int", "string"]));
        assert_eq!(
            extract_snapshot(&sheet, &HeaderLayout::default()).unwrap(),
            None
        );
    }

    #[test]
    fn missing_type_is_an_error() {
        let mut sheet = Sheet::new("Item");
        sheet
            .push_row(text_row(&[""]))
            .push_row(text_row(&["", "SerialNo", "Name"]))
            .push_row(text_row(&["Server", "int"]));
        assert!(matches!(
            extract_snapshot(&sheet, &HeaderLayout::default()),
            Err(SnapshotError::MissingType { ref field, column: 2, .. }) if field == "Name"
        ));
    }

    #[test]
    fn duplicate_field_is_an_error() {
        let mut sheet = Sheet::new("Item");
        sheet
            .push_row(text_row(&[""]))
            .push_row(text_row(&["", "SerialNo", "Name", "Name"]))
            .push_row(text_row(&["", "int", "string", "string"]));
        assert!(matches!(
            extract_snapshot(&sheet, &HeaderLayout::default()),
            Err(SnapshotError::DuplicateField {
                first: 2,
                second: 3,
                ..
            })
        ));
    }

    #[test]
    fn unknown_target_is_an_error() {
        let mut sheet = Sheet::new("Item");
        sheet
            .push_row(text_row(&[""]))
            .push_row(text_row(&["", "SerialNo"]))
            .push_row(text_row(&["Nobody", "int"]));
        assert!(matches!(
            extract_snapshot(&sheet, &HeaderLayout::default()),
            Err(SnapshotError::InvalidTarget { ref tag, .. }) if tag == "Nobody"
        ));
    }

    #[test]
    fn key_in_first_column_defaults_target() {
        let mut sheet = Sheet::new("Item");
        sheet
            .push_row(text_row(&[""]))
            .push_row(text_row(&["SerialNo", "Name"]))
            .push_row(text_row(&["int", "string"]));
        let observed = extract_snapshot(&sheet, &HeaderLayout::default())
            .unwrap()
            .unwrap();
        assert_eq!(observed.schema.target, Target::Both);
        assert_eq!(observed.start_column, 0);
        assert_eq!(observed.schema.fields.len(), 2);
    }

    #[test]
    fn columns_with_blank_names_are_ignored() {
        let mut sheet = Sheet::new("Item");
        sheet
            .push_row(text_row(&[""]))
            .push_row(text_row(&["", "SerialNo", "", "Power"]))
            .push_row(text_row(&["", "int", "float", "int"]));
        let observed = extract_snapshot(&sheet, &HeaderLayout::default())
            .unwrap()
            .unwrap();
        let names: Vec<_> = observed.schema.fields.names().collect();
        assert_eq!(names, vec!["SerialNo", "Power"]);
    }
}
