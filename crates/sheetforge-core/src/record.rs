//! Field-tagged binary records.
//!
//! Each data row becomes one record. For every non-deprecated field, in
//! schema declaration order:
//!
//! ```text
//! FieldId: u32 LE | Length: u32 LE | Value: Length bytes
//! ```
//!
//! Generated loaders read fields in exactly this order, so declaration order
//! is part of the format. Blank cells encode with `Length = 0`.

use crate::container::{self, ContainerError, Reader};
use crate::field_type::FieldType;
use crate::id::FieldId;
use crate::schema::{SchemaField, SchemaTemplate};
use crate::source::{CellValue, Row, TabularSource};
use crate::string_table::{StringTable, StringTableBuilder, StringTableError};
use std::str::FromStr;

// ===========================================================================
// Errors
// ===========================================================================

/// Why a cell could not be encoded, without table/row context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("'{0}' is not a valid literal")]
    Malformed(String),
    #[error("type '{0}' cannot be encoded")]
    Unsupported(String),
    #[error(transparent)]
    String(#[from] StringTableError),
}

/// Errors that abort encoding a table.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("table '{table}': field '{field}' has unsupported type '{type_name}'")]
    UnsupportedType {
        table: String,
        field: String,
        type_name: String,
    },

    #[error("table '{table}': field '{field}' is not bound to a sheet column")]
    UnboundColumn { table: String, field: String },

    #[error("table '{table}' row {row}: field '{field}' has no cell at column {column}")]
    MissingCell {
        table: String,
        row: usize,
        field: String,
        column: usize,
    },

    #[error("table '{table}' row {row}: field '{field}' ({field_type}): {source}")]
    Value {
        table: String,
        row: usize,
        field: String,
        field_type: FieldType,
        #[source]
        source: ValueError,
    },

    #[error(transparent)]
    Container(#[from] ContainerError),
}

// ===========================================================================
// Value encoding
// ===========================================================================

fn describe(cell: &CellValue) -> String {
    match cell.display_text() {
        Some(text) => text.into_owned(),
        None => String::new(),
    }
}

/// Read an integer cell or parse an integer literal from a text cell.
///
/// Numeric cells must hold a whole number inside the range of `T`.
fn integer<T>(cell: &CellValue) -> Result<T, ValueError>
where
    T: FromStr + TryFrom<i128>,
{
    match cell {
        CellValue::Numeric(v) if v.is_finite() && v.fract() == 0.0 => {
            T::try_from(*v as i128).map_err(|_| ValueError::Malformed(describe(cell)))
        }
        CellValue::Text(s) => s
            .trim()
            .parse::<T>()
            .map_err(|_| ValueError::Malformed(s.clone())),
        other => Err(ValueError::Malformed(describe(other))),
    }
}

/// Read a numeric cell or parse a floating-point literal from a text cell.
fn float<T: FromStr>(cell: &CellValue, cast: impl FnOnce(f64) -> T) -> Result<T, ValueError> {
    match cell {
        CellValue::Numeric(v) => Ok(cast(*v)),
        CellValue::Text(s) => s
            .trim()
            .parse::<T>()
            .map_err(|_| ValueError::Malformed(s.clone())),
        other => Err(ValueError::Malformed(describe(other))),
    }
}

fn boolean(cell: &CellValue) -> Result<bool, ValueError> {
    match cell {
        CellValue::Boolean(b) => Ok(*b),
        CellValue::Text(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
        CellValue::Text(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
        other => Err(ValueError::Malformed(describe(other))),
    }
}

/// The text a string or enum column registers and looks up.
///
/// Population and encoding must agree on this exactly.
pub fn cell_text(cell: &CellValue) -> Option<std::borrow::Cow<'_, str>> {
    cell.display_text()
}

/// Encode one cell's value bytes for a declared type.
pub fn encode_value(
    field_type: &FieldType,
    cell: &CellValue,
    strings: &StringTable,
) -> Result<Vec<u8>, ValueError> {
    if cell.is_blank() {
        return Ok(Vec::new());
    }
    let bytes = match field_type {
        FieldType::Int => integer::<i32>(cell)?.to_le_bytes().to_vec(),
        FieldType::UInt => integer::<u32>(cell)?.to_le_bytes().to_vec(),
        FieldType::Long => integer::<i64>(cell)?.to_le_bytes().to_vec(),
        FieldType::ULong => integer::<u64>(cell)?.to_le_bytes().to_vec(),
        FieldType::Short => integer::<i16>(cell)?.to_le_bytes().to_vec(),
        FieldType::UShort => integer::<u16>(cell)?.to_le_bytes().to_vec(),
        FieldType::Byte => vec![integer::<u8>(cell)?],
        FieldType::Float => float(cell, |v| v as f32)?.to_le_bytes().to_vec(),
        FieldType::Double => float(cell, |v| v)?.to_le_bytes().to_vec(),
        FieldType::Bool => vec![u8::from(boolean(cell)?)],
        FieldType::String => {
            let text = cell_text(cell).unwrap_or_default();
            strings.id(&text)?.0.to_le_bytes().to_vec()
        }
        FieldType::Enum(_) => cell_text(cell).unwrap_or_default().as_bytes().to_vec(),
        FieldType::Unsupported(raw) => return Err(ValueError::Unsupported(raw.clone())),
    };
    Ok(bytes)
}

// ===========================================================================
// String registration pass
// ===========================================================================

/// Register every string cell of one table on the builder.
///
/// Covers non-deprecated `string` fields of every data row. Blank and
/// missing cells are skipped; a physically absent data row is an error
/// because the encoder could not prove the table complete.
pub fn register_strings<S: TabularSource + ?Sized>(
    builder: &mut StringTableBuilder,
    schema: &SchemaTemplate,
    sheet: &S,
    first_data_row: usize,
) -> Result<(), StringTableError> {
    if schema.deprecated {
        return Ok(());
    }
    let columns: Vec<usize> = schema
        .active_fields()
        .filter(|(_, f)| f.field_type.is_string())
        .filter_map(|(_, f)| f.column_index)
        .collect();

    for index in first_data_row..sheet.row_count() {
        let row = sheet.row(index).ok_or_else(|| StringTableError::MissingRow {
            sheet: sheet.name().to_string(),
            row: index,
        })?;
        for &column in &columns {
            if let Some(text) = row.cell(column).and_then(cell_text) {
                builder.add(&text)?;
            }
        }
    }
    Ok(())
}

// ===========================================================================
// RecordEncoder
// ===========================================================================

struct BoundField<'a> {
    name: &'a str,
    field: &'a SchemaField,
    column: usize,
}

/// Encodes the rows of one table against its reconciled schema.
pub struct RecordEncoder<'a> {
    table: &'a str,
    fields: Vec<BoundField<'a>>,
    strings: &'a StringTable,
}

impl<'a> RecordEncoder<'a> {
    /// Bind the schema's active fields to their sheet columns. Fails on an
    /// unsupported type or a field with no column this run.
    pub fn new(schema: &'a SchemaTemplate, strings: &'a StringTable) -> Result<Self, EncodeError> {
        let fields = schema
            .active_fields()
            .map(|(name, field)| {
                if !field.field_type.is_supported() {
                    return Err(EncodeError::UnsupportedType {
                        table: schema.table.clone(),
                        field: name.to_string(),
                        type_name: field.field_type.to_string(),
                    });
                }
                let column = field.column_index.ok_or_else(|| EncodeError::UnboundColumn {
                    table: schema.table.clone(),
                    field: name.to_string(),
                })?;
                Ok(BoundField {
                    name,
                    field,
                    column,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            table: &schema.table,
            fields,
            strings,
        })
    }

    /// Encode one row. Every active field must have a cell.
    pub fn encode_row(&self, row_index: usize, row: &Row) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::with_capacity(self.fields.len() * 12);
        for bound in &self.fields {
            let cell = row.cell(bound.column).ok_or_else(|| EncodeError::MissingCell {
                table: self.table.to_string(),
                row: row_index,
                field: bound.name.to_string(),
                column: bound.column,
            })?;
            let value = encode_value(&bound.field.field_type, cell, self.strings).map_err(
                |source| EncodeError::Value {
                    table: self.table.to_string(),
                    row: row_index,
                    field: bound.name.to_string(),
                    field_type: bound.field.field_type.clone(),
                    source,
                },
            )?;
            out.extend_from_slice(&bound.field.id.to_le_bytes());
            out.extend_from_slice(&container::len_prefix(value.len())?);
            out.extend_from_slice(&value);
        }
        Ok(out)
    }

    /// Encode every data row of a sheet into a framed container payload.
    /// Physically absent rows are skipped.
    pub fn encode_sheet<S: TabularSource + ?Sized>(
        &self,
        sheet: &S,
        first_data_row: usize,
    ) -> Result<Vec<u8>, EncodeError> {
        let records = (first_data_row..sheet.row_count())
            .filter_map(|i| sheet.row(i).map(|row| (i, row)))
            .map(|(i, row)| self.encode_row(i, row))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(table = self.table, records = records.len(), "encoded table");
        Ok(container::encode_container(&records)?)
    }
}

/// One table to encode: its reconciled schema, its sheet and the first data
/// row index.
pub struct EncodeJob<'a, S: ?Sized> {
    pub schema: &'a SchemaTemplate,
    pub sheet: &'a S,
    pub first_data_row: usize,
}

/// Encode several tables against one frozen string table. Results are in
/// job order; with the `parallel` feature tables are encoded concurrently.
pub fn encode_tables<S>(
    jobs: &[EncodeJob<'_, S>],
    strings: &StringTable,
) -> Vec<Result<Vec<u8>, EncodeError>>
where
    S: TabularSource + Sync + ?Sized,
{
    let encode = |job: &EncodeJob<'_, S>| -> Result<Vec<u8>, EncodeError> {
        RecordEncoder::new(job.schema, strings)?.encode_sheet(job.sheet, job.first_data_row)
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        jobs.par_iter().map(encode).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        jobs.iter().map(encode).collect()
    }
}

// ===========================================================================
// Decoding
// ===========================================================================

/// One decoded `(FieldId, Value)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordField<'a> {
    pub id: FieldId,
    pub value: &'a [u8],
}

/// Split a record back into its fields.
pub fn decode_record(record: &[u8]) -> Result<Vec<RecordField<'_>>, ContainerError> {
    let mut reader = Reader::new(record);
    let mut fields = Vec::new();
    while !reader.is_empty() {
        let id = FieldId(reader.u32()?);
        let len = reader.u32()? as usize;
        fields.push(RecordField {
            id,
            value: reader.bytes(len)?,
        });
    }
    reader.finish()?;
    Ok(fields)
}

// ===========================================================================
// Tests
// ===========================================================================
