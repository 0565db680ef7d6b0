//! Workspace fixtures shared by the end-to-end tests.

#![allow(dead_code)]

use serde_json::{Value, json};
use sheetforge_core::artifact::open;
use sheetforge_core::container::{decode_container, decode_string_table};
use sheetforge_core::key::{EncryptionKey, KeySource};
use sheetforge_core::string_table::StringTable;
use sheetforge_data::PipelineConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Input, output and schema directories under one temp root.
pub struct Workspace {
    pub root: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("tables")).unwrap();
        Self { root }
    }

    pub fn input(&self) -> PathBuf {
        self.root.path().join("tables")
    }

    pub fn output(&self) -> PathBuf {
        self.root.path().join("out")
    }

    pub fn schemas(&self) -> PathBuf {
        self.root.path().join("schemas")
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            input_dir: self.input(),
            output_dir: self.output(),
            schema_dir: self.schemas(),
            revision: 7,
            key: KeySource::Development,
            ..PipelineConfig::default()
        }
    }

    /// Write a workbook file holding `sheets`.
    pub fn write_workbook(&self, file_name: &str, sheets: Vec<Value>) {
        let workbook = json!({ "sheets": sheets });
        fs::write(
            self.input().join(file_name),
            serde_json::to_string_pretty(&workbook).unwrap(),
        )
        .unwrap();
    }

    pub fn remove_workbook(&self, file_name: &str) {
        fs::remove_file(self.input().join(file_name)).unwrap();
    }

    pub fn schema_json(&self, table: &str) -> Value {
        let text = fs::read_to_string(self.schema_path(table)).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    pub fn schema_path(&self, table: &str) -> PathBuf {
        self.schemas().join(format!("{table}.Schema.json"))
    }

    pub fn artifact(&self, file_name: &str) -> Vec<u8> {
        fs::read(self.output().join(file_name)).unwrap()
    }

    pub fn manifest(&self) -> Value {
        let text = fs::read_to_string(self.output().join("Manifest.json")).unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

/// A sheet in the default layout: title row, name row, type row, data.
/// The target tag is in column 0 and fields start at column 1.
pub fn table(name: &str, target: &str, columns: &[(&str, &str)], data: Vec<Value>) -> Value {
    let mut names = vec![json!("")];
    let mut types = vec![json!(target)];
    for (field, ty) in columns {
        names.push(json!(field));
        types.push(json!(ty));
    }
    let mut rows = vec![json!([name]), Value::Array(names), Value::Array(types)];
    rows.extend(data.into_iter().map(|row| match row {
        Value::Array(mut cells) => {
            cells.insert(0, json!(""));
            Value::Array(cells)
        }
        other => other,
    }));
    json!({ "name": name, "rows": rows })
}

pub fn item_columns() -> Vec<(&'static str, &'static str)> {
    vec![("SerialNo", "int"), ("Name", "string"), ("Power", "int")]
}

pub fn item_table() -> Value {
    table(
        "Item",
        "Both",
        &item_columns(),
        vec![
            json!([1, "Sword", 10]),
            json!([2, "Shield", 4]),
            json!([3, "Sword", null]),
        ],
    )
}

// ---------------------------------------------------------------------------
// Consumer side
// ---------------------------------------------------------------------------

pub fn dev_key() -> EncryptionKey {
    EncryptionKey::development()
}

pub fn open_string_table(bytes: &[u8]) -> StringTable {
    decode_string_table(&open(bytes, &dev_key()).unwrap()).unwrap()
}

/// Decrypt a table artifact into its raw records.
pub fn open_records(bytes: &[u8]) -> Vec<Vec<u8>> {
    let payload = open(bytes, &dev_key()).unwrap();
    decode_container(&payload)
        .unwrap()
        .into_iter()
        .map(<[u8]>::to_vec)
        .collect()
}

pub fn field_ids(schema: &Value) -> Vec<(String, u64, bool)> {
    let mut fields: Vec<(String, u64, bool)> = schema["Fields"]
        .as_object()
        .unwrap()
        .iter()
        .map(|(name, f)| {
            (
                name.clone(),
                f["Id"].as_u64().unwrap(),
                f["Deprecated"].as_bool().unwrap_or(false),
            )
        })
        .collect();
    fields.sort_by_key(|(_, id, _)| *id);
    fields
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}
