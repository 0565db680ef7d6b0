//! File-backed persistence: schema documents, artifacts and the manifest.
//!
//! Every write goes through [`write_atomic`], so a reader never observes a
//! half-written file.

use sheetforge_core::manifest::{MANIFEST_FILE_NAME, Manifest};
use sheetforge_core::schema::{SchemaError, SchemaTemplate};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix of every persisted schema document.
pub const SCHEMA_SUFFIX: &str = ".Schema.json";

/// Why `table` cannot name a file inside the schema or output directory,
/// or `None` if it can.
pub fn unsafe_table_name(table: &str) -> Option<&'static str> {
    if table.trim().is_empty() {
        Some("name is empty")
    } else if table.contains(['/', '\\']) {
        Some("name contains a path separator")
    } else if table.contains("..") {
        Some("name contains '..'")
    } else if table.contains('\0') {
        Some("name contains a NUL character")
    } else {
        None
    }
}

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema {path}: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },

    #[error("cannot serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ===========================================================================
// Atomic writes
// ===========================================================================

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(source) = result {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Replace the manifest in `output_dir`.
pub fn write_manifest(output_dir: &Path, manifest: &Manifest) -> Result<PathBuf, StoreError> {
    let path = output_dir.join(MANIFEST_FILE_NAME);
    write_atomic(&path, manifest.to_json()?.as_bytes())?;
    Ok(path)
}

// ===========================================================================
// Schema store
// ===========================================================================

/// Directory of `{Table}.Schema.json` documents.
#[derive(Debug, Clone)]
pub struct SchemaStore {
    dir: PathBuf,
}

impl SchemaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}{SCHEMA_SUFFIX}"))
    }

    /// The persisted schema for `table`, or `None` on first sight.
    pub fn load(&self, table: &str) -> Result<Option<SchemaTemplate>, StoreError> {
        let path = self.path_for(table);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(io_error(&path))?;
        SchemaTemplate::from_json(&json)
            .map(Some)
            .map_err(|source| StoreError::Schema { path, source })
    }

    pub fn save(&self, schema: &SchemaTemplate) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&schema.table);
        let json = schema.to_json_pretty().map_err(|source| StoreError::Schema {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, json.as_bytes())?;
        Ok(path)
    }

    /// Names of every table with a schema document, sorted. An absent
    /// directory holds no tables.
    pub fn persisted_tables(&self) -> Result<Vec<String>, StoreError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut tables = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_error(&self.dir))? {
            let path = entry.map_err(io_error(&self.dir))?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(table) = name.strip_suffix(SCHEMA_SUFFIX) {
                if !table.is_empty() && path.is_file() {
                    tables.push(table.to_string());
                }
            }
        }
        tables.sort();
        Ok(tables)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sheetforge_core::field_type::FieldType;
    use sheetforge_core::schema::Target;

    fn item() -> SchemaTemplate {
        let mut schema = SchemaTemplate::new("Item", Target::Both, "SerialNo");
        schema.push_field("SerialNo", FieldType::Int, 0);
        schema.push_field("Name", FieldType::String, 1);
        schema
    }

    // -----------------------------------------------------------------------
    // write_atomic
    // -----------------------------------------------------------------------

    #[test]
    fn write_atomic_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("Item.bytes");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert!(!dir.path().join("out").join("Item.bytes.tmp").exists());
    }

    #[test]
    fn manifest_is_written_under_fixed_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::new(3, Utc::now(), false);
        manifest.record("Item.bytes", "00");
        let path = write_manifest(dir.path(), &manifest).unwrap();
        assert_eq!(path, dir.path().join("Manifest.json"));
        let back = Manifest::from_json(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, manifest);
    }

    // -----------------------------------------------------------------------
    // SchemaStore
    // -----------------------------------------------------------------------

    #[test]
    fn path_uses_exact_table_name() {
        let store = SchemaStore::new("/schemas");
        assert_eq!(
            store.path_for("ItemDrop"),
            Path::new("/schemas/ItemDrop.Schema.json")
        );
    }

    #[test]
    fn table_names_that_leave_the_directory_are_unsafe() {
        for name in ["", "  ", "../escaped", "a/b", "a\\b", "..", "Item..Drop", "nul\0"] {
            assert!(unsafe_table_name(name).is_some(), "{name:?}");
        }
        for name in ["Item", "ItemDrop", "Item_Drop", "Item.Drop", "아이템"] {
            assert_eq!(unsafe_table_name(name), None, "{name:?}");
        }
    }

    #[test]
    fn save_then_load_keeps_declaration_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SchemaStore::new(dir.path());
        let schema = item();
        store.save(&schema).unwrap();

        let loaded = store.load("Item").unwrap().unwrap();
        assert_eq!(loaded.fields.names().collect::<Vec<_>>(), vec!["SerialNo", "Name"]);
        assert_eq!(loaded.next_field_id, schema.next_field_id);
        assert_eq!(loaded.fields.get("Name").unwrap().column_index, None);
    }

    #[test]
    fn load_of_unknown_table_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SchemaStore::new(dir.path());
        assert!(store.load("Quest").unwrap().is_none());
    }

    #[test]
    fn corrupt_schema_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = SchemaStore::new(dir.path());
        fs::write(store.path_for("Item"), "{").unwrap();
        assert!(matches!(
            store.load("Item"),
            Err(StoreError::Schema { ref path, .. }) if *path == store.path_for("Item")
        ));
    }

    #[test]
    fn persisted_tables_lists_schema_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = SchemaStore::new(dir.path());
        store.save(&item()).unwrap();
        store
            .save(&SchemaTemplate::new("Armor", Target::Client, "SerialNo"))
            .unwrap();
        fs::write(dir.path().join("notes.json"), "{}").unwrap();

        assert_eq!(store.persisted_tables().unwrap(), vec!["Armor", "Item"]);
    }

    #[test]
    fn missing_schema_dir_has_no_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = SchemaStore::new(dir.path().join("nope"));
        assert!(store.persisted_tables().unwrap().is_empty());
    }
}
