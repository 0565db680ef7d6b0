//! Workbook discovery and format-detected deserialization.
//!
//! Provides format detection (RON/JSON/TOML), input directory scanning, and
//! the deserialization helper used by the workbook layer.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while locating or reading workbook files.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// The input root does not exist or is not a directory.
    #[error("input directory {dir} not found")]
    MissingInputDir { dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// An I/O error occurred.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DataLoadError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        DataLoadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported workbook file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// Workbook discovery
// ===========================================================================

/// Editor lock files start with `~` and are never workbooks.
fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('~'))
}

/// List the workbook files directly inside `dir`, sorted by path.
///
/// Files with an unsupported extension and editor lock files are skipped.
/// Returns `Err(ConflictingFormats)` if one base name exists in two formats.
pub fn discover_workbooks(dir: &Path) -> Result<Vec<PathBuf>, DataLoadError> {
    if !dir.is_dir() {
        return Err(DataLoadError::MissingInputDir {
            dir: dir.to_path_buf(),
        });
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| DataLoadError::io(dir, e))? {
        let path = entry.map_err(|e| DataLoadError::io(dir, e))?.path();
        if !path.is_file() || is_lock_file(&path) {
            continue;
        }
        if detect_format(&path).is_err() {
            tracing::debug!(file = %path.display(), "skipping non-workbook file");
            continue;
        }
        found.push(path);
    }
    found.sort();

    let mut stems: HashMap<String, &PathBuf> = HashMap::new();
    for path in &found {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(existing) = stems.insert(stem, path) {
            return Err(DataLoadError::ConflictingFormats {
                a: existing.clone(),
                b: path.clone(),
            });
        }
    }

    Ok(found)
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| DataLoadError::io(path, e))?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| DataLoadError::Parse {
            file: path.to_path_buf(),
            detail: e.to_string(),
        }),
        Format::Json => serde_json::from_str(&content).map_err(|e| DataLoadError::Parse {
            file: path.to_path_buf(),
            detail: e.to_string(),
        }),
        Format::Toml => toml::from_str(&content).map_err(|e| DataLoadError::Parse {
            file: path.to_path_buf(),
            detail: e.to_string(),
        }),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::WorkbookData;
    use std::fs;

    // -----------------------------------------------------------------------
    // detect_format
    // -----------------------------------------------------------------------

    #[test]
    fn format_follows_workbook_extension() {
        let cases = [
            ("Items.ron", Some(Format::Ron)),
            ("Items.toml", Some(Format::Toml)),
            ("Items.json", Some(Format::Json)),
            ("Items.xlsx", None),
            ("Items.JSON", None),
            ("Items", None),
        ];
        for (name, expected) in cases {
            match (detect_format(Path::new(name)), expected) {
                (Ok(format), Some(expected)) => assert_eq!(format, expected, "{name}"),
                (Err(DataLoadError::UnsupportedFormat { file }), None) => {
                    assert_eq!(file, Path::new(name))
                }
                (other, _) => panic!("{name}: unexpected {other:?}"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // discover_workbooks
    // -----------------------------------------------------------------------

    #[test]
    fn discover_lists_supported_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Skill.ron"), "()").unwrap();
        fs::write(dir.path().join("Item.json"), "{}").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();

        let found = discover_workbooks(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("Item.json"), dir.path().join("Skill.ron")]
        );
    }

    #[test]
    fn discover_skips_lock_files_and_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("~$Item.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("old.json")).unwrap();
        assert!(discover_workbooks(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn discover_rejects_conflicting_formats() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Item.ron"), "()").unwrap();
        fs::write(dir.path().join("Item.json"), "{}").unwrap();
        assert!(matches!(
            discover_workbooks(dir.path()),
            Err(DataLoadError::ConflictingFormats { .. })
        ));
    }

    #[test]
    fn discover_requires_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_workbooks(&dir.path().join("missing")),
            Err(DataLoadError::MissingInputDir { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // deserialize_file
    // -----------------------------------------------------------------------

    #[test]
    fn every_format_yields_the_same_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let sources = [
            ("Items.json", r#"{ "sheets": [{ "name": "Item", "hidden": true }] }"#),
            ("Items.ron", r#"(sheets: [(name: "Item", hidden: true)])"#),
            ("Items.toml", "[[sheets]]\nname = \"Item\"\nhidden = true\n"),
        ];
        for (name, text) in sources {
            let path = dir.path().join(name);
            fs::write(&path, text).unwrap();
            let workbook: WorkbookData = deserialize_file(&path).unwrap();
            assert_eq!(workbook.sheets.len(), 1, "{name}");
            assert_eq!(workbook.sheets[0].name, "Item", "{name}");
            assert!(workbook.sheets[0].hidden, "{name}");
            assert!(workbook.sheets[0].rows.is_empty(), "{name}");
        }
    }

    #[test]
    fn deserialize_file_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = deserialize_file::<WorkbookData>(&path).unwrap_err();
        assert!(matches!(err, DataLoadError::Parse { ref file, .. } if *file == path));
    }

    #[test]
    fn deserialize_file_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = deserialize_file::<WorkbookData>(&dir.path().join("gone.json"));
        assert!(matches!(result, Err(DataLoadError::Io { .. })));
    }
}
