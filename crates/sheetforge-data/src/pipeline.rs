//! One conversion run: workbooks in, schemas, artifacts and a manifest out.
//!
//! Phases, in order:
//!
//! 1. **Key** -- Resolve the encryption key before touching any file.
//! 2. **Reconcile** -- Snapshot every table sheet and merge it with its
//!    persisted schema. Any error result stops the run before anything is
//!    written.
//! 3. **Persist** -- Retire tables whose sheet disappeared and write every
//!    created or updated schema.
//! 4. **String table** -- Register every string cell of every encodable
//!    table, then freeze.
//! 5. **Artifacts** -- Encode, seal and write `StringTable.bytes` and one
//!    `{Table}.bytes` per table. A failing table does not stop the others.
//! 6. **Manifest** -- Written only when every artifact succeeded.
//!
//! Read-only runs do everything in memory and write nothing.

use crate::loader::{DataLoadError, discover_workbooks};
use crate::store::{SchemaStore, StoreError, unsafe_table_name, write_atomic, write_manifest};
use crate::workbook::load_workbook;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sheetforge_core::artifact::seal;
use sheetforge_core::container::encode_string_table;
use sheetforge_core::key::{EncryptionKey, KeyError, KeySource};
use sheetforge_core::manifest::Manifest;
use sheetforge_core::reconcile::{self, Action, Level, ReconcileOptions, ReconciliationResult};
use sheetforge_core::record::{EncodeJob, encode_tables, register_strings};
use sheetforge_core::snapshot::{HeaderLayout, extract_snapshot};
use sheetforge_core::source::{Sheet, TabularSource};
use sheetforge_core::string_table::{StringTable, StringTableBuilder, StringTableError};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// File name of the string table artifact.
pub const STRING_TABLE_FILE_NAME: &str = "StringTable.bytes";

/// Sheets whose name starts with one of these are documentation, not tables.
/// Enum definition sheets only feed code generation. `Constant` sheets hold
/// name/value rows with no `SerialNo` column, so snapshot extraction passes
/// over them as not a table.
const SKIPPED_SHEET_PREFIXES: &[&str] = &["desc_", "enum"];

// ===========================================================================
// Configuration
// ===========================================================================

/// Everything a run needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub schema_dir: PathBuf,
    pub revision: u32,
    pub layout: HeaderLayout,
    /// Apply declared type changes instead of refusing them.
    pub force_type_overwrite: bool,
    /// Compute everything, write nothing.
    pub read_only: bool,
    pub key: KeySource,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("out"),
            schema_dir: PathBuf::from("schemas"),
            revision: 1,
            layout: HeaderLayout::default(),
            force_type_overwrite: false,
            read_only: false,
            // No key configured: resolving fails unless development mode is chosen.
            key: KeySource::Production(String::new()),
        }
    }
}

impl PipelineConfig {
    fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            force_type_overwrite: self.force_type_overwrite,
            read_only: self.read_only,
        }
    }
}

// ===========================================================================
// Exit statuses and errors
// ===========================================================================

/// Process exit statuses, one per way a run can end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    InvalidArguments = 1,
    Exception = 2,
    SchemaError = 3,
    StringTableGenerationFailed = 4,
    BinaryGenerationFailed = 5,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// One artifact that could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFailure {
    pub file_name: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid encryption key: {0}")]
    Key(#[from] KeyError),

    #[error(transparent)]
    Load(#[from] DataLoadError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("schema errors in {} table(s)", .0.len())]
    Schema(Vec<ReconciliationResult>),

    #[error("string table generation failed: {0}")]
    StringTable(#[from] StringTableError),

    #[error("{} artifact(s) failed", .0.len())]
    Binary(Vec<ArtifactFailure>),
}

impl PipelineError {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            PipelineError::Key(_) => ExitStatus::InvalidArguments,
            PipelineError::Load(_) | PipelineError::Store(_) => ExitStatus::Exception,
            PipelineError::Schema(_) => ExitStatus::SchemaError,
            PipelineError::StringTable(_) => ExitStatus::StringTableGenerationFailed,
            PipelineError::Binary(_) => ExitStatus::BinaryGenerationFailed,
        }
    }
}

// ===========================================================================
// Report
// ===========================================================================

/// One sealed artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReport {
    pub file_name: String,
    pub hash: String,
    pub len: usize,
    /// Where it was written; `None` in read-only runs.
    pub path: Option<PathBuf>,
}

/// What a successful run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub results: Vec<ReconciliationResult>,
    pub written_schemas: Vec<PathBuf>,
    pub artifacts: Vec<ArtifactReport>,
    pub manifest: Manifest,
    pub manifest_path: Option<PathBuf>,
}

impl RunReport {
    pub fn result(&self, table: &str) -> Option<&ReconciliationResult> {
        self.results.iter().find(|r| r.table() == table)
    }
}

// ===========================================================================
// Sheet selection
// ===========================================================================

/// Why a sheet is not treated as a table, or `None` if it is a candidate.
pub fn skip_reason<S: TabularSource + ?Sized>(sheet: &S) -> Option<&'static str> {
    let lower = sheet.name().to_ascii_lowercase();
    if sheet.is_hidden() {
        Some("hidden")
    } else if sheet.physical_row_count() < 2 {
        Some("fewer than 2 rows")
    } else if SKIPPED_SHEET_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        Some("documentation sheet")
    } else {
        None
    }
}

// ===========================================================================
// Run
// ===========================================================================

/// A reconciled table and the sheet it came from, if any.
struct TableRun {
    result: ReconciliationResult,
    sheet: Option<Sheet>,
}

/// Execute one conversion run.
pub fn run(config: &PipelineConfig) -> Result<RunReport, PipelineError> {
    let key = EncryptionKey::resolve(&config.key)?;
    let store = SchemaStore::new(&config.schema_dir);

    let mut tables = reconcile_workbooks(config, &store)?;
    for table in &tables {
        log_result(&table.result);
    }

    let failures: Vec<ReconciliationResult> = tables
        .iter()
        .filter(|t| t.result.is_error())
        .map(|t| t.result.clone())
        .collect();
    if !failures.is_empty() {
        error!(tables = failures.len(), "schema errors detected; nothing was written");
        return Err(PipelineError::Schema(failures));
    }

    let mut written_schemas = Vec::new();
    if !config.read_only {
        tables.extend(retire_missing_tables(&store, &tables)?);
        for table in tables.iter().filter(|t| t.result.should_persist()) {
            let path = store.save(&table.result.schema)?;
            info!(table = table.result.table(), path = %path.display(), "schema written");
            written_schemas.push(path);
        }
    }

    let strings = build_string_table(&tables, config.layout.header_rows)?;
    info!(strings = strings.len(), "string table built");

    let mut manifest = Manifest::new(config.revision, Utc::now(), config.key.is_development());
    let (artifacts, artifact_failures) = write_artifacts(config, &key, &tables, &strings);
    if !artifact_failures.is_empty() {
        error!(
            failed = artifact_failures.len(),
            "binary generation failed; manifest not written"
        );
        return Err(PipelineError::Binary(artifact_failures));
    }
    for artifact in &artifacts {
        manifest.record(&artifact.file_name, &artifact.hash);
    }

    let manifest_path = if config.read_only {
        None
    } else {
        let path = write_manifest(&config.output_dir, &manifest)?;
        info!(path = %path.display(), artifacts = artifacts.len(), "manifest written");
        Some(path)
    };

    Ok(RunReport {
        results: tables.into_iter().map(|t| t.result).collect(),
        written_schemas,
        artifacts,
        manifest,
        manifest_path,
    })
}

/// Snapshot and reconcile every table sheet of every workbook.
fn reconcile_workbooks(
    config: &PipelineConfig,
    store: &SchemaStore,
) -> Result<Vec<TableRun>, PipelineError> {
    let opts = config.reconcile_options();
    let mut tables: Vec<TableRun> = Vec::new();
    let mut origins: HashMap<String, PathBuf> = HashMap::new();

    for path in discover_workbooks(&config.input_dir)? {
        info!(file = %path.display(), "reading workbook");
        for sheet in load_workbook(&path)?.into_sheets() {
            if let Some(reason) = skip_reason(&sheet) {
                debug!(sheet = sheet.name(), reason, "sheet skipped");
                continue;
            }
            if let Some(reason) = unsafe_table_name(sheet.name()) {
                let result = reconcile::refuse(
                    sheet.name(),
                    None,
                    format!(
                        "Sheet name '{}' cannot be used as a table name: {reason}",
                        sheet.name()
                    ),
                );
                tables.push(TableRun {
                    result,
                    sheet: None,
                });
                continue;
            }

            let observed = match extract_snapshot(&sheet, &config.layout) {
                Ok(Some(observed)) => observed,
                Ok(None) => {
                    info!(sheet = sheet.name(), "no SerialNo column; not a table");
                    continue;
                }
                Err(err) => {
                    let persisted = store.load(sheet.name()).ok().flatten();
                    let result = reconcile::snapshot_failed(sheet.name(), persisted, &err);
                    tables.push(TableRun {
                        result,
                        sheet: None,
                    });
                    continue;
                }
            };

            let table = observed.schema.table.clone();
            if let Some(first) = origins.get(&table) {
                let result = reconcile::refuse(
                    &table,
                    None,
                    format!(
                        "Table '{table}' is defined in both {} and {}",
                        first.display(),
                        path.display()
                    ),
                );
                tables.push(TableRun {
                    result,
                    sheet: None,
                });
                continue;
            }
            origins.insert(table.clone(), path.clone());

            let result = match store.load(&table) {
                Ok(None) => reconcile::create(observed),
                Ok(Some(persisted)) => reconcile::reconcile(&persisted, observed, &opts),
                Err(StoreError::Schema {
                    path: schema_path,
                    source,
                }) => reconcile::refuse(
                    &table,
                    None,
                    format!("Persisted schema {} is invalid: {source}", schema_path.display()),
                ),
                Err(other) => return Err(other.into()),
            };
            tables.push(TableRun {
                result,
                sheet: Some(sheet),
            });
        }
    }
    Ok(tables)
}

/// Retire persisted tables that no sheet produced this run.
fn retire_missing_tables(
    store: &SchemaStore,
    tables: &[TableRun],
) -> Result<Vec<TableRun>, PipelineError> {
    let seen: BTreeSet<&str> = tables.iter().map(|t| t.result.table()).collect();
    let mut retired = Vec::new();
    for table in store.persisted_tables()? {
        if seen.contains(table.as_str()) {
            continue;
        }
        let Some(persisted) = store.load(&table)? else {
            continue;
        };
        if let Some(result) = reconcile::retire_table(persisted) {
            warn!(table = %table, "sheet not found; table deprecated");
            retired.push(TableRun {
                result,
                sheet: None,
            });
        }
    }
    Ok(retired)
}

fn build_string_table(
    tables: &[TableRun],
    first_data_row: usize,
) -> Result<StringTable, StringTableError> {
    let mut builder = StringTableBuilder::new();
    for table in tables {
        let Some(sheet) = table.sheet.as_ref().filter(|_| table.result.is_encodable()) else {
            continue;
        };
        register_strings(&mut builder, &table.result.schema, sheet, first_data_row)?;
    }
    Ok(builder.build())
}

/// Seal and write every artifact. Failures are collected, not propagated.
fn write_artifacts(
    config: &PipelineConfig,
    key: &EncryptionKey,
    tables: &[TableRun],
    strings: &StringTable,
) -> (Vec<ArtifactReport>, Vec<ArtifactFailure>) {
    let mut artifacts = Vec::new();
    let mut failures = Vec::new();

    let mut emit = |file_name: String, payload: Result<Vec<u8>, String>| {
        match payload.and_then(|bytes| emit_artifact(config, key, &file_name, &bytes)) {
            Ok(report) => artifacts.push(report),
            Err(message) => {
                error!(file = %file_name, %message, "artifact failed");
                failures.push(ArtifactFailure { file_name, message });
            }
        }
    };

    emit(
        STRING_TABLE_FILE_NAME.to_string(),
        encode_string_table(strings).map_err(|e| e.to_string()),
    );

    let encodable: Vec<(&str, EncodeJob<'_, Sheet>)> = tables
        .iter()
        .filter(|t| t.result.is_encodable())
        .filter_map(|t| {
            t.sheet.as_ref().map(|sheet| {
                (
                    t.result.table(),
                    EncodeJob {
                        schema: &t.result.schema,
                        sheet,
                        first_data_row: config.layout.header_rows,
                    },
                )
            })
        })
        .collect();
    let (names, jobs): (Vec<&str>, Vec<EncodeJob<'_, Sheet>>) = encodable.into_iter().unzip();

    for (name, payload) in names.into_iter().zip(encode_tables(&jobs, strings)) {
        emit(format!("{name}.bytes"), payload.map_err(|e| e.to_string()));
    }

    (artifacts, failures)
}

fn emit_artifact(
    config: &PipelineConfig,
    key: &EncryptionKey,
    file_name: &str,
    payload: &[u8],
) -> Result<ArtifactReport, String> {
    let artifact = seal(payload, key).map_err(|e| e.to_string())?;
    let path = if config.read_only {
        None
    } else {
        let path = config.output_dir.join(file_name);
        write_atomic(&path, &artifact.bytes).map_err(|e| e.to_string())?;
        info!(path = %path.display(), bytes = artifact.bytes.len(), "artifact written");
        Some(path)
    };
    Ok(ArtifactReport {
        file_name: file_name.to_string(),
        hash: artifact.hash,
        len: artifact.bytes.len(),
        path,
    })
}

// ===========================================================================
// Logging
// ===========================================================================

fn log_result(result: &ReconciliationResult) {
    let table = result.table();
    match result.action {
        Action::Create => info!(table, version = result.schema.version, "schema created"),
        Action::Update => info!(table, version = result.schema.version, "schema updated"),
        Action::None => debug!(table, "schema unchanged"),
        Action::Error => error!(table, "schema error"),
    }
    for diagnostic in &result.diagnostics {
        match diagnostic.level {
            Level::Info => info!(table, "{diagnostic}"),
            Level::Warn => warn!(table, "{diagnostic}"),
            Level::Error => error!(table, "{diagnostic}"),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
