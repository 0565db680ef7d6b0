//! Schema reconciliation: merging an observed header snapshot into the
//! persisted schema contract.
//!
//! Field identity is the field name. Existing ids are never changed, removed
//! fields are deprecated rather than deleted, and a type change is refused
//! unless the caller explicitly allows overwriting it, because binary data
//! already shipped depends on the old width.

use crate::schema::{SchemaField, SchemaTemplate, Target};
use crate::snapshot::{KEY_COLUMN_NAME, ObservedSchema, SnapshotError};
use std::collections::BTreeSet;
use std::fmt;

// ===========================================================================
// Result types
// ===========================================================================

/// What the write phase should do with a reconciled schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// First sight of the table; persist a new schema.
    Create,
    /// The schema changed; persist it with a bumped version.
    Update,
    /// Nothing to persist.
    None,
    /// The merge was refused; nothing from this run may be written.
    Error,
}

/// Severity of a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "Info",
            Level::Warn => "Warn",
            Level::Error => "Error",
        })
    }
}

/// One human-readable line of the reconciliation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: Level::Warn,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Outcome of reconciling one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub action: Action,
    /// The schema to persist and encode with. For [`Action::Error`] this is
    /// the persisted schema, untouched.
    pub schema: SchemaTemplate,
    pub diagnostics: Vec<Diagnostic>,
    pub skip_columns: BTreeSet<usize>,
    /// First schema column in the sheet; `None` when there is no sheet to
    /// read from (errors and retired tables).
    pub start_column: Option<usize>,
}

impl ReconciliationResult {
    pub fn table(&self) -> &str {
        &self.schema.table
    }

    pub fn is_error(&self) -> bool {
        self.action == Action::Error
    }

    /// Create and Update results are written to the schema store.
    pub fn should_persist(&self) -> bool {
        matches!(self.action, Action::Create | Action::Update)
    }

    /// Whether this table produces a data artifact this run.
    pub fn is_encodable(&self) -> bool {
        !self.is_error() && !self.schema.deprecated && self.start_column.is_some()
    }

    fn failed(schema: SchemaTemplate, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            action: Action::Error,
            schema,
            diagnostics,
            skip_columns: BTreeSet::new(),
            start_column: None,
        }
    }
}

/// Caller permissions for a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Apply declared type changes instead of refusing them. Only safe
    /// before any artifact built from the old type has shipped.
    pub force_type_overwrite: bool,
    /// Compute the merge but never ask for anything to be persisted.
    pub read_only: bool,
}

// ===========================================================================
// Operations
// ===========================================================================

/// First sight of a table: the observed snapshot becomes the schema.
pub fn create(observed: ObservedSchema) -> ReconciliationResult {
    ReconciliationResult {
        action: Action::Create,
        schema: observed.schema,
        diagnostics: Vec::new(),
        skip_columns: observed.skip_columns,
        start_column: Some(observed.start_column),
    }
}

/// Merge `observed` into `persisted`.
pub fn reconcile(
    persisted: &SchemaTemplate,
    observed: ObservedSchema,
    opts: &ReconcileOptions,
) -> ReconciliationResult {
    let mut result = persisted.clone();
    let mut log = Vec::new();
    let mut has_update = false;
    let mut has_error = false;

    if result.deprecated {
        result.deprecated = false;
        log.push(Diagnostic::info("Table re-enabled: its sheet is back"));
        has_update = true;
    }

    if result.target != observed.schema.target {
        log.push(Diagnostic::info(format!(
            "Target changed: {} -> {}",
            result.target, observed.schema.target
        )));
        result.target = observed.schema.target;
        has_update = true;
    }

    for (name, seen) in observed.schema.fields.iter() {
        if let Some(existing) = result.fields.get_mut(name) {
            existing.column_index = seen.column_index;

            if existing.field_type != seen.field_type {
                if opts.force_type_overwrite {
                    log.push(Diagnostic::warn(format!(
                        "Field type updated for '{name}': {} -> {}",
                        existing.field_type, seen.field_type
                    )));
                    existing.field_type = seen.field_type.clone();
                    has_update = true;
                } else {
                    log.push(Diagnostic::error(format!(
                        "Field type mismatch for '{name}': existing is '{}', new is '{}'. \
                         Type change not allowed; add a new field instead",
                        existing.field_type, seen.field_type
                    )));
                    has_error = true;
                }
            }

            if existing.deprecated {
                existing.deprecated = false;
                log.push(Diagnostic::info(format!("Field re-enabled: {name}")));
                has_update = true;
            }
        } else {
            let id = result.allocate_id();
            let column = seen.column_index.unwrap_or_default();
            result
                .fields
                .insert(name, SchemaField::new(id, seen.field_type.clone(), column));
            log.push(Diagnostic::info(format!(
                "New field added: {name} (Type: {}, Id: {id})",
                seen.field_type
            )));
            has_update = true;
        }
    }

    if has_error {
        return ReconciliationResult::failed(persisted.clone(), log);
    }

    for (name, field) in result.fields.iter_mut() {
        if !field.deprecated && !observed.schema.fields.contains(name) {
            field.deprecated = true;
            field.column_index = None;
            log.push(Diagnostic::info(format!("Field deprecated: {name}")));
            has_update = true;
        }
    }

    let action = if has_update && !opts.read_only {
        result.version += 1;
        log.push(Diagnostic::info(format!(
            "Schema version updated to {}",
            result.version
        )));
        Action::Update
    } else {
        Action::None
    };

    ReconciliationResult {
        action,
        schema: result,
        diagnostics: log,
        skip_columns: observed.skip_columns,
        start_column: Some(observed.start_column),
    }
}

/// Retire a persisted table whose sheet no longer exists. Returns `None` if
/// the table is already retired.
pub fn retire_table(mut persisted: SchemaTemplate) -> Option<ReconciliationResult> {
    if persisted.deprecated {
        return None;
    }
    persisted.deprecated = true;
    for (_, field) in persisted.fields.iter_mut() {
        field.column_index = None;
    }
    Some(ReconciliationResult {
        action: Action::Update,
        schema: persisted,
        diagnostics: vec![Diagnostic::info(
            "Table marked as deprecated because the corresponding sheet was not found",
        )],
        skip_columns: BTreeSet::new(),
        start_column: None,
    })
}

/// An Error result for a sheet whose header rows could not be read.
pub fn snapshot_failed(
    table: &str,
    persisted: Option<SchemaTemplate>,
    err: &SnapshotError,
) -> ReconciliationResult {
    refuse(table, persisted, err.to_string())
}

/// An Error result carrying a single message. `persisted` is kept as the
/// result schema when there is one.
pub fn refuse(
    table: &str,
    persisted: Option<SchemaTemplate>,
    message: impl Into<String>,
) -> ReconciliationResult {
    let schema =
        persisted.unwrap_or_else(|| SchemaTemplate::new(table, Target::default(), KEY_COLUMN_NAME));
    ReconciliationResult::failed(schema, vec![Diagnostic::error(message)])
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::FieldType;
    use crate::id::FieldId;

    fn observed(target: Target, fields: &[(&str, &str, usize)]) -> ObservedSchema {
        let mut schema = SchemaTemplate::new("Item", target, KEY_COLUMN_NAME);
        for (name, ty, col) in fields {
            schema.push_field(*name, FieldType::from(*ty), *col);
        }
        ObservedSchema {
            schema,
            skip_columns: BTreeSet::new(),
            start_column: fields.first().map(|f| f.2).unwrap_or_default(),
        }
    }

    fn item_v1() -> ObservedSchema {
        observed(
            Target::Both,
            &[("SerialNo", "int", 3), ("Name", "string", 4), ("Power", "int", 5)],
        )
    }

    fn ids(schema: &SchemaTemplate) -> Vec<(String, u32, bool)> {
        schema
            .fields
            .iter()
            .map(|(n, f)| (n.to_string(), f.id.0, f.deprecated))
            .collect()
    }

    fn write() -> ReconcileOptions {
        ReconcileOptions::default()
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    #[test]
    fn create_assigns_ids_in_column_order() {
        let result = create(item_v1());
        assert_eq!(result.action, Action::Create);
        assert_eq!(result.schema.version, 1);
        assert_eq!(
            ids(&result.schema),
            vec![
                ("SerialNo".into(), 1, false),
                ("Name".into(), 2, false),
                ("Power".into(), 3, false)
            ]
        );
        assert_eq!(result.start_column, Some(3));
        assert!(result.should_persist());
    }

    // -----------------------------------------------------------------------
    // Update paths
    // -----------------------------------------------------------------------

    #[test]
    fn unchanged_snapshot_is_a_no_op() {
        let persisted = create(item_v1()).schema;
        let result = reconcile(&persisted, item_v1(), &write());
        assert_eq!(result.action, Action::None);
        assert_eq!(result.schema.version, 1);
        assert_eq!(ids(&result.schema), ids(&persisted));
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn new_field_gets_next_id_and_bumps_version() {
        let persisted = create(item_v1()).schema;
        let next = observed(
            Target::Both,
            &[
                ("SerialNo", "int", 3),
                ("Name", "string", 4),
                ("Power", "int", 5),
                ("Rarity", "string", 6),
            ],
        );
        let result = reconcile(&persisted, next, &write());
        assert_eq!(result.action, Action::Update);
        assert_eq!(result.schema.version, 2);
        assert_eq!(result.schema.fields.get("Rarity").unwrap().id, FieldId(4));
        assert_eq!(result.schema.fields.get("SerialNo").unwrap().id, FieldId(1));
        assert_eq!(result.schema.next_field_id, FieldId(5));
        assert_eq!(
            result.diagnostics.last().unwrap().to_string(),
            "[Info] Schema version updated to 2"
        );
    }

    #[test]
    fn moved_column_refreshes_index_only() {
        let persisted = create(item_v1()).schema;
        let moved = observed(
            Target::Both,
            &[("SerialNo", "int", 1), ("Power", "int", 2), ("Name", "string", 7)],
        );
        let result = reconcile(&persisted, moved, &write());
        assert_eq!(result.action, Action::None);
        assert_eq!(result.schema.fields.get("Name").unwrap().column_index, Some(7));
        // Declaration order stays the persisted one.
        let names: Vec<_> = result.schema.fields.names().collect();
        assert_eq!(names, vec!["SerialNo", "Name", "Power"]);
    }

    #[test]
    fn removed_field_is_deprecated_and_keeps_id() {
        let persisted = create(item_v1()).schema;
        let without_power = observed(
            Target::Both,
            &[("SerialNo", "int", 3), ("Name", "string", 4)],
        );
        let result = reconcile(&persisted, without_power, &write());
        assert_eq!(result.action, Action::Update);
        let power = result.schema.fields.get("Power").unwrap();
        assert!(power.deprecated);
        assert_eq!(power.id, FieldId(3));
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.to_string() == "[Info] Field deprecated: Power")
        );
    }

    #[test]
    fn reappearing_field_is_reactivated_with_old_id() {
        let v1 = create(item_v1()).schema;
        let v2 = reconcile(
            &v1,
            observed(Target::Both, &[("SerialNo", "int", 3), ("Name", "string", 4)]),
            &write(),
        )
        .schema;
        let result = reconcile(&v2, item_v1(), &write());
        assert_eq!(result.action, Action::Update);
        assert_eq!(result.schema.version, 3);
        let power = result.schema.fields.get("Power").unwrap();
        assert!(!power.deprecated);
        assert_eq!(power.id, FieldId(3));
        assert_eq!(result.schema.next_field_id, FieldId(4));
    }

    #[test]
    fn target_change_is_an_update() {
        let persisted = create(item_v1()).schema;
        let mut next = item_v1();
        next.schema.target = Target::Server;
        let result = reconcile(&persisted, next, &write());
        assert_eq!(result.action, Action::Update);
        assert_eq!(result.schema.target, Target::Server);
        assert_eq!(
            result.diagnostics[0].to_string(),
            "[Info] Target changed: Both -> Server"
        );
    }

    #[test]
    fn deprecated_table_is_reactivated() {
        let persisted = retire_table(create(item_v1()).schema).unwrap().schema;
        let result = reconcile(&persisted, item_v1(), &write());
        assert_eq!(result.action, Action::Update);
        assert!(!result.schema.deprecated);
        assert!(result.is_encodable());
    }

    // -----------------------------------------------------------------------
    // Type changes
    // -----------------------------------------------------------------------

    #[test]
    fn type_change_without_force_is_an_error_and_mutates_nothing() {
        let persisted = create(item_v1()).schema;
        let changed = observed(
            Target::Server,
            &[("SerialNo", "int", 3), ("Name", "string", 4), ("Power", "float", 5), ("Extra", "int", 6)],
        );
        let result = reconcile(&persisted, changed, &write());
        assert_eq!(result.action, Action::Error);
        assert_eq!(result.schema, persisted);
        assert!(!result.is_encodable());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.level == Level::Error && d.message.contains("'Power'"))
        );
    }

    #[test]
    fn type_change_with_force_is_applied_and_warned() {
        let persisted = create(item_v1()).schema;
        let changed = observed(
            Target::Both,
            &[("SerialNo", "int", 3), ("Name", "string", 4), ("Power", "float", 5)],
        );
        let opts = ReconcileOptions {
            force_type_overwrite: true,
            read_only: false,
        };
        let result = reconcile(&persisted, changed, &opts);
        assert_eq!(result.action, Action::Update);
        assert_eq!(
            result.schema.fields.get("Power").unwrap().field_type,
            FieldType::Float
        );
        assert_eq!(result.schema.fields.get("Power").unwrap().id, FieldId(3));
        assert_eq!(result.diagnostics[0].level, Level::Warn);
        assert_eq!(
            result.diagnostics[0].message,
            "Field type updated for 'Power': int -> float"
        );
    }

    // -----------------------------------------------------------------------
    // Read-only
    // -----------------------------------------------------------------------

    #[test]
    fn read_only_reports_but_does_not_bump() {
        let persisted = create(item_v1()).schema;
        let next = observed(
            Target::Both,
            &[("SerialNo", "int", 3), ("Name", "string", 8), ("Rarity", "string", 9)],
        );
        let opts = ReconcileOptions {
            force_type_overwrite: false,
            read_only: true,
        };
        let result = reconcile(&persisted, next, &opts);
        assert_eq!(result.action, Action::None);
        assert_eq!(result.schema.version, 1);
        assert_eq!(result.schema.fields.get("Name").unwrap().column_index, Some(8));
        assert!(!result.diagnostics.is_empty());
        assert!(!result.should_persist());
    }

    // -----------------------------------------------------------------------
    // Retirement and snapshot failures
    // -----------------------------------------------------------------------

    #[test]
    fn retire_marks_table_once() {
        let schema = create(item_v1()).schema;
        let retired = retire_table(schema).unwrap();
        assert_eq!(retired.action, Action::Update);
        assert!(retired.schema.deprecated);
        assert_eq!(retired.schema.version, 1);
        assert!(!retired.is_encodable());
        assert!(retire_table(retired.schema).is_none());
    }

    #[test]
    fn snapshot_failure_is_an_error_result() {
        let err = SnapshotError::MissingTypeRow {
            sheet: "Item".into(),
            row: 2,
        };
        let result = snapshot_failed("Item", None, &err);
        assert!(result.is_error());
        assert_eq!(result.table(), "Item");
        assert_eq!(result.diagnostics.len(), 1);
    }
}
