//! Persisted schema contract for one table.
//!
//! A [`SchemaTemplate`] is written to `{Table}.Schema.json` and merged with
//! the freshly observed header rows on every run. Field ids are the contract
//! with previously emitted binary data, so they are allocated from a
//! monotonic cursor and never handed out twice.

use crate::field_type::FieldType;
use crate::id::FieldId;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors raised while loading or validating a persisted schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table '{table}': field '{name}' declared twice")]
    DuplicateFieldName { table: String, name: String },

    #[error("table '{table}': field id {id} used by both '{first}' and '{second}'")]
    DuplicateFieldId {
        table: String,
        id: FieldId,
        first: String,
        second: String,
    },

    #[error("table '{table}': field '{name}' has id {id}, but next field id is {next}")]
    FieldIdOutOfRange {
        table: String,
        name: String,
        id: FieldId,
        next: FieldId,
    },
}

// ===========================================================================
// Target
// ===========================================================================

/// Which runtime audience loads a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Target {
    Server,
    Client,
    #[default]
    Both,
}

impl Target {
    /// Parse the tag written in a sheet header. A blank cell means `Both`.
    pub fn from_tag(tag: &str) -> Option<Target> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "both" => Some(Target::Both),
            "server" => Some(Target::Server),
            "client" => Some(Target::Client),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Target::Server => "Server",
            Target::Client => "Client",
            Target::Both => "Both",
        })
    }
}

// ===========================================================================
// SchemaField
// ===========================================================================

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaField {
    pub id: FieldId,
    #[serde(rename = "Type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub deprecated: bool,
    /// Sheet column this field was read from during the current run.
    #[serde(skip)]
    pub column_index: Option<usize>,
}

impl SchemaField {
    pub fn new(id: FieldId, field_type: FieldType, column_index: usize) -> Self {
        Self {
            id,
            field_type,
            deprecated: false,
            column_index: Some(column_index),
        }
    }
}

// ===========================================================================
// FieldMap
// ===========================================================================

/// Name-keyed field collection that preserves declaration order.
///
/// Declaration order is the order records are encoded in. It is stored
/// explicitly as a vector; the name index only accelerates lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, SchemaField)>,
    index: HashMap<String, usize>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&SchemaField> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SchemaField> {
        self.index.get(name).map(|&i| &mut self.entries[i].1)
    }

    /// Insert a field. An existing entry with the same name is replaced in
    /// place; a new name is appended at the end of the declaration order.
    pub fn insert(&mut self, name: impl Into<String>, field: SchemaField) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&i) => self.entries[i].1 = field,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, field));
            }
        }
    }

    /// All fields in declaration order, deprecated ones included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaField)> {
        self.entries.iter().map(|(n, f)| (n.as_str(), f))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut SchemaField)> {
        self.entries.iter_mut().map(|(n, f)| (n.as_str(), f))
    }

    /// Non-deprecated fields in declaration order.
    pub fn active(&self) -> impl Iterator<Item = (&str, &SchemaField)> {
        self.iter().filter(|(_, f)| !f.deprecated)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (n, _))| (n.clone(), i))
            .collect();
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, field) in &self.entries {
            map.serialize_entry(name, field)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to schema fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
                let mut entries: Vec<(String, SchemaField)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                let mut seen = HashSet::new();
                while let Some((name, field)) = access.next_entry::<String, SchemaField>()? {
                    if !seen.insert(name.clone()) {
                        return Err(serde::de::Error::custom(format!(
                            "field '{name}' declared twice"
                        )));
                    }
                    entries.push((name, field));
                }
                // JSON objects carry no order guarantee. Ids are allocated in
                // declaration order, so they recover it.
                entries.sort_by_key(|(_, f)| f.id);
                let mut map = FieldMap {
                    entries,
                    index: HashMap::new(),
                };
                map.rebuild_index();
                Ok(map)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

// ===========================================================================
// SchemaTemplate
// ===========================================================================

/// The persisted contract for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaTemplate {
    pub table: String,
    #[serde(default)]
    pub target: Target,
    pub version: u32,
    /// Whole-table soft delete, set when the source sheet disappears.
    #[serde(default)]
    pub deprecated: bool,
    pub primary_key: String,
    pub next_field_id: FieldId,
    pub fields: FieldMap,
}

impl SchemaTemplate {
    /// A version-1 schema with no fields and the id cursor at 1.
    pub fn new(table: impl Into<String>, target: Target, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            target,
            version: 1,
            deprecated: false,
            primary_key: primary_key.into(),
            next_field_id: FieldId::FIRST,
            fields: FieldMap::new(),
        }
    }

    /// Hand out the next field id and advance the cursor.
    pub fn allocate_id(&mut self) -> FieldId {
        let id = self.next_field_id;
        self.next_field_id = FieldId(id.0 + 1);
        id
    }

    /// Append a new field with a freshly allocated id.
    pub fn push_field(
        &mut self,
        name: impl Into<String>,
        field_type: FieldType,
        column_index: usize,
    ) -> FieldId {
        let id = self.allocate_id();
        self.fields
            .insert(name, SchemaField::new(id, field_type, column_index));
        id
    }

    pub fn active_fields(&self) -> impl Iterator<Item = (&str, &SchemaField)> {
        self.fields.active()
    }

    /// Check the id invariants: unique, positive, and below the cursor.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut owners: HashMap<FieldId, &str> = HashMap::new();
        for (name, field) in self.fields.iter() {
            if field.id.0 == 0 || field.id >= self.next_field_id {
                return Err(SchemaError::FieldIdOutOfRange {
                    table: self.table.clone(),
                    name: name.to_string(),
                    id: field.id,
                    next: self.next_field_id,
                });
            }
            if let Some(first) = owners.insert(field.id, name) {
                return Err(SchemaError::DuplicateFieldId {
                    table: self.table.clone(),
                    id: field.id,
                    first: first.to_string(),
                    second: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Parse and validate a persisted schema document.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: SchemaTemplate = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn to_json_pretty(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
