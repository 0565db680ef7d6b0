//! Deduplicated pool of text values referenced by id from records.
//!
//! Two-phase lifecycle, like the registry it is modelled on: every string is
//! registered on a [`StringTableBuilder`] during a complete pass over all
//! tables, then [`StringTableBuilder::build`] freezes it into a
//! [`StringTable`] that only supports lookups. Encoding takes the frozen
//! table, so a lookup can never allocate.

use crate::id::StringId;
use std::collections::HashMap;

/// Errors from string table lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StringTableError {
    #[error("string '{0}' not found in the string table")]
    NotFound(String),

    #[error("sheet '{sheet}': data row {row} is missing")]
    MissingRow { sheet: String, row: usize },

    #[error("string table is full ({0} entries)")]
    Overflow(usize),

    #[error("string '{value}' appears again at index {index}")]
    DuplicateEntry { value: String, index: usize },
}

/// Registration phase.
#[derive(Debug, Default)]
pub struct StringTableBuilder {
    strings: Vec<String>,
    ids: HashMap<String, StringId>,
}

impl StringTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a string. The first occurrence gets the next sequential id;
    /// repeats return the id already assigned.
    pub fn add(&mut self, value: &str) -> Result<StringId, StringTableError> {
        if let Some(&id) = self.ids.get(value) {
            return Ok(id);
        }
        let next = u32::try_from(self.strings.len())
            .map_err(|_| StringTableError::Overflow(self.strings.len()))?;
        let id = StringId(next);
        self.strings.push(value.to_string());
        self.ids.insert(value.to_string(), id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Freeze the table. No more strings can be added.
    pub fn build(self) -> StringTable {
        StringTable {
            strings: self.strings,
            ids: self.ids,
        }
    }
}

/// Frozen string table. Immutable and safe to share between encoders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    strings: Vec<String>,
    ids: HashMap<String, StringId>,
}

impl StringTable {
    /// Rebuild a table from its exported, id-indexed form.
    pub fn from_strings(strings: Vec<String>) -> Result<Self, StringTableError> {
        let mut builder = StringTableBuilder::new();
        for (index, s) in strings.iter().enumerate() {
            if builder.add(s)?.index() != index {
                return Err(StringTableError::DuplicateEntry {
                    value: s.clone(),
                    index,
                });
            }
        }
        Ok(builder.build())
    }

    /// The id assigned to `value`.
    pub fn id(&self, value: &str) -> Result<StringId, StringTableError> {
        self.ids
            .get(value)
            .copied()
            .ok_or_else(|| StringTableError::NotFound(value.to_string()))
    }

    pub fn get(&self, id: StringId) -> Option<&str> {
        self.strings.get(id.index()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Distinct strings in id order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.strings
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.strings.clone()
    }
}
