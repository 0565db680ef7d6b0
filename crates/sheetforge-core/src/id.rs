use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a column within a table. Never reused once allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(pub u32);

impl FieldId {
    /// The first id handed out for a freshly created table.
    pub const FIRST: FieldId = FieldId(1);

    /// Little-endian wire representation used in record framing.
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a distinct string in the run's string table. Dense, from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringId(pub u32);

impl StringId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
