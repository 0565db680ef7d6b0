//! Declared column types as written in a sheet's type row.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Prefix marking a column whose values are members of a named enum.
pub const ENUM_PREFIX: &str = "e.";

/// The declared type of a schema field.
///
/// Parsing never fails: a tag that names no known type is kept verbatim as
/// [`FieldType::Unsupported`] so that schemas round-trip through storage and
/// the problem surfaces when a table is encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Int,
    UInt,
    Long,
    ULong,
    Short,
    UShort,
    Byte,
    Float,
    Double,
    Bool,
    String,
    /// `e.<Name>`; values are stored as the member name.
    Enum(String),
    Unsupported(String),
}

impl FieldType {
    pub fn is_string(&self) -> bool {
        matches!(self, FieldType::String)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, FieldType::Unsupported(_))
    }
}

impl FromStr for FieldType {
    type Err = Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let tag = raw.trim();
        let parsed = match tag.to_ascii_lowercase().as_str() {
            "int" => FieldType::Int,
            "uint" => FieldType::UInt,
            "long" => FieldType::Long,
            "ulong" => FieldType::ULong,
            "short" => FieldType::Short,
            "ushort" => FieldType::UShort,
            "byte" => FieldType::Byte,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            "bool" => FieldType::Bool,
            "string" => FieldType::String,
            lower if lower.starts_with(ENUM_PREFIX) && tag.len() > ENUM_PREFIX.len() => {
                FieldType::Enum(tag[ENUM_PREFIX.len()..].to_string())
            }
            _ => FieldType::Unsupported(tag.to_string()),
        };
        Ok(parsed)
    }
}

impl From<String> for FieldType {
    fn from(raw: String) -> Self {
        match raw.parse() {
            Ok(ty) => ty,
            Err(never) => match never {},
        }
    }
}

impl From<&str> for FieldType {
    fn from(raw: &str) -> Self {
        FieldType::from(raw.to_string())
    }
}

impl From<FieldType> for String {
    fn from(ty: FieldType) -> Self {
        ty.to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => f.write_str("int"),
            FieldType::UInt => f.write_str("uint"),
            FieldType::Long => f.write_str("long"),
            FieldType::ULong => f.write_str("ulong"),
            FieldType::Short => f.write_str("short"),
            FieldType::UShort => f.write_str("ushort"),
            FieldType::Byte => f.write_str("byte"),
            FieldType::Float => f.write_str("float"),
            FieldType::Double => f.write_str("double"),
            FieldType::Bool => f.write_str("bool"),
            FieldType::String => f.write_str("string"),
            FieldType::Enum(name) => write!(f, "{ENUM_PREFIX}{name}"),
            FieldType::Unsupported(raw) => f.write_str(raw),
        }
    }
}
