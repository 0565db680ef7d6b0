//! Length-prefixed container framing shared by every artifact payload.
//!
//! ```text
//! RecordCount: u32 LE
//! RecordCount x { RecordLength: u32 LE, RecordBytes: RecordLength bytes }
//! ```
//!
//! In the string table artifact each record is the UTF-8 bytes of one
//! string, in id order.

use crate::string_table::{StringTable, StringTableError};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors while framing or unframing a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    #[error("truncated payload: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("{len} unexpected trailing bytes at offset {offset}")]
    TrailingBytes { offset: usize, len: usize },
    #[error("length {0} does not fit in a 32-bit length prefix")]
    TooLarge(usize),
    #[error("string {index} is not valid UTF-8")]
    InvalidUtf8 { index: usize },
    #[error("invalid string table: {0}")]
    StringTable(#[from] StringTableError),
}

// ---------------------------------------------------------------------------
// Primitive helpers
// ---------------------------------------------------------------------------

pub(crate) fn len_prefix(len: usize) -> Result<[u8; 4], ContainerError> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| ContainerError::TooLarge(len))
}

/// Cursor over a little-endian payload.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], ContainerError> {
        let available = self.data.len() - self.pos;
        if len > available {
            return Err(ContainerError::Truncated {
                offset: self.pos,
                needed: len,
                available,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, ContainerError> {
        let raw = self.bytes(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub(crate) fn finish(self) -> Result<(), ContainerError> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(ContainerError::TrailingBytes {
                offset: self.pos,
                len: self.data.len() - self.pos,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// Frame a sequence of records.
pub fn encode_container<R: AsRef<[u8]>>(records: &[R]) -> Result<Vec<u8>, ContainerError> {
    let body: usize = records.iter().map(|r| 4 + r.as_ref().len()).sum();
    let mut out = Vec::with_capacity(4 + body);
    out.extend_from_slice(&len_prefix(records.len())?);
    for record in records {
        let bytes = record.as_ref();
        out.extend_from_slice(&len_prefix(bytes.len())?);
        out.extend_from_slice(bytes);
    }
    Ok(out)
}

/// Split a framed payload back into its records.
pub fn decode_container(data: &[u8]) -> Result<Vec<&[u8]>, ContainerError> {
    let mut reader = Reader::new(data);
    let count = reader.u32()? as usize;
    // Each record needs at least its length prefix; cap the allocation so a
    // corrupt count cannot request more than the payload could hold.
    let mut records = Vec::with_capacity(count.min(data.len() / 4));
    for _ in 0..count {
        let len = reader.u32()? as usize;
        records.push(reader.bytes(len)?);
    }
    reader.finish()?;
    Ok(records)
}

// ---------------------------------------------------------------------------
// String table payload
// ---------------------------------------------------------------------------

/// Frame the string table: one record of UTF-8 bytes per string, id order.
pub fn encode_string_table(table: &StringTable) -> Result<Vec<u8>, ContainerError> {
    encode_container(table.as_slice())
}

/// Read a string table payload back into a frozen table.
pub fn decode_string_table(data: &[u8]) -> Result<StringTable, ContainerError> {
    let strings = decode_container(data)?
        .into_iter()
        .enumerate()
        .map(|(index, bytes)| {
            std::str::from_utf8(bytes)
                .map(str::to_string)
                .map_err(|_| ContainerError::InvalidUtf8 { index })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StringTable::from_strings(strings)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
