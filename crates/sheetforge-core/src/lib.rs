//! Sheetforge Core -- schema reconciliation and binary packaging for
//! spreadsheet-authored game data.
//!
//! Designers author tables as sheets. This crate turns them into versioned
//! schema contracts and encrypted, field-tagged binary artifacts that a
//! runtime loader reads without knowing the spreadsheet ever existed.
//!
//! # Pipeline
//!
//! 1. **Snapshot** -- Read the header rows of a sheet into an
//!    [`snapshot::ObservedSchema`].
//! 2. **Reconcile** -- Merge the snapshot into the persisted
//!    [`schema::SchemaTemplate`]: stable field ids, deprecation instead of
//!    deletion, refused type changes, version bumps.
//! 3. **String table** -- Collect every string cell of every table into a
//!    [`string_table::StringTableBuilder`], then freeze it.
//! 4. **Encode** -- [`record::RecordEncoder`] writes each row as
//!    `(FieldId, Length, Value)` triples inside a length-prefixed container.
//! 5. **Seal** -- [`artifact::seal`] gzips, encrypts with AES-256-GCM and
//!    hashes the result for the [`manifest::Manifest`].
//!
//! File access lives in `sheetforge-data`; everything here is pure.
//!
//! # Key Types
//!
//! - [`schema::SchemaTemplate`] -- The persisted contract for one table.
//! - [`reconcile::ReconciliationResult`] -- Action, schema and diagnostics
//!   for one table in one run.
//! - [`source::TabularSource`] -- Read access to a sheet of typed cells.
//! - [`string_table::StringTable`] -- Frozen, deduplicated string pool.
//! - [`key::EncryptionKey`] -- The run's AES-256 key.

pub mod artifact;
pub mod container;
pub mod field_type;
pub mod id;
pub mod key;
pub mod manifest;
pub mod reconcile;
pub mod record;
pub mod schema;
pub mod snapshot;
pub mod source;
pub mod string_table;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
