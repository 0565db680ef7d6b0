//! Sheetforge Data -- the file-backed side of a conversion run.
//!
//! Reads workbook files (RON, JSON or TOML) into sheets, keeps the schema
//! documents, writes artifacts and the manifest atomically, and drives the
//! whole run through [`pipeline::run`].

pub mod loader;
pub mod pipeline;
pub mod store;
pub mod workbook;

pub use loader::DataLoadError;
pub use pipeline::{ExitStatus, PipelineConfig, PipelineError, RunReport, run};
