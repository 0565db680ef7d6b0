//! Sheetforge command-line interface
//!
//! Converts a directory of workbooks into schema documents, encrypted table
//! artifacts and a manifest.
//!
//! # Usage
//!
//! ```bash
//! # Local run with the development key
//! sheetforge -i tables -o build/data -s schemas --dev
//!
//! # Release run; the key comes from SHEETFORGE_ENCRYPTION_KEY
//! sheetforge -i tables -o build/data -s schemas -r 42
//!
//! # Check what would change without writing anything
//! sheetforge -i tables -s schemas --dev --read-only
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind;
use sheetforge_core::key::KeySource;
use sheetforge_data::{ExitStatus, PipelineConfig, PipelineError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::load_config;

/// Sheetforge table converter
#[derive(Parser, Debug)]
#[command(
    name = "sheetforge",
    version,
    about = "Convert spreadsheet tables into versioned schemas and encrypted binaries"
)]
struct Args {
    /// Directory containing the workbook files
    #[arg(short = 'i', long, value_name = "DIR")]
    input: Option<PathBuf>,

    /// Directory for artifacts and the manifest
    #[arg(short = 'o', long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Directory holding the {Table}.Schema.json documents
    #[arg(short = 's', long, value_name = "DIR")]
    schema_dir: Option<PathBuf>,

    /// Revision number recorded in the manifest
    #[arg(short = 'r', long)]
    revision: Option<u32>,

    /// Number of header rows before the first data row
    #[arg(long)]
    header_rows: Option<usize>,

    /// Zero-based row holding the field names
    #[arg(long)]
    name_row: Option<usize>,

    /// Zero-based row holding the field types
    #[arg(long)]
    type_row: Option<usize>,

    /// Apply field type changes instead of refusing them
    #[arg(long)]
    force: bool,

    /// Compute everything but write nothing
    #[arg(long)]
    read_only: bool,

    /// Use the fixed development key (never for shipped data)
    #[arg(long, conflicts_with = "encryption_key")]
    dev: bool,

    /// Base64 AES-256 key (use SHEETFORGE_ENCRYPTION_KEY env var for security)
    #[arg(
        short = 'k',
        long,
        env = "SHEETFORGE_ENCRYPTION_KEY",
        hide_env_values = true
    )]
    encryption_key: Option<String>,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Args {
    /// Command-line flags win over the config file.
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(dir) = self.input {
            config.input_dir = dir;
        }
        if let Some(dir) = self.output {
            config.output_dir = dir;
        }
        if let Some(dir) = self.schema_dir {
            config.schema_dir = dir;
        }
        if let Some(revision) = self.revision {
            config.revision = revision;
        }
        if let Some(rows) = self.header_rows {
            config.layout.header_rows = rows;
        }
        if let Some(row) = self.name_row {
            config.layout.name_row = row;
        }
        if let Some(row) = self.type_row {
            config.layout.type_row = row;
        }
        config.force_type_overwrite |= self.force;
        config.read_only |= self.read_only;
        if self.dev {
            config.key = KeySource::Development;
        } else if let Some(key) = self.encryption_key {
            config.key = KeySource::Production(key);
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => exit(ExitStatus::InvalidArguments),
            };
        }
    };

    init_logging(args.verbose);

    let config = match load(args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return exit(ExitStatus::InvalidArguments);
        }
    };

    match sheetforge_data::run(&config) {
        Ok(report) => {
            info!(
                tables = report.results.len(),
                artifacts = report.artifacts.len(),
                revision = report.manifest.revision,
                "conversion finished"
            );
            exit(ExitStatus::Success)
        }
        Err(e) => {
            report_failure(&e);
            exit(e.exit_status())
        }
    }
}

fn load(args: Args) -> Result<PipelineConfig> {
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);
    Ok(config)
}

fn exit(status: ExitStatus) -> ExitCode {
    ExitCode::from(status.code())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("sheetforge=debug,sheetforge_data=debug,sheetforge_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn report_failure(err: &PipelineError) {
    match err {
        PipelineError::Schema(results) => {
            for result in results {
                error!("Error in schema {}:", result.table());
                for diagnostic in &result.diagnostics {
                    error!("  {diagnostic}");
                }
            }
        }
        PipelineError::Binary(failures) => {
            for failure in failures {
                error!("Failed to generate {}: {}", failure.file_name, failure.message);
            }
        }
        _ => {}
    }
    error!("{err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("sheetforge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_config() {
        let mut config = PipelineConfig {
            revision: 3,
            ..PipelineConfig::default()
        };
        parse(&["-i", "tables", "-r", "9", "--header-rows", "4", "--dev", "--force"])
            .apply(&mut config);
        assert_eq!(config.input_dir, PathBuf::from("tables"));
        assert_eq!(config.revision, 9);
        assert_eq!(config.layout.header_rows, 4);
        assert!(config.force_type_overwrite);
        assert_eq!(config.key, KeySource::Development);
    }

    #[test]
    fn unset_flags_keep_config_values() {
        let mut config = PipelineConfig {
            revision: 3,
            read_only: true,
            ..PipelineConfig::default()
        };
        parse(&[]).apply(&mut config);
        assert_eq!(config.revision, 3);
        assert!(config.read_only);
    }

    #[test]
    fn explicit_key_becomes_production_source() {
        let mut config = PipelineConfig::default();
        parse(&["-k", "c2VjcmV0"]).apply(&mut config);
        assert_eq!(config.key, KeySource::Production("c2VjcmV0".into()));
    }

    #[test]
    fn dev_and_key_conflict() {
        let result =
            Args::try_parse_from(["sheetforge", "--dev", "--encryption-key", "abc"]);
        assert!(result.is_err());
    }
}
