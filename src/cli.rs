//! CLI argument parsing for Veracity

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "veracity")]
#[command(version)]
#[command(
    about = "Detect quality theater in code changes and produce signed audit evidence",
    long_about = None
)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Enable debug tracing output (to stderr)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run detectors, validation and correlation; exits 2 on high theater risk
    Analyze {
        /// Analysis request JSON, `-` for stdin
        #[arg(value_name = "REQUEST")]
        input: PathBuf,
    },

    /// Run reality validation only; exits 2 when the improvement is not genuine
    Validate {
        /// Analysis request JSON, `-` for stdin
        #[arg(value_name = "REQUEST")]
        input: PathBuf,
    },

    /// Collect evidence for a request and export a signed audit package
    Audit {
        /// Analysis request JSON, `-` for stdin
        #[arg(value_name = "REQUEST")]
        input: PathBuf,

        /// Archive to write (.tar.gz)
        #[arg(short, long, value_name = "ARCHIVE")]
        output: PathBuf,

        /// Audit scope recorded in the package
        #[arg(long, default_value = "change-review")]
        scope: String,

        /// Test run summary JSON to include as evidence
        #[arg(long, value_name = "FILE")]
        tests: Option<PathBuf>,

        /// Security scan summary JSON to include as evidence
        #[arg(long, value_name = "FILE")]
        security: Option<PathBuf>,
    },

    /// Re-verify an exported audit archive; exits 2 when verification fails
    VerifyArchive {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },
}
