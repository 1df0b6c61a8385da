//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// infraguard -- integration test runner for OpenTofu modules on GCP.
///
/// Use `infraguard <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "infraguard", version, about, long_about = None)]
pub struct Cli {
    /// Path to the infraguard.toml configuration file.
    #[arg(short, long, global = true, default_value = "infraguard.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run integration test cases.
    Run(RunArgs),

    /// List the test catalogue.
    List(ListArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

/// Run selected cases in sequence, always tearing down what they created.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Case names (`suite/case`). Combine with --suite or use --all.
    pub cases: Vec<String>,

    /// Run every case of a suite.
    #[arg(long)]
    pub suite: Option<String>,

    /// Run the whole catalogue.
    #[arg(long, conflicts_with_all = ["cases", "suite"])]
    pub all: bool,

    /// Test timeout (e.g. 30m, 1h30m, 600). 0 means unlimited.
    #[arg(long)]
    pub timeout: Option<String>,

    /// Skip slow cases.
    #[arg(long)]
    pub short: bool,

    /// Include end-to-end cases.
    #[arg(long)]
    pub e2e: bool,
}

// ---- list ----

/// Print the test catalogue.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show one suite.
    #[arg(long)]
    pub suite: Option<String>,
}

// ---- config ----

/// Manage infraguard configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, gcp, tofu, workspace, timeouts).
        section: Option<String>,
    },
}
