//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{BuildCommand, PlanCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Library packaging pipeline
#[derive(Debug, Parser, Clone)]
#[command(name = "bundle-pipeline")]
#[command(version)]
#[command(about = "Assembles and runs the resolve/transform/output pipeline for JS/TS libraries", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the build configuration file
    #[arg(short, long, global = true, default_value = "bundle.yaml")]
    pub config: PathBuf,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the assembled pipeline
    Plan(PlanCommand),

    /// Build the configured inputs
    Build(BuildCommand),

    /// Validate a build configuration
    Validate(ValidateCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
