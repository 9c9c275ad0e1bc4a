//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    archive::ArchiveArgs, completions::CompletionsArgs, config::ConfigCommands,
    extract::ExtractArgs, import::ImportArgs, init::InitArgs, seed::SeedArgs, slugs::SlugsArgs,
};

#[derive(Parser)]
#[command(name = "catalog-ingest")]
#[command(author, version, about = "Bulk ingestion for an online course catalog")]
#[command(long_about = "Loads courses, course runs, degrees, course editors, geolocations, \
geotargeting restrictions and product values from CSV files or spreadsheet tabs into a catalog \
store, keeping draft and official records in step.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Workspace root (default: auto-detect by finding .catalog/)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new catalog workspace
    Init(InitArgs),

    /// Load reference data from a YAML seed file
    Seed(SeedArgs),

    /// Run a loader over a CSV file or spreadsheet tab
    Import(ImportArgs),

    /// Archive courses by uuid or course type
    Archive(ArchiveArgs),

    /// Migrate course url slugs from a CSV file
    Slugs(SlugsArgs),

    /// Write the product catalog CSV
    Extract(ExtractArgs),

    /// Show configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable markers and summary tables
    #[default]
    Auto,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
}
