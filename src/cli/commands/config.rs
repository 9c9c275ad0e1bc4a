//! `catalog-ingest config` command - inspect configuration

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::load_config;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::IngestionConfig;
use crate::core::workspace::Workspace;
use crate::schema::validator::SeedValidator;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Show paths to configuration files
    Path,

    /// Print the JSON schema seed files are validated against
    Schema,
}

pub fn run(cmd: ConfigCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ConfigCommands::Show => run_show(global),
        ConfigCommands::Path => run_path(global),
        ConfigCommands::Schema => {
            let schema = SeedValidator::schema_text()
                .ok_or_else(|| miette::miette!("Seed schema is not embedded"))?;
            print!("{}", schema);
            Ok(())
        }
    }
}

/// Configuration works outside a workspace too: it then has no workspace layer
fn workspace(global: &GlobalOpts) -> Option<Workspace> {
    Workspace::resolve(global.workspace.as_deref()).ok()
}

fn run_show(global: &GlobalOpts) -> Result<()> {
    let config = load_config(workspace(global).as_ref())?;
    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config).into_diagnostic()?);
        }
        _ => print!("{}", serde_yml::to_string(&config).into_diagnostic()?),
    }
    Ok(())
}

fn run_path(global: &GlobalOpts) -> Result<()> {
    println!("{}", style("Configuration file paths:").bold());
    println!();

    match IngestionConfig::global_config_path() {
        Some(path) => print_path("Global:", &path),
        None => println!("  {} {}", style("Global:").cyan(), style("(unavailable)").dim()),
    }
    match workspace(global) {
        Some(ws) => print_path("Workspace:", &ws.config_path()),
        None => println!(
            "  {} {}",
            style("Workspace:").cyan(),
            style("(not in a workspace)").dim()
        ),
    }

    println!();
    println!("{}", style("Config sources (in priority order):").dim());
    println!("  1. Environment variables (CATALOG_PARTNER, CATALOG_HTTP_TIMEOUT_SECS, ...)");
    println!("  2. Workspace config (.catalog/config.yaml)");
    println!("  3. Global config");
    Ok(())
}

fn print_path(label: &str, path: &std::path::Path) {
    let state = if path.exists() {
        style("(exists)").green()
    } else {
        style("(not created)").dim()
    };
    println!("  {} {} {}", style(label).cyan(), path.display(), state);
}
