//! `catalog-ingest seed` command - load reference data

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::cli::helpers::Session;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::catalog::SeedData;
use crate::schema::validator::SeedValidator;

#[derive(clap::Args, Debug)]
pub struct SeedArgs {
    /// YAML seed file
    pub file: PathBuf,

    /// Validate the file without writing to the catalog
    #[arg(long)]
    pub check: bool,
}

pub fn run(args: SeedArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let path = session.input_path(&args.file);
    let content = std::fs::read_to_string(&path)
        .map_err(|e| miette::miette!("Failed to read {}: {}", path.display(), e))?;

    let validator = SeedValidator::new().map_err(|e| miette::miette!("{}", e))?;
    validator.validate(&content, &path.display().to_string())?;

    if args.check {
        println!(
            "{} {} is a valid seed document",
            style("✓").green(),
            style(path.display()).cyan()
        );
        return Ok(());
    }

    let data = SeedData::from_yaml(&content).map_err(|e| miette::miette!("{}", e))?;
    let stats = session
        .catalog
        .apply_seed(&data)
        .map_err(|e| miette::miette!("Seeding failed: {}", e))?;

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats).into_diagnostic()?);
        }
        _ => {
            println!(
                "{} Seeded {} from {}",
                style("✓").green(),
                style(session.workspace.root().display()).cyan(),
                style(path.display()).yellow()
            );
            let counts = serde_json::to_value(&stats).into_diagnostic()?;
            if let Some(map) = counts.as_object() {
                for (kind, count) in map {
                    if count.as_u64().unwrap_or(0) > 0 {
                        println!("  {} {}", style(count).bold(), kind.replace('_', " "));
                    }
                }
            }
        }
    }
    Ok(())
}
