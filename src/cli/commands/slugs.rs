//! `catalog-ingest slugs` command - bulk url slug migration

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::cli::helpers::{write_file, Session};
use crate::cli::table::slug_failures;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::ingest::slugs::update_slugs;
use crate::ingest::{read_rows, resolve_partner, RowSource};

#[derive(clap::Args, Debug)]
pub struct SlugsArgs {
    /// CSV file with `course_uuid,new_slug` columns
    pub file: PathBuf,

    /// Write the `course_uuid,old_slug,new_slug,error` CSV to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: SlugsArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let partner =
        resolve_partner(&session.catalog, &session.config).map_err(|e| miette::miette!("{}", e))?;
    let rows = read_rows(RowSource::Path(session.input_path(&args.file)))
        .map_err(|e| miette::miette!("{}", e))?;

    let report = update_slugs(&session.catalog, partner.id, &rows);

    if let Some(path) = &args.report {
        write_file(path, &report.to_csv().into_diagnostic()?)?;
    }

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        OutputFormat::Csv => print!("{}", report.to_csv().into_diagnostic()?),
        OutputFormat::Auto => {
            println!(
                "{} Updated {} course url slug(s)",
                style("✓").green(),
                style(report.updated).bold()
            );
            if !report.failures.is_empty() {
                println!(
                    "{} {} row(s) failed",
                    style("✗").red(),
                    style(report.failures.len()).bold()
                );
                println!("{}", slug_failures(&report));
            }
        }
    }
    Ok(())
}
