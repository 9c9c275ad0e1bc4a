//! `catalog-ingest archive` command

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::cli::helpers::{parse_list, write_file, Session};
use crate::cli::table::archive_summary;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::ingest::archive::{archive_courses, ArchiveOptions, ArchiveTarget};
use crate::ingest::{read_rows, resolve_partner, RowSource};

#[derive(clap::Args, Debug)]
#[command(group(
    clap::ArgGroup::new("target")
        .required(true)
        .args(["uuids", "file", "product_type"]),
))]
pub struct ArchiveArgs {
    /// Comma separated course uuids
    #[arg(long)]
    pub uuids: Option<String>,

    /// CSV file with a `course_uuid` (or `uuid`) column
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Archive every course of this course type
    #[arg(long)]
    pub product_type: Option<String>,

    /// Clamp run end and enrollment end dates to now
    #[arg(long)]
    pub mangle_end_date: bool,

    /// Prefix course titles with `DELETED - `
    #[arg(long)]
    pub mangle_title: bool,

    /// Write the `course_uuid,title,status` CSV to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: ArchiveArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let partner =
        resolve_partner(&session.catalog, &session.config).map_err(|e| miette::miette!("{}", e))?;

    let target = if let Some(list) = &args.uuids {
        ArchiveTarget::Uuids(parse_list(list))
    } else if let Some(file) = &args.file {
        let rows = read_rows(RowSource::Path(session.input_path(file)))
            .map_err(|e| miette::miette!("{}", e))?;
        let uuids = rows
            .iter()
            .filter_map(|row| row.get("course_uuid").or_else(|| row.get("uuid")))
            .map(str::to_string)
            .collect();
        ArchiveTarget::Uuids(uuids)
    } else if let Some(product_type) = &args.product_type {
        ArchiveTarget::CourseType(product_type.clone())
    } else {
        return Err(miette::miette!(
            "Nothing to archive. Use --uuids, --file or --product-type"
        ));
    };

    let options = ArchiveOptions {
        mangle_end_date: args.mangle_end_date,
        mangle_title: args.mangle_title,
    };
    let report = archive_courses(&session.catalog, partner.id, &target, options)
        .map_err(|e| miette::miette!("{}", e))?;

    if let Some(path) = &args.report {
        write_file(path, &report.to_csv().into_diagnostic()?)?;
    }

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        OutputFormat::Csv => print!("{}", report.to_csv().into_diagnostic()?),
        OutputFormat::Auto => {
            if report.total_count > 0 {
                println!("{}", archive_summary(&report));
                println!();
            }
            let marker = if report.failures.is_empty() {
                style("✓").green()
            } else {
                style("✗").red()
            };
            println!(
                "{} Archived {} of {} course(s)",
                marker,
                style(report.successes.len()).bold(),
                report.total_count
            );
        }
    }
    Ok(())
}
