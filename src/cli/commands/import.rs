//! `catalog-ingest import` command - run a loader over a CSV file or sheet tab

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::cli::helpers::{write_file, Session};
use crate::cli::table::ingestion_summary;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::SheetLocator;
use crate::core::identity::LoaderKind;
use crate::ingest::loaders::{self, LoaderOptions};
use crate::ingest::report::IngestionReport;
use crate::ingest::{read_rows, run as run_ingestion, IngestionContext, RowSource};
use crate::schema::template::csv_template;

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Loader to run
    #[arg(value_enum)]
    pub loader: LoaderKind,

    /// CSV file to ingest (`-` reads stdin)
    pub file: Option<PathBuf>,

    /// Spreadsheet to read instead of a file
    #[arg(long, requires = "tab_id", conflicts_with = "file")]
    pub sheet_id: Option<String>,

    /// Worksheet tab id within --sheet-id
    #[arg(long, requires = "sheet_id")]
    pub tab_id: Option<String>,

    /// Course type slug the course loader defaults to
    #[arg(long)]
    pub product_type: Option<String>,

    /// Product source slug (default: the configured default source)
    #[arg(long)]
    pub product_source: Option<String>,

    /// Write the `error_key,message` CSV summary to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print the CSV header template for the loader and exit
    #[arg(long)]
    pub template: bool,
}

pub fn run(args: ImportArgs, global: &GlobalOpts) -> Result<()> {
    if args.template {
        return print_template(args.loader);
    }

    let session = Session::open(global)?;
    let ctx = IngestionContext::from_config(&session.catalog, &session.config)
        .map_err(|e| miette::miette!("{}", e))?;

    let source = row_source(&args, &session, &ctx)?;
    let rows = read_rows(source).map_err(|e| miette::miette!("{}", e))?;

    let options = LoaderOptions {
        product_type: args.product_type.clone(),
        product_source: args.product_source.clone(),
    };
    let mut loader =
        loaders::build(args.loader, &ctx, &options).map_err(|e| miette::miette!("{}", e))?;

    if global.format == OutputFormat::Auto {
        println!(
            "{} Running {} loader over {} row(s) (run {})",
            style("→").blue(),
            style(args.loader).cyan(),
            rows.len(),
            style(ctx.run_id).dim()
        );
        println!();
    }

    let report =
        run_ingestion(&ctx, loader.as_mut(), rows).map_err(|e| miette::miette!("{}", e))?;

    if let Some(path) = &args.report {
        write_file(path, &report.to_csv_string())?;
    }

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        OutputFormat::Csv => {
            report
                .write_csv(std::io::stdout())
                .into_diagnostic()?;
        }
        OutputFormat::Auto => print_report(&report, args.report.as_ref()),
    }
    Ok(())
}

/// File, explicit sheet, or the sheet configured for the product type
fn row_source<'a>(
    args: &ImportArgs,
    session: &Session,
    ctx: &'a IngestionContext<'_>,
) -> Result<RowSource<'a>> {
    if let Some(file) = &args.file {
        if file.as_os_str() == "-" {
            return Ok(RowSource::Stream(Box::new(std::io::stdin())));
        }
        return Ok(RowSource::Path(session.input_path(file)));
    }

    let locator = match (&args.sheet_id, &args.tab_id) {
        (Some(sheet_id), Some(tab_id)) => SheetLocator {
            sheet_id: sheet_id.clone(),
            input_tab_id: tab_id.clone(),
        },
        _ => {
            let product_type = args.product_type.as_deref().ok_or_else(|| {
                miette::miette!(
                    "No input given. Usage: catalog-ingest import {} FILE, or --sheet-id/--tab-id, or --product-type with a configured sheet",
                    args.loader
                )
            })?;
            let source = args
                .product_source
                .as_deref()
                .unwrap_or(&session.config.default_product_source);
            session
                .config
                .sheet_for(product_type, source)
                .cloned()
                .ok_or_else(|| {
                    miette::miette!(
                        "No sheet configured for product type '{}' and source '{}'",
                        product_type,
                        source
                    )
                })?
        }
    };

    Ok(RowSource::Sheet {
        client: ctx.services.sheets.as_ref(),
        locator,
    })
}

fn print_template(kind: LoaderKind) -> Result<()> {
    let template = csv_template(kind)
        .ok_or_else(|| miette::miette!("No CSV template for the {} loader", kind))?;
    print!("{}", template);

    // Usage hint goes to stderr so redirected output stays a clean CSV
    eprintln!();
    eprintln!(
        "{} Template generated. Redirect to file: catalog-ingest import {} --template > {}.csv",
        style("→").blue(),
        kind,
        kind
    );
    Ok(())
}

fn print_report(report: &IngestionReport, report_path: Option<&PathBuf>) {
    for product in &report.created_products {
        println!(
            "{} Created {} {}",
            style("✓").green(),
            style(&product.key).cyan(),
            style(&product.title).dim()
        );
    }
    for external_id in &report.archived_products {
        println!("{} Archived {}", style("•").yellow(), style(external_id).cyan());
    }
    for (key, messages) in report.errors.ordered() {
        for message in messages {
            println!("{} {} {}", style("✗").red(), style(key).red(), message);
        }
    }
    for message in &report.others {
        println!("{} {}", style("!").yellow(), message);
    }

    println!();
    println!("{}", ingestion_summary(report));

    if let Some(path) = report_path {
        println!();
        println!(
            "{} Report written to {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
    }
}
