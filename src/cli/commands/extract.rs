//! `catalog-ingest extract` command - product catalog CSV

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::helpers::{write_file, Session};
use crate::cli::GlobalOpts;
use crate::ingest::extract::extract_catalog;
use crate::ingest::resolve_partner;

#[derive(clap::Args, Debug)]
pub struct ExtractArgs {
    /// Only courses of this course type
    #[arg(long)]
    pub product_type: Option<String>,

    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: ExtractArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let partner =
        resolve_partner(&session.catalog, &session.config).map_err(|e| miette::miette!("{}", e))?;
    let product_type = args.product_type.as_deref();

    match &args.output {
        Some(path) => {
            // Nothing is written when the extract fails
            let mut buffer = Vec::new();
            let count = extract_catalog(&session.catalog, &partner, product_type, &mut buffer)
                .map_err(|e| miette::miette!("{}", e))?;
            write_file(path, &String::from_utf8_lossy(&buffer))?;
            eprintln!(
                "{} Wrote {} product(s) to {}",
                style("✓").green(),
                style(count).bold(),
                style(path.display()).cyan()
            );
        }
        None => {
            extract_catalog(&session.catalog, &partner, product_type, std::io::stdout().lock())
                .map_err(|e| miette::miette!("{}", e))?;
        }
    }
    Ok(())
}
