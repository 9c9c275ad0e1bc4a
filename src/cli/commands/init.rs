//! `catalog-ingest init` command - create a workspace

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::Path;

use crate::core::catalog::Catalog;
use crate::core::workspace::{Workspace, WorkspaceError};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Rewrite the workspace config even if .catalog/ already exists
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
        println!(
            "{} Created directory {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
    }

    match Workspace::init(&path, args.force) {
        Ok(workspace) => {
            Catalog::open_workspace(&workspace).map_err(|e| miette::miette!("{}", e))?;
            println!(
                "{} Initialized catalog workspace at {}",
                style("✓").green(),
                style(workspace.root().display()).cyan()
            );
            println!();
            print_structure(workspace.root());
            println!();
            println!("Next steps:");
            println!(
                "  {} Load partners, organizations and types",
                style("catalog-ingest seed reference.yaml").yellow()
            );
            println!(
                "  {} Ingest a course sheet",
                style("catalog-ingest import course courses.csv").yellow()
            );
            Ok(())
        }
        Err(WorkspaceError::AlreadyExists(path)) => {
            println!(
                "{} Catalog workspace already exists at {}",
                style("!").yellow(),
                style(path.display()).cyan()
            );
            println!();
            println!(
                "Use {} to rewrite its configuration",
                style("catalog-ingest init --force").yellow()
            );
            Ok(())
        }
        Err(e) => Err(miette::miette!("{}", e)),
    }
}

fn print_structure(root: &Path) {
    let entries = [
        ".catalog/",
        ".catalog/config.yaml",
        ".catalog/catalog.db",
        ".catalog/outbox/",
        ".catalog/reports/",
    ];

    for entry in entries {
        if root.join(entry).exists() {
            let prefix = if entry.ends_with('/') { "📁" } else { "📄" };
            println!("  {} {}", prefix, style(entry).dim());
        }
    }
}
