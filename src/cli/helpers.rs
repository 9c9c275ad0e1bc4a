//! Shared helper functions for CLI commands

use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result};

use crate::cli::GlobalOpts;
use crate::core::catalog::Catalog;
use crate::core::config::IngestionConfig;
use crate::core::workspace::Workspace;

/// An opened workspace with its effective configuration and catalog
pub struct Session {
    pub workspace: Workspace,
    pub config: IngestionConfig,
    pub catalog: Catalog,
}

impl Session {
    /// Discover (or use `--workspace`) and open everything a command needs
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let workspace =
            Workspace::resolve(global.workspace.as_deref()).map_err(|e| miette::miette!("{}", e))?;
        let config = load_config(Some(&workspace))?;
        let catalog = Catalog::open_workspace(&workspace).map_err(|e| miette::miette!("{}", e))?;
        Ok(Self {
            workspace,
            config,
            catalog,
        })
    }

    /// Resolve a command-line path against the current directory
    pub fn input_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            path.to_path_buf()
        } else {
            self.workspace.resolve_path(path)
        }
    }
}

/// Load the layered configuration; relative outbox paths are workspace-relative
pub fn load_config(workspace: Option<&Workspace>) -> Result<IngestionConfig> {
    let mut config = IngestionConfig::load(workspace).map_err(|e| miette::miette!("{}", e))?;
    if let (Some(workspace), Some(dir)) = (workspace, config.notification.outbox_dir.take()) {
        config.notification.outbox_dir = Some(workspace.resolve_path(&dir));
    }
    Ok(config)
}

/// Write a report file, creating parent directories
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).into_diagnostic()?;
    }
    std::fs::write(path, contents).into_diagnostic()
}

/// Split a `--uuids a,b` style list, dropping blanks
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
