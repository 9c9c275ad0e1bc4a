//! Workspace discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory that marks a workspace root
pub const WORKSPACE_DIR: &str = ".catalog";

/// An ingestion workspace: a directory holding `.catalog/`
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Root directory of the workspace (parent of .catalog/)
    root: PathBuf,
}

impl Workspace {
    /// Find workspace root by walking up from the current directory
    pub fn discover() -> Result<Self, WorkspaceError> {
        let current =
            std::env::current_dir().map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find workspace root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, WorkspaceError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;

        loop {
            if current.join(WORKSPACE_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(WorkspaceError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Resolve an explicit root, or discover one
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, WorkspaceError> {
        match explicit {
            Some(path) => Self::discover_from(path),
            None => Self::discover(),
        }
    }

    /// Create a new workspace at the given path
    pub fn init(path: &Path, force: bool) -> Result<Self, WorkspaceError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let dir = root.join(WORKSPACE_DIR);
        if dir.exists() && !force {
            return Err(WorkspaceError::AlreadyExists(root));
        }

        std::fs::create_dir_all(dir.join("outbox"))
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        std::fs::create_dir_all(dir.join("reports"))
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;

        let config_path = dir.join("config.yaml");
        if force || !config_path.exists() {
            std::fs::write(&config_path, Self::default_config())
                .map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        }

        Ok(Self { root })
    }

    fn default_config() -> &'static str {
        r#"# catalog-ingest workspace configuration

# Partner short code every ingested entity is scoped to
# partner: edx

# Product source used when a command does not name one
# default_product_source: edx

# Product types whose absent products are archived at the end of a course run
# archive_targets: [executive-education-2u]

# Spreadsheet tabs per product type and source
# product_source_mapping_table:
#   executive-education-2u:
#     ext_source:
#       sheet_id: ""
#       input_tab_id: ""

# Labels mapped to language tag codes before lookup
# language_label_map:
#   "English - United States": en-us

notification:
  outbox_dir: .catalog/outbox
"#
    }

    /// Get the workspace root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .catalog directory
    pub fn catalog_dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    /// Path of the SQLite catalog store
    pub fn database_path(&self) -> PathBuf {
        self.catalog_dir().join("catalog.db")
    }

    /// Path of the workspace configuration file
    pub fn config_path(&self) -> PathBuf {
        self.catalog_dir().join("config.yaml")
    }

    /// Directory where run reports are written by default
    pub fn reports_dir(&self) -> PathBuf {
        self.catalog_dir().join("reports")
    }

    /// Resolve a path relative to the workspace root
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Errors that can occur during workspace operations
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Not a catalog workspace (or any parent): {searched_from}. Run 'catalog-ingest init' first")]
    NotFound { searched_from: PathBuf },

    #[error("Workspace already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let workspace = Workspace::init(tmp.path(), false).unwrap();

        assert!(workspace.catalog_dir().is_dir());
        assert!(workspace.config_path().is_file());
        assert!(workspace.catalog_dir().join("outbox").is_dir());
    }

    #[test]
    fn test_init_twice_requires_force() {
        let tmp = tempdir().unwrap();
        Workspace::init(tmp.path(), false).unwrap();

        assert!(matches!(
            Workspace::init(tmp.path(), false),
            Err(WorkspaceError::AlreadyExists(_))
        ));
        assert!(Workspace::init(tmp.path(), true).is_ok());
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let tmp = tempdir().unwrap();
        Workspace::init(tmp.path(), false).unwrap();
        let nested = tmp.path().join("inputs/2025");
        std::fs::create_dir_all(&nested).unwrap();

        let found = Workspace::discover_from(&nested).unwrap();
        assert_eq!(found.root(), tmp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_discover_fails_outside_workspace() {
        let tmp = tempdir().unwrap();
        assert!(matches!(
            Workspace::discover_from(tmp.path()),
            Err(WorkspaceError::NotFound { .. })
        ));
    }
}
