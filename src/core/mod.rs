//! Core module - catalog store, identities, configuration

pub mod catalog;
pub mod config;
pub mod entity;
pub mod identity;
pub mod workflow;
pub mod workspace;

pub use catalog::{Catalog, CatalogError};
pub use config::{ConfigError, IngestionConfig};
pub use entity::{CourseRunStatus, ProductStatus};
pub use identity::{CourseKey, CourseRunKey, LoaderKind, ProductKind, RunId};
pub use workflow::{ReviewWorkflow, WorkflowError};
pub use workspace::{Workspace, WorkspaceError};
