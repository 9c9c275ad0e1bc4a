//! Ingestion configuration with layered hierarchy
//!
//! Built-in defaults, then the global user file, then the workspace
//! `.catalog/config.yaml`, then environment variables. Each file layer is a
//! partial document; fields it sets override the layers below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::entity::course_type;
use crate::core::workspace::Workspace;

/// User agent sent to image CDNs, several of which reject non-browser agents
pub const DEFAULT_IMAGE_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/101.0.4951.54 Safari/537.36";

/// Errors while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Spreadsheet tab a product source publishes its rows in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLocator {
    pub sheet_id: String,
    pub input_tab_id: String,
}

/// How the internal course API is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CourseApiMode {
    /// Apply envelopes to the local catalog store
    #[default]
    Local,
    /// Send envelopes to a running catalog service
    Http,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseApiConfig {
    pub mode: CourseApiMode,
    pub base_url: Option<String>,
    pub token: Option<String>,
}

/// A remote collaborator that may be switched off
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketingConfig {
    pub enabled: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchIndexConfig {
    pub enabled: bool,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sheets.googleapis.com".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub recipients: Vec<String>,
    pub outbox_dir: Option<PathBuf>,
}

/// Effective configuration handed to every loader
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionConfig {
    pub partner: String,
    pub default_product_source: String,
    pub product_source_mapping_table: BTreeMap<String, BTreeMap<String, SheetLocator>>,
    pub degree_variant_fields_by_source: BTreeMap<String, Vec<String>>,
    pub legal_review_required_fields: Vec<String>,
    pub language_label_map: BTreeMap<String, String>,
    pub program_types_allowlist: Vec<String>,
    pub archive_targets: Vec<String>,
    pub image_user_agent: String,
    pub http_timeout_secs: u64,
    pub course_api: CourseApiConfig,
    pub studio: ServiceConfig,
    pub marketing: MarketingConfig,
    pub salesforce: ServiceConfig,
    pub search_index: SearchIndexConfig,
    pub sheets: SheetsConfig,
    pub notification: NotificationConfig,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            partner: "edx".to_string(),
            default_product_source: "edx".to_string(),
            product_source_mapping_table: BTreeMap::new(),
            degree_variant_fields_by_source: BTreeMap::new(),
            legal_review_required_fields: [
                "image",
                "long_description",
                "short_description",
                "what_will_you_learn",
                "course_level",
                "primary_subject",
                "publish_date",
                "minimum_effort",
                "maximum_effort",
                "length",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            language_label_map: BTreeMap::new(),
            program_types_allowlist: vec![
                "masters".to_string(),
                "professional certificate".to_string(),
                "micromasters".to_string(),
                "xseries".to_string(),
                "microbachelors".to_string(),
            ],
            archive_targets: vec![
                course_type::EXECUTIVE_EDUCATION_2U.to_string(),
                course_type::BOOTCAMP_2U.to_string(),
            ],
            image_user_agent: DEFAULT_IMAGE_USER_AGENT.to_string(),
            http_timeout_secs: 30,
            course_api: CourseApiConfig::default(),
            studio: ServiceConfig::default(),
            marketing: MarketingConfig::default(),
            salesforce: ServiceConfig::default(),
            search_index: SearchIndexConfig::default(),
            sheets: SheetsConfig::default(),
            notification: NotificationConfig::default(),
        }
    }
}

/// One configuration layer as read from a file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub partner: Option<String>,
    pub default_product_source: Option<String>,
    pub product_source_mapping_table: Option<BTreeMap<String, BTreeMap<String, SheetLocator>>>,
    pub degree_variant_fields_by_source: Option<BTreeMap<String, Vec<String>>>,
    pub legal_review_required_fields: Option<Vec<String>>,
    pub language_label_map: Option<BTreeMap<String, String>>,
    pub program_types_allowlist: Option<Vec<String>>,
    pub archive_targets: Option<Vec<String>>,
    pub image_user_agent: Option<String>,
    pub http_timeout_secs: Option<u64>,
    pub course_api: Option<CourseApiConfig>,
    pub studio: Option<ServiceConfig>,
    pub marketing: Option<MarketingConfig>,
    pub salesforce: Option<ServiceConfig>,
    pub search_index: Option<SearchIndexConfig>,
    pub sheets: Option<SheetsConfig>,
    pub notification: Option<NotificationConfig>,
}

impl IngestionConfig {
    /// Load configuration from all sources, merging in priority order
    pub fn load(workspace: Option<&Workspace>) -> Result<Self, ConfigError> {
        let mut config = IngestionConfig::default();

        // Global user config (~/.config/catalog-ingest/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                config.merge(Self::read_layer(&global_path)?);
            }
        }

        // Workspace config (.catalog/config.yaml)
        if let Some(workspace) = workspace {
            let path = workspace.config_path();
            if path.exists() {
                config.merge(Self::read_layer(&path)?);
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Read a single layer from a YAML file
    pub fn read_layer(path: &Path) -> Result<ConfigLayer, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Ok(ConfigLayer::default());
        }
        serde_yml::from_str::<ConfigLayer>(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "catalog-ingest")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn apply_env(&mut self) {
        if let Ok(partner) = std::env::var("CATALOG_PARTNER") {
            self.partner = partner;
        }
        if let Ok(source) = std::env::var("CATALOG_DEFAULT_PRODUCT_SOURCE") {
            self.default_product_source = source;
        }
        if let Ok(agent) = std::env::var("CATALOG_IMAGE_USER_AGENT") {
            self.image_user_agent = agent;
        }
        if let Some(secs) = std::env::var("CATALOG_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.http_timeout_secs = secs;
        }
        if let Ok(key) = std::env::var("CATALOG_SHEETS_API_KEY") {
            self.sheets.api_key = Some(key);
        }
        if let Ok(token) = std::env::var("CATALOG_STUDIO_TOKEN") {
            self.studio.token = Some(token);
        }
        if let Ok(password) = std::env::var("CATALOG_MARKETING_PASSWORD") {
            self.marketing.password = Some(password);
        }
    }

    /// Merge a layer into this config (layer takes precedence)
    pub fn merge(&mut self, layer: ConfigLayer) {
        if let Some(partner) = layer.partner {
            self.partner = partner;
        }
        if let Some(source) = layer.default_product_source {
            self.default_product_source = source;
        }
        if let Some(table) = layer.product_source_mapping_table {
            for (product_type, sources) in table {
                self.product_source_mapping_table
                    .entry(product_type)
                    .or_default()
                    .extend(sources);
            }
        }
        if let Some(variants) = layer.degree_variant_fields_by_source {
            self.degree_variant_fields_by_source.extend(variants);
        }
        if let Some(fields) = layer.legal_review_required_fields {
            self.legal_review_required_fields = fields;
        }
        if let Some(labels) = layer.language_label_map {
            self.language_label_map.extend(labels);
        }
        if let Some(allowlist) = layer.program_types_allowlist {
            self.program_types_allowlist = allowlist;
        }
        if let Some(targets) = layer.archive_targets {
            self.archive_targets = targets;
        }
        if let Some(agent) = layer.image_user_agent {
            self.image_user_agent = agent;
        }
        if let Some(secs) = layer.http_timeout_secs {
            self.http_timeout_secs = secs;
        }
        if let Some(course_api) = layer.course_api {
            self.course_api = course_api;
        }
        if let Some(studio) = layer.studio {
            self.studio = studio;
        }
        if let Some(marketing) = layer.marketing {
            self.marketing = marketing;
        }
        if let Some(salesforce) = layer.salesforce {
            self.salesforce = salesforce;
        }
        if let Some(search_index) = layer.search_index {
            self.search_index = search_index;
        }
        if let Some(sheets) = layer.sheets {
            self.sheets = sheets;
        }
        if let Some(notification) = layer.notification {
            self.notification = notification;
        }
    }

    /// Sheet configured for a product type and source
    pub fn sheet_for(&self, product_type: &str, source: &str) -> Option<&SheetLocator> {
        self.product_source_mapping_table
            .get(product_type)
            .and_then(|sources| sources.get(source))
    }

    /// Extra degree fields required for a product source
    pub fn degree_variant_fields(&self, source: &str) -> &[String] {
        self.degree_variant_fields_by_source
            .get(source)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_archive_target(&self, product_type: &str) -> bool {
        self.archive_targets.iter().any(|t| t == product_type)
    }

    /// Expected program type if it is on the allowlist
    pub fn allowed_program_type(&self, value: &str) -> Option<String> {
        let needle = value.trim().to_lowercase();
        self.program_types_allowlist
            .iter()
            .find(|t| t.to_lowercase() == needle)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = IngestionConfig::default();
        assert_eq!(config.default_product_source, "edx");
        assert!(config
            .legal_review_required_fields
            .contains(&"primary_subject".to_string()));
        assert_eq!(config.course_api.mode, CourseApiMode::Local);
        assert!(config.image_user_agent.contains("Chrome/101"));
    }

    #[test]
    fn test_layer_overrides_only_present_fields() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(
            &path,
            "default_product_source: ext_source\narchive_targets: [executive-education-2u]\n",
        )
        .unwrap();

        let mut config = IngestionConfig::default();
        config.merge(IngestionConfig::read_layer(&path).unwrap());

        assert_eq!(config.default_product_source, "ext_source");
        assert!(config.is_archive_target("executive-education-2u"));
        assert!(!config.is_archive_target("bootcamp-2u"));
        assert_eq!(config.partner, "edx");
        assert_eq!(config.http_timeout_secs, 30);
    }

    #[test]
    fn test_mapping_table_merges_per_product_type() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
product_source_mapping_table:
  executive-education-2u:
    ext_source:
      sheet_id: abc
      input_tab_id: "0"
degree_variant_fields_by_source:
  ext_source: [taxi_form_id]
"#,
        )
        .unwrap();

        let mut config = IngestionConfig::default();
        config.merge(IngestionConfig::read_layer(&path).unwrap());

        let sheet = config
            .sheet_for("executive-education-2u", "ext_source")
            .unwrap();
        assert_eq!(sheet.sheet_id, "abc");
        assert_eq!(config.degree_variant_fields("ext_source"), ["taxi_form_id"]);
        assert!(config.degree_variant_fields("edx").is_empty());
    }

    #[test]
    fn test_invalid_layer_reports_path() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "archive_targets: {not: [a list").unwrap();

        let err = IngestionConfig::read_layer(&path).unwrap_err();
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn test_allowed_program_type_is_case_insensitive() {
        let config = IngestionConfig::default();
        assert_eq!(
            config.allowed_program_type("MicroMasters"),
            Some("micromasters".to_string())
        );
        assert_eq!(config.allowed_program_type("bundle"), None);
    }
}
