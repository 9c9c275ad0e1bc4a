//! Embedded text templates: run notifications and CSV header templates

use rust_embed::Embed;
use serde::Serialize;
use tera::Tera;
use thiserror::Error;

use crate::core::identity::LoaderKind;
use crate::ingest::report::IngestionReport;

#[derive(Embed)]
#[folder = "templates/"]
struct EmbeddedTemplates;

const NOTIFICATION_TEMPLATE: &str = "notification.txt.tera";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template rendering error: {0}")]
    RenderError(String),
}

/// One error key of the notification, in ledger order
#[derive(Serialize)]
struct ErrorEntry<'a> {
    key: &'static str,
    messages: &'a [String],
}

/// Tera renderer over the embedded `.tera` templates
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self, TemplateError> {
        let mut tera = Tera::default();

        for file in EmbeddedTemplates::iter() {
            let filename = file.as_ref();
            if !filename.ends_with(".tera") {
                continue;
            }
            if let Some(content) = EmbeddedTemplates::get(filename) {
                if let Ok(template_str) = std::str::from_utf8(&content.data) {
                    tera.add_raw_template(filename, template_str)
                        .map_err(|e| TemplateError::RenderError(e.to_string()))?;
                }
            }
        }

        Ok(Self { tera })
    }

    /// Plain-text body of the run summary mail
    pub fn notification(&self, report: &IngestionReport, run_id: &str) -> Result<String, TemplateError> {
        if !self
            .tera
            .get_template_names()
            .any(|n| n == NOTIFICATION_TEMPLATE)
        {
            return Err(TemplateError::NotFound(NOTIFICATION_TEMPLATE.to_string()));
        }

        let mut context = tera::Context::from_serialize(report)
            .map_err(|e| TemplateError::RenderError(e.to_string()))?;
        // The serialized ledger is a map and would lose its sequence order.
        let errors: Vec<ErrorEntry<'_>> = report
            .errors
            .ordered()
            .into_iter()
            .map(|(key, messages)| ErrorEntry {
                key: key.as_str(),
                messages,
            })
            .collect();
        context.insert("errors", &errors);
        context.insert("run_id", run_id);

        self.tera
            .render(NOTIFICATION_TEMPLATE, &context)
            .map_err(|e| TemplateError::RenderError(e.to_string()))
    }
}

/// Render the run summary mail body
pub fn render_notification(report: &IngestionReport, run_id: &str) -> Result<String, TemplateError> {
    TemplateRenderer::new()?.notification(report, run_id)
}

/// The CSV header line a loader expects
pub fn csv_template(kind: LoaderKind) -> Option<String> {
    EmbeddedTemplates::get(&format!("{}.csv", kind.as_str()))
        .map(|file| String::from_utf8_lossy(&file.data).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::normalize::normalize_key;
    use crate::ingest::report::{CreatedProduct, ErrorKey, RowFailure};
    use crate::ingest::validator::{
        COURSE_REQUIRED_FIELDS, DEGREE_REQUIRED_FIELDS, EDITOR_REQUIRED_FIELDS,
        GEOLOCATION_REQUIRED_FIELDS, GEOTARGETING_REQUIRED_FIELDS, PRODUCT_VALUE_FIELDS,
        PRODUCT_VALUE_REQUIRED_FIELDS,
    };

    fn sample_report() -> IngestionReport {
        let mut report = IngestionReport::new(LoaderKind::Course, 3);
        report.created(CreatedProduct {
            uuid: "0b5c7c31-7d1a-4b0e-9d0e-6a1b2c3d4e5f".to_string(),
            title: "Intro Bio".to_string(),
            key: "edx+BIO101".to_string(),
            variant_id: None,
            restriction_type: None,
            url_slug: Some("intro-bio".to_string()),
            external_course_marketing_type: None,
            rerun: false,
            is_future_variant: false,
        });
        report.fail(RowFailure::new(
            ErrorKey::CourseUpdateError,
            "update failed",
        ));
        report.fail(RowFailure::new(
            ErrorKey::MissingOrganization,
            "no such org",
        ));
        report
    }

    #[test]
    fn test_notification_lists_errors_in_sequence() {
        let body = render_notification(&sample_report(), "01HZX").unwrap();

        assert!(body.starts_with("course ingestion run 01HZX finished."));
        assert!(body.contains("Failed: 2"));
        assert!(body.contains("  - Intro Bio [0b5c7c31-7d1a-4b0e-9d0e-6a1b2c3d4e5f] (edx+BIO101)"));
        let org = body.find("MISSING_ORGANIZATION (1)").unwrap();
        let update = body.find("COURSE_UPDATE_ERROR (1)").unwrap();
        assert!(org < update);
    }

    #[test]
    fn test_clean_run_notification() {
        let report = IngestionReport::new(LoaderKind::Editor, 0);
        let body = render_notification(&report, "01HZY").unwrap();
        assert!(body.contains("No errors reported in the ingestion."));
        assert!(!body.contains("New products:"));
    }

    #[test]
    fn test_csv_templates_cover_required_fields() {
        let required: [(LoaderKind, &[&str]); 6] = [
            (LoaderKind::Course, COURSE_REQUIRED_FIELDS),
            (LoaderKind::Degree, DEGREE_REQUIRED_FIELDS),
            (LoaderKind::Editor, EDITOR_REQUIRED_FIELDS),
            (LoaderKind::Geolocation, GEOLOCATION_REQUIRED_FIELDS),
            (LoaderKind::Geotargeting, GEOTARGETING_REQUIRED_FIELDS),
            (LoaderKind::ProductValue, PRODUCT_VALUE_REQUIRED_FIELDS),
        ];
        for (kind, fields) in required {
            let template = csv_template(kind).unwrap();
            let headers: Vec<String> = template.trim().split(',').map(normalize_key).collect();
            for field in fields {
                assert!(
                    headers.iter().any(|h| h == field),
                    "{} template lacks {}",
                    kind,
                    field
                );
            }
        }

        let values = csv_template(LoaderKind::ProductValue).unwrap();
        for field in PRODUCT_VALUE_FIELDS {
            assert!(values.to_lowercase().replace(' ', "_").contains(field));
        }
    }
}
