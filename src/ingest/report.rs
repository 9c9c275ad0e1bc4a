//! Ingestion report and error ledger
//!
//! Every loader records its per-row outcomes here. Errors are grouped by a
//! stable key and always emitted in the loader's fixed error-log sequence so
//! that summaries diff cleanly between runs.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::{error, info};

use crate::core::identity::LoaderKind;

/// Stable identifiers of row-level failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKey {
    MissingOrganization,
    MissingCourseType,
    MissingCourseRunType,
    MissingRequiredData,
    ImageDownloadFailure,
    LogoImageDownloadFailure,
    CourseCreateError,
    CourseUpdateError,
    CourseRunCreateError,
    CourseRunUpdateError,
    CourseEntitlementPriceUpdateError,
    UserNotFound,
    CourseNotFound,
    UserOrgMismatch,
    CourseEditorAddError,
    CourseEditorRemoveError,
    UnsupportedAction,
    MissingProgramType,
    MissingSubjectData,
    MissingLevelTypeData,
    MissingLanguageTagData,
    DegreeCreateError,
    DegreeUpdateError,
    InvalidProductUuid,
    InvalidProductType,
    InvalidIncludeExcludeValue,
    InvalidCountryCode,
    InvalidLocationData,
    ProductNotFound,
    LocationUpdateError,
    GeotargetingUpdateError,
    ProductValueUpdateError,
}

impl ErrorKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKey::MissingOrganization => "MISSING_ORGANIZATION",
            ErrorKey::MissingCourseType => "MISSING_COURSE_TYPE",
            ErrorKey::MissingCourseRunType => "MISSING_COURSE_RUN_TYPE",
            ErrorKey::MissingRequiredData => "MISSING_REQUIRED_DATA",
            ErrorKey::ImageDownloadFailure => "IMAGE_DOWNLOAD_FAILURE",
            ErrorKey::LogoImageDownloadFailure => "LOGO_IMAGE_DOWNLOAD_FAILURE",
            ErrorKey::CourseCreateError => "COURSE_CREATE_ERROR",
            ErrorKey::CourseUpdateError => "COURSE_UPDATE_ERROR",
            ErrorKey::CourseRunCreateError => "COURSE_RUN_CREATE_ERROR",
            ErrorKey::CourseRunUpdateError => "COURSE_RUN_UPDATE_ERROR",
            ErrorKey::CourseEntitlementPriceUpdateError => "COURSE_ENTITLEMENT_PRICE_UPDATE_ERROR",
            ErrorKey::UserNotFound => "USER_NOT_FOUND",
            ErrorKey::CourseNotFound => "COURSE_NOT_FOUND",
            ErrorKey::UserOrgMismatch => "USER_ORG_MISMATCH",
            ErrorKey::CourseEditorAddError => "COURSE_EDITOR_ADD_ERROR",
            ErrorKey::CourseEditorRemoveError => "COURSE_EDITOR_REMOVE_ERROR",
            ErrorKey::UnsupportedAction => "UNSUPPORTED_ACTION",
            ErrorKey::MissingProgramType => "MISSING_PROGRAM_TYPE",
            ErrorKey::MissingSubjectData => "MISSING_SUBJECT_DATA",
            ErrorKey::MissingLevelTypeData => "MISSING_LEVEL_TYPE_DATA",
            ErrorKey::MissingLanguageTagData => "MISSING_LANGUAGE_TAG_DATA",
            ErrorKey::DegreeCreateError => "DEGREE_CREATE_ERROR",
            ErrorKey::DegreeUpdateError => "DEGREE_UPDATE_ERROR",
            ErrorKey::InvalidProductUuid => "INVALID_PRODUCT_UUID",
            ErrorKey::InvalidProductType => "INVALID_PRODUCT_TYPE",
            ErrorKey::InvalidIncludeExcludeValue => "INVALID_INCLUDE_EXCLUDE_VALUE",
            ErrorKey::InvalidCountryCode => "INVALID_COUNTRY_CODE",
            ErrorKey::InvalidLocationData => "INVALID_LOCATION_DATA",
            ErrorKey::ProductNotFound => "PRODUCT_NOT_FOUND",
            ErrorKey::LocationUpdateError => "LOCATION_UPDATE_ERROR",
            ErrorKey::GeotargetingUpdateError => "GEOTARGETING_UPDATE_ERROR",
            ErrorKey::ProductValueUpdateError => "PRODUCT_VALUE_UPDATE_ERROR",
        }
    }

    /// Fixed order in which a loader's errors are emitted
    pub fn sequence(loader: LoaderKind) -> &'static [ErrorKey] {
        use ErrorKey::*;
        match loader {
            LoaderKind::Course => &[
                MissingOrganization,
                MissingCourseType,
                MissingCourseRunType,
                MissingRequiredData,
                ImageDownloadFailure,
                LogoImageDownloadFailure,
                CourseCreateError,
                CourseUpdateError,
                CourseRunCreateError,
                CourseRunUpdateError,
                CourseEntitlementPriceUpdateError,
            ],
            LoaderKind::Degree => &[
                MissingRequiredData,
                MissingOrganization,
                MissingProgramType,
                MissingSubjectData,
                MissingLevelTypeData,
                MissingLanguageTagData,
                DegreeCreateError,
                DegreeUpdateError,
                ImageDownloadFailure,
                LogoImageDownloadFailure,
            ],
            LoaderKind::Editor => &[
                MissingRequiredData,
                UserNotFound,
                CourseNotFound,
                UserOrgMismatch,
                CourseEditorAddError,
                CourseEditorRemoveError,
                UnsupportedAction,
            ],
            LoaderKind::Geolocation => &[
                MissingRequiredData,
                InvalidProductUuid,
                InvalidProductType,
                InvalidLocationData,
                ProductNotFound,
                LocationUpdateError,
            ],
            LoaderKind::Geotargeting => &[
                MissingRequiredData,
                InvalidProductUuid,
                InvalidProductType,
                InvalidIncludeExcludeValue,
                InvalidCountryCode,
                ProductNotFound,
                GeotargetingUpdateError,
            ],
            LoaderKind::ProductValue => &[
                MissingRequiredData,
                InvalidProductUuid,
                InvalidProductType,
                ProductNotFound,
                ProductValueUpdateError,
            ],
        }
    }
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable messages recorded against each key
pub mod messages {
    pub fn missing_organization(org_key: &str, course_title: &str) -> String {
        format!(
            "[MISSING_ORGANIZATION] Unable to locate partner organization with key {} for the course titled {}.",
            org_key, course_title
        )
    }

    pub fn missing_course_type(course_type: &str, course_title: &str) -> String {
        format!(
            "[MISSING_COURSE_TYPE] Unable to find the course enrollment track \"{}\" for the course {}",
            course_type, course_title
        )
    }

    pub fn missing_course_run_type(run_type: &str, course_title: &str) -> String {
        format!(
            "[MISSING_COURSE_RUN_TYPE] Unable to find the course run enrollment track \"{}\" for the course {}",
            run_type, course_title
        )
    }

    pub fn missing_required_data(course_title: &str, missing: &str) -> String {
        format!(
            "[MISSING_REQUIRED_DATA] Course {} is missing the required data for ingestion. The missing data elements are \"{}\"",
            course_title, missing
        )
    }

    pub fn image_download_failure(course_title: &str) -> String {
        format!(
            "[IMAGE_DOWNLOAD_FAILURE] The course image download failed for the course {}.",
            course_title
        )
    }

    pub fn logo_image_download_failure(course_title: &str) -> String {
        format!(
            "[LOGO_IMAGE_DOWNLOAD_FAILURE] The logo image download failed for the course {}.",
            course_title
        )
    }

    pub fn course_create_error(course_title: &str, error: &str) -> String {
        format!(
            "[COURSE_CREATE_ERROR] Unable to create course {} in the system. The ingestion failed with the exception: {}",
            course_title, error
        )
    }

    pub fn course_update_error(course_title: &str, error: &str) -> String {
        format!(
            "[COURSE_UPDATE_ERROR] Unable to update course {} in the system. The update failed with the exception: {}",
            course_title, error
        )
    }

    pub fn course_run_create_error(course_title: &str, variant_id: &str, error: &str) -> String {
        format!(
            "[COURSE_RUN_CREATE_ERROR] Unable to create course run of the course {} with variant_id {} in the system. The ingestion failed with the exception: {}",
            course_title, variant_id, error
        )
    }

    pub fn course_run_update_error(course_title: &str, error: &str) -> String {
        format!(
            "[COURSE_RUN_UPDATE_ERROR] Unable to update course run of the course {} in the system. The update failed with the exception: {}",
            course_title, error
        )
    }

    pub fn entitlement_price_update_error(course_title: &str, error: &str) -> String {
        format!(
            "[COURSE_ENTITLEMENT_PRICE_UPDATE_ERROR] Unable to update the entitlement price of the course {}. The update failed with the exception: {}",
            course_title, error
        )
    }

    pub fn editor_missing_required_data(row: usize, missing: &str) -> String {
        format!(
            "[MISSING_REQUIRED_DATA] [Row {}] Missing required field(s): {}",
            row, missing
        )
    }

    pub fn user_not_found(row: usize, user: &str) -> String {
        format!(
            "[USER_NOT_FOUND] [Row {}] Unable to find user with identifier \"{}\".",
            row, user
        )
    }

    pub fn course_not_found(row: usize, course: &str) -> String {
        format!(
            "[COURSE_NOT_FOUND] [Row {}] Unable to find course with identifier \"{}\".",
            row, course
        )
    }

    pub fn user_org_mismatch(row: usize, user: &str, course_title: &str) -> String {
        format!(
            "[USER_ORG_MISMATCH] [Row {}] User \"{}\" does not belong to any authoring organization for course \"{}\".",
            row, user, course_title
        )
    }

    pub fn course_editor_add_error(row: usize, user: &str, course_title: &str, error: &str) -> String {
        format!(
            "[COURSE_EDITOR_ADD_ERROR] [Row {}] Failed to create CourseEditor for user \"{}\" and course \"{}\": {}",
            row, user, course_title, error
        )
    }

    pub fn course_editor_remove_error(row: usize, user: &str, course_title: &str, error: &str) -> String {
        format!(
            "[COURSE_EDITOR_REMOVE_ERROR] [Row {}] Failed to remove CourseEditor for user \"{}\" and course \"{}\": {}",
            row, user, course_title, error
        )
    }

    pub fn unsupported_action(row: usize, action: &str) -> String {
        format!(
            "[UNSUPPORTED_ACTION] [Row {}] Unsupported action '{}' for course editor.",
            row, action
        )
    }

    pub fn degree_missing(key: &str, degree_slug: &str, what: &str) -> String {
        format!(
            "[{}] Unable to locate {} for the degree {}",
            key, what, degree_slug
        )
    }

    pub fn degree_missing_required_data(degree_slug: &str, missing: &str) -> String {
        format!(
            "[MISSING_REQUIRED_DATA] Degree {} is missing the required data for ingestion. The missing data elements are \"{}\"",
            degree_slug, missing
        )
    }

    pub fn degree_create_error(degree_slug: &str, error: &str) -> String {
        format!(
            "[DEGREE_CREATE_ERROR] Unable to create degree {} in the system. The ingestion failed with the exception: {}",
            degree_slug, error
        )
    }

    pub fn degree_update_error(degree_slug: &str, error: &str) -> String {
        format!(
            "[DEGREE_UPDATE_ERROR] Unable to update degree {} in the system. The update failed with the exception: {}",
            degree_slug, error
        )
    }

    pub fn degree_image_failure(key: &str, degree_slug: &str) -> String {
        format!(
            "[{}] The image download failed for the degree {}.",
            key, degree_slug
        )
    }
}

/// A failed row: the key it is filed under and the rendered message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub key: ErrorKey,
    pub message: String,
}

impl RowFailure {
    pub fn new(key: ErrorKey, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Product created during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreatedProduct {
    pub uuid: String,
    pub title: String,
    pub key: String,
    pub variant_id: Option<String>,
    pub restriction_type: Option<String>,
    pub url_slug: Option<String>,
    pub external_course_marketing_type: Option<String>,
    pub rerun: bool,
    pub is_future_variant: bool,
}

/// Recorded error messages grouped by key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLedger {
    sequence: &'static [ErrorKey],
    entries: BTreeMap<ErrorKey, Vec<String>>,
}

impl ErrorLedger {
    pub fn new(loader: LoaderKind) -> Self {
        Self {
            sequence: ErrorKey::sequence(loader),
            entries: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, key: ErrorKey, message: String) {
        self.entries.entry(key).or_default().push(message);
    }

    pub fn get(&self, key: ErrorKey) -> &[String] {
        self.entries.get(&key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|v| v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }

    /// Keys with messages: sequence order first, then any others by name
    pub fn ordered(&self) -> Vec<(ErrorKey, &[String])> {
        let mut out: Vec<(ErrorKey, &[String])> = self
            .sequence
            .iter()
            .filter_map(|key| {
                self.entries
                    .get(key)
                    .filter(|v| !v.is_empty())
                    .map(|v| (*key, v.as_slice()))
            })
            .collect();
        let mut extra: Vec<(ErrorKey, &[String])> = self
            .entries
            .iter()
            .filter(|(key, v)| !v.is_empty() && !self.sequence.contains(key))
            .map(|(key, v)| (*key, v.as_slice()))
            .collect();
        extra.sort_by_key(|(key, _)| key.as_str());
        out.extend(extra);
        out
    }
}

impl Serialize for ErrorLedger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ordered = self.ordered();
        let mut map = serializer.serialize_map(Some(ordered.len()))?;
        for (key, messages) in ordered {
            map.serialize_entry(key.as_str(), messages)?;
        }
        map.end()
    }
}

/// Outcome of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub loader: LoaderKind,
    pub total_products_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub updated_products_count: usize,
    pub created_products: Vec<CreatedProduct>,
    pub archived_products: Vec<String>,
    pub errors: ErrorLedger,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub others: Vec<String>,
}

impl IngestionReport {
    pub fn new(loader: LoaderKind, total_products_count: usize) -> Self {
        Self {
            loader,
            total_products_count,
            success_count: 0,
            failure_count: 0,
            updated_products_count: 0,
            created_products: Vec::new(),
            archived_products: Vec::new(),
            errors: ErrorLedger::new(loader),
            others: Vec::new(),
        }
    }

    /// Record a failed row
    pub fn fail(&mut self, failure: RowFailure) {
        error!(key = %failure.key, "{}", failure.message);
        self.failure_count += 1;
        self.errors.push(failure.key, failure.message);
    }

    /// Record an error that did not fail its row
    pub fn note(&mut self, key: ErrorKey, message: impl Into<String>) {
        let message = message.into();
        error!(key = %key, "{}", message);
        self.errors.push(key, message);
    }

    pub fn succeed(&mut self) {
        self.success_count += 1;
    }

    pub fn created(&mut self, product: CreatedProduct) {
        self.success_count += 1;
        self.created_products.push(product);
    }

    pub fn updated(&mut self) {
        self.success_count += 1;
        self.updated_products_count += 1;
    }

    pub fn archived(&mut self, external_identifier: impl Into<String>) {
        self.archived_products.push(external_identifier.into());
    }

    pub fn other(&mut self, message: impl Into<String>) {
        self.others.push(message.into());
    }

    /// Log the summarized errors in sequence order
    pub fn log_summary(&self) {
        if self.errors.is_empty() {
            info!("No errors reported in the ingestion");
            return;
        }
        info!("Summarized errors:");
        for (_, messages) in self.errors.ordered() {
            for message in messages {
                error!("{}", message);
            }
        }
    }

    /// Counter name/value pairs in display order
    pub fn counters(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("total_products_count", self.total_products_count),
            ("success_count", self.success_count),
            ("failure_count", self.failure_count),
            ("updated_products_count", self.updated_products_count),
            ("created_products", self.created_products.len()),
            ("archived_products", self.archived_products.len()),
        ]
    }

    /// Write the `error_key,message` CSV summary
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["error_key", "message"])?;
        for (key, messages) in self.errors.ordered() {
            for message in messages {
                csv.write_record([key.as_str(), message.as_str()])?;
            }
        }
        for (name, value) in self.counters() {
            csv.write_record(["summary", &format!("{}={}", name, value)])?;
        }
        for product in &self.created_products {
            let description = serde_json::to_string(product).unwrap_or_else(|_| product.uuid.clone());
            csv.write_record(["created", &description])?;
        }
        for external_id in &self.archived_products {
            csv.write_record(["archived", external_id.as_str()])?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> String {
        let mut buffer = Vec::new();
        if self.write_csv(&mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_follow_sequence() {
        let mut report = IngestionReport::new(LoaderKind::Course, 3);
        report.fail(RowFailure::new(ErrorKey::CourseUpdateError, "update"));
        report.fail(RowFailure::new(ErrorKey::MissingOrganization, "org"));
        report.note(ErrorKey::UserNotFound, "stray");

        let keys: Vec<_> = report.errors.ordered().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            [
                ErrorKey::MissingOrganization,
                ErrorKey::CourseUpdateError,
                ErrorKey::UserNotFound
            ]
        );
        assert_eq!(report.failure_count, 2);
        assert_eq!(report.errors.len(), 3);
    }

    #[test]
    fn test_json_error_section_is_ordered() {
        let mut report = IngestionReport::new(LoaderKind::Editor, 2);
        report.fail(RowFailure::new(ErrorKey::UnsupportedAction, "b"));
        report.fail(RowFailure::new(ErrorKey::UserNotFound, "a"));

        let json = serde_json::to_string(&report).unwrap();
        let user = json.find("USER_NOT_FOUND").unwrap();
        let action = json.find("UNSUPPORTED_ACTION").unwrap();
        assert!(user < action);
        assert!(!json.contains("\"others\""));
    }

    #[test]
    fn test_csv_summary() {
        let mut report = IngestionReport::new(LoaderKind::Course, 2);
        report.fail(RowFailure::new(
            ErrorKey::MissingRequiredData,
            messages::missing_required_data("Intro Bio", "title, number"),
        ));
        report.created(CreatedProduct {
            uuid: "u1".to_string(),
            variant_id: Some("V1".to_string()),
            ..CreatedProduct::default()
        });

        let csv = report.to_csv_string();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("error_key,message"));
        assert!(lines.next().unwrap().starts_with("MISSING_REQUIRED_DATA,"));
        assert!(csv.contains("summary,total_products_count=2"));
        assert!(csv.contains("summary,success_count=1"));
        assert!(csv.contains("created,"));
    }

    #[test]
    fn test_message_templates() {
        assert_eq!(
            messages::missing_organization("edx", "Intro Bio"),
            "[MISSING_ORGANIZATION] Unable to locate partner organization with key edx for the course titled Intro Bio."
        );
        assert!(messages::course_run_create_error("Intro Bio", "V1", "boom").contains("variant_id V1"));
    }
}
