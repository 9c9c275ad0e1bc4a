//! Row validation
//!
//! Course, degree and editor rows report the comma-separated list of
//! missing fields (empty when valid). The geo and product-value loaders
//! collect one problem per failed check; the first problem's key files the
//! row and all messages are joined into one.

use super::normalize::{is_country_code, is_uuid, parse_bool};
use super::reader::Row;
use super::report::{ErrorKey, RowFailure};
use super::resolver;
use crate::core::catalog::{Catalog, CourseType};
use crate::core::config::IngestionConfig;
use crate::core::entity::course_type;
use crate::core::identity::ProductKind;

pub const COURSE_REQUIRED_FIELDS: &[&str] = &[
    "organization",
    "title",
    "number",
    "start_date",
    "end_date",
    "course_pacing",
];

/// Description fields masters courses may leave empty during legal review
const MASTERS_EXEMPT_FIELDS: &[&str] = &["long_description", "short_description", "what_will_you_learn"];

const EXTERNAL_REQUIRED_FIELDS: &[&str] = &["redirect_url", "external_identifier"];

const EXEC_ED_LEGAL_REVIEW_FIELDS: &[&str] = &[
    "lead_capture_form_url",
    "certificate_header",
    "certificate_text",
    "stat1",
    "stat1_text",
    "stat2",
    "stat2_text",
    "frequently_asked_questions",
    "reg_close_date",
    "reg_close_time",
];

pub const DEGREE_REQUIRED_FIELDS: &[&str] = &[
    "title",
    "card_image_url",
    "product_type",
    "organization_key",
    "organization_short_code_override",
    "slug",
    "primary_subject",
    "content_language",
    "course_level",
    "paid_landing_page_url",
    "organic_url",
    "identifier",
    "overview",
];

pub const EDITOR_REQUIRED_FIELDS: &[&str] = &["username_or_email", "course_key_or_uuid", "action"];

pub const GEOLOCATION_REQUIRED_FIELDS: &[&str] =
    &["uuid", "product_type", "location_name", "latitude", "longitude"];

pub const GEOTARGETING_REQUIRED_FIELDS: &[&str] = &["uuid", "product_type", "include_or_exclude"];

pub const PRODUCT_VALUE_REQUIRED_FIELDS: &[&str] = &["uuid", "product_type"];

pub const PRODUCT_VALUE_FIELDS: &[&str] = &[
    "per_click_usa",
    "per_click_international",
    "per_lead_usa",
    "per_lead_international",
];

/// Fields from `fields` that are blank in `row`, in order
pub fn missing_fields<'f>(row: &Row, fields: impl IntoIterator<Item = &'f str>) -> Vec<&'f str> {
    let mut missing: Vec<&str> = Vec::new();
    for field in fields {
        if !row.has(field) && !missing.contains(&field) {
            missing.push(field);
        }
    }
    missing
}

/// Required fields of a course row for its course type
pub fn course_required_fields<'c>(
    row: &Row,
    config: &'c IngestionConfig,
    course_type: &CourseType,
) -> Vec<&'c str> {
    let legal_review = parse_bool(row.value("move_to_legal_review"));
    let slug = course_type.slug.as_str();

    let mut required: Vec<&str> = COURSE_REQUIRED_FIELDS.to_vec();
    if legal_review {
        required.extend(
            config
                .legal_review_required_fields
                .iter()
                .map(String::as_str)
                .filter(|f| !(slug == course_type::MASTERS && MASTERS_EXEMPT_FIELDS.contains(f))),
        );
    }
    if course_type::is_external(slug) {
        required.extend_from_slice(EXTERNAL_REQUIRED_FIELDS);
        if slug == course_type::EXECUTIVE_EDUCATION_2U && legal_review {
            required.extend_from_slice(EXEC_ED_LEGAL_REVIEW_FIELDS);
        }
    }
    if slug != course_type::AUDIT {
        required.push("verified_price");
    }
    required
}

/// Comma-separated missing fields of a course row; empty when valid
pub fn validate_course(row: &Row, config: &IngestionConfig, course_type: &CourseType) -> String {
    missing_fields(row, course_required_fields(row, config, course_type)).join(", ")
}

/// Comma-separated missing fields of a degree row; empty when valid
pub fn validate_degree(row: &Row, config: &IngestionConfig, product_source: &str) -> String {
    let variant = config.degree_variant_fields(product_source);
    missing_fields(
        row,
        DEGREE_REQUIRED_FIELDS
            .iter()
            .copied()
            .chain(variant.iter().map(String::as_str)),
    )
    .join(", ")
}

pub fn validate_editor(row: &Row) -> String {
    missing_fields(row, EDITOR_REQUIRED_FIELDS.iter().copied()).join(", ")
}

// =========================================================================
// Geo and product-value checks
// =========================================================================

/// Problems found in one row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Problems(Vec<(ErrorKey, String)>);

impl Problems {
    pub fn push(&mut self, key: ErrorKey, message: impl Into<String>) {
        self.0.push((key, message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn message(&self) -> String {
        self.0
            .iter()
            .map(|(_, m)| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn into_failure(self) -> Option<RowFailure> {
        let key = self.0.first()?.0;
        Some(RowFailure::new(key, self.message()))
    }
}

fn check_required(row: &Row, fields: &[&str], problems: &mut Problems) {
    for field in missing_fields(row, fields.iter().copied()) {
        problems.push(ErrorKey::MissingRequiredData, format!("Missing field: {}", field));
    }
}

/// Product kind of a folded row, recording a problem when it is neither
/// `course` nor `program`
fn check_product_type(row: &Row, problems: &mut Problems) -> Option<ProductKind> {
    match row.value("product_type").parse::<ProductKind>() {
        Ok(kind @ (ProductKind::Course | ProductKind::Program)) => Some(kind),
        _ => {
            problems.push(
                ErrorKey::InvalidProductType,
                format!("Wrong product_type value for UUID: {}", row.value("uuid")),
            );
            None
        }
    }
}

fn check_uuid(row: &Row, problems: &mut Problems) -> bool {
    let valid = is_uuid(row.value("uuid"));
    if !valid {
        problems.push(
            ErrorKey::InvalidProductUuid,
            format!("Invalid UUID: {}", row.value("uuid")),
        );
    }
    valid
}

fn check_exists(
    catalog: &Catalog,
    row: &Row,
    kind: ProductKind,
    problems: &mut Problems,
) -> crate::core::catalog::Result<()> {
    if !resolver::product_exists(catalog, kind, row.value("uuid"))? {
        problems.push(
            ErrorKey::ProductNotFound,
            format!(
                "Course or Program with UUID {} was not found",
                row.value("uuid")
            ),
        );
    }
    Ok(())
}

/// Validate a folded geolocation row
pub fn validate_geolocation(catalog: &Catalog, row: &Row) -> crate::core::catalog::Result<Problems> {
    let mut problems = Problems::default();
    check_required(row, GEOLOCATION_REQUIRED_FIELDS, &mut problems);
    let uuid_ok = check_uuid(row, &mut problems);
    let kind = check_product_type(row, &mut problems);

    let coordinates_ok = [row.value("latitude"), row.value("longitude")]
        .iter()
        .all(|v| v.is_empty() || v.parse::<f64>().is_ok());
    if !coordinates_ok {
        problems.push(
            ErrorKey::InvalidLocationData,
            format!("Invalid latitude/longitude for UUID: {}", row.value("uuid")),
        );
    }

    if let (true, Some(kind)) = (uuid_ok, kind) {
        check_exists(catalog, row, kind, &mut problems)?;
    }
    Ok(problems)
}

/// Validate a folded geotargeting row
pub fn validate_geotargeting(catalog: &Catalog, row: &Row) -> crate::core::catalog::Result<Problems> {
    let mut problems = Problems::default();
    check_required(row, GEOTARGETING_REQUIRED_FIELDS, &mut problems);
    let uuid_ok = check_uuid(row, &mut problems);

    if !matches!(row.value("include_or_exclude"), "include" | "exclude") {
        problems.push(
            ErrorKey::InvalidIncludeExcludeValue,
            format!("Wrong include/exclude value for UUID: {}", row.value("uuid")),
        );
    }
    let kind = check_product_type(row, &mut problems);

    let countries_ok = row
        .get("countries")
        .map(|list| list.split(',').all(is_country_code))
        .unwrap_or(true);
    if !countries_ok {
        problems.push(
            ErrorKey::InvalidCountryCode,
            format!("Error in the countries list for UUID: {}", row.value("uuid")),
        );
    }

    if let (true, Some(kind)) = (uuid_ok, kind) {
        check_exists(catalog, row, kind, &mut problems)?;
    }
    Ok(problems)
}

/// Validate a folded product-value row
pub fn validate_product_value(catalog: &Catalog, row: &Row) -> crate::core::catalog::Result<Problems> {
    let mut problems = Problems::default();
    for field in missing_fields(row, PRODUCT_VALUE_REQUIRED_FIELDS.iter().copied()) {
        problems.push(
            ErrorKey::MissingRequiredData,
            format!("Missing required field: {}", field),
        );
    }
    if !PRODUCT_VALUE_FIELDS.iter().any(|f| row.has(f)) {
        problems.push(
            ErrorKey::MissingRequiredData,
            format!(
                "Must have at least one optional field: {}",
                PRODUCT_VALUE_FIELDS.join(", ")
            ),
        );
    }
    let uuid_ok = check_uuid(row, &mut problems);
    let kind = check_product_type(row, &mut problems);

    if let (true, Some(kind)) = (uuid_ok, kind) {
        if !resolver::product_exists(catalog, kind, row.value("uuid"))? {
            let label = match kind {
                ProductKind::Course => "Course",
                _ => "Program",
            };
            problems.push(
                ErrorKey::ProductNotFound,
                format!("{} with UUID: {} was not found", label, row.value("uuid")),
            );
        }
    }
    Ok(problems)
}
