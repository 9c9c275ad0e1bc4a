//! Row types for the catalog store

use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::entity::{CourseRunStatus, Pacing, ProductStatus, ProgramStatus, RestrictionType};

// =========================================================================
// Tenancy and reference data
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Partner {
    pub id: i64,
    pub short_code: String,
    pub name: String,
    pub marketing_site_url_root: Option<String>,
    pub marketing_site_api_username: Option<String>,
    pub marketing_site_api_password: Option<String>,
    pub studio_url: Option<String>,
    pub lms_url: Option<String>,
}

pub(super) const PARTNER_COLUMNS: &str = "id, short_code, name, marketing_site_url_root, \
    marketing_site_api_username, marketing_site_api_password, studio_url, lms_url";

impl Partner {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            short_code: row.get(1)?,
            name: row.get(2)?,
            marketing_site_url_root: row.get(3)?,
            marketing_site_api_username: row.get(4)?,
            marketing_site_api_password: row.get(5)?,
            studio_url: row.get(6)?,
            lms_url: row.get(7)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Organization {
    pub id: i64,
    pub partner_id: i64,
    pub uuid: String,
    pub key: String,
    pub name: String,
    pub logo_image_url: Option<String>,
    pub banner_image_url: Option<String>,
}

pub(super) const ORGANIZATION_COLUMNS: &str =
    "id, partner_id, uuid, key, name, logo_image_url, banner_image_url";

impl Organization {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            partner_id: row.get(1)?,
            uuid: row.get(2)?,
            key: row.get(3)?,
            name: row.get(4)?,
            logo_image_url: row.get(5)?,
            banner_image_url: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub id: i64,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseRunType {
    pub id: i64,
    pub uuid: String,
    pub slug: String,
    pub name: String,
    pub is_marketable: bool,
    /// Seat types a run of this type carries
    pub seat_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseType {
    pub id: i64,
    pub uuid: String,
    pub slug: String,
    pub name: String,
    /// Entitlement modes a course of this type sells
    pub entitlement_types: Vec<String>,
    /// Run type slugs allowed on courses of this type, in preference order
    pub run_types: Vec<String>,
}

impl CourseType {
    pub fn allows_run_type(&self, run_type_slug: &str) -> bool {
        self.run_types.iter().any(|t| t == run_type_slug)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subject {
    pub id: i64,
    pub uuid: String,
    pub slug: String,
    pub name: String,
    pub name_es: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelType {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageTag {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramType {
    pub id: i64,
    pub uuid: String,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collaborator {
    pub id: i64,
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Person {
    pub id: i64,
    pub uuid: String,
    pub given_name: String,
}

// =========================================================================
// Value objects
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub heading: String,
    pub blurb: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub heading: String,
    pub blurb: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
}

/// Side table of an externally sourced course
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalMetadata {
    #[serde(skip)]
    pub id: i64,
    pub external_url: Option<String>,
    pub external_identifier: Option<String>,
    pub lead_capture_form_url: Option<String>,
    pub organic_url: Option<String>,
    pub certificate_info: Option<CertificateInfo>,
    pub facts: Vec<Fact>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub registration_deadline: Option<String>,
    pub product_status: ProductStatus,
    pub external_course_marketing_type: Option<String>,
    pub taxi_form_id: Option<String>,
    pub post_submit_url: Option<String>,
    pub product_meta: Option<ProductMeta>,
}

pub(super) const ADDITIONAL_METADATA_COLUMNS: &str = "id, external_url, external_identifier, \
    lead_capture_form_url, organic_url, certificate_info, facts, start_date, end_date, \
    registration_deadline, product_status, external_course_marketing_type, taxi_form_id, \
    post_submit_url, product_meta";

impl AdditionalMetadata {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let certificate_info: Option<String> = row.get(5)?;
        let facts: String = row.get(6)?;
        let status: String = row.get(10)?;
        let product_meta: Option<String> = row.get(14)?;
        Ok(Self {
            id: row.get(0)?,
            external_url: row.get(1)?,
            external_identifier: row.get(2)?,
            lead_capture_form_url: row.get(3)?,
            organic_url: row.get(4)?,
            certificate_info: certificate_info.and_then(|s| serde_json::from_str(&s).ok()),
            facts: serde_json::from_str(&facts).unwrap_or_default(),
            start_date: row.get(7)?,
            end_date: row.get(8)?,
            registration_deadline: row.get(9)?,
            product_status: status.parse().unwrap_or_default(),
            external_course_marketing_type: row.get(11)?,
            taxi_form_id: row.get(12)?,
            post_submit_url: row.get(13)?,
            product_meta: product_meta.and_then(|s| serde_json::from_str(&s).ok()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoLocation {
    pub id: i64,
    pub location_name: String,
    pub lat: String,
    pub lng: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationRestriction {
    pub id: i64,
    pub restriction_type: RestrictionType,
    pub countries: Vec<String>,
}

impl LocationRestriction {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let restriction_type: String = row.get(1)?;
        let countries: String = row.get(2)?;
        Ok(Self {
            id: row.get(0)?,
            restriction_type: restriction_type
                .parse()
                .unwrap_or(RestrictionType::Blocklist),
            countries: split_countries(&countries),
        })
    }
}

pub(super) fn split_countries(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueAmounts {
    pub per_click_usa: i64,
    pub per_click_international: i64,
    pub per_lead_usa: i64,
    pub per_lead_international: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductValue {
    pub id: i64,
    pub amounts: ValueAmounts,
}

// =========================================================================
// Courses
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Course {
    pub id: i64,
    pub uuid: String,
    pub partner_id: i64,
    pub key: String,
    pub draft: bool,
    pub draft_version_id: Option<i64>,
    pub title: String,
    pub short_description: Option<String>,
    pub full_description: Option<String>,
    pub outcome: Option<String>,
    pub syllabus_raw: Option<String>,
    pub prerequisites_raw: Option<String>,
    pub faq: Option<String>,
    pub learner_testimonials: Option<String>,
    pub additional_information: Option<String>,
    pub video_url: Option<String>,
    pub level_type_id: Option<i64>,
    pub type_id: Option<i64>,
    pub product_source_id: Option<i64>,
    pub image_url: Option<String>,
    pub image_hash: Option<String>,
    pub organization_logo_override_url: Option<String>,
    pub organization_short_code_override: Option<String>,
    pub canonical_course_run_id: Option<i64>,
    pub additional_metadata_id: Option<i64>,
    pub geolocation_id: Option<i64>,
    pub location_restriction_id: Option<i64>,
    pub in_year_value_id: Option<i64>,
    pub created: String,
    pub modified: String,
}

/// Columns copied between a course and its shadow twin
pub(super) const COURSE_DATA_COLUMNS: &[&str] = &[
    "uuid",
    "partner_id",
    "key",
    "title",
    "short_description",
    "full_description",
    "outcome",
    "syllabus_raw",
    "prerequisites_raw",
    "faq",
    "learner_testimonials",
    "additional_information",
    "video_url",
    "level_type_id",
    "type_id",
    "product_source_id",
    "image_url",
    "image_hash",
    "organization_logo_override_url",
    "organization_short_code_override",
    "additional_metadata_id",
    "geolocation_id",
    "location_restriction_id",
    "in_year_value_id",
];

pub(super) const COURSE_COLUMNS: &str = "id, uuid, partner_id, key, draft, draft_version_id, \
    title, short_description, full_description, outcome, syllabus_raw, prerequisites_raw, faq, \
    learner_testimonials, additional_information, video_url, level_type_id, type_id, \
    product_source_id, image_url, image_hash, organization_logo_override_url, \
    organization_short_code_override, canonical_course_run_id, additional_metadata_id, \
    geolocation_id, location_restriction_id, in_year_value_id, created, modified";

impl Course {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            partner_id: row.get(2)?,
            key: row.get(3)?,
            draft: row.get(4)?,
            draft_version_id: row.get(5)?,
            title: row.get(6)?,
            short_description: row.get(7)?,
            full_description: row.get(8)?,
            outcome: row.get(9)?,
            syllabus_raw: row.get(10)?,
            prerequisites_raw: row.get(11)?,
            faq: row.get(12)?,
            learner_testimonials: row.get(13)?,
            additional_information: row.get(14)?,
            video_url: row.get(15)?,
            level_type_id: row.get(16)?,
            type_id: row.get(17)?,
            product_source_id: row.get(18)?,
            image_url: row.get(19)?,
            image_hash: row.get(20)?,
            organization_logo_override_url: row.get(21)?,
            organization_short_code_override: row.get(22)?,
            canonical_course_run_id: row.get(23)?,
            additional_metadata_id: row.get(24)?,
            geolocation_id: row.get(25)?,
            location_restriction_id: row.get(26)?,
            in_year_value_id: row.get(27)?,
            created: row.get(28)?,
            modified: row.get(29)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseRun {
    pub id: i64,
    pub uuid: String,
    pub course_id: i64,
    pub key: String,
    pub draft: bool,
    pub draft_version_id: Option<i64>,
    pub title_override: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub go_live_date: Option<String>,
    pub upgrade_deadline_override: Option<String>,
    pub enrollment_end: Option<String>,
    pub pacing_type: Option<Pacing>,
    pub status: CourseRunStatus,
    pub type_id: Option<i64>,
    pub content_language: Option<String>,
    pub weeks_to_complete: Option<i64>,
    pub min_effort: Option<i64>,
    pub max_effort: Option<i64>,
    pub expected_program_type: Option<String>,
    pub expected_program_name: Option<String>,
    pub variant_id: Option<String>,
    pub restriction_type: Option<String>,
    pub created: String,
    pub modified: String,
}

pub(super) const COURSE_RUN_DATA_COLUMNS: &[&str] = &[
    "uuid",
    "key",
    "title_override",
    "start_at",
    "end_at",
    "go_live_date",
    "upgrade_deadline_override",
    "enrollment_end",
    "pacing_type",
    "status",
    "type_id",
    "content_language",
    "weeks_to_complete",
    "min_effort",
    "max_effort",
    "expected_program_type",
    "expected_program_name",
    "variant_id",
    "restriction_type",
];

pub(super) const COURSE_RUN_COLUMNS: &str = "id, uuid, course_id, key, draft, draft_version_id, \
    title_override, start_at, end_at, go_live_date, upgrade_deadline_override, enrollment_end, \
    pacing_type, status, type_id, content_language, weeks_to_complete, min_effort, max_effort, \
    expected_program_type, expected_program_name, variant_id, restriction_type, created, modified";

impl CourseRun {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let pacing: Option<String> = row.get(12)?;
        let status: String = row.get(13)?;
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            course_id: row.get(2)?,
            key: row.get(3)?,
            draft: row.get(4)?,
            draft_version_id: row.get(5)?,
            title_override: row.get(6)?,
            start: row.get(7)?,
            end: row.get(8)?,
            go_live_date: row.get(9)?,
            upgrade_deadline_override: row.get(10)?,
            enrollment_end: row.get(11)?,
            pacing_type: pacing.and_then(|p| p.parse().ok()),
            status: status.parse().unwrap_or_default(),
            type_id: row.get(14)?,
            content_language: row.get(15)?,
            weeks_to_complete: row.get(16)?,
            min_effort: row.get(17)?,
            max_effort: row.get(18)?,
            expected_program_type: row.get(19)?,
            expected_program_name: row.get(20)?,
            variant_id: row.get(21)?,
            restriction_type: row.get(22)?,
            created: row.get(23)?,
            modified: row.get(24)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Seat {
    pub id: i64,
    pub course_run_id: i64,
    pub draft: bool,
    pub draft_version_id: Option<i64>,
    pub type_slug: String,
    pub price: String,
    pub currency: String,
    pub sku: Option<String>,
}

pub(super) const SEAT_COLUMNS: &str =
    "id, course_run_id, draft, draft_version_id, type_slug, price, currency, sku";

impl Seat {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            course_run_id: row.get(1)?,
            draft: row.get(2)?,
            draft_version_id: row.get(3)?,
            type_slug: row.get(4)?,
            price: row.get(5)?,
            currency: row.get(6)?,
            sku: row.get(7)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entitlement {
    pub id: i64,
    pub course_id: i64,
    pub draft: bool,
    pub draft_version_id: Option<i64>,
    pub mode: String,
    pub price: String,
    pub currency: String,
    pub sku: Option<String>,
}

pub(super) const ENTITLEMENT_COLUMNS: &str =
    "id, course_id, draft, draft_version_id, mode, price, currency, sku";

impl Entitlement {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            course_id: row.get(1)?,
            draft: row.get(2)?,
            draft_version_id: row.get(3)?,
            mode: row.get(4)?,
            price: row.get(5)?,
            currency: row.get(6)?,
            sku: row.get(7)?,
        })
    }
}

// =========================================================================
// Programs and degrees
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub id: i64,
    pub uuid: String,
    pub partner_id: i64,
    pub title: String,
    pub type_id: Option<i64>,
    pub status: ProgramStatus,
    pub marketing_slug: Option<String>,
    pub overview: Option<String>,
    pub card_image_url: Option<String>,
    pub card_image_hash: Option<String>,
    pub organization_logo_override_url: Option<String>,
    pub organization_short_code_override: Option<String>,
    pub primary_subject_override_id: Option<i64>,
    pub level_type_override_id: Option<i64>,
    pub language_override: Option<String>,
    pub product_source_id: Option<i64>,
    pub is_degree: bool,
    pub geolocation_id: Option<i64>,
    pub in_year_value_id: Option<i64>,
    pub created: String,
    pub modified: String,
}

pub(super) const PROGRAM_COLUMNS: &str = "id, uuid, partner_id, title, type_id, status, \
    marketing_slug, overview, card_image_url, card_image_hash, organization_logo_override_url, \
    organization_short_code_override, primary_subject_override_id, level_type_override_id, \
    language_override, product_source_id, is_degree, geolocation_id, in_year_value_id, \
    created, modified";

impl Program {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let status: String = row.get(5)?;
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            partner_id: row.get(2)?,
            title: row.get(3)?,
            type_id: row.get(4)?,
            status: status.parse().unwrap_or_default(),
            marketing_slug: row.get(6)?,
            overview: row.get(7)?,
            card_image_url: row.get(8)?,
            card_image_hash: row.get(9)?,
            organization_logo_override_url: row.get(10)?,
            organization_short_code_override: row.get(11)?,
            primary_subject_override_id: row.get(12)?,
            level_type_override_id: row.get(13)?,
            language_override: row.get(14)?,
            product_source_id: row.get(15)?,
            is_degree: row.get(16)?,
            geolocation_id: row.get(17)?,
            in_year_value_id: row.get(18)?,
            created: row.get(19)?,
            modified: row.get(20)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DegreeAdditionalMetadata {
    pub external_identifier: Option<String>,
    pub organic_url: Option<String>,
    pub external_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseEditor {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
}

/// Entity kinds the search index tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexedKind {
    Course,
    CourseRun,
    Program,
}

impl IndexedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexedKind::Course => "course",
            IndexedKind::CourseRun => "course_run",
            IndexedKind::Program => "program",
        }
    }
}
