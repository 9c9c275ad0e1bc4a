//! Internal course API
//!
//! Course and run writes issued by the loaders go through create/update
//! envelopes. [`LocalCourseApi`] applies them to the catalog in-process;
//! [`HttpCourseApi`] sends them to a running catalog service that writes the
//! same store.
//!
//! Envelope fields are optional: `None` leaves a field alone and an empty
//! string clears it.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{http, Result, SyncError};
use crate::core::catalog::{
    AdditionalMetadata, Catalog, Course, CourseRun, CourseType, NewCourse, NewCourseRun, Partner,
};
use crate::core::config::IngestionConfig;
use crate::core::entity::{CourseRunStatus, Pacing};
use crate::core::identity::{slugify, CourseKey, CourseRunKey};

/// Seat types that are always free
const FREE_SEAT_TYPES: &[&str] = &["audit", "honor"];

// =========================================================================
// Envelopes
// =========================================================================

/// Run part of a course-create envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCreateFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pacing_type: Option<Pacing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    /// Run type uuid
    pub run_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restriction_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseCreate {
    pub org: String,
    pub title: String,
    pub number: String,
    /// Course type uuid
    #[serde(rename = "type")]
    pub course_type: String,
    pub product_source: String,
    pub prices: BTreeMap<String, String>,
    pub course_run: RunCreateFields,
}

/// Create a run of an existing course, optionally as a rerun of `rerun`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseRunCreate {
    /// Course key
    pub course: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    pub run_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pacing_type: Option<Pacing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerun: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restriction_type: Option<String>,
    pub prices: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub src: String,
}

/// An image already downloaded into the catalog image store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub url: String,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseUpdate {
    /// Keep the change on the draft only
    pub draft: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_slug: Option<String>,
    /// Course type uuid
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub course_type: Option<String>,
    /// Subject slugs, primary first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjects: Option<Vec<String>>,
    /// Collaborator uuids
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborators: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prices: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syllabus_raw: Option<String>,
    /// Level type name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faq: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<Video>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerequisites_raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learner_testimonials: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_information: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_short_code_override: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_logo_override: Option<StoredImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<StoredImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_metadata: Option<AdditionalMetadata>,
}

impl CourseUpdate {
    /// Narrow update carrying entitlement prices only
    pub fn prices_only(draft: bool, prices: BTreeMap<String, String>) -> Self {
        Self {
            draft,
            prices: Some(prices),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseRunUpdate {
    pub draft: bool,
    /// Run type uuid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prices: Option<BTreeMap<String, String>>,
    /// Person uuids in display order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weeks_to_complete: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_effort: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_effort: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pacing_type: Option<Pacing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_languages: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub go_live_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_program_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_program_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_deadline_override: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment_end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restriction_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CourseRunStatus>,
}

impl CourseRunUpdate {
    /// Update that only moves the run to another review status
    pub fn status_only(status: CourseRunStatus) -> Self {
        Self {
            draft: true,
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Result of creating a course
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseCreated {
    pub uuid: String,
    pub key: String,
    pub course_run_key: String,
}

/// Identity of the entity a call touched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRef {
    pub uuid: String,
    pub key: String,
}

/// The internal course API
pub trait CourseApi {
    fn create_course(&self, create: &CourseCreate) -> Result<CourseCreated>;
    fn create_course_run(&self, create: &CourseRunCreate) -> Result<ApiRef>;
    fn update_course(&self, uuid: &str, update: &CourseUpdate) -> Result<ApiRef>;
    fn update_course_run(&self, key: &str, update: &CourseRunUpdate) -> Result<ApiRef>;
}

// =========================================================================
// Shared pricing and key rules
// =========================================================================

/// Entitlement price for a mode; missing prices default to zero
pub fn entitlement_price(prices: &BTreeMap<String, String>, mode: &str) -> String {
    prices
        .get(mode)
        .cloned()
        .unwrap_or_else(|| "0.00".to_string())
}

/// Seat price for a seat type; free seat types are always zero
pub fn seat_price(prices: &BTreeMap<String, String>, seat_type: &str) -> String {
    if FREE_SEAT_TYPES.contains(&seat_type) {
        return "0.00".to_string();
    }
    entitlement_price(prices, seat_type)
}

/// First unused run key for a course starting at `start`.
/// Collisions get `a`, `b`, ... appended to the run value.
pub fn next_run_key(catalog: &Catalog, course_key: &CourseKey, start: Option<&str>) -> Result<String> {
    let (year, month) = start
        .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ").ok())
        .map(|dt| (dt.year(), dt.month()))
        .unwrap_or_else(|| {
            let today = Utc::now();
            (today.year(), today.month())
        });
    let base = CourseRunKey::run_value_for(year, month);

    let candidate = course_key.run_key(&base).to_string();
    if !catalog.course_run_key_exists(&candidate)? {
        return Ok(candidate);
    }
    for suffix in 'a'..='z' {
        let candidate = course_key.run_key(&format!("{}{}", base, suffix)).to_string();
        if !catalog.course_run_key_exists(&candidate)? {
            return Ok(candidate);
        }
    }
    Err(SyncError::rejected(
        400,
        format!("no free run key left for {} in {}", course_key, base),
    ))
}

fn apply_text(field: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *field = if value.is_empty() {
            None
        } else {
            Some(value.clone())
        };
    }
}

fn apply_number(field: &mut Option<i64>, value: Option<i64>) {
    if value.is_some() {
        *field = value;
    }
}

// =========================================================================
// Local implementation
// =========================================================================

/// Applies envelopes directly to the catalog store
pub struct LocalCourseApi<'a> {
    catalog: &'a Catalog,
    partner: Partner,
}

impl<'a> LocalCourseApi<'a> {
    pub fn new(catalog: &'a Catalog, partner: Partner) -> Self {
        Self { catalog, partner }
    }

    fn course_type(&self, uuid: &str) -> Result<CourseType> {
        self.catalog
            .course_type_by_uuid(uuid)?
            .ok_or_else(|| SyncError::rejected(400, format!("Course type {} does not exist", uuid)))
    }

    fn write_seats(&self, run: &CourseRun, prices: &BTreeMap<String, String>) -> Result<()> {
        let Some(type_id) = run.type_id else {
            return Ok(());
        };
        let Some(run_type) = self.catalog.run_type_by_id(type_id)? else {
            return Ok(());
        };
        for seat_type in &run_type.seat_types {
            self.catalog
                .upsert_seat(run, seat_type, &seat_price(prices, seat_type))?;
        }
        self.catalog.retain_seats(run, &run_type.seat_types)?;
        Ok(())
    }

    fn write_entitlements(&self, course: &Course, prices: &BTreeMap<String, String>) -> Result<()> {
        let Some(type_id) = course.type_id else {
            return Ok(());
        };
        let Some(course_type) = self.catalog.course_type_by_id(type_id)? else {
            return Ok(());
        };
        for mode in &course_type.entitlement_types {
            if let Some(price) = prices.get(mode) {
                self.catalog.upsert_entitlement(course, mode, price)?;
            }
        }
        self.catalog
            .retain_entitlements(course, &course_type.entitlement_types)?;
        Ok(())
    }

    fn apply_course_fields(&self, course: &mut Course, update: &CourseUpdate) -> Result<()> {
        if let Some(key) = &update.key {
            course.key = key.clone();
        }
        if let Some(title) = &update.title {
            if !title.is_empty() {
                course.title = title.clone();
            }
        }
        if let Some(type_uuid) = &update.course_type {
            course.type_id = Some(self.course_type(type_uuid)?.id);
        }
        apply_text(&mut course.syllabus_raw, &update.syllabus_raw);
        apply_text(&mut course.outcome, &update.outcome);
        apply_text(&mut course.faq, &update.faq);
        apply_text(&mut course.prerequisites_raw, &update.prerequisites_raw);
        apply_text(&mut course.full_description, &update.full_description);
        apply_text(&mut course.short_description, &update.short_description);
        apply_text(&mut course.learner_testimonials, &update.learner_testimonials);
        apply_text(&mut course.additional_information, &update.additional_information);
        apply_text(
            &mut course.organization_short_code_override,
            &update.organization_short_code_override,
        );
        if let Some(video) = &update.video {
            course.video_url = if video.src.is_empty() {
                None
            } else {
                Some(video.src.clone())
            };
        }
        if let Some(level) = &update.level_type {
            course.level_type_id = if level.is_empty() {
                None
            } else {
                let level_type = self.catalog.level_type_by_name(level)?.ok_or_else(|| {
                    SyncError::rejected(400, format!("Level type {} does not exist", level))
                })?;
                Some(level_type.id)
            };
        }
        if let Some(image) = &update.image {
            course.image_url = Some(image.url.clone());
            course.image_hash = Some(image.hash.clone());
        }
        if let Some(logo) = &update.organization_logo_override {
            course.organization_logo_override_url = Some(logo.url.clone());
        }
        if let Some(metadata) = &update.additional_metadata {
            let mut metadata = metadata.clone();
            metadata.id = course.additional_metadata_id.unwrap_or(0);
            course.additional_metadata_id = Some(self.catalog.save_additional_metadata(&metadata)?);
        }
        Ok(())
    }

    fn apply_course_relations(&self, course: &Course, update: &CourseUpdate) -> Result<()> {
        if let Some(subjects) = &update.subjects {
            let mut ids = Vec::with_capacity(subjects.len());
            for slug in subjects {
                let subject = self
                    .catalog
                    .subject_by_name(self.partner.id, slug)?
                    .ok_or_else(|| {
                        SyncError::rejected(400, format!("Subject {} does not exist", slug))
                    })?;
                ids.push(subject.id);
            }
            self.catalog.set_subjects(course.id, &ids)?;
        }
        if let Some(collaborators) = &update.collaborators {
            let mut ids = Vec::with_capacity(collaborators.len());
            for uuid in collaborators {
                let collaborator = self.catalog.collaborator_by_uuid(uuid)?.ok_or_else(|| {
                    SyncError::rejected(400, format!("Collaborator {} does not exist", uuid))
                })?;
                ids.push(collaborator.id);
            }
            self.catalog.set_collaborators(course.id, &ids)?;
        }
        if let Some(slug) = &update.url_slug {
            if !slug.is_empty()
                && self.catalog.active_url_slug(self.partner.id, &course.uuid)?.as_deref()
                    != Some(slug.as_str())
            {
                self.catalog
                    .set_active_url_slug(self.partner.id, &course.uuid, slug)?;
            }
        }
        Ok(())
    }

    fn apply_run_fields(&self, run: &mut CourseRun, update: &CourseRunUpdate) -> Result<()> {
        if let Some(run_type) = &update.run_type {
            let run_type = self.catalog.run_type_by_uuid(run_type)?.ok_or_else(|| {
                SyncError::rejected(400, format!("Course run type {} does not exist", run_type))
            })?;
            run.type_id = Some(run_type.id);
        }
        apply_text(&mut run.start, &update.start);
        apply_text(&mut run.end, &update.end);
        apply_text(&mut run.go_live_date, &update.go_live_date);
        apply_text(&mut run.upgrade_deadline_override, &update.upgrade_deadline_override);
        apply_text(&mut run.enrollment_end, &update.enrollment_end);
        apply_text(&mut run.content_language, &update.content_language);
        apply_text(&mut run.expected_program_type, &update.expected_program_type);
        apply_text(&mut run.expected_program_name, &update.expected_program_name);
        apply_text(&mut run.variant_id, &update.variant_id);
        apply_text(&mut run.restriction_type, &update.restriction_type);
        apply_number(&mut run.weeks_to_complete, update.weeks_to_complete);
        apply_number(&mut run.min_effort, update.min_effort);
        apply_number(&mut run.max_effort, update.max_effort);
        if update.pacing_type.is_some() {
            run.pacing_type = update.pacing_type;
        }
        Ok(())
    }

    fn apply_run_relations(&self, run: &CourseRun, update: &CourseRunUpdate) -> Result<()> {
        if let Some(staff) = &update.staff {
            let mut ids = Vec::with_capacity(staff.len());
            for uuid in staff {
                let person = self.catalog.person_by_uuid(uuid)?.ok_or_else(|| {
                    SyncError::rejected(400, format!("Person {} does not exist", uuid))
                })?;
                ids.push(person.id);
            }
            self.catalog.set_staff(run.id, &ids)?;
        }
        if let Some(languages) = &update.transcript_languages {
            self.catalog.set_transcript_languages(run.id, languages)?;
        }
        if let Some(prices) = &update.prices {
            self.write_seats(run, prices)?;
        }
        Ok(())
    }
}

impl CourseApi for LocalCourseApi<'_> {
    fn create_course(&self, create: &CourseCreate) -> Result<CourseCreated> {
        let org = self
            .catalog
            .organization_by_key(self.partner.id, &create.org)?
            .ok_or_else(|| {
                SyncError::rejected(400, format!("Organization {} does not exist", create.org))
            })?;
        let course_type = self.course_type(&create.course_type)?;
        let run_type = self
            .catalog
            .run_type_by_uuid(&create.course_run.run_type)?
            .ok_or_else(|| {
                SyncError::rejected(
                    400,
                    format!("Course run type {} does not exist", create.course_run.run_type),
                )
            })?;
        let source = self
            .catalog
            .source_by_slug(&create.product_source)?
            .ok_or_else(|| {
                SyncError::rejected(
                    400,
                    format!("Product source {} does not exist", create.product_source),
                )
            })?;

        let key = CourseKey::new(org.key.clone(), create.number.trim());
        if self
            .catalog
            .course_by_key_draft_aware(self.partner.id, &key.to_string())?
            .is_some()
        {
            return Err(SyncError::rejected(
                400,
                format!("A course with key {} already exists", key),
            ));
        }

        let course = self.catalog.insert_course(&NewCourse {
            uuid: Uuid::new_v4().to_string(),
            partner_id: self.partner.id,
            key: key.to_string(),
            title: create.title.clone(),
            draft: true,
            type_id: Some(course_type.id),
            product_source_id: Some(source.id),
        })?;
        self.catalog.set_authoring_orgs(course.id, &[org.id])?;

        let base = match slugify(&create.title) {
            slug if slug.is_empty() => course.uuid.clone(),
            slug => slug,
        };
        let slug = self.catalog.unique_url_slug(self.partner.id, &base)?;
        self.catalog
            .set_active_url_slug(self.partner.id, &course.uuid, &slug)?;

        for mode in &course_type.entitlement_types {
            self.catalog
                .upsert_entitlement(&course, mode, &entitlement_price(&create.prices, mode))?;
        }

        let fields = &create.course_run;
        let run_key = next_run_key(self.catalog, &key, fields.start.as_deref())?;
        let mut run = self.catalog.insert_course_run(&NewCourseRun {
            uuid: Uuid::new_v4().to_string(),
            course_id: course.id,
            key: run_key.clone(),
            draft: true,
            type_id: Some(run_type.id),
            start: fields.start.clone(),
            end: fields.end.clone(),
            pacing_type: fields.pacing_type,
            variant_id: fields.variant_id.clone(),
        })?;
        if fields.restriction_type.is_some() {
            run.restriction_type = fields.restriction_type.clone();
            self.catalog.save_course_run(&run)?;
        }
        for seat_type in &run_type.seat_types {
            self.catalog
                .upsert_seat(&run, seat_type, &seat_price(&create.prices, seat_type))?;
        }
        self.catalog.set_canonical_run(course.id, Some(run.id))?;

        info!(course = %key, run = %run_key, slug = %slug, "course created");
        Ok(CourseCreated {
            uuid: course.uuid,
            key: key.to_string(),
            course_run_key: run_key,
        })
    }

    fn create_course_run(&self, create: &CourseRunCreate) -> Result<ApiRef> {
        let course = self
            .catalog
            .course_by_key_draft_aware(self.partner.id, &create.course)?
            .ok_or_else(|| {
                SyncError::rejected(400, format!("Course {} does not exist", create.course))
            })?;
        let course = self.catalog.ensure_draft_course(&course)?;
        let course_key: CourseKey = course
            .key
            .parse()
            .map_err(|e: crate::core::identity::KeyParseError| SyncError::rejected(400, e.to_string()))?;
        let run_type = self.catalog.run_type_by_uuid(&create.run_type)?.ok_or_else(|| {
            SyncError::rejected(400, format!("Course run type {} does not exist", create.run_type))
        })?;

        let parent = match &create.rerun {
            Some(old_key) => Some(
                self.catalog
                    .course_run_by_key_draft_aware(old_key)?
                    .ok_or_else(|| {
                        SyncError::rejected(400, format!("Course run {} does not exist", old_key))
                    })?,
            ),
            None => None,
        };

        let key = next_run_key(self.catalog, &course_key, create.start.as_deref())?;
        let mut run = self.catalog.insert_course_run(&NewCourseRun {
            uuid: Uuid::new_v4().to_string(),
            course_id: course.id,
            key: key.clone(),
            draft: true,
            type_id: Some(run_type.id),
            start: create.start.clone(),
            end: create.end.clone(),
            pacing_type: create
                .pacing_type
                .or_else(|| parent.as_ref().and_then(|p| p.pacing_type)),
            variant_id: create.variant_id.clone(),
        })?;

        if let Some(parent) = &parent {
            run.title_override = parent.title_override.clone();
            run.content_language = parent.content_language.clone();
            run.weeks_to_complete = parent.weeks_to_complete;
            run.min_effort = parent.min_effort;
            run.max_effort = parent.max_effort;
            run.expected_program_type = parent.expected_program_type.clone();
            run.expected_program_name = parent.expected_program_name.clone();
            self.catalog
                .set_staff(run.id, &self.catalog.staff_ids(parent.id)?)?;
            self.catalog
                .set_transcript_languages(run.id, &self.catalog.transcript_languages(parent.id)?)?;
        }
        run.restriction_type = create.restriction_type.clone();
        self.catalog.save_course_run(&run)?;

        for seat_type in &run_type.seat_types {
            self.catalog
                .upsert_seat(&run, seat_type, &seat_price(&create.prices, seat_type))?;
        }

        debug!(run = %key, rerun = ?create.rerun, "course run created");
        Ok(ApiRef {
            uuid: run.uuid,
            key,
        })
    }

    fn update_course(&self, uuid: &str, update: &CourseUpdate) -> Result<ApiRef> {
        let course = self
            .catalog
            .course_by_uuid_draft_aware(uuid)?
            .ok_or_else(|| SyncError::rejected(404, format!("Course {} does not exist", uuid)))?;
        let mut course = self.catalog.ensure_draft_course(&course)?;

        self.apply_course_fields(&mut course, update)?;
        self.catalog.save_course(&course)?;
        self.apply_course_relations(&course, update)?;
        if let Some(prices) = &update.prices {
            self.write_entitlements(&course, prices)?;
        }

        if !update.draft {
            self.catalog.set_official_course(&course)?;
        }
        Ok(ApiRef {
            uuid: course.uuid,
            key: course.key,
        })
    }

    fn update_course_run(&self, key: &str, update: &CourseRunUpdate) -> Result<ApiRef> {
        let run = self
            .catalog
            .course_run_by_key_draft_aware(key)?
            .ok_or_else(|| SyncError::rejected(404, format!("Course run {} does not exist", key)))?;
        let mut run = self.catalog.ensure_draft_run(&run)?;

        self.apply_run_fields(&mut run, update)?;
        self.catalog.save_course_run(&run)?;
        self.apply_run_relations(&run, update)?;
        if let Some(status) = update.status {
            self.catalog.set_course_run_status(&run, status)?;
        }

        if !update.draft {
            if let Some(draft) = self.catalog.course_run_by_id(run.id)? {
                self.catalog.set_official_run(&draft)?;
            }
        }
        Ok(ApiRef {
            uuid: run.uuid,
            key: run.key,
        })
    }
}

// =========================================================================
// HTTP implementation
// =========================================================================

/// Sends envelopes to a running catalog service
pub struct HttpCourseApi {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CreatedResponse {
    uuid: String,
    key: String,
    #[serde(default)]
    course_runs: Vec<RunKeyResponse>,
}

#[derive(Deserialize)]
struct RunKeyResponse {
    key: String,
}

impl HttpCourseApi {
    pub fn new(config: &IngestionConfig) -> Result<Self> {
        let base_url = config
            .course_api
            .base_url
            .clone()
            .ok_or(SyncError::NotConfigured("course_api.base_url"))?;
        Ok(Self {
            client: http::build_client(
                config.http_timeout_secs,
                &http::api_user_agent(),
                config.course_api.token.as_deref(),
            )?,
            base_url,
        })
    }

    fn decode<T: serde::de::DeserializeOwned>(response: reqwest::blocking::Response) -> Result<T> {
        response
            .json::<T>()
            .map_err(|e| SyncError::Decode(e.to_string()))
    }
}

impl CourseApi for HttpCourseApi {
    fn create_course(&self, create: &CourseCreate) -> Result<CourseCreated> {
        let url = http::join(&self.base_url, "/api/v1/courses/")?;
        let response = http::check(self.client.post(url).json(create).send()?)?;
        let created: CreatedResponse = Self::decode(response)?;
        let course_run_key = created
            .course_runs
            .into_iter()
            .next()
            .map(|r| r.key)
            .ok_or_else(|| SyncError::Decode("course created without a course run".to_string()))?;
        Ok(CourseCreated {
            uuid: created.uuid,
            key: created.key,
            course_run_key,
        })
    }

    fn create_course_run(&self, create: &CourseRunCreate) -> Result<ApiRef> {
        let url = http::join(&self.base_url, "/api/v1/course_runs/")?;
        let response = http::check(self.client.post(url).json(create).send()?)?;
        Self::decode(response)
    }

    fn update_course(&self, uuid: &str, update: &CourseUpdate) -> Result<ApiRef> {
        let url = http::join(
            &self.base_url,
            &format!("/api/v1/courses/{}/?exclude_utm=1", uuid),
        )?;
        let response = http::check(self.client.patch(url).json(update).send()?)?;
        Self::decode(response)
    }

    fn update_course_run(&self, key: &str, update: &CourseRunUpdate) -> Result<ApiRef> {
        let url = http::join(
            &self.base_url,
            &format!("/api/v1/course_runs/{}/?exclude_utm=1", key),
        )?;
        let response = http::check(self.client.patch(url).json(update).send()?)?;
        Self::decode(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::SeedData;

    const SEED: &str = r#"
partners:
  - short_code: edx
    name: edX
sources:
  - slug: edx
    name: edX
organizations:
  - partner: edx
    key: edx
    name: edX
seat_types:
  - { slug: audit, name: Audit }
  - { slug: verified, name: Verified }
course_run_types:
  - slug: verified-audit
    name: Verified and Audit
    uuid: 00000000-0000-0000-0000-0000000000r1
    seat_types: [audit, verified]
course_types:
  - slug: verified-audit
    name: Verified and Audit
    uuid: 00000000-0000-0000-0000-0000000000c1
    entitlement_types: [verified]
    run_types: [verified-audit]
subjects:
  - { partner: edx, slug: biology, name: Biology }
level_types: [Introductory]
"#;

    fn setup() -> (Catalog, Partner) {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .apply_seed(&SeedData::from_yaml(SEED).unwrap())
            .unwrap();
        let partner = catalog.partner_by_code("edx").unwrap().unwrap();
        (catalog, partner)
    }

    fn create_envelope() -> CourseCreate {
        CourseCreate {
            org: "edx".to_string(),
            title: "Intro Bio".to_string(),
            number: "BIO101".to_string(),
            course_type: "00000000-0000-0000-0000-0000000000c1".to_string(),
            product_source: "edx".to_string(),
            prices: BTreeMap::from([("verified".to_string(), "100.00".to_string())]),
            course_run: RunCreateFields {
                pacing_type: Some(Pacing::InstructorPaced),
                start: Some("2025-01-01T09:00:00Z".to_string()),
                end: Some("2025-03-01T17:00:00Z".to_string()),
                run_type: "00000000-0000-0000-0000-0000000000r1".to_string(),
                variant_id: Some("V1".to_string()),
                restriction_type: None,
            },
        }
    }

    #[test]
    fn test_create_course_builds_draft_world() {
        let (catalog, partner) = setup();
        let api = LocalCourseApi::new(&catalog, partner.clone());

        let created = api.create_course(&create_envelope()).unwrap();
        assert_eq!(created.key, "edx+BIO101");
        assert_eq!(created.course_run_key, "course-v1:edx+BIO101+1T2025");

        let course = catalog
            .course_by_key_draft_aware(partner.id, "edx+BIO101")
            .unwrap()
            .unwrap();
        assert!(course.draft);
        assert!(catalog.course_by_key(partner.id, "edx+BIO101").unwrap().is_none());
        assert_eq!(
            catalog.active_url_slug(partner.id, &course.uuid).unwrap().as_deref(),
            Some("intro-bio")
        );

        let run = catalog
            .course_run_by_key_draft_aware(&created.course_run_key)
            .unwrap()
            .unwrap();
        assert_eq!(course.canonical_course_run_id, Some(run.id));
        assert_eq!(run.variant_id.as_deref(), Some("V1"));

        let seats = catalog.seats(run.id).unwrap();
        let prices: Vec<_> = seats.iter().map(|s| (s.type_slug.as_str(), s.price.as_str())).collect();
        assert_eq!(prices, [("audit", "0.00"), ("verified", "100.00")]);
        assert_eq!(catalog.entitlements(course.id).unwrap()[0].price, "100.00");
    }

    #[test]
    fn test_create_duplicate_key_rejected() {
        let (catalog, partner) = setup();
        let api = LocalCourseApi::new(&catalog, partner);
        api.create_course(&create_envelope()).unwrap();

        let err = api.create_course(&create_envelope()).unwrap_err();
        assert!(matches!(err, SyncError::Http { status: 400, .. }));
    }

    #[test]
    fn test_create_unknown_org_rejected() {
        let (catalog, partner) = setup();
        let api = LocalCourseApi::new(&catalog, partner);
        let mut envelope = create_envelope();
        envelope.org = "nope".to_string();
        assert!(api.create_course(&envelope).is_err());
        assert_eq!(catalog.count("courses").unwrap(), 0);
    }

    #[test]
    fn test_run_key_collision_gets_suffix() {
        let (catalog, partner) = setup();
        let api = LocalCourseApi::new(&catalog, partner);
        let created = api.create_course(&create_envelope()).unwrap();

        let rerun = api
            .create_course_run(&CourseRunCreate {
                course: created.key.clone(),
                start: Some("2025-02-01T00:00:00Z".to_string()),
                end: None,
                run_type: "00000000-0000-0000-0000-0000000000r1".to_string(),
                pacing_type: None,
                rerun: Some(created.course_run_key.clone()),
                variant_id: Some("V2".to_string()),
                restriction_type: None,
                prices: BTreeMap::new(),
            })
            .unwrap();
        assert_eq!(rerun.key, "course-v1:edx+BIO101+1T2025a");

        let run = catalog.course_run_by_key_draft_aware(&rerun.key).unwrap().unwrap();
        assert_eq!(run.pacing_type, Some(Pacing::InstructorPaced));
    }

    #[test]
    fn test_update_course_draft_then_official() {
        let (catalog, partner) = setup();
        let api = LocalCourseApi::new(&catalog, partner.clone());
        let created = api.create_course(&create_envelope()).unwrap();

        let update = CourseUpdate {
            draft: true,
            short_description: Some("<p>Cells</p>".to_string()),
            subjects: Some(vec!["biology".to_string()]),
            level_type: Some("Introductory".to_string()),
            ..CourseUpdate::default()
        };
        api.update_course(&created.uuid, &update).unwrap();
        assert!(catalog.course_by_uuid(&created.uuid).unwrap().is_none());

        let publish = CourseUpdate {
            draft: false,
            ..update
        };
        api.update_course(&created.uuid, &publish).unwrap();
        let official = catalog.course_by_uuid(&created.uuid).unwrap().unwrap();
        assert_eq!(official.short_description.as_deref(), Some("<p>Cells</p>"));
        assert_eq!(catalog.subject_ids(official.id).unwrap().len(), 1);
        assert!(official.level_type_id.is_some());
    }

    #[test]
    fn test_empty_string_clears_field() {
        let (catalog, partner) = setup();
        let api = LocalCourseApi::new(&catalog, partner);
        let created = api.create_course(&create_envelope()).unwrap();

        api.update_course(
            &created.uuid,
            &CourseUpdate {
                draft: true,
                faq: Some("<p>Q</p>".to_string()),
                ..CourseUpdate::default()
            },
        )
        .unwrap();
        api.update_course(
            &created.uuid,
            &CourseUpdate {
                draft: true,
                faq: Some(String::new()),
                ..CourseUpdate::default()
            },
        )
        .unwrap();
        let course = catalog.course_by_uuid_draft_aware(&created.uuid).unwrap().unwrap();
        assert_eq!(course.faq, None);
    }

    #[test]
    fn test_update_run_prices_seats() {
        let (catalog, partner) = setup();
        let api = LocalCourseApi::new(&catalog, partner);
        let created = api.create_course(&create_envelope()).unwrap();

        api.update_course_run(
            &created.course_run_key,
            &CourseRunUpdate {
                draft: true,
                prices: Some(BTreeMap::from([("verified".to_string(), "150.00".to_string())])),
                min_effort: Some(2),
                ..CourseRunUpdate::default()
            },
        )
        .unwrap();
        let run = catalog
            .course_run_by_key_draft_aware(&created.course_run_key)
            .unwrap()
            .unwrap();
        assert_eq!(run.min_effort, Some(2));
        let verified = catalog
            .seats(run.id)
            .unwrap()
            .into_iter()
            .find(|s| s.type_slug == "verified")
            .unwrap();
        assert_eq!(verified.price, "150.00");
    }

    #[test]
    fn test_seat_price_rules() {
        let prices = BTreeMap::from([("verified".to_string(), "49.00".to_string())]);
        assert_eq!(seat_price(&prices, "audit"), "0.00");
        assert_eq!(seat_price(&prices, "verified"), "49.00");
        assert_eq!(seat_price(&prices, "professional"), "0.00");
    }

    #[test]
    fn test_http_update_course_patches_with_exclude_utm() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("PATCH", "/api/v1/courses/abc/")
            .match_query(mockito::Matcher::UrlEncoded(
                "exclude_utm".into(),
                "1".into(),
            ))
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body(r#"{"uuid":"abc","key":"edx+BIO101"}"#)
            .create();

        let mut config = IngestionConfig::default();
        config.course_api.base_url = Some(server.url());
        config.course_api.token = Some("secret".to_string());
        let api = HttpCourseApi::new(&config).unwrap();

        let result = api
            .update_course("abc", &CourseUpdate::prices_only(true, BTreeMap::new()))
            .unwrap();
        assert_eq!(result.key, "edx+BIO101");
        mock.assert();
    }

    #[test]
    fn test_http_create_failure_surfaces_status() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("POST", "/api/v1/courses/")
            .with_status(400)
            .with_body("bad org")
            .create();

        let mut config = IngestionConfig::default();
        config.course_api.base_url = Some(server.url());
        let api = HttpCourseApi::new(&config).unwrap();

        match api.create_course(&create_envelope()) {
            Err(SyncError::Http { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad org");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_http_requires_base_url() {
        assert!(matches!(
            HttpCourseApi::new(&IngestionConfig::default()),
            Err(SyncError::NotConfigured(_))
        ));
    }
}
