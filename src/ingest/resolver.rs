//! Entity resolution
//!
//! Maps a validated row onto the catalog entity it targets. Course lookups
//! prefer the draft twin; run identity is the variant id when one is given,
//! else the exact schedule of a variant-less run.

use std::collections::HashSet;

use crate::core::catalog::{Catalog, Course, CourseRun, LanguageTag, Program, Result, User};
use crate::core::config::IngestionConfig;
use crate::core::identity::{CourseKey, ProductKind};
use crate::ingest::normalize::is_uuid;

/// Outcome of resolving one row
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<T> {
    pub entity: Option<T>,
    /// Whether an earlier row of the same run already touched this entity
    pub already_processed: bool,
}

impl<T> Resolution<T> {
    pub fn is_new(&self) -> bool {
        self.entity.is_none()
    }
}

/// Course keys handled so far in a run
#[derive(Debug, Default)]
pub struct ProcessedSet(HashSet<String>);

impl ProcessedSet {
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    /// Record a key; returns true the first time it is seen
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        self.0.insert(key.into())
    }
}

/// Course of a partner by key, draft first
pub fn resolve_course(
    catalog: &Catalog,
    partner_id: i64,
    key: &CourseKey,
    processed: &ProcessedSet,
) -> Result<Resolution<Course>> {
    let key = key.to_string();
    Ok(Resolution {
        entity: catalog.course_by_key_draft_aware(partner_id, &key)?,
        already_processed: processed.contains(&key),
    })
}

/// How a row's run maps onto the runs of a course
#[derive(Debug, Clone, PartialEq)]
pub enum RunMatch {
    /// An existing run carries the row's variant id
    Variant(CourseRun),
    /// A variant-less run has the row's exact schedule
    Schedule(CourseRun),
    /// Nothing matches; a rerun is needed
    None,
}

impl RunMatch {
    pub fn run(&self) -> Option<&CourseRun> {
        match self {
            RunMatch::Variant(run) | RunMatch::Schedule(run) => Some(run),
            RunMatch::None => None,
        }
    }
}

/// Find the run of `course` a row refers to. Ties go to the oldest run.
pub fn match_run(
    catalog: &Catalog,
    course: &Course,
    variant_id: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<RunMatch> {
    if let Some(variant) = variant_id.filter(|v| !v.is_empty()) {
        if let Some(run) = catalog.course_run_by_variant(course.id, variant)? {
            return Ok(RunMatch::Variant(run));
        }
    }
    if let (Some(start), Some(end)) = (start, end) {
        if let Some(run) = catalog.course_run_by_schedule(course.id, start, end)? {
            return Ok(RunMatch::Schedule(run));
        }
    }
    Ok(RunMatch::None)
}

/// Run a rerun is cloned from: the most recently created run of the course
pub fn rerun_parent(catalog: &Catalog, course: &Course) -> Result<Option<CourseRun>> {
    let runs = catalog.course_runs_for(course.id)?;
    Ok(runs
        .into_iter()
        .max_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id))))
}

/// Whether the course or program a geo or value row names exists.
/// Course checks include drafts.
pub fn product_exists(catalog: &Catalog, kind: ProductKind, uuid: &str) -> Result<bool> {
    Ok(match kind {
        ProductKind::Course => !catalog.course_rows_by_uuid(uuid)?.is_empty(),
        ProductKind::Program | ProductKind::Degree => catalog.program_by_uuid(uuid)?.is_some(),
    })
}

/// Degree of a partner and product source by external identifier
pub fn resolve_degree(
    catalog: &Catalog,
    partner_id: i64,
    product_source_id: i64,
    external_identifier: &str,
) -> Result<Resolution<Program>> {
    Ok(Resolution {
        entity: catalog.degree_by_external_identifier(
            partner_id,
            product_source_id,
            external_identifier,
        )?,
        already_processed: false,
    })
}

/// Language tag for a spreadsheet label. Configured labels map to codes
/// first; anything else is matched against tag names and codes.
pub fn resolve_language(
    catalog: &Catalog,
    config: &IngestionConfig,
    label: &str,
) -> Result<Option<LanguageTag>> {
    let label = label.trim();
    let mapped = config
        .language_label_map
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(label))
        .map(|(_, code)| code.as_str())
        .unwrap_or(label);
    catalog.language_by_name_or_code(mapped)
}

/// User named by username or email
pub fn resolve_user(catalog: &Catalog, username_or_email: &str) -> Result<Option<User>> {
    catalog.user_by_username_or_email(username_or_email.trim())
}

/// Course named by uuid when the value parses as one, else by key.
/// The official row wins; a draft-only course resolves to its draft.
pub fn resolve_course_ref(catalog: &Catalog, partner_id: i64, value: &str) -> Result<Option<Course>> {
    let value = value.trim();
    if is_uuid(value) {
        return match catalog.course_by_uuid(value)? {
            Some(course) => Ok(Some(course)),
            None => catalog.course_by_uuid_draft_aware(value),
        };
    }
    match catalog.course_by_key(partner_id, value)? {
        Some(course) => Ok(Some(course)),
        None => catalog.course_by_key_draft_aware(partner_id, value),
    }
}
