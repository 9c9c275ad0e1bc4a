//! Course archival
//!
//! Two entry points share one per-course routine: the end-of-run sweep of
//! the course loader, which archives published external courses missing
//! from the batch, and the standalone `archive` command.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::catalog::{now, Catalog, CatalogError, Course, CourseType, Source};
use crate::core::entity::{CourseRunStatus, ProductStatus};
use crate::ingest::report::IngestionReport;
use crate::ingest::{IngestError, IngestionContext};

const DELETED_PREFIX: &str = "DELETED - ";

#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveOptions {
    /// Clamp run end and enrollment end dates to now
    pub mangle_end_date: bool,
    /// Prefix course titles with `DELETED - `
    pub mangle_title: bool,
}

/// Which courses the standalone command archives
#[derive(Debug, Clone)]
pub enum ArchiveTarget {
    Uuids(Vec<String>),
    CourseType(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedCourse {
    pub uuid: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveFailure {
    pub uuid: String,
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveReport {
    pub total_count: usize,
    pub successes: Vec<ArchivedCourse>,
    pub failures: Vec<ArchiveFailure>,
}

impl ArchiveReport {
    /// `course_uuid,title,status` with successes first
    pub fn to_csv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["course_uuid", "title", "status"])?;
        for course in &self.successes {
            writer.write_record([course.uuid.as_str(), course.title.as_str(), "success"])?;
        }
        for course in &self.failures {
            writer.write_record([course.uuid.as_str(), course.title.as_str(), "failure"])?;
        }
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[derive(Debug, thiserror::Error)]
enum ArchiveError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("{0}")]
    DateOrder(String),
}

fn out_of_order(first: Option<&str>, second: Option<&str>) -> bool {
    matches!((first, second), (Some(a), Some(b)) if a > b)
}

/// Archive every row of one course: unpublish its runs, mark its metadata
/// archived and clamp the metadata end date.
fn archive_course(
    catalog: &Catalog,
    course: &Course,
    options: ArchiveOptions,
) -> Result<(), ArchiveError> {
    let stamp = now();
    for mut run in catalog.course_runs_for(course.id)? {
        run.status = CourseRunStatus::Unpublished;
        if options.mangle_end_date {
            if run.end.as_deref().is_some_and(|end| end > stamp.as_str()) {
                run.end = Some(stamp.clone());
            }
            if run
                .enrollment_end
                .as_deref()
                .is_some_and(|end| end > stamp.as_str())
            {
                run.enrollment_end = Some(stamp.clone());
            }
        }
        if out_of_order(run.start.as_deref(), run.end.as_deref()) {
            return Err(ArchiveError::DateOrder(format!(
                "Start date is greater than end date for {}",
                run.key
            )));
        }
        catalog.save_course_run(&run)?;
    }

    if let Some(metadata_id) = course.additional_metadata_id {
        catalog.set_product_status(metadata_id, ProductStatus::Archived, Some(&stamp))?;
    }

    if options.mangle_title && !course.title.starts_with("DELETED") {
        let mut renamed = course.clone();
        renamed.title = format!("{}{}", DELETED_PREFIX, course.title);
        catalog.save_course(&renamed)?;
    }
    Ok(())
}

/// Archive the courses named by `target`. Each course is archived in its own
/// savepoint; a failure is recorded and the remaining courses still run.
pub fn archive_courses(
    catalog: &Catalog,
    partner_id: i64,
    target: &ArchiveTarget,
    options: ArchiveOptions,
) -> Result<ArchiveReport, CatalogError> {
    let uuids: Vec<String> = match target {
        ArchiveTarget::Uuids(uuids) => uuids.clone(),
        ArchiveTarget::CourseType(slug) => {
            let course_type = catalog
                .course_type_by_slug_or_name(slug)?
                .ok_or_else(|| CatalogError::not_found("course type", slug.clone()))?;
            let mut seen = HashSet::new();
            catalog
                .courses(partner_id)?
                .into_iter()
                .filter(|c| c.type_id == Some(course_type.id))
                .map(|c| c.uuid)
                .filter(|uuid| seen.insert(uuid.clone()))
                .collect()
        }
    };

    let mut report = ArchiveReport {
        total_count: uuids.len(),
        ..ArchiveReport::default()
    };

    for uuid in uuids {
        let rows = catalog.course_rows_by_uuid(&uuid)?;
        let Some(first) = rows.first() else {
            warn!(uuid = %uuid, "no course to archive");
            report.failures.push(ArchiveFailure {
                uuid,
                title: String::new(),
                reason: "course not found".to_string(),
            });
            continue;
        };
        let title = first.title.clone();

        let outcome = catalog.with_savepoint(|| {
            rows.iter()
                .try_for_each(|course| archive_course(catalog, course, options))
        })?;
        match outcome {
            Ok(()) => {
                info!(uuid = %uuid, "Successfully archived course");
                report.successes.push(ArchivedCourse { uuid, title });
            }
            Err(e) => {
                error!(uuid = %uuid, error = %e, "Failed to archive course");
                report.failures.push(ArchiveFailure {
                    uuid,
                    title,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}

/// End-of-run sweep: published courses of `course_type` from `source` whose
/// external identifier is not in `seen` become archived.
pub fn archive_missing(
    ctx: &IngestionContext<'_>,
    course_type: &CourseType,
    source: &Source,
    seen: &HashSet<String>,
    report: &mut IngestionReport,
) -> Result<(), IngestError> {
    let published =
        ctx.catalog
            .published_external_courses(ctx.partner.id, course_type.id, source.id)?;

    for (course, metadata) in published {
        let Some(external_identifier) = metadata.external_identifier.clone() else {
            continue;
        };
        if seen.contains(&external_identifier) {
            continue;
        }

        let rows = ctx.catalog.course_rows_by_uuid(&course.uuid)?;
        let outcome = ctx.catalog.with_savepoint(|| {
            rows.iter().try_for_each(|row| {
                for run in ctx.catalog.course_runs_for(row.id)? {
                    ctx.catalog
                        .set_course_run_status(&run, CourseRunStatus::Unpublished)?;
                }
                if let Some(metadata_id) = row.additional_metadata_id {
                    ctx.catalog
                        .set_product_status(metadata_id, ProductStatus::Archived, None)?;
                }
                Ok::<(), CatalogError>(())
            })
        })?;

        match outcome {
            Ok(()) => {
                info!(course = %course.key, external_identifier = %external_identifier, "archived course");
                report.archived(external_identifier);
            }
            Err(e) => report.other(format!(
                "Failed to archive course {} ({}): {}",
                course.key, external_identifier, e
            )),
        }
    }
    Ok(())
}
