//! Course and course-run CSV loader
//!
//! One row describes one run of a course. A row either creates the course
//! (with its seed run), adds a rerun to an existing course, or updates the
//! run it matches. Every written run then goes through review completion.
//! External course types are reconciled at the end of the run: published
//! products missing from the input are archived.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, warn};

use crate::core::catalog::{
    AdditionalMetadata, CatalogError, CertificateInfo, Course, CourseRun, CourseRunType,
    CourseType, Fact, Organization, ProductMeta, Source,
};
use crate::core::entity::{course_type, run_restriction, Pacing, ProductStatus};
use crate::core::identity::{CourseKey, LoaderKind};
use crate::ingest::normalize::{
    combine_date_time, canonical_datetime, format_price, parse_bool, parse_int, split_list,
    to_html,
};
use crate::ingest::reader::Row;
use crate::ingest::report::{messages, CreatedProduct, ErrorKey, IngestionReport, RowFailure};
use crate::ingest::resolver::{self, ProcessedSet, RunMatch};
use crate::ingest::validator::validate_course;
use crate::ingest::{archive, lifecycle, IngestError, IngestionContext, Loader, RowOutcome};
use crate::sync::course_api::{
    CourseCreate, CourseRunCreate, CourseRunUpdate, CourseUpdate, RunCreateFields, StoredImage,
    Video,
};
use crate::sync::images::download_and_store;
use crate::sync::studio::push_to_studio;

const SUBJECT_COLUMNS: &[&str] = &["primary_subject", "secondary_subject", "tertiary_subject"];

/// What a row did to the course structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Creation {
    Course,
    Rerun,
    None,
}

pub struct CourseLoader {
    product_type: Option<String>,
    source: Source,
    processed: ProcessedSet,
    seen_external_ids: HashSet<String>,
}

impl CourseLoader {
    pub fn new(
        ctx: &IngestionContext<'_>,
        product_type: Option<&str>,
        product_source: Option<&str>,
    ) -> Result<Self, IngestError> {
        let source = super::product_source(ctx, product_source)?;
        debug!(source = %source.slug, product_type = ?product_type, "course loader ready");
        Ok(Self {
            product_type: product_type.map(str::to_string),
            source,
            processed: ProcessedSet::default(),
            seen_external_ids: HashSet::new(),
        })
    }

    /// External identifiers read so far
    pub fn seen_external_ids(&self) -> &HashSet<String> {
        &self.seen_external_ids
    }

    // =====================================================================
    // Reference lookups
    // =====================================================================

    fn organization(&self, ctx: &IngestionContext<'_>, row: &Row) -> Result<Organization, RowFailure> {
        let title = row.value("title");
        let key = row.value("organization");
        ctx.catalog
            .organization_by_key_or_mapping(ctx.partner.id, key, Some(self.source.id))
            .map_err(|e| db_failure(title, e))?
            .ok_or_else(|| {
                RowFailure::new(
                    ErrorKey::MissingOrganization,
                    messages::missing_organization(key, title),
                )
            })
    }

    fn course_type(&self, ctx: &IngestionContext<'_>, row: &Row) -> Result<CourseType, RowFailure> {
        let title = row.value("title");
        let wanted = row
            .get("course_enrollment_track")
            .or(self.product_type.as_deref())
            .unwrap_or("");
        let found = if wanted.is_empty() {
            None
        } else {
            ctx.catalog
                .course_type_by_slug_or_name(wanted)
                .map_err(|e| db_failure(title, e))?
        };
        found.ok_or_else(|| {
            RowFailure::new(
                ErrorKey::MissingCourseType,
                messages::missing_course_type(wanted, title),
            )
        })
    }

    fn run_type(
        &self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        course_type: &CourseType,
    ) -> Result<CourseRunType, RowFailure> {
        let title = row.value("title");
        let wanted = row
            .get("course_run_enrollment_track")
            .or_else(|| course_type.run_types.first().map(String::as_str))
            .unwrap_or("");
        let found = if wanted.is_empty() {
            None
        } else {
            ctx.catalog
                .run_type_by_slug_or_name(wanted)
                .map_err(|e| db_failure(title, e))?
                .filter(|run_type| course_type.allows_run_type(&run_type.slug))
        };
        found.ok_or_else(|| {
            RowFailure::new(
                ErrorKey::MissingCourseRunType,
                messages::missing_course_run_type(wanted, title),
            )
        })
    }

    // =====================================================================
    // Course and run creation
    // =====================================================================

    fn create_course(
        &self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        org: &Organization,
        types: (&CourseType, &CourseRunType),
        prices: &BTreeMap<String, String>,
    ) -> Result<(Course, CourseRun), RowFailure> {
        let title = row.value("title");
        let (course_type, run_type) = types;
        let create_error = |e: String| {
            RowFailure::new(ErrorKey::CourseCreateError, messages::course_create_error(title, &e))
        };
        let created = ctx
            .services
            .course_api
            .create_course(&CourseCreate {
                org: org.key.clone(),
                title: title.to_string(),
                number: row.value("number").to_string(),
                course_type: course_type.uuid.clone(),
                product_source: self.source.slug.clone(),
                prices: prices.clone(),
                course_run: RunCreateFields {
                    pacing_type: Pacing::from_token(row.value("course_pacing")),
                    start: start_of(row),
                    end: end_of(row),
                    run_type: run_type.uuid.clone(),
                    variant_id: row.get("variant_id").map(str::to_string),
                    restriction_type: restriction_of(row),
                },
            })
            .map_err(|e| create_error(e.to_string()))?;
        info!(course = %created.key, run = %created.course_run_key, "course created");

        let course = ctx
            .catalog
            .course_by_key_draft_aware(ctx.partner.id, &created.key)
            .map_err(|e| create_error(e.to_string()))?
            .ok_or_else(|| create_error(format!("course {} vanished after create", created.key)))?;
        let run = load_run(ctx, &created.course_run_key).map_err(|e| create_error(e.to_string()))?;
        Ok((course, run))
    }

    fn create_rerun(
        &self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        course: &Course,
        run_type: &CourseRunType,
        prices: &BTreeMap<String, String>,
    ) -> Result<(CourseRun, Option<String>), RowFailure> {
        let title = row.value("title");
        let create_error = |e: String| {
            RowFailure::new(
                ErrorKey::CourseRunCreateError,
                messages::course_run_create_error(title, row.value("variant_id"), &e),
            )
        };
        let parent = resolver::rerun_parent(ctx.catalog, course)
            .map_err(|e| create_error(e.to_string()))?
            .map(|run| run.key);
        let created = ctx
            .services
            .course_api
            .create_course_run(&CourseRunCreate {
                course: course.key.clone(),
                start: start_of(row),
                end: end_of(row),
                run_type: run_type.uuid.clone(),
                pacing_type: Pacing::from_token(row.value("course_pacing")),
                rerun: parent.clone(),
                variant_id: row.get("variant_id").map(str::to_string),
                restriction_type: restriction_of(row),
                prices: prices.clone(),
            })
            .map_err(|e| create_error(e.to_string()))?;
        info!(course = %course.key, run = %created.key, rerun = ?parent, "course run created");
        let run = load_run(ctx, &created.key).map_err(|e| create_error(e.to_string()))?;
        Ok((run, parent))
    }

    // =====================================================================
    // Updates
    // =====================================================================

    /// Full course update, or the entitlement prices alone when an earlier
    /// row of this run already wrote the course
    fn update_course(
        &self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        course: &Course,
        course_type: &CourseType,
        draft: bool,
        already_processed: bool,
        prices: Option<BTreeMap<String, String>>,
        report: &mut IngestionReport,
    ) -> Result<(), RowFailure> {
        let title = row.value("title");
        if already_processed {
            let Some(prices) = prices else {
                return Ok(());
            };
            return ctx
                .services
                .course_api
                .update_course(&course.uuid, &CourseUpdate::prices_only(draft, prices))
                .map(|_| ())
                .map_err(|e| {
                    RowFailure::new(
                        ErrorKey::CourseEntitlementPriceUpdateError,
                        messages::entitlement_price_update_error(title, &e.to_string()),
                    )
                });
        }

        let update_error = |e: String| {
            RowFailure::new(ErrorKey::CourseUpdateError, messages::course_update_error(title, &e))
        };
        let image = match row.get("image") {
            Some(url) => Some(
                download_and_store(ctx.catalog, &*ctx.services.images, url)
                    .map(|hash| StoredImage {
                        url: url.to_string(),
                        hash,
                    })
                    .map_err(|_| {
                        RowFailure::new(
                            ErrorKey::ImageDownloadFailure,
                            messages::image_download_failure(title),
                        )
                    })?,
            ),
            None => None,
        };
        let logo = match row.get("organization_logo_override") {
            Some(url) => match download_and_store(ctx.catalog, &*ctx.services.images, url) {
                Ok(hash) => Some(StoredImage {
                    url: url.to_string(),
                    hash,
                }),
                Err(_) => {
                    report.note(
                        ErrorKey::LogoImageDownloadFailure,
                        messages::logo_image_download_failure(title),
                    );
                    None
                }
            },
            None => None,
        };

        let mut collaborators = Vec::new();
        for name in split_list(row.value("collaborators")) {
            let collaborator = ctx
                .catalog
                .get_or_create_collaborator(&name)
                .map_err(|e| update_error(e.to_string()))?;
            collaborators.push(collaborator.uuid);
        }

        let update = CourseUpdate {
            draft,
            course_type: Some(course_type.uuid.clone()),
            subjects: self
                .subject_slugs(ctx, row)
                .map_err(|e| update_error(e.to_string()))?,
            collaborators: row.has("collaborators").then_some(collaborators),
            prices,
            title: Some(title.to_string()),
            syllabus_raw: row.get("syllabus").map(str::to_string),
            level_type: row.get("course_level").map(str::to_string),
            outcome: row.get("what_will_you_learn").map(to_html),
            faq: row.get("frequently_asked_questions").map(to_html),
            video: row.get("about_video_link").map(|src| Video {
                src: src.to_string(),
            }),
            prerequisites_raw: row.get("prerequisites").map(str::to_string),
            full_description: row.get("long_description").map(to_html),
            short_description: row.get("short_description").map(to_html),
            learner_testimonials: row.get("learner_testimonials").map(to_html),
            additional_information: row.get("additional_information").map(to_html),
            organization_short_code_override: row
                .get("organization_short_code_override")
                .map(str::to_string),
            organization_logo_override: logo,
            image,
            additional_metadata: course_type::is_external(&course_type.slug)
                .then(|| additional_metadata(row)),
            ..CourseUpdate::default()
        };
        ctx.services
            .course_api
            .update_course(&course.uuid, &update)
            .map_err(|e| update_error(e.to_string()))?;
        debug!(course = %course.key, draft, "course updated");
        Ok(())
    }

    /// Subject slugs in primary, secondary, tertiary order. Unknown subject
    /// names are skipped.
    fn subject_slugs(
        &self,
        ctx: &IngestionContext<'_>,
        row: &Row,
    ) -> Result<Option<Vec<String>>, CatalogError> {
        let names: Vec<&str> = SUBJECT_COLUMNS.iter().filter_map(|c| row.get(c)).collect();
        if names.is_empty() {
            return Ok(None);
        }
        let mut slugs = Vec::with_capacity(names.len());
        for name in names {
            match ctx.catalog.subject_by_name(ctx.partner.id, name)? {
                Some(subject) if !slugs.contains(&subject.slug) => slugs.push(subject.slug),
                Some(_) => {}
                None => warn!(subject = name, "unknown subject skipped"),
            }
        }
        Ok(Some(slugs))
    }

    fn update_run(
        &self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        run: &CourseRun,
        run_type: &CourseRunType,
        draft: bool,
        prices: Option<BTreeMap<String, String>>,
    ) -> Result<(), RowFailure> {
        let title = row.value("title");
        let update_error = |e: String| {
            RowFailure::new(
                ErrorKey::CourseRunUpdateError,
                messages::course_run_update_error(title, &e),
            )
        };

        let staff = match row.get("staff") {
            Some(value) => {
                let mut uuids = Vec::new();
                for name in split_list(value) {
                    let person = ctx
                        .catalog
                        .get_or_create_person(ctx.partner.id, &name)
                        .map_err(|e| update_error(e.to_string()))?;
                    uuids.push(person.uuid);
                }
                Some(uuids)
            }
            None => None,
        };
        let content_language = match row.get("content_language") {
            Some(label) => Some(self.language_code(ctx, label).map_err(update_error)?),
            None => None,
        };
        let transcript_languages = match row.get("transcript_language") {
            Some(value) => {
                let mut codes = Vec::new();
                for label in split_list(value) {
                    let code = self.language_code(ctx, &label).map_err(update_error)?;
                    if !codes.contains(&code) {
                        codes.push(code);
                    }
                }
                Some(codes)
            }
            None => None,
        };

        let update = CourseRunUpdate {
            draft,
            run_type: Some(run_type.uuid.clone()),
            prices,
            staff,
            start: start_of(row),
            end: end_of(row),
            weeks_to_complete: parse_int(row.value("length")),
            min_effort: parse_int(row.value("minimum_effort")),
            max_effort: parse_int(row.value("maximum_effort")),
            content_language,
            pacing_type: Pacing::from_token(row.value("course_pacing")),
            transcript_languages,
            go_live_date: Some(canonical_datetime(row.value("publish_date")).unwrap_or_default()),
            expected_program_type: Some(
                ctx.config
                    .allowed_program_type(row.value("expected_program_type"))
                    .unwrap_or_default(),
            ),
            expected_program_name: Some(row.value("expected_program_name").to_string()),
            upgrade_deadline_override: Some(
                combine_date_time(
                    row.value("upgrade_deadline_override_date"),
                    row.value("upgrade_deadline_override_time"),
                )
                .unwrap_or_default(),
            ),
            enrollment_end: Some(
                combine_date_time(row.value("reg_close_date"), row.value("reg_close_time"))
                    .unwrap_or_default(),
            ),
            variant_id: row.get("variant_id").map(str::to_string),
            restriction_type: restriction_of(row),
            status: None,
        };
        ctx.services
            .course_api
            .update_course_run(&run.key, &update)
            .map_err(|e| update_error(e.to_string()))?;
        debug!(run = %run.key, draft, "course run updated");
        Ok(())
    }

    fn language_code(&self, ctx: &IngestionContext<'_>, label: &str) -> Result<String, String> {
        match resolver::resolve_language(ctx.catalog, ctx.config, label) {
            Ok(Some(tag)) => Ok(tag.code),
            Ok(None) => Err(format!("Language {} does not exist", label)),
            Err(e) => Err(e.to_string()),
        }
    }

    fn sync_studio(
        &self,
        ctx: &IngestionContext<'_>,
        course_key: &str,
        run_key: &str,
        creation: Creation,
        parent: Option<&str>,
        report: &mut IngestionReport,
    ) {
        let loaded = ctx
            .catalog
            .course_by_key_draft_aware(ctx.partner.id, course_key)
            .and_then(|course| Ok((course, ctx.catalog.course_run_by_key_draft_aware(run_key)?)));
        let Ok((Some(course), Some(run))) = loaded else {
            warn!(run = run_key, "run not found for studio push");
            return;
        };
        let create = creation != Creation::None;
        if let Err(e) = push_to_studio(
            &*ctx.services.studio,
            ctx.catalog,
            &course,
            &run,
            create,
            parent.filter(|_| creation == Creation::Rerun),
            None,
        ) {
            warn!(run = %run.key, error = %e, "studio push failed");
            report.other(format!("Studio push of {} failed: {}", run.key, e));
        }
    }
}

impl Loader for CourseLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::Course
    }

    fn process_row(
        &mut self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        report: &mut IngestionReport,
    ) -> Result<RowOutcome, RowFailure> {
        if let Some(external_id) = row.get("external_identifier") {
            self.seen_external_ids.insert(external_id.to_string());
        }
        let title = row.value("title");

        let org = self.organization(ctx, row)?;
        let course_type = self.course_type(ctx, row)?;
        let run_type = self.run_type(ctx, row, &course_type)?;
        let missing = validate_course(row, ctx.config, &course_type);
        if !missing.is_empty() {
            return Err(RowFailure::new(
                ErrorKey::MissingRequiredData,
                messages::missing_required_data(title, &missing),
            ));
        }

        let key = CourseKey::new(org.key.clone(), row.value("number"));
        let prices = prices_for(row, &course_type, &run_type);
        let resolution = resolver::resolve_course(ctx.catalog, ctx.partner.id, &key, &self.processed)
            .map_err(|e| db_failure(title, e))?;
        let already_processed = resolution.already_processed;

        let (course, run, creation, parent) = match resolution.entity {
            None => {
                let (course, run) =
                    self.create_course(ctx, row, &org, (&course_type, &run_type), &prices)?;
                (course, run, Creation::Course, None)
            }
            Some(course) => {
                let matched = resolver::match_run(
                    ctx.catalog,
                    &course,
                    row.get("variant_id"),
                    start_of(row).as_deref(),
                    end_of(row).as_deref(),
                )
                .map_err(|e| db_failure(title, e))?;
                match matched {
                    RunMatch::Variant(run) | RunMatch::Schedule(run) => {
                        (course, run, Creation::None, None)
                    }
                    RunMatch::None => {
                        let (run, parent) =
                            self.create_rerun(ctx, row, &course, &run_type, &prices)?;
                        (course, run, Creation::Rerun, parent)
                    }
                }
            }
        };

        let draft = !ctx
            .catalog
            .has_published_run(&course)
            .map_err(|e| db_failure(title, e))?;
        let send_prices = (!is_b2b_enterprise(row)).then(|| prices.clone());

        self.update_course(
            ctx,
            row,
            &course,
            &course_type,
            draft,
            already_processed,
            send_prices.clone(),
            report,
        )?;
        if !run.status.in_review() {
            self.update_run(ctx, row, &run, &run_type, draft, send_prices)?;
        }

        self.sync_studio(ctx, &course.key, &run.key, creation, parent.as_deref(), report);

        let run_error = |e: String| {
            RowFailure::new(
                ErrorKey::CourseRunUpdateError,
                messages::course_run_update_error(title, &e),
            )
        };
        let run = load_run(ctx, &run.key).map_err(|e| run_error(e.to_string()))?;
        lifecycle::finish_review(
            ctx,
            &run,
            parse_bool(row.value("move_to_legal_review")),
            report,
        )
        .map_err(|e| run_error(e.to_string()))?;

        ctx.catalog
            .set_course_product_source(&course, self.source.id)
            .map_err(|e| db_failure(title, e))?;
        self.processed.insert(course.key.clone());

        if creation == Creation::None {
            return Ok(RowOutcome::Updated);
        }
        let url_slug = ctx
            .catalog
            .active_url_slug(ctx.partner.id, &course.uuid)
            .map_err(|e| db_failure(title, e))?;
        Ok(RowOutcome::Created(CreatedProduct {
            uuid: course.uuid.clone(),
            title: title.to_string(),
            key: run.key.clone(),
            variant_id: run.variant_id.clone(),
            restriction_type: run.restriction_type.clone(),
            url_slug,
            external_course_marketing_type: row
                .get("external_course_marketing_type")
                .map(str::to_string),
            rerun: creation == Creation::Rerun,
            is_future_variant: parse_bool(row.value("is_future_variant")),
        }))
    }

    fn finish(
        &mut self,
        ctx: &IngestionContext<'_>,
        report: &mut IngestionReport,
    ) -> Result<(), IngestError> {
        let Some(product_type) = self.product_type.as_deref() else {
            return Ok(());
        };
        if !ctx.config.is_archive_target(product_type) {
            return Ok(());
        }
        match ctx.catalog.course_type_by_slug_or_name(product_type)? {
            Some(course_type) => archive::archive_missing(
                ctx,
                &course_type,
                &self.source,
                &self.seen_external_ids,
                report,
            ),
            None => {
                warn!(product_type, "archival skipped: unknown course type");
                Ok(())
            }
        }
    }
}

// =========================================================================
// Row helpers
// =========================================================================

fn db_failure(title: &str, e: CatalogError) -> RowFailure {
    RowFailure::new(
        ErrorKey::CourseUpdateError,
        messages::course_update_error(title, &e.to_string()),
    )
}

fn load_run(ctx: &IngestionContext<'_>, key: &str) -> Result<CourseRun, CatalogError> {
    ctx.catalog
        .course_run_by_key_draft_aware(key)?
        .ok_or_else(|| CatalogError::not_found("course run", key))
}

fn start_of(row: &Row) -> Option<String> {
    combine_date_time(row.value("start_date"), row.value("start_time"))
}

fn end_of(row: &Row) -> Option<String> {
    combine_date_time(row.value("end_date"), row.value("end_time"))
}

fn restriction_of(row: &Row) -> Option<String> {
    match row.get("restriction_type") {
        Some(value) if run_restriction::is_valid(value) => Some(value.to_string()),
        Some(value) => {
            warn!(restriction_type = value, "unknown restriction type ignored");
            None
        }
        None => None,
    }
}

fn is_b2b_enterprise(row: &Row) -> bool {
    row.get("restriction_type") == Some(run_restriction::CUSTOM_B2B_ENTERPRISE)
}

/// One price for every entitlement and seat type the course sells.
/// `fixed_price_usd` wins over `verified_price`.
fn prices_for(
    row: &Row,
    course_type: &CourseType,
    run_type: &CourseRunType,
) -> BTreeMap<String, String> {
    let price = row
        .get("fixed_price_usd")
        .and_then(format_price)
        .or_else(|| row.get("verified_price").and_then(format_price));
    let Some(price) = price else {
        return BTreeMap::new();
    };
    course_type
        .entitlement_types
        .iter()
        .chain(run_type.seat_types.iter())
        .map(|mode| (mode.clone(), price.clone()))
        .collect()
}

/// Metadata of an externally sourced course
fn additional_metadata(row: &Row) -> AdditionalMetadata {
    let text = |key: &str| row.get(key).map(str::to_string);
    let certificate_info = (row.has("certificate_header") || row.has("certificate_text")).then(|| {
        CertificateInfo {
            heading: row.value("certificate_header").to_string(),
            blurb: row.value("certificate_text").to_string(),
        }
    });
    let facts = [("stat1", "stat1_text"), ("stat2", "stat2_text")]
        .iter()
        .filter(|(heading, blurb)| row.has(heading) || row.has(blurb))
        .map(|(heading, blurb)| Fact {
            heading: row.value(heading).to_string(),
            blurb: row.value(blurb).to_string(),
        })
        .collect();
    let product_meta = ["meta_title", "meta_description", "meta_keywords"]
        .iter()
        .any(|k| row.has(k))
        .then(|| ProductMeta {
            title: text("meta_title"),
            description: text("meta_description"),
            keywords: split_list(row.value("meta_keywords")),
        });

    AdditionalMetadata {
        id: 0,
        external_url: text("redirect_url"),
        external_identifier: text("external_identifier"),
        lead_capture_form_url: text("lead_capture_form_url"),
        organic_url: text("organic_url"),
        certificate_info,
        facts,
        start_date: start_of(row),
        end_date: end_of(row),
        registration_deadline: combine_date_time(
            row.value("reg_close_date"),
            row.value("reg_close_time"),
        ),
        product_status: ProductStatus::Published,
        external_course_marketing_type: text("external_course_marketing_type"),
        taxi_form_id: text("taxi_form_id"),
        post_submit_url: text("post_submit_url"),
        product_meta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IngestionConfig;
    use crate::core::entity::CourseRunStatus;
    use crate::ingest::run;
    use crate::ingest::testing::{context, context_with, seeded_catalog, StubNotifier};

    fn external_row(index: usize) -> Row {
        Row::from_pairs(
            index,
            [
                ("Organization", "edx"),
                ("Title", "Intro Bio"),
                ("Number", "BIO101"),
                ("Verified Price", "100"),
                ("Course Pacing", "instructor-paced"),
                ("Start Date", "2025-01-01"),
                ("Start Time", "09:00:00"),
                ("End Date", "2025-03-01"),
                ("End Time", "17:00:00"),
                ("Image", "https://example/img.png"),
                ("External Identifier", "EXT-1"),
                ("Redirect Url", "https://x"),
                ("Variant Id", "V1"),
            ],
        )
    }

    fn loader(ctx: &IngestionContext<'_>) -> CourseLoader {
        CourseLoader::new(ctx, Some("executive-education-2u"), None).unwrap()
    }

    #[test]
    fn test_unknown_source_is_fatal() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let err = CourseLoader::new(&ctx, None, Some("nowhere")).err().unwrap();
        assert!(matches!(err, IngestError::MissingProductSource(s) if s == "nowhere"));
    }

    #[test]
    fn test_create_external_course() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let mut loader = loader(&ctx);

        let report = run(&ctx, &mut loader, vec![external_row(0)]).unwrap();

        assert_eq!(report.failure_count, 0, "{:?}", report.errors);
        assert_eq!(report.success_count, 1);
        assert_eq!(report.created_products.len(), 1);
        let created = &report.created_products[0];
        assert_eq!(created.variant_id.as_deref(), Some("V1"));
        assert_eq!(created.url_slug.as_deref(), Some("intro-bio"));
        assert!(!created.rerun);

        let course = catalog.course_by_key(ctx.partner.id, "edx+BIO101").unwrap().unwrap();
        let metadata = catalog
            .additional_metadata(course.additional_metadata_id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(metadata.external_identifier.as_deref(), Some("EXT-1"));
        assert_eq!(metadata.external_url.as_deref(), Some("https://x"));
        assert_eq!(metadata.product_status, ProductStatus::Published);

        let runs = catalog.course_runs_for(course.id).unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].key.starts_with("course-v1:edx+BIO101+"));
        assert_eq!(runs[0].status, CourseRunStatus::Published);
        assert_eq!(runs[0].start.as_deref(), Some("2025-01-01T09:00:00Z"));
        let seats = catalog.seats(runs[0].id).unwrap();
        let verified = seats.iter().find(|s| s.type_slug == "verified").unwrap();
        assert_eq!(verified.price, "100.00");
    }

    #[test]
    fn test_replay_updates_without_creating() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        run(&ctx, &mut loader(&ctx), vec![external_row(0)]).unwrap();
        let course = catalog.course_by_key(ctx.partner.id, "edx+BIO101").unwrap().unwrap();

        let report = run(&ctx, &mut loader(&ctx), vec![external_row(0)]).unwrap();

        assert_eq!(report.failure_count, 0, "{:?}", report.errors);
        assert!(report.created_products.is_empty());
        assert_eq!(report.updated_products_count, 1);
        let again = catalog.course_by_key(ctx.partner.id, "edx+BIO101").unwrap().unwrap();
        assert_eq!(again.id, course.id);
        assert_eq!(catalog.course_runs_for(course.id).unwrap().len(), 1);
    }

    #[test]
    fn test_b2b_enterprise_keeps_entitlement_price() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        run(&ctx, &mut loader(&ctx), vec![external_row(0)]).unwrap();

        let mut row = external_row(0);
        row.set("verified_price", "150");
        row.set("restriction_type", "custom-b2b-enterprise");
        let report = run(&ctx, &mut loader(&ctx), vec![row]).unwrap();

        assert_eq!(report.failure_count, 0, "{:?}", report.errors);
        let course = catalog.course_by_key(ctx.partner.id, "edx+BIO101").unwrap().unwrap();
        let entitlements = catalog.entitlements(course.id).unwrap();
        assert_eq!(entitlements.len(), 1);
        assert_eq!(entitlements[0].price, "100.00");
    }

    #[test]
    fn test_new_schedule_creates_rerun() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        run(&ctx, &mut loader(&ctx), vec![external_row(0)]).unwrap();

        let mut row = external_row(0);
        row.set("variant_id", "V2");
        row.set("start_date", "2025-09-01");
        row.set("end_date", "2025-12-01");
        let report = run(&ctx, &mut loader(&ctx), vec![row]).unwrap();

        assert_eq!(report.failure_count, 0, "{:?}", report.errors);
        assert_eq!(report.created_products.len(), 1);
        assert!(report.created_products[0].rerun);
        let course = catalog
            .course_by_key_draft_aware(ctx.partner.id, "edx+BIO101")
            .unwrap()
            .unwrap();
        assert_eq!(catalog.course_runs_for(course.id).unwrap().len(), 2);
        let reruns = catalog.outbox_entries("studio").unwrap();
        assert!(reruns.iter().any(|(action, _, _)| action == "rerun"));
    }

    #[test]
    fn test_image_failure_aborts_row_before_writes() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let mut row = external_row(0);
        row.set("image", "https://example/404.png");

        let report = run(&ctx, &mut loader(&ctx), vec![row]).unwrap();

        assert_eq!(report.failure_count, 1);
        assert_eq!(report.errors.get(ErrorKey::ImageDownloadFailure).len(), 1);
        assert!(catalog
            .course_by_key_draft_aware(ctx.partner.id, "edx+BIO101")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_logo_failure_is_noted_only() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let mut row = external_row(0);
        row.set("organization_logo_override", "https://example/404-logo.png");

        let report = run(&ctx, &mut loader(&ctx), vec![row]).unwrap();

        assert_eq!(report.success_count, 1);
        assert_eq!(report.failure_count, 0);
        assert_eq!(report.errors.get(ErrorKey::LogoImageDownloadFailure).len(), 1);
    }

    #[test]
    fn test_lookup_failures_are_keyed() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);

        let mut no_org = external_row(0);
        no_org.set("organization", "nobody");
        let mut no_type = external_row(1);
        no_type.set("course_enrollment_track", "Nonexistent Track");
        let mut bad_run_type = external_row(2);
        bad_run_type.set("course_run_enrollment_track", "audit");
        let mut blank = external_row(3);
        blank.set("redirect_url", "");

        let report = run(
            &ctx,
            &mut loader(&ctx),
            vec![no_org, no_type, bad_run_type, blank],
        )
        .unwrap();

        assert_eq!(report.failure_count, 4);
        assert_eq!(report.errors.get(ErrorKey::MissingOrganization).len(), 1);
        assert_eq!(report.errors.get(ErrorKey::MissingCourseType).len(), 1);
        assert_eq!(report.errors.get(ErrorKey::MissingCourseRunType).len(), 1);
        let missing = report.errors.get(ErrorKey::MissingRequiredData);
        assert_eq!(missing.len(), 1);
        assert!(missing[0].contains("redirect_url"));
    }

    #[test]
    fn test_mapped_organization_key() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let mut loader = CourseLoader::new(&ctx, Some("executive-education-2u"), Some("ext_source"))
            .unwrap();
        let mut row = external_row(0);
        row.set("organization", "other-ext");

        let report = run(&ctx, &mut loader, vec![row]).unwrap();

        assert_eq!(report.failure_count, 0, "{:?}", report.errors);
        let course = catalog
            .course_by_key_draft_aware(ctx.partner.id, "other+BIO101")
            .unwrap()
            .unwrap();
        let source = catalog.source_by_slug("ext_source").unwrap().unwrap();
        assert_eq!(course.product_source_id, Some(source.id));
    }

    #[test]
    fn test_legal_review_holds_publication() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let config = IngestionConfig {
            legal_review_required_fields: Vec::new(),
            ..IngestionConfig::default()
        };
        let ctx = context_with(&catalog, &notifier, &config);
        let mut row = external_row(0);
        row.set("course_enrollment_track", "verified-audit");
        row.set("move_to_legal_review", "true");

        let report = run(&ctx, &mut loader(&ctx), vec![row]).unwrap();

        assert_eq!(report.failure_count, 0, "{:?}", report.errors);
        let course = catalog
            .course_by_key_draft_aware(ctx.partner.id, "edx+BIO101")
            .unwrap()
            .unwrap();
        let runs = catalog.course_runs_for(course.id).unwrap();
        assert_eq!(runs[0].status, CourseRunStatus::LegalReview);
        assert!(catalog.course_by_key(ctx.partner.id, "edx+BIO101").unwrap().is_none());
        assert!(notifier
            .sent()
            .iter()
            .any(|n| n.subject.contains("review_by_legal")));
    }

    #[test]
    fn test_replayed_legal_review_row_stays_in_legal_review() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let config = IngestionConfig {
            legal_review_required_fields: Vec::new(),
            ..IngestionConfig::default()
        };
        let ctx = context_with(&catalog, &notifier, &config);
        let legal_row = || {
            let mut row = external_row(0);
            row.set("course_enrollment_track", "verified-audit");
            row.set("move_to_legal_review", "true");
            row
        };

        let first = run(&ctx, &mut loader(&ctx), vec![legal_row()]).unwrap();
        let second = run(&ctx, &mut loader(&ctx), vec![legal_row()]).unwrap();

        assert_eq!(first.failure_count, 0, "{:?}", first.errors);
        assert_eq!(second.failure_count, 0, "{:?}", second.errors);
        let course = catalog
            .course_by_key_draft_aware(ctx.partner.id, "edx+BIO101")
            .unwrap()
            .unwrap();
        let runs = catalog.course_runs_for(course.id).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, CourseRunStatus::LegalReview);
        assert!(catalog.course_by_key(ctx.partner.id, "edx+BIO101").unwrap().is_none());
        assert!(catalog.course_run_by_key(&runs[0].key).unwrap().is_none());
        assert!(catalog.outbox_entries("marketing").unwrap().is_empty());
    }

    #[test]
    fn test_second_row_of_course_sends_prices_only() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let mut second = external_row(1);
        second.set("variant_id", "V2");
        second.set("start_date", "2025-09-01");
        second.set("end_date", "2025-12-01");
        second.set("verified_price", "120");
        second.set("title", "Renamed Bio");

        let report = run(&ctx, &mut loader(&ctx), vec![external_row(0), second]).unwrap();

        assert_eq!(report.failure_count, 0, "{:?}", report.errors);
        assert_eq!(report.created_products.len(), 2);
        let course = catalog
            .course_by_key_draft_aware(ctx.partner.id, "edx+BIO101")
            .unwrap()
            .unwrap();
        assert_eq!(course.title, "Intro Bio");
        let entitlements = catalog.entitlements(course.id).unwrap();
        assert_eq!(entitlements[0].price, "120.00");
    }

    #[test]
    fn test_prices_fan_out_over_modes() {
        let catalog = seeded_catalog();
        let course_type = catalog
            .course_type_by_slug_or_name("verified-audit")
            .unwrap()
            .unwrap();
        let run_type = catalog
            .run_type_by_slug_or_name("verified-audit")
            .unwrap()
            .unwrap();
        let row = Row::from_pairs(0, [("verified_price", "$1,200"), ("fixed_price_usd", "")]);
        let prices = prices_for(&row, &course_type, &run_type);
        assert_eq!(prices.get("verified").map(String::as_str), Some("1200.00"));
        assert_eq!(prices.get("audit").map(String::as_str), Some("1200.00"));

        let fixed = Row::from_pairs(0, [("verified_price", "10"), ("fixed_price_usd", "25")]);
        let prices = prices_for(&fixed, &course_type, &run_type);
        assert_eq!(prices.get("verified").map(String::as_str), Some("25.00"));
    }

    #[test]
    fn test_additional_metadata_from_row() {
        let row = Row::from_pairs(
            0,
            [
                ("redirect_url", "https://x"),
                ("external_identifier", "EXT-9"),
                ("certificate_header", "Certified"),
                ("stat1", "90%"),
                ("stat1_text", "completion"),
                ("reg_close_date", "2025-02-01"),
                ("reg_close_time", "23:59:00"),
                ("meta_keywords", "a, b"),
            ],
        );
        let metadata = additional_metadata(&row);
        assert_eq!(metadata.external_identifier.as_deref(), Some("EXT-9"));
        assert_eq!(
            metadata.certificate_info.map(|c| c.heading),
            Some("Certified".to_string())
        );
        assert_eq!(metadata.facts.len(), 1);
        assert_eq!(
            metadata.registration_deadline.as_deref(),
            Some("2025-02-01T23:59:00Z")
        );
        assert_eq!(metadata.product_meta.unwrap().keywords, vec!["a", "b"]);
    }
}
