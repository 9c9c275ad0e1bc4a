//! Degree loader
//!
//! Degrees are programs flagged `is_degree`, identified across runs by the
//! external identifier of their product source. New degrees start
//! unpublished.

use tracing::{debug, info};
use uuid::Uuid;

use crate::core::catalog::{
    CatalogError, DegreeAdditionalMetadata, LanguageTag, LevelType, NewProgram, Organization,
    Program, ProgramType, Source, Subject,
};
use crate::core::entity::ProgramStatus;
use crate::core::identity::LoaderKind;
use crate::ingest::normalize::{split_list, to_html, to_html_list};
use crate::ingest::reader::Row;
use crate::ingest::report::{messages, CreatedProduct, ErrorKey, IngestionReport, RowFailure};
use crate::ingest::resolver;
use crate::ingest::validator::validate_degree;
use crate::ingest::{IngestError, IngestionContext, Loader, RowOutcome};
use crate::sync::images::download_and_store;

/// Reference data a degree row points at
struct DegreeRefs {
    org: Organization,
    program_type: ProgramType,
    subject: Subject,
    level: LevelType,
    language: LanguageTag,
}

pub struct DegreeLoader {
    source: Source,
}

impl DegreeLoader {
    pub fn new(ctx: &IngestionContext<'_>, product_source: Option<&str>) -> Result<Self, IngestError> {
        let source = super::product_source(ctx, product_source)?;
        Ok(Self { source })
    }

    fn lookup(&self, ctx: &IngestionContext<'_>, row: &Row) -> Result<DegreeRefs, RowFailure> {
        let slug = row.value("slug");
        let catalog = ctx.catalog;
        let missing = |key: ErrorKey, what: String| {
            RowFailure::new(key, messages::degree_missing(key.as_str(), slug, &what))
        };
        let db = |e: CatalogError| {
            RowFailure::new(
                ErrorKey::DegreeUpdateError,
                messages::degree_update_error(slug, &e.to_string()),
            )
        };

        let org_key = row.value("organization_key");
        let org = catalog
            .organization_by_key_or_mapping(ctx.partner.id, org_key, Some(self.source.id))
            .map_err(db)?
            .ok_or_else(|| {
                missing(
                    ErrorKey::MissingOrganization,
                    format!("organization {}", org_key),
                )
            })?;

        let type_slug = row.value("product_type").trim_matches(|c| c == '"' || c == '\'');
        let program_type = catalog
            .program_type_by_slug(type_slug)
            .map_err(db)?
            .ok_or_else(|| {
                missing(
                    ErrorKey::MissingProgramType,
                    format!("program type {}", type_slug),
                )
            })?;

        let subject_name = row.value("primary_subject");
        let subject = catalog
            .subject_by_name(ctx.partner.id, subject_name)
            .map_err(db)?
            .ok_or_else(|| missing(ErrorKey::MissingSubjectData, format!("subject {}", subject_name)))?;

        let level_name = row.value("course_level");
        let level = catalog
            .level_type_by_name(level_name)
            .map_err(db)?
            .ok_or_else(|| {
                missing(
                    ErrorKey::MissingLevelTypeData,
                    format!("level type {}", level_name),
                )
            })?;

        let language_label = row.value("content_language");
        let language = resolver::resolve_language(catalog, ctx.config, language_label)
            .map_err(db)?
            .ok_or_else(|| {
                missing(
                    ErrorKey::MissingLanguageTagData,
                    format!("language tag {}", language_label),
                )
            })?;

        Ok(DegreeRefs {
            org,
            program_type,
            subject,
            level,
            language,
        })
    }

    /// Write every row field onto `degree` and its side tables
    fn apply(
        &self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        degree: &mut Program,
        refs: &DegreeRefs,
    ) -> Result<(), CatalogError> {
        let catalog = ctx.catalog;
        let slug = row.value("slug");
        if catalog.program_slug_taken(ctx.partner.id, slug, degree.id)? {
            return Err(CatalogError::Integrity(format!(
                "marketing slug '{}' is already used by another program",
                slug
            )));
        }

        degree.title = row.value("title").to_string();
        degree.type_id = Some(refs.program_type.id);
        degree.marketing_slug = Some(slug.to_string());
        degree.overview = Some(to_html(row.value("overview")));
        degree.organization_short_code_override =
            Some(row.value("organization_short_code_override").to_string());
        degree.primary_subject_override_id = Some(refs.subject.id);
        degree.level_type_override_id = Some(refs.level.id);
        degree.language_override = Some(refs.language.code.clone());
        degree.product_source_id = Some(self.source.id);
        catalog.save_program(degree)?;

        catalog.set_program_authoring_orgs(degree.id, &[refs.org.id])?;
        catalog.save_degree_metadata(
            degree.id,
            &DegreeAdditionalMetadata {
                external_identifier: row.get("identifier").map(str::to_string),
                organic_url: row.get("organic_url").map(str::to_string),
                external_url: row.get("paid_landing_page_url").map(str::to_string),
            },
        )?;
        if let Some(value) = row.get("specializations") {
            catalog.set_specializations(degree.id, &split_list(value))?;
        }
        if let Some(html) = row.get("courses").and_then(to_html_list) {
            catalog.set_curriculum_marketing_text(degree.id, &html)?;
        }
        Ok(())
    }

    /// Download the card image and organization logo. Failures are noted;
    /// the row still succeeds.
    fn apply_images(
        &self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        degree: &mut Program,
        report: &mut IngestionReport,
    ) -> Result<(), CatalogError> {
        let slug = row.value("slug");
        let images = &*ctx.services.images;
        if let Some(url) = row.get("card_image_url") {
            match download_and_store(ctx.catalog, images, url) {
                Ok(hash) => {
                    degree.card_image_url = Some(url.to_string());
                    degree.card_image_hash = Some(hash);
                }
                Err(_) => report.note(
                    ErrorKey::ImageDownloadFailure,
                    messages::degree_image_failure(ErrorKey::ImageDownloadFailure.as_str(), slug),
                ),
            }
        }
        if let Some(url) = row.get("organization_logo_override") {
            match download_and_store(ctx.catalog, images, url) {
                Ok(_) => degree.organization_logo_override_url = Some(url.to_string()),
                Err(_) => report.note(
                    ErrorKey::LogoImageDownloadFailure,
                    messages::degree_image_failure(
                        ErrorKey::LogoImageDownloadFailure.as_str(),
                        slug,
                    ),
                ),
            }
        }
        ctx.catalog.save_program(degree)
    }
}

impl Loader for DegreeLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::Degree
    }

    fn process_row(
        &mut self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        report: &mut IngestionReport,
    ) -> Result<RowOutcome, RowFailure> {
        let slug = row.value("slug");
        let missing = validate_degree(row, ctx.config, &self.source.slug);
        if !missing.is_empty() {
            return Err(RowFailure::new(
                ErrorKey::MissingRequiredData,
                messages::degree_missing_required_data(slug, &missing),
            ));
        }
        let refs = self.lookup(ctx, row)?;

        let update_error = |e: CatalogError| {
            RowFailure::new(
                ErrorKey::DegreeUpdateError,
                messages::degree_update_error(slug, &e.to_string()),
            )
        };
        let identifier = row.value("identifier");
        let resolution =
            resolver::resolve_degree(ctx.catalog, ctx.partner.id, self.source.id, identifier)
                .map_err(update_error)?;

        let (mut degree, created) = match resolution.entity {
            Some(degree) => (degree, false),
            None => {
                let create_error = |e: CatalogError| {
                    RowFailure::new(
                        ErrorKey::DegreeCreateError,
                        messages::degree_create_error(slug, &e.to_string()),
                    )
                };
                let mut degree = ctx
                    .catalog
                    .insert_program(&NewProgram {
                        uuid: Uuid::new_v4().to_string(),
                        partner_id: ctx.partner.id,
                        title: row.value("title").to_string(),
                        type_id: Some(refs.program_type.id),
                        product_source_id: Some(self.source.id),
                        is_degree: true,
                        status: ProgramStatus::Unpublished,
                    })
                    .map_err(create_error)?;
                self.apply(ctx, row, &mut degree, &refs).map_err(create_error)?;
                info!(degree = %slug, uuid = %degree.uuid, "degree created");
                (degree, true)
            }
        };
        if !created {
            self.apply(ctx, row, &mut degree, &refs).map_err(update_error)?;
            debug!(degree = %slug, "degree updated");
        }
        self.apply_images(ctx, row, &mut degree, report)
            .map_err(update_error)?;

        if !created {
            return Ok(RowOutcome::Updated);
        }
        Ok(RowOutcome::Created(CreatedProduct {
            uuid: degree.uuid.clone(),
            title: degree.title.clone(),
            key: identifier.to_string(),
            url_slug: degree.marketing_slug.clone(),
            ..CreatedProduct::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IngestionConfig;
    use crate::ingest::run;
    use crate::ingest::testing::{context, context_with, seeded_catalog, StubNotifier};

    fn degree_row(index: usize) -> Row {
        Row::from_pairs(
            index,
            [
                ("Title", "Master of Data"),
                ("Card Image Url", "https://example/card.png"),
                ("Product Type", "\"masters\""),
                ("Organization Key", "edx"),
                ("Organization Short Code Override", "EDX"),
                ("Slug", "master-of-data"),
                ("Primary Subject", "Computer Science"),
                ("Content Language", "English - United States"),
                ("Course Level", "Advanced"),
                ("Paid Landing Page Url", "https://paid"),
                ("Organic Url", "https://organic"),
                ("Identifier", "DEG-1"),
                ("Overview", "A deep dive"),
                ("Specializations", "ML | Statistics"),
                ("Courses", "Linear Algebra|Probability"),
            ],
        )
    }

    #[test]
    fn test_create_then_update_by_identifier() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);

        let report = run(&ctx, &mut DegreeLoader::new(&ctx, None).unwrap(), vec![degree_row(0)])
            .unwrap();
        assert_eq!(report.failure_count, 0, "{:?}", report.errors);
        assert_eq!(report.created_products.len(), 1);
        let uuid = report.created_products[0].uuid.clone();

        let degree = catalog.program_by_uuid(&uuid).unwrap().unwrap();
        assert!(degree.is_degree);
        assert_eq!(degree.status, ProgramStatus::Unpublished);
        assert_eq!(degree.overview.as_deref(), Some("<p>A deep dive</p>"));
        assert_eq!(degree.language_override.as_deref(), Some("en-us"));
        assert!(degree.card_image_hash.is_some());
        assert_eq!(
            catalog.specializations(degree.id).unwrap(),
            vec!["ML", "Statistics"]
        );
        assert_eq!(
            catalog.curriculum_marketing_text(degree.id).unwrap().as_deref(),
            Some("<ul><li>Linear Algebra</li><li>Probability</li></ul>")
        );
        let metadata = catalog.degree_metadata(degree.id).unwrap().unwrap();
        assert_eq!(metadata.external_url.as_deref(), Some("https://paid"));

        let mut row = degree_row(0);
        row.set("title", "Master of Data Science");
        let report = run(&ctx, &mut DegreeLoader::new(&ctx, None).unwrap(), vec![row]).unwrap();
        assert_eq!(report.updated_products_count, 1);
        assert!(report.created_products.is_empty());
        let degree = catalog.program_by_uuid(&uuid).unwrap().unwrap();
        assert_eq!(degree.title, "Master of Data Science");
    }

    #[test]
    fn test_lookup_failures() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let mut no_type = degree_row(0);
        no_type.set("product_type", "doctorate");
        let mut no_subject = degree_row(1);
        no_subject.set("primary_subject", "Alchemy");
        let mut no_level = degree_row(2);
        no_level.set("course_level", "Wizard");
        let mut no_language = degree_row(3);
        no_language.set("content_language", "Klingon");
        let mut no_org = degree_row(4);
        no_org.set("organization_key", "nobody");

        let report = run(
            &ctx,
            &mut DegreeLoader::new(&ctx, None).unwrap(),
            vec![no_type, no_subject, no_level, no_language, no_org],
        )
        .unwrap();

        assert_eq!(report.failure_count, 5);
        for key in [
            ErrorKey::MissingProgramType,
            ErrorKey::MissingSubjectData,
            ErrorKey::MissingLevelTypeData,
            ErrorKey::MissingLanguageTagData,
            ErrorKey::MissingOrganization,
        ] {
            assert_eq!(report.errors.get(key).len(), 1, "{}", key);
        }
        assert_eq!(catalog.count("programs").unwrap(), 0);
    }

    #[test]
    fn test_source_variant_fields_are_required() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let mut config = IngestionConfig::default();
        config
            .degree_variant_fields_by_source
            .insert("edx".to_string(), vec!["taxi_form_id".to_string()]);
        let ctx = context_with(&catalog, &notifier, &config);

        let report = run(&ctx, &mut DegreeLoader::new(&ctx, None).unwrap(), vec![degree_row(0)])
            .unwrap();

        let missing = report.errors.get(ErrorKey::MissingRequiredData);
        assert_eq!(missing.len(), 1);
        assert!(missing[0].contains("taxi_form_id"));
    }

    #[test]
    fn test_image_failure_keeps_degree() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let mut row = degree_row(0);
        row.set("card_image_url", "https://example/404.png");

        let report = run(&ctx, &mut DegreeLoader::new(&ctx, None).unwrap(), vec![row]).unwrap();

        assert_eq!(report.success_count, 1);
        assert_eq!(report.errors.get(ErrorKey::ImageDownloadFailure).len(), 1);
        assert_eq!(catalog.count("programs").unwrap(), 1);
    }
}
