//! Geotargeting rows: allow or block a product in a list of countries
//!
//! Course restrictions are value objects. Each row creates a fresh one for
//! every row of the course, and the restriction it replaced is deleted once
//! nothing references it. Program restrictions are updated in place.

use tracing::info;

use crate::core::catalog::CatalogError;
use crate::core::entity::RestrictionType;
use crate::core::identity::{LoaderKind, ProductKind};
use crate::ingest::reader::Row;
use crate::ingest::report::{ErrorKey, IngestionReport, RowFailure};
use crate::ingest::validator::validate_geotargeting;
use crate::ingest::{IngestionContext, Loader, RowOutcome};

#[derive(Debug, Default)]
pub struct GeotargetingLoader;

impl GeotargetingLoader {
    pub fn new() -> Self {
        Self
    }
}

fn countries(row: &Row) -> Vec<String> {
    row.value("countries")
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn apply(ctx: &IngestionContext<'_>, row: &Row) -> Result<(), CatalogError> {
    let uuid = row.value("uuid");
    let restriction_type = RestrictionType::from_include_exclude(row.value("include_or_exclude"));
    let countries = countries(row);

    match row.value("product_type").parse::<ProductKind>() {
        Ok(ProductKind::Course) => {
            let restriction = ctx
                .catalog
                .create_course_restriction(restriction_type, &countries)?;
            ctx.catalog.set_course_restriction(uuid, restriction.id)?;
            let removed = ctx.catalog.delete_orphan_course_restrictions()?;
            if removed > 0 {
                info!(uuid, removed, "removed replaced course restrictions");
            }
        }
        _ => {
            let program = ctx
                .catalog
                .program_by_uuid(uuid)?
                .ok_or_else(|| CatalogError::not_found("program", uuid))?;
            ctx.catalog
                .set_program_restriction(&program, restriction_type, &countries)?;
        }
    }
    Ok(())
}

impl Loader for GeotargetingLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::Geotargeting
    }

    fn process_row(
        &mut self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        _report: &mut IngestionReport,
    ) -> Result<RowOutcome, RowFailure> {
        let row = row.folded();
        let uuid = row.value("uuid");
        let update_error = |e: CatalogError| {
            RowFailure::new(
                ErrorKey::GeotargetingUpdateError,
                format!("Failed to update location restriction for UUID {}: {}", uuid, e),
            )
        };

        let problems = validate_geotargeting(ctx.catalog, &row).map_err(update_error)?;
        if let Some(failure) = problems.into_failure() {
            return Err(failure);
        }

        apply(ctx, &row).map_err(update_error)?;
        info!(
            "Updated location restriction for {} with UUID: {}",
            row.value("product_type"),
            uuid
        );
        Ok(RowOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::{NewProgram, SeedData};
    use crate::core::entity::ProgramStatus;
    use crate::ingest::run;
    use crate::ingest::testing::{context, seeded_catalog, StubNotifier};

    const COURSE_UUID: &str = "5b0c1d9e-2f3a-4b5c-8d6e-7f8091a2b3c4";

    fn row(uuid: &str, product_type: &str, include: &str, countries: &str) -> Row {
        Row::from_pairs(
            0,
            [
                ("UUID", uuid),
                ("Product Type", product_type),
                ("Include Or Exclude", include),
                ("Countries", countries),
            ],
        )
    }

    fn seed_restricted_course(catalog: &crate::core::catalog::Catalog) {
        let seed = format!(
            r#"
courses:
  - partner: edx
    key: edx+GEO101
    title: Geography
    uuid: {}
    organizations: [edx]
    location_restriction:
      restriction_type: blocklist
      countries: [RU]
"#,
            COURSE_UUID
        );
        catalog
            .apply_seed(&SeedData::from_yaml(&seed).unwrap())
            .unwrap();
    }

    #[test]
    fn test_course_restriction_is_replaced() {
        let catalog = seeded_catalog();
        seed_restricted_course(&catalog);
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let before = catalog.course_by_uuid(COURSE_UUID).unwrap().unwrap();
        let prior = before.location_restriction_id.unwrap();

        let report = run(
            &ctx,
            &mut GeotargetingLoader::new(),
            vec![row(COURSE_UUID, "course", "include", "us;ca")],
        )
        .unwrap();
        assert_eq!(report.updated_products_count, 1);

        let after = catalog.course_by_uuid(COURSE_UUID).unwrap().unwrap();
        let current = after.location_restriction_id.unwrap();
        assert_ne!(current, prior);
        let restriction = catalog.course_restriction(current).unwrap().unwrap();
        assert_eq!(restriction.restriction_type, RestrictionType::Allowlist);
        assert_eq!(restriction.countries, vec!["US", "CA"]);
        assert!(catalog.course_restriction(prior).unwrap().is_none());
    }

    #[test]
    fn test_program_restriction_updated_in_place() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let program = catalog
            .insert_program(&NewProgram {
                uuid: "0a9b8c7d-6e5f-4a3b-9c2d-1e0f9a8b7c6d".to_string(),
                partner_id: ctx.partner.id,
                title: "Data Science".to_string(),
                type_id: None,
                product_source_id: None,
                is_degree: false,
                status: ProgramStatus::Active,
            })
            .unwrap();

        for (include, countries) in [("exclude", "RU"), ("include", "US,MX")] {
            run(
                &ctx,
                &mut GeotargetingLoader::new(),
                vec![row(&program.uuid, "program", include, countries)],
            )
            .unwrap();
        }

        let restriction = catalog.program_restriction(program.id).unwrap().unwrap();
        assert_eq!(restriction.restriction_type, RestrictionType::Allowlist);
        assert_eq!(restriction.countries, vec!["US", "MX"]);
    }

    #[test]
    fn test_invalid_rows() {
        let catalog = seeded_catalog();
        seed_restricted_course(&catalog);
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);

        let report = run(
            &ctx,
            &mut GeotargetingLoader::new(),
            vec![
                row(COURSE_UUID, "course", "maybe", "US"),
                row(COURSE_UUID, "course", "include", "USA,CA"),
                row("5b0c1d9e-2f3a-4b5c-8d6e-000000000000", "course", "include", "US"),
            ],
        )
        .unwrap();

        assert_eq!(report.failure_count, 3);
        assert_eq!(
            report.errors.get(ErrorKey::InvalidIncludeExcludeValue),
            [format!("Wrong include/exclude value for UUID: {}", COURSE_UUID)]
        );
        assert_eq!(
            report.errors.get(ErrorKey::InvalidCountryCode),
            [format!("Error in the countries list for UUID: {}", COURSE_UUID)]
        );
        assert_eq!(report.errors.get(ErrorKey::ProductNotFound).len(), 1);

        let course = catalog.course_by_uuid(COURSE_UUID).unwrap().unwrap();
        let restriction = catalog
            .course_restriction(course.location_restriction_id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(restriction.restriction_type, RestrictionType::Blocklist);
    }
}
