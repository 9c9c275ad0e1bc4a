//! Geolocation rows: attach a named lat/lng point to a course or program

use tracing::info;

use crate::core::catalog::{CatalogError, GeoLocation};
use crate::core::identity::{LoaderKind, ProductKind};
use crate::ingest::reader::Row;
use crate::ingest::report::{ErrorKey, IngestionReport, RowFailure};
use crate::ingest::validator::validate_geolocation;
use crate::ingest::{IngestError, IngestionContext, Loader, RowOutcome};

#[derive(Debug, Default)]
pub struct GeolocationLoader;

impl GeolocationLoader {
    pub fn new() -> Self {
        Self
    }

    fn apply(ctx: &IngestionContext<'_>, row: &Row) -> Result<bool, CatalogError> {
        let uuid = row.value("uuid");
        let location: GeoLocation = ctx.catalog.get_or_create_geolocation(
            row.value("location_name"),
            row.value("latitude"),
            row.value("longitude"),
        )?;

        let replaced = match row.value("product_type").parse::<ProductKind>() {
            Ok(ProductKind::Course) => {
                let rows = ctx.catalog.course_rows_by_uuid(uuid)?;
                let replaced = rows.iter().any(|c| c.geolocation_id.is_some());
                ctx.catalog.set_course_geolocation(uuid, location.id)?;
                replaced
            }
            _ => {
                let program = ctx
                    .catalog
                    .program_by_uuid(uuid)?
                    .ok_or_else(|| CatalogError::not_found("program", uuid))?;
                ctx.catalog.set_program_geolocation(&program, location.id)?;
                program.geolocation_id.is_some()
            }
        };
        Ok(replaced)
    }
}

impl Loader for GeolocationLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::Geolocation
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
                ErrorKey::LocationUpdateError,
                format!("Failed to update geolocation for UUID {}: {}", uuid, e),
            )
        };

        let problems = validate_geolocation(ctx.catalog, &row).map_err(update_error)?;
        if let Some(failure) = problems.into_failure() {
            return Err(failure);
        }

        let replaced = Self::apply(ctx, &row).map_err(update_error)?;
        info!(
            "{} geolocation data for product with UUID: {}",
            if replaced { "Updated" } else { "Created" },
            uuid
        );
        Ok(RowOutcome::Updated)
    }

    fn finish(
        &mut self,
        ctx: &IngestionContext<'_>,
        _report: &mut IngestionReport,
    ) -> Result<(), IngestError> {
        let removed = ctx.catalog.delete_orphan_geolocations()?;
        if removed > 0 {
            info!(removed, "removed orphaned geolocations");
        }
        Ok(())
    }
}
