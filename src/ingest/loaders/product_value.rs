//! In-year product value rows
//!
//! A row names any subset of the four value fields. Fields it leaves blank
//! keep the product's prior value, or 0 when there is none. Every write
//! creates a new value object; replaced ones are swept at end of run.

use tracing::info;

use crate::core::catalog::{CatalogError, ValueAmounts};
use crate::core::identity::{LoaderKind, ProductKind};
use crate::ingest::reader::Row;
use crate::ingest::report::{ErrorKey, IngestionReport, RowFailure};
use crate::ingest::validator::validate_product_value;
use crate::ingest::{IngestError, IngestionContext, Loader, RowOutcome};

#[derive(Debug, Default)]
pub struct ProductValueLoader;

impl ProductValueLoader {
    pub fn new() -> Self {
        Self
    }
}

fn field(row: &Row, name: &str, prior: i64) -> Result<i64, String> {
    match row.get(name) {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| format!("Invalid value for {}: {}", name, raw)),
        None => Ok(prior),
    }
}

/// Amounts for a row merged over the prior amounts
pub fn merge_amounts(row: &Row, prior: Option<ValueAmounts>) -> Result<ValueAmounts, String> {
    let prior = prior.unwrap_or_default();
    Ok(ValueAmounts {
        per_click_usa: field(row, "per_click_usa", prior.per_click_usa)?,
        per_click_international: field(
            row,
            "per_click_international",
            prior.per_click_international,
        )?,
        per_lead_usa: field(row, "per_lead_usa", prior.per_lead_usa)?,
        per_lead_international: field(row, "per_lead_international", prior.per_lead_international)?,
    })
}

impl Loader for ProductValueLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::ProductValue
    }

    fn process_row(
        &mut self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        _report: &mut IngestionReport,
    ) -> Result<RowOutcome, RowFailure> {
        let row = row.folded();
        let uuid = row.value("uuid");
        let update_error = |e: String| {
            RowFailure::new(
                ErrorKey::ProductValueUpdateError,
                format!("Failed to update product value for UUID {}: {}", uuid, e),
            )
        };
        let catalog_error = |e: CatalogError| update_error(e.to_string());

        let problems = validate_product_value(ctx.catalog, &row).map_err(catalog_error)?;
        if let Some(failure) = problems.into_failure() {
            return Err(failure);
        }

        match row.value("product_type").parse::<ProductKind>() {
            Ok(ProductKind::Course) => {
                // Draft and official rows may point at different values.
                for course in ctx.catalog.course_rows_by_uuid(uuid).map_err(catalog_error)? {
                    let prior = match course.in_year_value_id {
                        Some(id) => ctx.catalog.product_value(id).map_err(catalog_error)?,
                        None => None,
                    };
                    let amounts =
                        merge_amounts(&row, prior.map(|p| p.amounts)).map_err(update_error)?;
                    let value = ctx
                        .catalog
                        .create_product_value(amounts)
                        .map_err(catalog_error)?;
                    ctx.catalog
                        .set_course_row_product_value(course.id, value.id)
                        .map_err(catalog_error)?;
                }
            }
            _ => {
                let program = ctx
                    .catalog
                    .program_by_uuid(uuid)
                    .map_err(catalog_error)?
                    .ok_or_else(|| update_error("program not found".to_string()))?;
                let prior = match program.in_year_value_id {
                    Some(id) => ctx.catalog.product_value(id).map_err(catalog_error)?,
                    None => None,
                };
                let amounts = merge_amounts(&row, prior.map(|p| p.amounts)).map_err(update_error)?;
                let value = ctx
                    .catalog
                    .create_product_value(amounts)
                    .map_err(catalog_error)?;
                ctx.catalog
                    .set_program_product_value(&program, value.id)
                    .map_err(catalog_error)?;
            }
        }
        info!(
            "Updated product value data for {} with UUID: {}",
            row.value("product_type"),
            uuid
        );
        Ok(RowOutcome::Updated)
    }

    fn finish(
        &mut self,
        ctx: &IngestionContext<'_>,
        _report: &mut IngestionReport,
    ) -> Result<(), IngestError> {
        let removed = ctx.catalog.delete_orphan_product_values()?;
        if removed > 0 {
            info!(removed, "removed orphaned product values");
        }
        Ok(())
    }
}
