//! Bulk ingestion engine
//!
//! An ingestion run reads every row of its input, then hands the rows one by
//! one, in input order, to a [`Loader`]. Each row executes inside its own
//! savepoint: a row that fails leaves the catalog as it was before the row.
//! Search index receivers stay disconnected for the whole run.

pub mod archive;
pub mod extract;
pub mod lifecycle;
pub mod loaders;
pub mod normalize;
pub mod reader;
pub mod report;
pub mod resolver;
pub mod slugs;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;
use tracing::{info, info_span, warn};

use crate::core::catalog::{Catalog, CatalogError, Partner};
use crate::core::config::IngestionConfig;
use crate::core::identity::{LoaderKind, RunId};
use crate::schema::template::render_notification;
use crate::sync::{IndexSuppression, Notification, Services, SyncError};

pub use reader::{read_rows, ReadError, Row, RowSource};
pub use report::{CreatedProduct, ErrorKey, IngestionReport, RowFailure};

/// Errors that abort a whole run
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Input(#[from] ReadError),

    #[error("partner {0} does not exist")]
    MissingPartner(String),

    #[error("product source {0} does not exist")]
    MissingProductSource(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Partner named by the configuration
pub fn resolve_partner(catalog: &Catalog, config: &IngestionConfig) -> Result<Partner, IngestError> {
    catalog
        .partner_by_code(&config.partner)?
        .ok_or_else(|| IngestError::MissingPartner(config.partner.clone()))
}

/// Everything a loader needs while processing rows
pub struct IngestionContext<'a> {
    pub catalog: &'a Catalog,
    pub partner: Partner,
    pub config: &'a IngestionConfig,
    pub services: Services<'a>,
    pub run_id: RunId,
}

impl<'a> IngestionContext<'a> {
    pub fn new(
        catalog: &'a Catalog,
        partner: Partner,
        config: &'a IngestionConfig,
        services: Services<'a>,
    ) -> Self {
        Self {
            catalog,
            partner,
            config,
            services,
            run_id: RunId::new(),
        }
    }

    /// Context with the configured adapters for the configured partner
    pub fn from_config(catalog: &'a Catalog, config: &'a IngestionConfig) -> Result<Self, IngestError> {
        let partner = resolve_partner(catalog, config)?;
        let services = Services::from_config(catalog, &partner, config)?;
        Ok(Self::new(catalog, partner, config, services))
    }
}

/// What a successful row did
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Created(CreatedProduct),
    Updated,
    Done,
}

/// Per-loader row handling
pub trait Loader {
    fn kind(&self) -> LoaderKind;

    /// Process one row. Errors that do not fail the row are noted on
    /// `report` directly.
    fn process_row(
        &mut self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        report: &mut IngestionReport,
    ) -> Result<RowOutcome, RowFailure>;

    /// Work done once every row has been processed
    fn finish(
        &mut self,
        _ctx: &IngestionContext<'_>,
        _report: &mut IngestionReport,
    ) -> Result<(), IngestError> {
        Ok(())
    }
}

/// Run a loader over a materialized batch of rows
pub fn run(
    ctx: &IngestionContext<'_>,
    loader: &mut dyn Loader,
    rows: Vec<Row>,
) -> Result<IngestionReport, IngestError> {
    let kind = loader.kind();
    let span = info_span!("ingestion", run_id = %ctx.run_id, loader = %kind);
    let _enter = span.enter();

    let mut report = IngestionReport::new(kind, rows.len());
    info!(rows = rows.len(), partner = %ctx.partner.short_code, "ingestion started");
    {
        let _suppression = IndexSuppression::new(ctx.catalog, ctx.run_id.to_string());
        for row in &rows {
            let row_span = info_span!("row", index = row.index());
            let _row = row_span.enter();

            let outcome = ctx
                .catalog
                .with_savepoint(|| loader.process_row(ctx, row, &mut report))?;
            match outcome {
                Ok(RowOutcome::Created(product)) => report.created(product),
                Ok(RowOutcome::Updated) => report.updated(),
                Ok(RowOutcome::Done) => report.succeed(),
                Err(failure) => report.fail(failure),
            }
        }
        loader.finish(ctx, &mut report)?;
    }

    report.log_summary();
    info!(
        success = report.success_count,
        failure = report.failure_count,
        created = report.created_products.len(),
        "ingestion finished"
    );
    send_summary(ctx, &report);
    Ok(report)
}

/// Mail the run summary with the CSV report attached
fn send_summary(ctx: &IngestionContext<'_>, report: &IngestionReport) {
    let body = match render_notification(report, &ctx.run_id.to_string()) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "failed to render ingestion summary");
            return;
        }
    };
    let notification = Notification {
        subject: format!(
            "{} ingestion summary for {}",
            report.loader, ctx.partner.short_code
        ),
        body,
        attachment: Some((
            format!("{}-report.csv", report.loader),
            report.to_csv_string(),
        )),
    };
    if let Err(e) = ctx.services.notifier.send(&notification) {
        warn!(error = %e, "failed to send ingestion summary");
    }
}
