//! Row handlers, one per input format

pub mod course;
pub mod degree;
pub mod editor;
pub mod geolocation;
pub mod geotargeting;
pub mod product_value;

pub use course::CourseLoader;
pub use degree::DegreeLoader;
pub use editor::EditorLoader;
pub use geolocation::GeolocationLoader;
pub use geotargeting::GeotargetingLoader;
pub use product_value::ProductValueLoader;

use super::{IngestError, IngestionContext, Loader};
use crate::core::catalog::Source;
use crate::core::identity::LoaderKind;

/// Loader parameters given on the command line
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Course type slug the course loader falls back to (and archives)
    pub product_type: Option<String>,
    /// Product source slug; the configured default when absent
    pub product_source: Option<String>,
}

/// Build the loader for `kind`
pub fn build(
    kind: LoaderKind,
    ctx: &IngestionContext<'_>,
    options: &LoaderOptions,
) -> Result<Box<dyn Loader>, IngestError> {
    Ok(match kind {
        LoaderKind::Course => Box::new(CourseLoader::new(
            ctx,
            options.product_type.as_deref(),
            options.product_source.as_deref(),
        )?),
        LoaderKind::Degree => Box::new(DegreeLoader::new(ctx, options.product_source.as_deref())?),
        LoaderKind::Editor => Box::new(EditorLoader::new()),
        LoaderKind::Geolocation => Box::new(GeolocationLoader::new()),
        LoaderKind::Geotargeting => Box::new(GeotargetingLoader::new()),
        LoaderKind::ProductValue => Box::new(ProductValueLoader::new()),
    })
}

/// The named product source, or the configured default. A missing source
/// aborts the run.
pub(crate) fn product_source(
    ctx: &IngestionContext<'_>,
    slug: Option<&str>,
) -> Result<Source, IngestError> {
    let slug = slug.unwrap_or(&ctx.config.default_product_source);
    ctx.catalog
        .source_by_slug(slug)?
        .ok_or_else(|| IngestError::MissingProductSource(slug.to_string()))
}
