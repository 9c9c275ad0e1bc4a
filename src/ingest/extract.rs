//! Product catalog extract
//!
//! Writes one CSV line per marketable official course: published, with at
//! least one authoring organization and a card image.

use std::collections::BTreeSet;
use std::io::Write;

use thiserror::Error;
use tracing::{error, info};

use crate::core::catalog::{Catalog, CatalogError, Course, Partner};

pub const CATALOG_CSV_HEADERS: [&str; 10] = [
    "UUID",
    "Title",
    "Organizations Name",
    "Organizations Logo",
    "Organizations Abbr",
    "Languages",
    "Subjects",
    "Subjects Spanish",
    "Marketing URL",
    "Marketing Image",
];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("csv output: {0}")]
    Csv(#[from] csv::Error),

    #[error("unknown product type {0}")]
    UnknownProductType(String),

    #[error("No products found for the given criteria.")]
    Empty,
}

/// Public url of a course page. Slugs with a `/` are full paths.
pub fn marketing_url(partner: &Partner, slug: &str) -> Option<String> {
    let root = partner.marketing_site_url_root.as_deref()?.trim_end_matches('/');
    if slug.contains('/') {
        Some(format!("{}/{}", root, slug))
    } else {
        Some(format!("{}/course/{}", root, slug))
    }
}

fn catalog_record(
    catalog: &Catalog,
    partner: &Partner,
    course: &Course,
) -> Result<Option<[String; 10]>, CatalogError> {
    let Some(image) = course.image_url.clone().filter(|i| !i.is_empty()) else {
        return Ok(None);
    };
    let mut orgs = Vec::new();
    for id in catalog.authoring_org_ids(course.id)? {
        if let Some(org) = catalog.organization_by_id(id)? {
            orgs.push(org);
        }
    }
    if orgs.is_empty() || !catalog.has_published_run(course)? {
        return Ok(None);
    }

    let languages: BTreeSet<String> = catalog
        .course_runs_for(course.id)?
        .into_iter()
        .filter_map(|run| run.content_language)
        .collect();
    let subjects = catalog.subject_names(course.id)?;
    let slug = catalog.active_url_slug(partner.id, &course.uuid)?;

    Ok(Some([
        course.uuid.replace('-', ""),
        course.title.clone(),
        orgs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>().join(", "),
        orgs.iter()
            .filter_map(|o| o.logo_image_url.as_deref())
            .collect::<Vec<_>>()
            .join(", "),
        orgs.iter().map(|o| o.key.as_str()).collect::<Vec<_>>().join(", "),
        languages.into_iter().collect::<Vec<_>>().join(", "),
        subjects
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        subjects
            .iter()
            .filter_map(|(_, es)| es.as_deref())
            .collect::<Vec<_>>()
            .join(", "),
        slug.and_then(|s| marketing_url(partner, &s)).unwrap_or_default(),
        image,
    ]))
}

/// Write the catalog CSV for `partner`, optionally limited to one course
/// type. Returns the number of products written.
pub fn extract_catalog(
    catalog: &Catalog,
    partner: &Partner,
    product_type: Option<&str>,
    out: impl Write,
) -> Result<usize, ExtractError> {
    let type_id = match product_type {
        Some(slug) => Some(
            catalog
                .course_type_by_slug_or_name(slug)?
                .ok_or_else(|| ExtractError::UnknownProductType(slug.to_string()))?
                .id,
        ),
        None => None,
    };

    let courses: Vec<Course> = catalog
        .courses(partner.id)?
        .into_iter()
        .filter(|c| !c.draft && type_id.map_or(true, |id| c.type_id == Some(id)))
        .collect();

    let mut records = Vec::new();
    for course in &courses {
        match catalog_record(catalog, partner, course) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => error!(uuid = %course.uuid, error = %e, "Error reading product for the catalog"),
        }
    }
    if records.is_empty() {
        return Err(ExtractError::Empty);
    }

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CATALOG_CSV_HEADERS)?;
    for record in &records {
        writer.write_record(record)?;
    }
    writer.flush().map_err(csv::Error::from)?;
    info!(count = records.len(), "Populated product catalog");
    Ok(records.len())
}
