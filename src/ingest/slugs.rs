//! Bulk url-slug migration
//!
//! Rows name a course uuid and its new active slug. Old slugs stay in the
//! course's slug history. Every row that does not end in an update lands in
//! the error report.

use serde::Serialize;
use tracing::{error, info};

use crate::core::catalog::Catalog;
use crate::core::identity::is_valid_slug;
use crate::ingest::normalize::is_uuid;
use crate::ingest::reader::Row;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlugFailure {
    pub course_uuid: String,
    pub old_slug: Option<String>,
    pub new_slug: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SlugReport {
    pub updated: usize,
    pub failures: Vec<SlugFailure>,
}

impl SlugReport {
    /// `course_uuid,old_slug,new_slug,error`, one line per failure
    pub fn to_csv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["course_uuid", "old_slug", "new_slug", "error"])?;
        for failure in &self.failures {
            writer.write_record([
                failure.course_uuid.as_str(),
                failure.old_slug.as_deref().unwrap_or(""),
                failure.new_slug.as_deref().unwrap_or(""),
                failure.error.as_str(),
            ])?;
        }
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn new_slug(row: &Row) -> &str {
    row.get("new_slug")
        .or_else(|| row.get("course_url_slug"))
        .unwrap_or("")
}

/// Apply every slug row. Each update runs in its own savepoint.
pub fn update_slugs(catalog: &Catalog, partner_id: i64, rows: &[Row]) -> SlugReport {
    let mut report = SlugReport::default();

    for row in rows {
        let uuid = row.value("course_uuid");
        let slug = new_slug(row);
        let fail = |old_slug: Option<String>, error: String| {
            error!(course_uuid = uuid, "{}", error);
            SlugFailure {
                course_uuid: uuid.to_string(),
                old_slug,
                new_slug: Some(slug.to_string()).filter(|s| !s.is_empty()),
                error,
            }
        };

        if !is_uuid(uuid) {
            report
                .failures
                .push(fail(None, format!("Invalid course uuid: {}", uuid)));
            continue;
        }
        if !is_valid_slug(slug) {
            report
                .failures
                .push(fail(None, format!("Invalid course url slug: {}", slug)));
            continue;
        }

        let exists = catalog
            .course_rows_by_uuid(uuid)
            .map(|rows| !rows.is_empty());
        match exists {
            Ok(true) => {}
            Ok(false) => {
                report.failures.push(fail(
                    None,
                    format!("Course with uuid: {} does not exist", uuid),
                ));
                continue;
            }
            Err(e) => {
                report.failures.push(fail(None, e.to_string()));
                continue;
            }
        }

        let old_slug = catalog.active_url_slug(partner_id, uuid).ok().flatten();
        let outcome = catalog
            .with_savepoint(|| catalog.set_active_url_slug(partner_id, uuid, slug))
            .and_then(|inner| inner);
        match outcome {
            Ok(()) => {
                info!(
                    "Updated the course url slug of course:{} from {} to {}",
                    uuid,
                    old_slug.as_deref().unwrap_or("-"),
                    slug
                );
                report.updated += 1;
            }
            Err(e) => report.failures.push(fail(
                old_slug,
                format!("Error occurred while updating the course url slug: {}", e),
            )),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::SeedData;
    use crate::ingest::testing::seeded_catalog;

    const FIRST: &str = "11111111-2222-4333-8444-555555555555";
    const SECOND: &str = "66666666-7777-4888-9999-aaaaaaaaaaaa";

    fn setup() -> (Catalog, i64) {
        let catalog = seeded_catalog();
        let seed = format!(
            r#"
courses:
  - {{ partner: edx, key: edx+ONE, title: One, uuid: {}, url_slug: one }}
  - {{ partner: edx, key: edx+TWO, title: Two, uuid: {}, url_slug: two }}
"#,
            FIRST, SECOND
        );
        catalog
            .apply_seed(&SeedData::from_yaml(&seed).unwrap())
            .unwrap();
        let partner_id = catalog.partner_by_code("edx").unwrap().unwrap().id;
        (catalog, partner_id)
    }

    fn row(index: usize, uuid: &str, slug: &str) -> Row {
        Row::from_pairs(index, [("course_uuid", uuid), ("new_slug", slug)])
    }

    #[test]
    fn test_update_keeps_history() {
        let (catalog, partner_id) = setup();
        let report = update_slugs(&catalog, partner_id, &[row(0, FIRST, "learn/biology/one")]);

        assert_eq!(report.updated, 1);
        assert!(report.failures.is_empty());
        assert_eq!(
            catalog.active_url_slug(partner_id, FIRST).unwrap().as_deref(),
            Some("learn/biology/one")
        );
        assert_eq!(
            catalog.url_slug_history(partner_id, FIRST).unwrap(),
            vec!["one", "learn/biology/one"]
        );
    }

    #[test]
    fn test_failures_reported() {
        let (catalog, partner_id) = setup();
        let report = update_slugs(
            &catalog,
            partner_id,
            &[
                row(0, "nope", "x"),
                row(1, FIRST, "Bad Slug"),
                row(2, "99999999-7777-4888-9999-aaaaaaaaaaaa", "fine"),
                row(3, FIRST, "two"),
            ],
        );

        assert_eq!(report.updated, 0);
        assert_eq!(report.failures.len(), 4);
        assert_eq!(report.failures[0].error, "Invalid course uuid: nope");
        assert_eq!(report.failures[1].error, "Invalid course url slug: Bad Slug");
        assert!(report.failures[2].error.ends_with("does not exist"));
        assert_eq!(report.failures[3].old_slug.as_deref(), Some("one"));
        assert_eq!(
            catalog.active_url_slug(partner_id, FIRST).unwrap().as_deref(),
            Some("one")
        );

        let csv = report.to_csv().unwrap();
        assert!(csv.starts_with("course_uuid,old_slug,new_slug,error\n"));
        assert!(csv.contains(&format!("{},one,two,", FIRST)));
    }
}
