//! Course queries and writes

use rusqlite::{params, OptionalExtension};

use super::types::{ADDITIONAL_METADATA_COLUMNS, COURSE_COLUMNS, ENTITLEMENT_COLUMNS};
use super::{
    now, AdditionalMetadata, Catalog, CatalogError, Course, Entitlement, IndexedKind, Result,
};
use crate::core::entity::ProductStatus;

/// Fields needed to insert a course row
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub uuid: String,
    pub partner_id: i64,
    pub key: String,
    pub title: String,
    pub draft: bool,
    pub type_id: Option<i64>,
    pub product_source_id: Option<i64>,
}

impl Catalog {
    pub fn insert_course(&self, new: &NewCourse) -> Result<Course> {
        let ts = now();
        self.conn.execute(
            "INSERT INTO courses (uuid, partner_id, key, draft, title, type_id, product_source_id, created, modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                new.uuid,
                new.partner_id,
                new.key,
                new.draft,
                new.title,
                new.type_id,
                new.product_source_id,
                ts
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.touch(IndexedKind::Course, &new.uuid)?;
        self.course_by_id(id)?
            .ok_or_else(|| CatalogError::not_found("course", id.to_string()))
    }

    pub fn course_by_id(&self, id: i64) -> Result<Option<Course>> {
        let sql = format!("SELECT {} FROM courses WHERE id = ?1", COURSE_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], Course::from_row)
            .optional()?)
    }

    /// Official course by key
    pub fn course_by_key(&self, partner_id: i64, key: &str) -> Result<Option<Course>> {
        let sql = format!(
            "SELECT {} FROM courses WHERE partner_id = ?1 AND key = ?2 AND draft = 0",
            COURSE_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![partner_id, key], Course::from_row)
            .optional()?)
    }

    /// Course by key, preferring the draft
    pub fn course_by_key_draft_aware(&self, partner_id: i64, key: &str) -> Result<Option<Course>> {
        let sql = format!(
            "SELECT {} FROM courses WHERE partner_id = ?1 AND key = ?2 ORDER BY draft DESC LIMIT 1",
            COURSE_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![partner_id, key], Course::from_row)
            .optional()?)
    }

    /// Official course by uuid
    pub fn course_by_uuid(&self, uuid: &str) -> Result<Option<Course>> {
        let sql = format!(
            "SELECT {} FROM courses WHERE uuid = ?1 AND draft = 0",
            COURSE_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![uuid], Course::from_row)
            .optional()?)
    }

    /// Course by uuid, preferring the draft
    pub fn course_by_uuid_draft_aware(&self, uuid: &str) -> Result<Option<Course>> {
        let sql = format!(
            "SELECT {} FROM courses WHERE uuid = ?1 ORDER BY draft DESC LIMIT 1",
            COURSE_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![uuid], Course::from_row)
            .optional()?)
    }

    /// Every row (draft and official) sharing a uuid
    pub fn course_rows_by_uuid(&self, uuid: &str) -> Result<Vec<Course>> {
        let sql = format!(
            "SELECT {} FROM courses WHERE uuid = ?1 ORDER BY draft, id",
            COURSE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![uuid], Course::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Official twin of a draft course
    pub fn official_version_of(&self, draft: &Course) -> Result<Option<Course>> {
        let sql = format!(
            "SELECT {} FROM courses WHERE draft_version_id = ?1 AND draft = 0",
            COURSE_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![draft.id], Course::from_row)
            .optional()?)
    }

    /// Official courses of a partner, ordered by key
    pub fn courses(&self, partner_id: i64) -> Result<Vec<Course>> {
        let sql = format!(
            "SELECT {} FROM courses WHERE partner_id = ?1 AND draft = 0 ORDER BY key",
            COURSE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![partner_id], Course::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Write every mutable column of a course row
    pub fn save_course(&self, course: &Course) -> Result<()> {
        self.conn.execute(
            "UPDATE courses SET
                key = ?2, title = ?3, short_description = ?4, full_description = ?5,
                outcome = ?6, syllabus_raw = ?7, prerequisites_raw = ?8, faq = ?9,
                learner_testimonials = ?10, additional_information = ?11, video_url = ?12,
                level_type_id = ?13, type_id = ?14, product_source_id = ?15, image_url = ?16,
                image_hash = ?17, organization_logo_override_url = ?18,
                organization_short_code_override = ?19, canonical_course_run_id = ?20,
                additional_metadata_id = ?21, geolocation_id = ?22,
                location_restriction_id = ?23, in_year_value_id = ?24,
                draft_version_id = ?25, modified = ?26
             WHERE id = ?1",
            params![
                course.id,
                course.key,
                course.title,
                course.short_description,
                course.full_description,
                course.outcome,
                course.syllabus_raw,
                course.prerequisites_raw,
                course.faq,
                course.learner_testimonials,
                course.additional_information,
                course.video_url,
                course.level_type_id,
                course.type_id,
                course.product_source_id,
                course.image_url,
                course.image_hash,
                course.organization_logo_override_url,
                course.organization_short_code_override,
                course.canonical_course_run_id,
                course.additional_metadata_id,
                course.geolocation_id,
                course.location_restriction_id,
                course.in_year_value_id,
                course.draft_version_id,
                now()
            ],
        )?;
        self.touch(IndexedKind::Course, &course.uuid)
    }

    /// Set product source on a course and its official twin
    pub fn set_course_product_source(&self, course: &Course, source_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE courses SET product_source_id = ?2, modified = ?3 WHERE uuid = ?1",
            params![course.uuid, source_id, now()],
        )?;
        Ok(())
    }

    // =====================================================================
    // Many-to-many sets
    // =====================================================================

    pub fn authoring_org_ids(&self, course_id: i64) -> Result<Vec<i64>> {
        self.id_list(
            "SELECT organization_id FROM course_authoring_orgs WHERE course_id = ?1 ORDER BY position, organization_id",
            course_id,
        )
    }

    pub fn set_authoring_orgs(&self, course_id: i64, org_ids: &[i64]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM course_authoring_orgs WHERE course_id = ?1",
            params![course_id],
        )?;
        for (position, org_id) in org_ids.iter().enumerate() {
            self.conn.execute(
                "INSERT OR IGNORE INTO course_authoring_orgs (course_id, organization_id, position) VALUES (?1, ?2, ?3)",
                params![course_id, org_id, position as i64],
            )?;
        }
        Ok(())
    }

    pub fn subject_ids(&self, course_id: i64) -> Result<Vec<i64>> {
        self.id_list(
            "SELECT subject_id FROM course_subjects WHERE course_id = ?1 ORDER BY position, subject_id",
            course_id,
        )
    }

    pub fn set_subjects(&self, course_id: i64, subject_ids: &[i64]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM course_subjects WHERE course_id = ?1",
            params![course_id],
        )?;
        for (position, subject_id) in subject_ids.iter().enumerate() {
            self.conn.execute(
                "INSERT OR IGNORE INTO course_subjects (course_id, subject_id, position) VALUES (?1, ?2, ?3)",
                params![course_id, subject_id, position as i64],
            )?;
        }
        Ok(())
    }

    pub fn collaborator_ids(&self, course_id: i64) -> Result<Vec<i64>> {
        self.id_list(
            "SELECT collaborator_id FROM course_collaborators WHERE course_id = ?1 ORDER BY collaborator_id",
            course_id,
        )
    }

    pub fn set_collaborators(&self, course_id: i64, collaborator_ids: &[i64]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM course_collaborators WHERE course_id = ?1",
            params![course_id],
        )?;
        for collaborator_id in collaborator_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO course_collaborators (course_id, collaborator_id) VALUES (?1, ?2)",
                params![course_id, collaborator_id],
            )?;
        }
        Ok(())
    }

    /// Subject names of a course as `(name, spanish name)`
    pub fn subject_names(&self, course_id: i64) -> Result<Vec<(String, Option<String>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.name, s.name_es FROM course_subjects cs
             JOIN subjects s ON s.id = cs.subject_id
             WHERE cs.course_id = ?1 ORDER BY cs.position, s.id",
        )?;
        let rows = stmt
            .query_map(params![course_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub(super) fn id_list(&self, sql: &str, owner_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map(params![owner_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    // =====================================================================
    // Entitlements
    // =====================================================================

    pub fn entitlements(&self, course_id: i64) -> Result<Vec<Entitlement>> {
        let sql = format!(
            "SELECT {} FROM entitlements WHERE course_id = ?1 ORDER BY mode",
            ENTITLEMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![course_id], Entitlement::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Create or reprice the entitlement of a mode on a course row
    pub fn upsert_entitlement(&self, course: &Course, mode: &str, price: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO entitlements (course_id, draft, mode, price) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(course_id, mode) DO UPDATE SET price = excluded.price",
            params![course.id, course.draft, mode, price],
        )?;
        Ok(())
    }

    /// Delete the entitlements of a course row whose mode is not in `keep`
    pub fn retain_entitlements(&self, course: &Course, keep: &[String]) -> Result<usize> {
        let mut removed = 0;
        for entitlement in self.entitlements(course.id)? {
            if !keep.contains(&entitlement.mode) {
                removed += self.conn.execute(
                    "DELETE FROM entitlements WHERE id = ?1",
                    params![entitlement.id],
                )?;
            }
        }
        Ok(removed)
    }

    // =====================================================================
    // Additional metadata
    // =====================================================================

    pub fn additional_metadata(&self, id: i64) -> Result<Option<AdditionalMetadata>> {
        let sql = format!(
            "SELECT {} FROM additional_metadata WHERE id = ?1",
            ADDITIONAL_METADATA_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![id], AdditionalMetadata::from_row)
            .optional()?)
    }

    /// Insert or update the metadata row; returns its id
    pub fn save_additional_metadata(&self, metadata: &AdditionalMetadata) -> Result<i64> {
        let certificate_info = match &metadata.certificate_info {
            Some(info) => Some(to_json(info)?),
            None => None,
        };
        let product_meta = match &metadata.product_meta {
            Some(meta) => Some(to_json(meta)?),
            None => None,
        };
        let facts = to_json(&metadata.facts)?;
        let status = metadata.product_status.to_string();

        if metadata.id > 0 {
            self.conn.execute(
                "UPDATE additional_metadata SET
                    external_url = ?1, external_identifier = ?2, lead_capture_form_url = ?3,
                    organic_url = ?4, certificate_info = ?5, facts = ?6, start_date = ?7,
                    end_date = ?8, registration_deadline = ?9, product_status = ?10,
                    external_course_marketing_type = ?11, taxi_form_id = ?12,
                    post_submit_url = ?13, product_meta = ?14
                 WHERE id = ?15",
                params![
                    metadata.external_url,
                    metadata.external_identifier,
                    metadata.lead_capture_form_url,
                    metadata.organic_url,
                    certificate_info,
                    facts,
                    metadata.start_date,
                    metadata.end_date,
                    metadata.registration_deadline,
                    status,
                    metadata.external_course_marketing_type,
                    metadata.taxi_form_id,
                    metadata.post_submit_url,
                    product_meta,
                    metadata.id,
                ],
            )?;
            return Ok(metadata.id);
        }

        self.conn.execute(
            "INSERT INTO additional_metadata (
                external_url, external_identifier, lead_capture_form_url, organic_url,
                certificate_info, facts, start_date, end_date, registration_deadline,
                product_status, external_course_marketing_type, taxi_form_id,
                post_submit_url, product_meta)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                metadata.external_url,
                metadata.external_identifier,
                metadata.lead_capture_form_url,
                metadata.organic_url,
                certificate_info,
                facts,
                metadata.start_date,
                metadata.end_date,
                metadata.registration_deadline,
                status,
                metadata.external_course_marketing_type,
                metadata.taxi_form_id,
                metadata.post_submit_url,
                product_meta,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Set the product status on a metadata row, optionally clamping its end date
    pub fn set_product_status(
        &self,
        metadata_id: i64,
        status: ProductStatus,
        clamp_end_date_to: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE additional_metadata SET product_status = ?2 WHERE id = ?1",
            params![metadata_id, status.to_string()],
        )?;
        if let Some(limit) = clamp_end_date_to {
            self.conn.execute(
                "UPDATE additional_metadata SET end_date = ?2
                 WHERE id = ?1 AND (end_date IS NULL OR end_date > ?2)",
                params![metadata_id, limit],
            )?;
        }
        Ok(())
    }

    /// Official courses of a type and source whose metadata is published
    pub fn published_external_courses(
        &self,
        partner_id: i64,
        course_type_id: i64,
        product_source_id: i64,
    ) -> Result<Vec<(Course, AdditionalMetadata)>> {
        let sql = format!(
            "SELECT {} FROM courses c
             JOIN additional_metadata am ON am.id = c.additional_metadata_id
             WHERE c.partner_id = ?1 AND c.type_id = ?2 AND c.product_source_id = ?3
               AND c.draft = 0 AND am.product_status = 'published'
             ORDER BY c.key",
            COURSE_COLUMNS
                .split(", ")
                .map(|c| format!("c.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let courses = stmt
            .query_map(
                params![partner_id, course_type_id, product_source_id],
                Course::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(courses.len());
        for course in courses {
            if let Some(metadata_id) = course.additional_metadata_id {
                if let Some(metadata) = self.additional_metadata(metadata_id)? {
                    out.push((course, metadata));
                }
            }
        }
        Ok(out)
    }

    // =====================================================================
    // Url slugs
    // =====================================================================

    pub fn active_url_slug(&self, partner_id: i64, course_uuid: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT url_slug FROM course_url_slugs
                 WHERE partner_id = ?1 AND course_uuid = ?2 AND is_active = 1
                 ORDER BY id DESC LIMIT 1",
                params![partner_id, course_uuid],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Every slug a course has used, oldest first
    pub fn url_slug_history(&self, partner_id: i64, course_uuid: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT url_slug FROM course_url_slugs WHERE partner_id = ?1 AND course_uuid = ?2 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![partner_id, course_uuid], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
    }

    /// Uuid of the course that has used a slug, if any
    pub fn url_slug_owner(&self, partner_id: i64, slug: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT course_uuid FROM course_url_slugs WHERE partner_id = ?1 AND url_slug = ?2",
                params![partner_id, slug],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Make `slug` the active slug of a course; previous slugs stay as redirects
    pub fn set_active_url_slug(&self, partner_id: i64, course_uuid: &str, slug: &str) -> Result<()> {
        match self.url_slug_owner(partner_id, slug)? {
            Some(owner) if owner != course_uuid => {
                return Err(CatalogError::Integrity(format!(
                    "url slug '{}' already belongs to course {}",
                    slug, owner
                )));
            }
            _ => {}
        }
        self.conn.execute(
            "UPDATE course_url_slugs SET is_active = 0 WHERE partner_id = ?1 AND course_uuid = ?2",
            params![partner_id, course_uuid],
        )?;
        self.conn.execute(
            "INSERT INTO course_url_slugs (partner_id, course_uuid, url_slug, is_active, created)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(partner_id, url_slug) DO UPDATE SET is_active = 1",
            params![partner_id, course_uuid, slug, now()],
        )?;
        self.touch(IndexedKind::Course, course_uuid)
    }

    /// First free slug derived from `base` (`base`, `base-2`, `base-3`, ...)
    pub fn unique_url_slug(&self, partner_id: i64, base: &str) -> Result<String> {
        let mut candidate = base.to_string();
        let mut n = 2;
        while self.url_slug_owner(partner_id, &candidate)?.is_some() {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        Ok(candidate)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CatalogError::Invalid(e.to_string()))
}
