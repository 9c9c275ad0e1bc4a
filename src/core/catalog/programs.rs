//! Programs and degrees

use rusqlite::{params, OptionalExtension};

use super::types::PROGRAM_COLUMNS;
use super::{
    now, Catalog, CatalogError, DegreeAdditionalMetadata, IndexedKind, LocationRestriction,
    Program, Result,
};
use crate::core::entity::{ProgramStatus, RestrictionType};

#[derive(Debug, Clone)]
pub struct NewProgram {
    pub uuid: String,
    pub partner_id: i64,
    pub title: String,
    pub type_id: Option<i64>,
    pub product_source_id: Option<i64>,
    pub is_degree: bool,
    pub status: ProgramStatus,
}

impl Catalog {
    pub fn insert_program(&self, new: &NewProgram) -> Result<Program> {
        let ts = now();
        self.conn.execute(
            "INSERT INTO programs (uuid, partner_id, title, type_id, product_source_id, is_degree,
                status, created, modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                new.uuid,
                new.partner_id,
                new.title,
                new.type_id,
                new.product_source_id,
                new.is_degree,
                new.status.to_string(),
                ts
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.touch(IndexedKind::Program, &new.uuid)?;
        self.program_by_id(id)?
            .ok_or_else(|| CatalogError::not_found("program", id.to_string()))
    }

    pub fn program_by_id(&self, id: i64) -> Result<Option<Program>> {
        let sql = format!("SELECT {} FROM programs WHERE id = ?1", PROGRAM_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], Program::from_row)
            .optional()?)
    }

    pub fn program_by_uuid(&self, uuid: &str) -> Result<Option<Program>> {
        let sql = format!("SELECT {} FROM programs WHERE uuid = ?1", PROGRAM_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![uuid], Program::from_row)
            .optional()?)
    }

    /// Degree of a partner and product source carrying an external identifier
    pub fn degree_by_external_identifier(
        &self,
        partner_id: i64,
        product_source_id: i64,
        external_identifier: &str,
    ) -> Result<Option<Program>> {
        let columns = PROGRAM_COLUMNS
            .split(", ")
            .map(|c| format!("p.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM programs p
             JOIN degree_additional_metadata m ON m.degree_id = p.id
             WHERE p.partner_id = ?1 AND p.product_source_id = ?2 AND p.is_degree = 1
               AND m.external_identifier = ?3
             ORDER BY p.id LIMIT 1",
            columns
        );
        Ok(self
            .conn
            .query_row(
                &sql,
                params![partner_id, product_source_id, external_identifier],
                Program::from_row,
            )
            .optional()?)
    }

    pub fn save_program(&self, program: &Program) -> Result<()> {
        self.conn.execute(
            "UPDATE programs SET
                title = ?2, type_id = ?3, status = ?4, marketing_slug = ?5, overview = ?6,
                card_image_url = ?7, card_image_hash = ?8, organization_logo_override_url = ?9,
                organization_short_code_override = ?10, primary_subject_override_id = ?11,
                level_type_override_id = ?12, language_override = ?13, product_source_id = ?14,
                geolocation_id = ?15, in_year_value_id = ?16, modified = ?17
             WHERE id = ?1",
            params![
                program.id,
                program.title,
                program.type_id,
                program.status.to_string(),
                program.marketing_slug,
                program.overview,
                program.card_image_url,
                program.card_image_hash,
                program.organization_logo_override_url,
                program.organization_short_code_override,
                program.primary_subject_override_id,
                program.level_type_override_id,
                program.language_override,
                program.product_source_id,
                program.geolocation_id,
                program.in_year_value_id,
                now()
            ],
        )?;
        self.touch(IndexedKind::Program, &program.uuid)
    }

    /// Whether another program of the partner already uses a marketing slug
    pub fn program_slug_taken(&self, partner_id: i64, slug: &str, except_id: i64) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM programs WHERE partner_id = ?1 AND marketing_slug = ?2 AND id != ?3",
            params![partner_id, slug, except_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn program_authoring_org_ids(&self, program_id: i64) -> Result<Vec<i64>> {
        self.id_list(
            "SELECT organization_id FROM program_authoring_orgs WHERE program_id = ?1 ORDER BY organization_id",
            program_id,
        )
    }

    pub fn set_program_authoring_orgs(&self, program_id: i64, org_ids: &[i64]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM program_authoring_orgs WHERE program_id = ?1",
            params![program_id],
        )?;
        for org_id in org_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO program_authoring_orgs (program_id, organization_id) VALUES (?1, ?2)",
                params![program_id, org_id],
            )?;
        }
        Ok(())
    }

    // =====================================================================
    // Degree side tables
    // =====================================================================

    pub fn degree_metadata(&self, degree_id: i64) -> Result<Option<DegreeAdditionalMetadata>> {
        Ok(self
            .conn
            .query_row(
                "SELECT external_identifier, organic_url, external_url
                 FROM degree_additional_metadata WHERE degree_id = ?1",
                params![degree_id],
                |row| {
                    Ok(DegreeAdditionalMetadata {
                        external_identifier: row.get(0)?,
                        organic_url: row.get(1)?,
                        external_url: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn save_degree_metadata(
        &self,
        degree_id: i64,
        metadata: &DegreeAdditionalMetadata,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO degree_additional_metadata (degree_id, external_identifier, organic_url, external_url)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(degree_id) DO UPDATE SET
                external_identifier = excluded.external_identifier,
                organic_url = excluded.organic_url,
                external_url = excluded.external_url",
            params![
                degree_id,
                metadata.external_identifier,
                metadata.organic_url,
                metadata.external_url
            ],
        )?;
        Ok(())
    }

    pub fn specializations(&self, degree_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.value FROM degree_specializations ds
             JOIN specializations s ON s.id = ds.specialization_id
             WHERE ds.degree_id = ?1 ORDER BY s.value",
        )?;
        let rows = stmt
            .query_map(params![degree_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
    }

    /// Replace the specializations of a degree, creating unknown values
    pub fn set_specializations(&self, degree_id: i64, values: &[String]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM degree_specializations WHERE degree_id = ?1",
            params![degree_id],
        )?;
        for value in values {
            self.conn.execute(
                "INSERT OR IGNORE INTO specializations (value) VALUES (?1)",
                params![value],
            )?;
            self.conn.execute(
                "INSERT OR IGNORE INTO degree_specializations (degree_id, specialization_id)
                 SELECT ?1, id FROM specializations WHERE value = ?2",
                params![degree_id, value],
            )?;
        }
        Ok(())
    }

    pub fn curriculum_marketing_text(&self, program_id: i64) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT marketing_text FROM curricula WHERE program_id = ?1",
                params![program_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten())
    }

    /// Create or update the active curriculum of a program
    pub fn set_curriculum_marketing_text(&self, program_id: i64, text: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO curricula (uuid, program_id, marketing_text, is_active) VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(program_id) DO UPDATE SET marketing_text = excluded.marketing_text",
            params![uuid::Uuid::new_v4().to_string(), program_id, text],
        )?;
        Ok(())
    }

    // =====================================================================
    // Program location restrictions
    // =====================================================================

    pub fn program_restriction(&self, program_id: i64) -> Result<Option<LocationRestriction>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, restriction_type, countries FROM program_location_restrictions WHERE program_id = ?1",
                params![program_id],
                LocationRestriction::from_row,
            )
            .optional()?)
    }

    /// Update the restriction of a program in place, creating it when absent
    pub fn set_program_restriction(
        &self,
        program: &Program,
        restriction_type: RestrictionType,
        countries: &[String],
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO program_location_restrictions (program_id, restriction_type, countries)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(program_id) DO UPDATE SET
                restriction_type = excluded.restriction_type,
                countries = excluded.countries",
            params![program.id, restriction_type.to_string(), countries.join(",")],
        )?;
        self.touch(IndexedKind::Program, &program.uuid)
    }
}
