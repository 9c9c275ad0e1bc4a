//! Geo value objects and product values
//!
//! Geolocations, course location restrictions and product values are value
//! objects. Assigning a new one to a course leaves the previous row orphaned;
//! the `delete_orphan_*` sweeps remove rows no course or program references.

use rusqlite::{params, OptionalExtension};

use super::{
    Catalog, CatalogError, GeoLocation, IndexedKind, LocationRestriction, ProductValue, Program,
    Result, ValueAmounts,
};
use crate::core::entity::RestrictionType;

impl Catalog {
    // =====================================================================
    // Geolocations
    // =====================================================================

    pub fn geolocation_by_id(&self, id: i64) -> Result<Option<GeoLocation>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, location_name, lat, lng FROM geolocations WHERE id = ?1",
                params![id],
                |row| {
                    Ok(GeoLocation {
                        id: row.get(0)?,
                        location_name: row.get(1)?,
                        lat: row.get(2)?,
                        lng: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn get_or_create_geolocation(
        &self,
        location_name: &str,
        lat: &str,
        lng: &str,
    ) -> Result<GeoLocation> {
        self.conn.execute(
            "INSERT OR IGNORE INTO geolocations (location_name, lat, lng) VALUES (?1, ?2, ?3)",
            params![location_name, lat, lng],
        )?;
        let id: i64 = self.conn.query_row(
            "SELECT id FROM geolocations WHERE location_name = ?1 AND lat = ?2 AND lng = ?3",
            params![location_name, lat, lng],
            |row| row.get(0),
        )?;
        self.geolocation_by_id(id)?
            .ok_or_else(|| CatalogError::not_found("geolocation", id.to_string()))
    }

    /// Point every row of a course (draft and official) at a geolocation
    pub fn set_course_geolocation(&self, course_uuid: &str, geolocation_id: i64) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE courses SET geolocation_id = ?2 WHERE uuid = ?1",
            params![course_uuid, geolocation_id],
        )?;
        self.touch(IndexedKind::Course, course_uuid)?;
        Ok(changed)
    }

    pub fn set_program_geolocation(&self, program: &Program, geolocation_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE programs SET geolocation_id = ?2 WHERE id = ?1",
            params![program.id, geolocation_id],
        )?;
        self.touch(IndexedKind::Program, &program.uuid)
    }

    pub fn delete_orphan_geolocations(&self) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM geolocations
             WHERE id NOT IN (SELECT geolocation_id FROM courses WHERE geolocation_id IS NOT NULL)
               AND id NOT IN (SELECT geolocation_id FROM programs WHERE geolocation_id IS NOT NULL)",
            [],
        )?)
    }

    // =====================================================================
    // Course location restrictions
    // =====================================================================

    pub fn course_restriction(&self, id: i64) -> Result<Option<LocationRestriction>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, restriction_type, countries FROM course_location_restrictions WHERE id = ?1",
                params![id],
                LocationRestriction::from_row,
            )
            .optional()?)
    }

    pub fn create_course_restriction(
        &self,
        restriction_type: RestrictionType,
        countries: &[String],
    ) -> Result<LocationRestriction> {
        self.conn.execute(
            "INSERT INTO course_location_restrictions (restriction_type, countries) VALUES (?1, ?2)",
            params![restriction_type.to_string(), countries.join(",")],
        )?;
        Ok(LocationRestriction {
            id: self.conn.last_insert_rowid(),
            restriction_type,
            countries: countries.to_vec(),
        })
    }

    /// Point every row of a course at a restriction
    pub fn set_course_restriction(&self, course_uuid: &str, restriction_id: i64) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE courses SET location_restriction_id = ?2 WHERE uuid = ?1",
            params![course_uuid, restriction_id],
        )?;
        self.touch(IndexedKind::Course, course_uuid)?;
        Ok(changed)
    }

    pub fn delete_orphan_course_restrictions(&self) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM course_location_restrictions
             WHERE id NOT IN (
                SELECT location_restriction_id FROM courses WHERE location_restriction_id IS NOT NULL)",
            [],
        )?)
    }

    // =====================================================================
    // Product values
    // =====================================================================

    pub fn product_value(&self, id: i64) -> Result<Option<ProductValue>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, per_click_usa, per_click_international, per_lead_usa, per_lead_international
                 FROM product_values WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ProductValue {
                        id: row.get(0)?,
                        amounts: ValueAmounts {
                            per_click_usa: row.get(1)?,
                            per_click_international: row.get(2)?,
                            per_lead_usa: row.get(3)?,
                            per_lead_international: row.get(4)?,
                        },
                    })
                },
            )
            .optional()?)
    }

    pub fn create_product_value(&self, amounts: ValueAmounts) -> Result<ProductValue> {
        self.conn.execute(
            "INSERT INTO product_values (per_click_usa, per_click_international, per_lead_usa, per_lead_international)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                amounts.per_click_usa,
                amounts.per_click_international,
                amounts.per_lead_usa,
                amounts.per_lead_international
            ],
        )?;
        Ok(ProductValue {
            id: self.conn.last_insert_rowid(),
            amounts,
        })
    }

    /// Point a single course row at a product value
    pub fn set_course_row_product_value(&self, course_id: i64, value_id: i64) -> Result<()> {
        let uuid: String = self.conn.query_row(
            "SELECT uuid FROM courses WHERE id = ?1",
            params![course_id],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "UPDATE courses SET in_year_value_id = ?2 WHERE id = ?1",
            params![course_id, value_id],
        )?;
        self.touch(IndexedKind::Course, &uuid)
    }

    pub fn set_program_product_value(&self, program: &Program, value_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE programs SET in_year_value_id = ?2 WHERE id = ?1",
            params![program.id, value_id],
        )?;
        self.touch(IndexedKind::Program, &program.uuid)
    }

    pub fn delete_orphan_product_values(&self) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM product_values
             WHERE id NOT IN (SELECT in_year_value_id FROM courses WHERE in_year_value_id IS NOT NULL)
               AND id NOT IN (SELECT in_year_value_id FROM programs WHERE in_year_value_id IS NOT NULL)",
            [],
        )?)
    }
}
