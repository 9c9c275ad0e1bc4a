//! Reference-data lookups: partners, organizations, users, types, subjects,
//! languages, collaborators and people

use rusqlite::{params, OptionalExtension};

use super::types::{ORGANIZATION_COLUMNS, PARTNER_COLUMNS};
use super::{
    Catalog, Collaborator, CourseRunType, CourseType, LanguageTag, LevelType, Organization,
    Partner, Person, ProgramType, Result, Source, Subject, User,
};

impl Catalog {
    // =====================================================================
    // Partners and organizations
    // =====================================================================

    pub fn partner_by_code(&self, short_code: &str) -> Result<Option<Partner>> {
        let sql = format!("SELECT {} FROM partners WHERE short_code = ?1", PARTNER_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![short_code], Partner::from_row)
            .optional()?)
    }

    pub fn partner_by_id(&self, id: i64) -> Result<Option<Partner>> {
        let sql = format!("SELECT {} FROM partners WHERE id = ?1", PARTNER_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], Partner::from_row)
            .optional()?)
    }

    pub fn organization_by_key(&self, partner_id: i64, key: &str) -> Result<Option<Organization>> {
        let sql = format!(
            "SELECT {} FROM organizations WHERE partner_id = ?1 AND key = ?2",
            ORGANIZATION_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![partner_id, key], Organization::from_row)
            .optional()?)
    }

    /// Organization by key, falling back to an external vendor key mapping
    pub fn organization_by_key_or_mapping(
        &self,
        partner_id: i64,
        key: &str,
        source_id: Option<i64>,
    ) -> Result<Option<Organization>> {
        if let Some(org) = self.organization_by_key(partner_id, key)? {
            return Ok(Some(org));
        }
        let Some(source_id) = source_id else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {} FROM organizations WHERE partner_id = ?1 AND id IN (
                SELECT organization_id FROM organization_mappings
                WHERE source_id = ?2 AND organization_external_key = ?3)",
            ORGANIZATION_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![partner_id, source_id, key], Organization::from_row)
            .optional()?)
    }

    pub fn organization_by_id(&self, id: i64) -> Result<Option<Organization>> {
        let sql = format!("SELECT {} FROM organizations WHERE id = ?1", ORGANIZATION_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], Organization::from_row)
            .optional()?)
    }

    /// Organization ids a user belongs to
    pub fn organization_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT organization_id FROM user_organizations WHERE user_id = ?1 ORDER BY organization_id",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    // =====================================================================
    // Users
    // =====================================================================

    /// First user whose username or email matches exactly, by id order
    pub fn user_by_username_or_email(&self, value: &str) -> Result<Option<User>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, username, email FROM users
                 WHERE username = ?1 OR email = ?1 ORDER BY id LIMIT 1",
                params![value],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    // =====================================================================
    // Product sources
    // =====================================================================

    pub fn source_by_slug(&self, slug: &str) -> Result<Option<Source>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, slug, name FROM sources WHERE slug = ?1",
                params![slug],
                |row| {
                    Ok(Source {
                        id: row.get(0)?,
                        slug: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn source_by_id(&self, id: i64) -> Result<Option<Source>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, slug, name FROM sources WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Source {
                        id: row.get(0)?,
                        slug: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    // =====================================================================
    // Course and run types
    // =====================================================================

    /// Course type by slug or display name (case-insensitive)
    pub fn course_type_by_slug_or_name(&self, value: &str) -> Result<Option<CourseType>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM course_types
                 WHERE slug = ?1 OR lower(name) = lower(?1) ORDER BY id LIMIT 1",
                params![value.trim()],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => self.course_type_by_id(id),
            None => Ok(None),
        }
    }

    pub fn course_type_by_id(&self, id: i64) -> Result<Option<CourseType>> {
        let base = self
            .conn
            .query_row(
                "SELECT id, uuid, slug, name FROM course_types WHERE id = ?1",
                params![id],
                |row| {
                    Ok(CourseType {
                        id: row.get(0)?,
                        uuid: row.get(1)?,
                        slug: row.get(2)?,
                        name: row.get(3)?,
                        entitlement_types: Vec::new(),
                        run_types: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut course_type) = base else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT st.slug FROM course_type_entitlement_types cte
             JOIN seat_types st ON st.id = cte.seat_type_id
             WHERE cte.course_type_id = ?1 ORDER BY st.slug",
        )?;
        course_type.entitlement_types = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT rt.slug FROM course_type_run_types ctr
             JOIN course_run_types rt ON rt.id = ctr.course_run_type_id
             WHERE ctr.course_type_id = ?1 ORDER BY ctr.position, rt.id",
        )?;
        course_type.run_types = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(Some(course_type))
    }

    /// Course-run type by slug or display name (case-insensitive)
    pub fn run_type_by_slug_or_name(&self, value: &str) -> Result<Option<CourseRunType>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM course_run_types
                 WHERE slug = ?1 OR lower(name) = lower(?1) ORDER BY id LIMIT 1",
                params![value.trim()],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => self.run_type_by_id(id),
            None => Ok(None),
        }
    }

    pub fn run_type_by_uuid(&self, uuid: &str) -> Result<Option<CourseRunType>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM course_run_types WHERE uuid = ?1",
                params![uuid],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => self.run_type_by_id(id),
            None => Ok(None),
        }
    }

    pub fn course_type_by_uuid(&self, uuid: &str) -> Result<Option<CourseType>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM course_types WHERE uuid = ?1",
                params![uuid],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => self.course_type_by_id(id),
            None => Ok(None),
        }
    }

    pub fn run_type_by_id(&self, id: i64) -> Result<Option<CourseRunType>> {
        let base = self
            .conn
            .query_row(
                "SELECT id, uuid, slug, name, is_marketable FROM course_run_types WHERE id = ?1",
                params![id],
                |row| {
                    Ok(CourseRunType {
                        id: row.get(0)?,
                        uuid: row.get(1)?,
                        slug: row.get(2)?,
                        name: row.get(3)?,
                        is_marketable: row.get(4)?,
                        seat_types: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut run_type) = base else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT st.slug FROM course_run_type_seat_types rts
             JOIN seat_types st ON st.id = rts.seat_type_id
             WHERE rts.course_run_type_id = ?1 ORDER BY st.slug",
        )?;
        run_type.seat_types = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(Some(run_type))
    }

    // =====================================================================
    // Subjects, levels, languages, program types
    // =====================================================================

    /// Subject by English name (case-insensitive) or slug
    pub fn subject_by_name(&self, partner_id: i64, name: &str) -> Result<Option<Subject>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, uuid, slug, name, name_es FROM subjects
                 WHERE partner_id = ?1 AND (lower(name) = lower(?2) OR slug = ?2)
                 ORDER BY id LIMIT 1",
                params![partner_id, name.trim()],
                |row| {
                    Ok(Subject {
                        id: row.get(0)?,
                        uuid: row.get(1)?,
                        slug: row.get(2)?,
                        name: row.get(3)?,
                        name_es: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn level_type_by_name(&self, name: &str) -> Result<Option<LevelType>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name FROM level_types WHERE lower(name) = lower(?1)",
                params![name.trim()],
                |row| {
                    Ok(LevelType {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn level_type_by_id(&self, id: i64) -> Result<Option<LevelType>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name FROM level_types WHERE id = ?1",
                params![id],
                |row| {
                    Ok(LevelType {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    /// Language tag by display name or code (case-insensitive)
    pub fn language_by_name_or_code(&self, value: &str) -> Result<Option<LanguageTag>> {
        Ok(self
            .conn
            .query_row(
                "SELECT code, name FROM language_tags
                 WHERE lower(name) = lower(?1) OR lower(code) = lower(?1)
                 ORDER BY code LIMIT 1",
                params![value.trim()],
                |row| {
                    Ok(LanguageTag {
                        code: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn program_type_by_slug(&self, slug: &str) -> Result<Option<ProgramType>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, uuid, slug, name FROM program_types
                 WHERE slug = ?1 OR lower(name) = lower(?1) ORDER BY id LIMIT 1",
                params![slug.trim()],
                |row| {
                    Ok(ProgramType {
                        id: row.get(0)?,
                        uuid: row.get(1)?,
                        slug: row.get(2)?,
                        name: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    // =====================================================================
    // Collaborators and people
    // =====================================================================

    pub fn get_or_create_collaborator(&self, name: &str) -> Result<Collaborator> {
        let existing = self
            .conn
            .query_row(
                "SELECT id, uuid, name FROM collaborators WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Collaborator {
                        id: row.get(0)?,
                        uuid: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        if let Some(collaborator) = existing {
            return Ok(collaborator);
        }

        let uuid = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO collaborators (uuid, name) VALUES (?1, ?2)",
            params![uuid, name],
        )?;
        Ok(Collaborator {
            id: self.conn.last_insert_rowid(),
            uuid,
            name: name.to_string(),
        })
    }

    pub fn collaborator_by_uuid(&self, uuid: &str) -> Result<Option<Collaborator>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, uuid, name FROM collaborators WHERE uuid = ?1",
                params![uuid],
                |row| {
                    Ok(Collaborator {
                        id: row.get(0)?,
                        uuid: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    /// First person with this given name for the partner, created if missing
    pub fn get_or_create_person(&self, partner_id: i64, given_name: &str) -> Result<Person> {
        let existing = self
            .conn
            .query_row(
                "SELECT id, uuid, given_name FROM people
                 WHERE partner_id = ?1 AND given_name = ?2 ORDER BY id LIMIT 1",
                params![partner_id, given_name],
                |row| {
                    Ok(Person {
                        id: row.get(0)?,
                        uuid: row.get(1)?,
                        given_name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        if let Some(person) = existing {
            return Ok(person);
        }

        let uuid = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO people (uuid, partner_id, given_name) VALUES (?1, ?2, ?3)",
            params![uuid, partner_id, given_name],
        )?;
        Ok(Person {
            id: self.conn.last_insert_rowid(),
            uuid,
            given_name: given_name.to_string(),
        })
    }

    pub fn person_by_uuid(&self, uuid: &str) -> Result<Option<Person>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, uuid, given_name FROM people WHERE uuid = ?1",
                params![uuid],
                |row| {
                    Ok(Person {
                        id: row.get(0)?,
                        uuid: row.get(1)?,
                        given_name: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }
}
