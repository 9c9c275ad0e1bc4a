//! Reference-data seeding from YAML documents
//!
//! Every record is inserted or updated by its natural key, so applying the
//! same document twice leaves the catalog unchanged.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{now, Catalog, CatalogError, IndexedKind, Result};
use crate::core::entity::{CourseRunStatus, RestrictionType};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeedData {
    pub partners: Vec<SeedPartner>,
    pub sources: Vec<SeedSource>,
    pub organizations: Vec<SeedOrganization>,
    pub users: Vec<SeedUser>,
    pub seat_types: Vec<SeedNamed>,
    pub course_run_types: Vec<SeedRunType>,
    pub course_types: Vec<SeedCourseType>,
    pub subjects: Vec<SeedSubject>,
    pub level_types: Vec<String>,
    pub language_tags: Vec<SeedLanguage>,
    pub program_types: Vec<SeedNamed>,
    pub collaborators: Vec<String>,
    pub courses: Vec<SeedCourse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedPartner {
    pub short_code: String,
    pub name: String,
    pub marketing_site_url_root: Option<String>,
    pub marketing_site_api_username: Option<String>,
    pub marketing_site_api_password: Option<String>,
    pub studio_url: Option<String>,
    pub lms_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedSource {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedOrganization {
    pub partner: String,
    pub key: String,
    pub name: String,
    pub uuid: Option<String>,
    pub logo_image_url: Option<String>,
    pub banner_image_url: Option<String>,
    /// External vendor keys as `{source, key}`
    #[serde(default)]
    pub mappings: Vec<SeedOrgMapping>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedOrgMapping {
    pub source: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedUser {
    pub username: String,
    pub email: Option<String>,
    pub partner: Option<String>,
    /// Organization keys the user belongs to
    #[serde(default)]
    pub organizations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedNamed {
    pub slug: String,
    pub name: String,
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedRunType {
    pub slug: String,
    pub name: String,
    pub uuid: Option<String>,
    #[serde(default = "default_true")]
    pub is_marketable: bool,
    #[serde(default)]
    pub seat_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedCourseType {
    pub slug: String,
    pub name: String,
    pub uuid: Option<String>,
    #[serde(default)]
    pub entitlement_types: Vec<String>,
    /// Allowed run type slugs in preference order
    #[serde(default)]
    pub run_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedSubject {
    pub partner: String,
    pub slug: String,
    pub name: String,
    pub name_es: Option<String>,
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedLanguage {
    pub code: String,
    pub name: String,
}

/// A pre-existing official course
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedCourse {
    pub partner: String,
    pub key: String,
    pub title: String,
    pub uuid: Option<String>,
    #[serde(rename = "type")]
    pub course_type: Option<String>,
    pub product_source: Option<String>,
    pub url_slug: Option<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    pub location_restriction: Option<SeedRestriction>,
    #[serde(default)]
    pub runs: Vec<SeedRun>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedRestriction {
    pub restriction_type: RestrictionType,
    #[serde(default)]
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedRun {
    pub key: String,
    pub uuid: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(default)]
    pub status: CourseRunStatus,
    pub variant_id: Option<String>,
    #[serde(rename = "type")]
    pub run_type: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Counts of records applied per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedStats {
    pub partners: usize,
    pub sources: usize,
    pub organizations: usize,
    pub users: usize,
    pub seat_types: usize,
    pub course_run_types: usize,
    pub course_types: usize,
    pub subjects: usize,
    pub level_types: usize,
    pub language_tags: usize,
    pub program_types: usize,
    pub collaborators: usize,
    pub courses: usize,
}

impl SeedData {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yml::from_str(content).map_err(|e| CatalogError::Invalid(e.to_string()))
    }

    /// Fold another document into this one
    pub fn extend(&mut self, other: SeedData) {
        self.partners.extend(other.partners);
        self.sources.extend(other.sources);
        self.organizations.extend(other.organizations);
        self.users.extend(other.users);
        self.seat_types.extend(other.seat_types);
        self.course_run_types.extend(other.course_run_types);
        self.course_types.extend(other.course_types);
        self.subjects.extend(other.subjects);
        self.level_types.extend(other.level_types);
        self.language_tags.extend(other.language_tags);
        self.program_types.extend(other.program_types);
        self.collaborators.extend(other.collaborators);
        self.courses.extend(other.courses);
    }
}

fn new_uuid(given: &Option<String>) -> String {
    given
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

impl Catalog {
    /// Apply a seed document inside a single transaction
    pub fn apply_seed(&self, data: &SeedData) -> Result<SeedStats> {
        self.conn.execute_batch("BEGIN")?;
        match self.apply_seed_inner(data) {
            Ok(stats) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(stats)
            }
            Err(e) => {
                self.conn.execute_batch("ROLLBACK")?;
                Err(e)
            }
        }
    }

    fn apply_seed_inner(&self, data: &SeedData) -> Result<SeedStats> {
        let mut stats = SeedStats::default();

        for p in &data.partners {
            self.conn.execute(
                "INSERT INTO partners (short_code, name, marketing_site_url_root,
                    marketing_site_api_username, marketing_site_api_password, studio_url, lms_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(short_code) DO UPDATE SET name = excluded.name,
                    marketing_site_url_root = excluded.marketing_site_url_root,
                    marketing_site_api_username = excluded.marketing_site_api_username,
                    marketing_site_api_password = excluded.marketing_site_api_password,
                    studio_url = excluded.studio_url, lms_url = excluded.lms_url",
                params![
                    p.short_code,
                    p.name,
                    p.marketing_site_url_root,
                    p.marketing_site_api_username,
                    p.marketing_site_api_password,
                    p.studio_url,
                    p.lms_url
                ],
            )?;
            stats.partners += 1;
        }

        for s in &data.sources {
            self.conn.execute(
                "INSERT INTO sources (slug, name) VALUES (?1, ?2)
                 ON CONFLICT(slug) DO UPDATE SET name = excluded.name",
                params![s.slug, s.name],
            )?;
            stats.sources += 1;
        }

        for o in &data.organizations {
            let partner_id = self.require_partner(&o.partner)?;
            self.conn.execute(
                "INSERT INTO organizations (partner_id, uuid, key, name, logo_image_url, banner_image_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(partner_id, key) DO UPDATE SET name = excluded.name,
                    logo_image_url = excluded.logo_image_url,
                    banner_image_url = excluded.banner_image_url",
                params![
                    partner_id,
                    new_uuid(&o.uuid),
                    o.key,
                    o.name,
                    o.logo_image_url,
                    o.banner_image_url
                ],
            )?;
            let org_id = self.require_org(partner_id, &o.key)?;
            for mapping in &o.mappings {
                let source = self
                    .source_by_slug(&mapping.source)?
                    .ok_or_else(|| CatalogError::not_found("source", mapping.source.clone()))?;
                self.conn.execute(
                    "INSERT INTO organization_mappings (organization_id, source_id, organization_external_key)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(source_id, organization_external_key) DO UPDATE SET
                        organization_id = excluded.organization_id",
                    params![org_id, source.id, mapping.key],
                )?;
            }
            stats.organizations += 1;
        }

        for u in &data.users {
            self.conn.execute(
                "INSERT INTO users (username, email) VALUES (?1, ?2)
                 ON CONFLICT(username) DO UPDATE SET email = excluded.email",
                params![u.username, u.email],
            )?;
            let user_id: i64 = self.conn.query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![u.username],
                |row| row.get(0),
            )?;
            let partner_id = match &u.partner {
                Some(code) => Some(self.require_partner(code)?),
                None => None,
            };
            for key in &u.organizations {
                let org_id = match partner_id {
                    Some(partner_id) => self.require_org(partner_id, key)?,
                    None => self
                        .conn
                        .query_row(
                            "SELECT id FROM organizations WHERE key = ?1 ORDER BY id LIMIT 1",
                            params![key],
                            |row| row.get(0),
                        )
                        .optional()?
                        .ok_or_else(|| CatalogError::not_found("organization", key.clone()))?,
                };
                self.conn.execute(
                    "INSERT OR IGNORE INTO user_organizations (user_id, organization_id) VALUES (?1, ?2)",
                    params![user_id, org_id],
                )?;
            }
            stats.users += 1;
        }

        for st in &data.seat_types {
            self.upsert_seat_type(&st.slug, &st.name)?;
            stats.seat_types += 1;
        }

        for rt in &data.course_run_types {
            self.conn.execute(
                "INSERT INTO course_run_types (uuid, slug, name, is_marketable) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(slug) DO UPDATE SET name = excluded.name, is_marketable = excluded.is_marketable",
                params![new_uuid(&rt.uuid), rt.slug, rt.name, rt.is_marketable],
            )?;
            let run_type_id: i64 = self.conn.query_row(
                "SELECT id FROM course_run_types WHERE slug = ?1",
                params![rt.slug],
                |row| row.get(0),
            )?;
            self.conn.execute(
                "DELETE FROM course_run_type_seat_types WHERE course_run_type_id = ?1",
                params![run_type_id],
            )?;
            for seat in &rt.seat_types {
                let seat_type_id = self.upsert_seat_type(seat, seat)?;
                self.conn.execute(
                    "INSERT OR IGNORE INTO course_run_type_seat_types (course_run_type_id, seat_type_id) VALUES (?1, ?2)",
                    params![run_type_id, seat_type_id],
                )?;
            }
            stats.course_run_types += 1;
        }

        for ct in &data.course_types {
            self.conn.execute(
                "INSERT INTO course_types (uuid, slug, name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(slug) DO UPDATE SET name = excluded.name",
                params![new_uuid(&ct.uuid), ct.slug, ct.name],
            )?;
            let course_type_id: i64 = self.conn.query_row(
                "SELECT id FROM course_types WHERE slug = ?1",
                params![ct.slug],
                |row| row.get(0),
            )?;
            self.conn.execute(
                "DELETE FROM course_type_entitlement_types WHERE course_type_id = ?1",
                params![course_type_id],
            )?;
            for mode in &ct.entitlement_types {
                let seat_type_id = self.upsert_seat_type(mode, mode)?;
                self.conn.execute(
                    "INSERT OR IGNORE INTO course_type_entitlement_types (course_type_id, seat_type_id) VALUES (?1, ?2)",
                    params![course_type_id, seat_type_id],
                )?;
            }
            self.conn.execute(
                "DELETE FROM course_type_run_types WHERE course_type_id = ?1",
                params![course_type_id],
            )?;
            for (position, slug) in ct.run_types.iter().enumerate() {
                let run_type_id: i64 = self
                    .conn
                    .query_row(
                        "SELECT id FROM course_run_types WHERE slug = ?1",
                        params![slug],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or_else(|| CatalogError::not_found("course run type", slug.clone()))?;
                self.conn.execute(
                    "INSERT INTO course_type_run_types (course_type_id, course_run_type_id, position) VALUES (?1, ?2, ?3)",
                    params![course_type_id, run_type_id, position as i64],
                )?;
            }
            stats.course_types += 1;
        }

        for s in &data.subjects {
            let partner_id = self.require_partner(&s.partner)?;
            self.conn.execute(
                "INSERT INTO subjects (uuid, partner_id, slug, name, name_es) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(partner_id, slug) DO UPDATE SET name = excluded.name, name_es = excluded.name_es",
                params![new_uuid(&s.uuid), partner_id, s.slug, s.name, s.name_es],
            )?;
            stats.subjects += 1;
        }

        for name in &data.level_types {
            self.conn.execute(
                "INSERT OR IGNORE INTO level_types (name) VALUES (?1)",
                params![name],
            )?;
            stats.level_types += 1;
        }

        for lang in &data.language_tags {
            self.conn.execute(
                "INSERT INTO language_tags (code, name) VALUES (?1, ?2)
                 ON CONFLICT(code) DO UPDATE SET name = excluded.name",
                params![lang.code, lang.name],
            )?;
            stats.language_tags += 1;
        }

        for pt in &data.program_types {
            self.conn.execute(
                "INSERT INTO program_types (uuid, slug, name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(slug) DO UPDATE SET name = excluded.name",
                params![new_uuid(&pt.uuid), pt.slug, pt.name],
            )?;
            stats.program_types += 1;
        }

        for name in &data.collaborators {
            self.get_or_create_collaborator(name)?;
            stats.collaborators += 1;
        }

        for course in &data.courses {
            self.seed_course(course)?;
            stats.courses += 1;
        }

        Ok(stats)
    }

    fn require_partner(&self, short_code: &str) -> Result<i64> {
        self.partner_by_code(short_code)?
            .map(|p| p.id)
            .ok_or_else(|| CatalogError::not_found("partner", short_code))
    }

    fn require_org(&self, partner_id: i64, key: &str) -> Result<i64> {
        self.organization_by_key(partner_id, key)?
            .map(|o| o.id)
            .ok_or_else(|| CatalogError::not_found("organization", key))
    }

    fn upsert_seat_type(&self, slug: &str, name: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO seat_types (slug, name) VALUES (?1, ?2)",
            params![slug, name],
        )?;
        Ok(self.conn.query_row(
            "SELECT id FROM seat_types WHERE slug = ?1",
            params![slug],
            |row| row.get(0),
        )?)
    }

    /// Insert or update an official course (and its runs) by key
    fn seed_course(&self, seed: &SeedCourse) -> Result<()> {
        let partner_id = self.require_partner(&seed.partner)?;
        let type_id = match &seed.course_type {
            Some(slug) => Some(
                self.course_type_by_slug_or_name(slug)?
                    .ok_or_else(|| CatalogError::not_found("course type", slug.clone()))?
                    .id,
            ),
            None => None,
        };
        let source_id = match &seed.product_source {
            Some(slug) => Some(
                self.source_by_slug(slug)?
                    .ok_or_else(|| CatalogError::not_found("source", slug.clone()))?
                    .id,
            ),
            None => None,
        };

        let ts = now();
        let course = match self.course_by_key(partner_id, &seed.key)? {
            Some(existing) => {
                self.conn.execute(
                    "UPDATE courses SET title = ?2, type_id = ?3, product_source_id = ?4, modified = ?5
                     WHERE id = ?1",
                    params![existing.id, seed.title, type_id, source_id, ts],
                )?;
                existing
            }
            None => {
                self.conn.execute(
                    "INSERT INTO courses (uuid, partner_id, key, draft, title, type_id, product_source_id, created, modified)
                     VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?7)",
                    params![new_uuid(&seed.uuid), partner_id, seed.key, seed.title, type_id, source_id, ts],
                )?;
                let id = self.conn.last_insert_rowid();
                self.course_by_id(id)?
                    .ok_or_else(|| CatalogError::not_found("course", id.to_string()))?
            }
        };

        let mut org_ids = Vec::with_capacity(seed.organizations.len());
        for key in &seed.organizations {
            org_ids.push(self.require_org(partner_id, key)?);
        }
        self.set_authoring_orgs(course.id, &org_ids)?;

        if let Some(slug) = &seed.url_slug {
            self.set_active_url_slug(partner_id, &course.uuid, slug)?;
        }

        if let Some(restriction) = &seed.location_restriction {
            let countries: Vec<String> = restriction
                .countries
                .iter()
                .map(|c| c.trim().to_uppercase())
                .collect();
            let created = self.create_course_restriction(restriction.restriction_type, &countries)?;
            self.set_course_restriction(&course.uuid, created.id)?;
            self.delete_orphan_course_restrictions()?;
        }

        for run in &seed.runs {
            let run_type_id = match &run.run_type {
                Some(slug) => Some(
                    self.run_type_by_slug_or_name(slug)?
                        .ok_or_else(|| CatalogError::not_found("course run type", slug.clone()))?
                        .id,
                ),
                None => None,
            };
            self.conn.execute(
                "INSERT INTO course_runs (uuid, course_id, key, draft, type_id, start_at, end_at, status,
                    variant_id, created, modified)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(key, draft) DO UPDATE SET start_at = excluded.start_at,
                    end_at = excluded.end_at, status = excluded.status,
                    variant_id = excluded.variant_id, type_id = excluded.type_id",
                params![
                    new_uuid(&run.uuid),
                    course.id,
                    run.key,
                    run_type_id,
                    run.start,
                    run.end,
                    run.status.as_str(),
                    run.variant_id,
                    ts
                ],
            )?;
        }

        self.touch(IndexedKind::Course, &course.uuid)
    }
}
