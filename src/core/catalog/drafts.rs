//! Draft/official shadow management
//!
//! Every course, run, seat and entitlement exists as at most two rows: a
//! draft and an official. The official row points at its draft through
//! `draft_version_id`; the draft finds its official twin through the reverse
//! pointer. Both rows share `uuid` and `key`.
//!
//! `ensure_draft_*` materializes the draft world (course → runs → seats and
//! entitlements) from an official subtree. `set_official_*` copies a draft
//! onto its official twin, creating the twin when it does not exist yet.
//! Callers run both inside a row savepoint so integrity errors roll back the
//! whole subtree.

use rusqlite::{params, OptionalExtension};

use super::types::{COURSE_COLUMNS, COURSE_DATA_COLUMNS, COURSE_RUN_COLUMNS, COURSE_RUN_DATA_COLUMNS};
use super::{column_list, now, Catalog, CatalogError, Course, CourseRun, IndexedKind, Result};

impl Catalog {
    // =====================================================================
    // Draft world
    // =====================================================================

    /// Return the draft twin of a course, cloning the official subtree if needed
    pub fn ensure_draft_course(&self, course: &Course) -> Result<Course> {
        if course.draft {
            return Ok(course.clone());
        }
        if let Some(draft_id) = course.draft_version_id {
            if let Some(existing) = self.course_by_id(draft_id)? {
                return Ok(existing);
            }
        }

        let ts = now();
        let columns = column_list(COURSE_DATA_COLUMNS);
        self.conn.execute(
            &format!(
                "INSERT INTO courses ({cols}, draft, created, modified)
                 SELECT {cols}, 1, ?2, ?2 FROM courses WHERE id = ?1",
                cols = columns
            ),
            params![course.id, ts],
        )?;
        let draft_id = self.conn.last_insert_rowid();

        self.conn.execute(
            "UPDATE courses SET draft_version_id = ?2 WHERE id = ?1",
            params![course.id, draft_id],
        )?;

        self.copy_course_relations(course.id, draft_id)?;

        for run in self.course_runs_for(course.id)? {
            self.clone_run_into(&run, draft_id, true)?;
        }

        self.conn.execute(
            "INSERT INTO entitlements (course_id, draft, mode, price, currency, sku)
             SELECT ?2, 1, mode, price, currency, sku FROM entitlements WHERE course_id = ?1",
            params![course.id, draft_id],
        )?;
        self.conn.execute(
            "UPDATE entitlements SET draft_version_id = (
                SELECT d.id FROM entitlements d WHERE d.course_id = ?2 AND d.mode = entitlements.mode)
             WHERE course_id = ?1",
            params![course.id, draft_id],
        )?;

        if let Some(canonical_id) = course.canonical_course_run_id {
            let draft_canonical: Option<i64> = self
                .conn
                .query_row(
                    "SELECT d.id FROM course_runs d
                     JOIN course_runs o ON o.uuid = d.uuid
                     WHERE o.id = ?1 AND d.course_id = ?2 AND d.draft = 1",
                    params![canonical_id, draft_id],
                    |row| row.get(0),
                )
                .optional()?;
            self.set_canonical_run(draft_id, draft_canonical)?;
        }

        let draft = self
            .course_by_id(draft_id)?
            .ok_or_else(|| CatalogError::not_found("course", draft_id.to_string()))?;
        self.touch(IndexedKind::Course, &draft.uuid)?;
        Ok(draft)
    }

    /// Return the draft twin of a run, materializing its course's draft world
    pub fn ensure_draft_run(&self, run: &CourseRun) -> Result<CourseRun> {
        if run.draft {
            return Ok(run.clone());
        }
        let course = self
            .course_by_id(run.course_id)?
            .ok_or_else(|| CatalogError::not_found("course", run.course_id.to_string()))?;
        let draft_course = self.ensure_draft_course(&course)?;

        let sql = format!(
            "SELECT {} FROM course_runs WHERE key = ?1 AND draft = 1",
            COURSE_RUN_COLUMNS
        );
        let existing = self
            .conn
            .query_row(&sql, params![run.key], CourseRun::from_row)
            .optional()?;
        match existing {
            Some(draft) => Ok(draft),
            None => self.clone_run_into(run, draft_course.id, true),
        }
    }

    /// Copy a run row (with staff, languages and seats) under another course row
    fn clone_run_into(&self, run: &CourseRun, course_id: i64, draft: bool) -> Result<CourseRun> {
        let ts = now();
        let columns = column_list(COURSE_RUN_DATA_COLUMNS);
        self.conn.execute(
            &format!(
                "INSERT INTO course_runs ({cols}, course_id, draft, created, modified)
                 SELECT {cols}, ?2, ?3, ?4, ?4 FROM course_runs WHERE id = ?1",
                cols = columns
            ),
            params![run.id, course_id, draft, ts],
        )?;
        let copy_id = self.conn.last_insert_rowid();

        if draft {
            self.conn.execute(
                "UPDATE course_runs SET draft_version_id = ?2 WHERE id = ?1",
                params![run.id, copy_id],
            )?;
        } else {
            self.conn.execute(
                "UPDATE course_runs SET draft_version_id = ?1 WHERE id = ?2",
                params![run.id, copy_id],
            )?;
        }

        self.copy_run_relations(run.id, copy_id)?;
        self.sync_seats(run.id, copy_id, draft)?;

        let copy = self
            .course_run_by_id(copy_id)?
            .ok_or_else(|| CatalogError::not_found("course run", copy_id.to_string()))?;
        self.touch(IndexedKind::CourseRun, &copy.uuid)?;
        Ok(copy)
    }

    // =====================================================================
    // Promotion
    // =====================================================================

    /// Create or update the official twin of a draft course and its entitlements
    pub fn set_official_course(&self, draft: &Course) -> Result<Course> {
        if !draft.draft {
            return Ok(draft.clone());
        }

        let columns = column_list(COURSE_DATA_COLUMNS);
        let ts = now();
        let official_id = match self.official_version_of(draft)? {
            Some(official) => {
                self.conn.execute(
                    &format!(
                        "UPDATE courses SET ({cols}) = (SELECT {cols} FROM courses WHERE id = ?1),
                            modified = ?3
                         WHERE id = ?2",
                        cols = columns
                    ),
                    params![draft.id, official.id, ts],
                )?;
                official.id
            }
            None => {
                self.conn.execute(
                    &format!(
                        "INSERT INTO courses ({cols}, draft, draft_version_id, created, modified)
                         SELECT {cols}, 0, id, ?2, ?2 FROM courses WHERE id = ?1",
                        cols = columns
                    ),
                    params![draft.id, ts],
                )?;
                self.conn.last_insert_rowid()
            }
        };

        self.clear_course_relations(official_id)?;
        self.copy_course_relations(draft.id, official_id)?;

        for entitlement in self.entitlements(draft.id)? {
            self.conn.execute(
                "INSERT INTO entitlements (course_id, draft, mode, price, currency, sku)
                 VALUES (?1, 0, ?2, ?3, ?4, ?5)
                 ON CONFLICT(course_id, mode) DO UPDATE SET
                    price = excluded.price, currency = excluded.currency, sku = excluded.sku",
                params![
                    official_id,
                    entitlement.mode,
                    entitlement.price,
                    entitlement.currency,
                    entitlement.sku
                ],
            )?;
            self.conn.execute(
                "UPDATE entitlements SET draft_version_id = ?3 WHERE course_id = ?1 AND mode = ?2",
                params![official_id, entitlement.mode, entitlement.id],
            )?;
        }
        self.conn.execute(
            "DELETE FROM entitlements WHERE course_id = ?1
               AND mode NOT IN (SELECT mode FROM entitlements WHERE course_id = ?2)",
            params![official_id, draft.id],
        )?;

        if let Some(canonical_id) = draft.canonical_course_run_id {
            let official_canonical: Option<i64> = self
                .conn
                .query_row(
                    "SELECT id FROM course_runs WHERE draft_version_id = ?1 AND draft = 0",
                    params![canonical_id],
                    |row| row.get(0),
                )
                .optional()?;
            if official_canonical.is_some() {
                self.set_canonical_run(official_id, official_canonical)?;
            }
        }

        let official = self
            .course_by_id(official_id)?
            .ok_or_else(|| CatalogError::not_found("course", official_id.to_string()))?;
        self.touch(IndexedKind::Course, &official.uuid)?;
        Ok(official)
    }

    /// Create or update the official twin of a draft run and its seats.
    /// The parent course is promoted first when it has no official twin.
    pub fn set_official_run(&self, draft: &CourseRun) -> Result<CourseRun> {
        if !draft.draft {
            return Ok(draft.clone());
        }
        let draft_course = self
            .course_by_id(draft.course_id)?
            .ok_or_else(|| CatalogError::not_found("course", draft.course_id.to_string()))?;
        let official_course = match self.official_version_of(&draft_course)? {
            Some(course) => course,
            None => self.set_official_course(&draft_course)?,
        };

        let official = match self.official_run_of(draft)? {
            Some(existing) => {
                let columns = column_list(COURSE_RUN_DATA_COLUMNS);
                self.conn.execute(
                    &format!(
                        "UPDATE course_runs SET ({cols}) = (SELECT {cols} FROM course_runs WHERE id = ?1),
                            course_id = ?3, modified = ?4
                         WHERE id = ?2",
                        cols = columns
                    ),
                    params![draft.id, existing.id, official_course.id, now()],
                )?;
                self.clear_run_relations(existing.id)?;
                self.copy_run_relations(draft.id, existing.id)?;
                self.sync_seats(draft.id, existing.id, false)?;
                self.course_run_by_id(existing.id)?
                    .ok_or_else(|| CatalogError::not_found("course run", existing.id.to_string()))?
            }
            None => self.clone_run_into(draft, official_course.id, false)?,
        };

        if draft_course.canonical_course_run_id == Some(draft.id) {
            self.set_canonical_run(official_course.id, Some(official.id))?;
        }

        self.touch(IndexedKind::CourseRun, &official.uuid)?;
        Ok(official)
    }

    /// Official course rows currently lacking a draft twin
    pub fn courses_without_draft(&self, partner_id: i64) -> Result<Vec<Course>> {
        let sql = format!(
            "SELECT {} FROM courses WHERE partner_id = ?1 AND draft = 0 AND draft_version_id IS NULL ORDER BY key",
            COURSE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![partner_id], Course::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // =====================================================================
    // Relation copying
    // =====================================================================

    fn copy_course_relations(&self, from_id: i64, to_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO course_authoring_orgs (course_id, organization_id, position)
             SELECT ?2, organization_id, position FROM course_authoring_orgs WHERE course_id = ?1",
            params![from_id, to_id],
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO course_subjects (course_id, subject_id, position)
             SELECT ?2, subject_id, position FROM course_subjects WHERE course_id = ?1",
            params![from_id, to_id],
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO course_collaborators (course_id, collaborator_id)
             SELECT ?2, collaborator_id FROM course_collaborators WHERE course_id = ?1",
            params![from_id, to_id],
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO course_editors (user_id, course_id)
             SELECT user_id, ?2 FROM course_editors WHERE course_id = ?1",
            params![from_id, to_id],
        )?;
        Ok(())
    }

    fn clear_course_relations(&self, course_id: i64) -> Result<()> {
        for table in ["course_authoring_orgs", "course_subjects", "course_collaborators"] {
            self.conn.execute(
                &format!("DELETE FROM {} WHERE course_id = ?1", table),
                params![course_id],
            )?;
        }
        Ok(())
    }

    fn copy_run_relations(&self, from_id: i64, to_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO course_run_staff (course_run_id, person_id, position)
             SELECT ?2, person_id, position FROM course_run_staff WHERE course_run_id = ?1",
            params![from_id, to_id],
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO course_run_transcript_languages (course_run_id, language_code)
             SELECT ?2, language_code FROM course_run_transcript_languages WHERE course_run_id = ?1",
            params![from_id, to_id],
        )?;
        Ok(())
    }

    fn clear_run_relations(&self, run_id: i64) -> Result<()> {
        for table in ["course_run_staff", "course_run_transcript_languages"] {
            self.conn.execute(
                &format!("DELETE FROM {} WHERE course_run_id = ?1", table),
                params![run_id],
            )?;
        }
        Ok(())
    }

    /// Make the seats of `to` mirror those of `from` and link each pair.
    /// `to_is_draft` tells which side of the pair `to` is.
    fn sync_seats(&self, from_id: i64, to_id: i64, to_is_draft: bool) -> Result<()> {
        self.conn.execute(
            "DELETE FROM seats WHERE course_run_id = ?1
               AND type_slug NOT IN (SELECT type_slug FROM seats WHERE course_run_id = ?2)",
            params![to_id, from_id],
        )?;
        for seat in self.seats(from_id)? {
            self.conn.execute(
                "INSERT INTO seats (course_run_id, draft, type_slug, price, currency, sku)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(course_run_id, type_slug) DO UPDATE SET
                    price = excluded.price, currency = excluded.currency, sku = excluded.sku",
                params![to_id, to_is_draft, seat.type_slug, seat.price, seat.currency, seat.sku],
            )?;
            let copy_id: i64 = self.conn.query_row(
                "SELECT id FROM seats WHERE course_run_id = ?1 AND type_slug = ?2",
                params![to_id, seat.type_slug],
                |row| row.get(0),
            )?;
            let (official_id, draft_id) = if to_is_draft {
                (seat.id, copy_id)
            } else {
                (copy_id, seat.id)
            };
            self.conn.execute(
                "UPDATE seats SET draft_version_id = ?2 WHERE id = ?1",
                params![official_id, draft_id],
            )?;
        }
        Ok(())
    }
}
