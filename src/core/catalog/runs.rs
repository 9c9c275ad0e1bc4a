//! Course run, seat and staff queries

use rusqlite::{params, OptionalExtension};

use super::types::{COURSE_RUN_COLUMNS, SEAT_COLUMNS};
use super::{now, Catalog, CatalogError, Course, CourseRun, IndexedKind, Result, Seat};
use crate::core::entity::{CourseRunStatus, Pacing};

/// Fields needed to insert a course run row
#[derive(Debug, Clone)]
pub struct NewCourseRun {
    pub uuid: String,
    pub course_id: i64,
    pub key: String,
    pub draft: bool,
    pub type_id: Option<i64>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub pacing_type: Option<Pacing>,
    pub variant_id: Option<String>,
}

impl Catalog {
    pub fn insert_course_run(&self, new: &NewCourseRun) -> Result<CourseRun> {
        let ts = now();
        self.conn.execute(
            "INSERT INTO course_runs (uuid, course_id, key, draft, type_id, start_at, end_at,
                pacing_type, variant_id, status, created, modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                new.uuid,
                new.course_id,
                new.key,
                new.draft,
                new.type_id,
                new.start,
                new.end,
                new.pacing_type.map(|p| p.as_str()),
                new.variant_id,
                CourseRunStatus::Unpublished.as_str(),
                ts
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.touch(IndexedKind::CourseRun, &new.uuid)?;
        self.course_run_by_id(id)?
            .ok_or_else(|| CatalogError::not_found("course run", id.to_string()))
    }

    pub fn course_run_by_id(&self, id: i64) -> Result<Option<CourseRun>> {
        let sql = format!("SELECT {} FROM course_runs WHERE id = ?1", COURSE_RUN_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], CourseRun::from_row)
            .optional()?)
    }

    /// Official run by key
    pub fn course_run_by_key(&self, key: &str) -> Result<Option<CourseRun>> {
        let sql = format!(
            "SELECT {} FROM course_runs WHERE key = ?1 AND draft = 0",
            COURSE_RUN_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![key], CourseRun::from_row)
            .optional()?)
    }

    /// Run by key, preferring the draft
    pub fn course_run_by_key_draft_aware(&self, key: &str) -> Result<Option<CourseRun>> {
        let sql = format!(
            "SELECT {} FROM course_runs WHERE key = ?1 ORDER BY draft DESC LIMIT 1",
            COURSE_RUN_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![key], CourseRun::from_row)
            .optional()?)
    }

    /// Whether any row (draft or official) already uses a run key
    pub fn course_run_key_exists(&self, key: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM course_runs WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Official twin of a draft run
    pub fn official_run_of(&self, draft: &CourseRun) -> Result<Option<CourseRun>> {
        let sql = format!(
            "SELECT {} FROM course_runs WHERE draft_version_id = ?1 AND draft = 0",
            COURSE_RUN_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![draft.id], CourseRun::from_row)
            .optional()?)
    }

    /// Runs attached to one course row, oldest first
    pub fn course_runs_for(&self, course_id: i64) -> Result<Vec<CourseRun>> {
        let sql = format!(
            "SELECT {} FROM course_runs WHERE course_id = ?1 ORDER BY created, id",
            COURSE_RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![course_id], CourseRun::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Run of a course row carrying a variant id
    pub fn course_run_by_variant(
        &self,
        course_id: i64,
        variant_id: &str,
    ) -> Result<Option<CourseRun>> {
        let sql = format!(
            "SELECT {} FROM course_runs WHERE course_id = ?1 AND variant_id = ?2
             ORDER BY created, id LIMIT 1",
            COURSE_RUN_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![course_id, variant_id], CourseRun::from_row)
            .optional()?)
    }

    /// Variant-less run of a course row on an exact schedule, oldest first
    pub fn course_run_by_schedule(
        &self,
        course_id: i64,
        start: &str,
        end: &str,
    ) -> Result<Option<CourseRun>> {
        let sql = format!(
            "SELECT {} FROM course_runs
             WHERE course_id = ?1 AND start_at = ?2 AND end_at = ?3 AND variant_id IS NULL
             ORDER BY created, id LIMIT 1",
            COURSE_RUN_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![course_id, start, end], CourseRun::from_row)
            .optional()?)
    }

    /// Whether any run of the course (draft or official) has been published
    pub fn has_published_run(&self, course: &Course) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM course_runs r
             JOIN courses c ON c.id = r.course_id
             WHERE c.uuid = ?1 AND r.status = 'published'",
            params![course.uuid],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Write every mutable column of a run row
    pub fn save_course_run(&self, run: &CourseRun) -> Result<()> {
        self.conn.execute(
            "UPDATE course_runs SET
                key = ?2, title_override = ?3, start_at = ?4, end_at = ?5, go_live_date = ?6,
                upgrade_deadline_override = ?7, enrollment_end = ?8, pacing_type = ?9,
                status = ?10, type_id = ?11, content_language = ?12, weeks_to_complete = ?13,
                min_effort = ?14, max_effort = ?15, expected_program_type = ?16,
                expected_program_name = ?17, variant_id = ?18, restriction_type = ?19,
                draft_version_id = ?20, modified = ?21
             WHERE id = ?1",
            params![
                run.id,
                run.key,
                run.title_override,
                run.start,
                run.end,
                run.go_live_date,
                run.upgrade_deadline_override,
                run.enrollment_end,
                run.pacing_type.map(|p| p.as_str()),
                run.status.as_str(),
                run.type_id,
                run.content_language,
                run.weeks_to_complete,
                run.min_effort,
                run.max_effort,
                run.expected_program_type,
                run.expected_program_name,
                run.variant_id,
                run.restriction_type,
                run.draft_version_id,
                now()
            ],
        )?;
        self.touch(IndexedKind::CourseRun, &run.uuid)
    }

    /// Set the status of a run and its official twin
    pub fn set_course_run_status(&self, run: &CourseRun, status: CourseRunStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE course_runs SET status = ?2, modified = ?3 WHERE uuid = ?1",
            params![run.uuid, status.as_str(), now()],
        )?;
        self.touch(IndexedKind::CourseRun, &run.uuid)
    }

    /// Make a run the canonical run of its course row
    pub fn set_canonical_run(&self, course_id: i64, run_id: Option<i64>) -> Result<()> {
        self.conn.execute(
            "UPDATE courses SET canonical_course_run_id = ?2 WHERE id = ?1",
            params![course_id, run_id],
        )?;
        Ok(())
    }

    // =====================================================================
    // Seats
    // =====================================================================

    pub fn seats(&self, course_run_id: i64) -> Result<Vec<Seat>> {
        let sql = format!(
            "SELECT {} FROM seats WHERE course_run_id = ?1 ORDER BY type_slug",
            SEAT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![course_run_id], Seat::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Create or reprice the seat of a type on a run row
    pub fn upsert_seat(&self, run: &CourseRun, type_slug: &str, price: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO seats (course_run_id, draft, type_slug, price) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(course_run_id, type_slug) DO UPDATE SET price = excluded.price",
            params![run.id, run.draft, type_slug, price],
        )?;
        Ok(())
    }

    /// Delete the seats of a run row whose type is not in `keep`
    pub fn retain_seats(&self, run: &CourseRun, keep: &[String]) -> Result<usize> {
        let mut removed = 0;
        for seat in self.seats(run.id)? {
            if !keep.contains(&seat.type_slug) {
                removed += self
                    .conn
                    .execute("DELETE FROM seats WHERE id = ?1", params![seat.id])?;
            }
        }
        Ok(removed)
    }

    // =====================================================================
    // Staff and transcript languages
    // =====================================================================

    pub fn staff_ids(&self, course_run_id: i64) -> Result<Vec<i64>> {
        self.id_list(
            "SELECT person_id FROM course_run_staff WHERE course_run_id = ?1 ORDER BY position, person_id",
            course_run_id,
        )
    }

    pub fn set_staff(&self, course_run_id: i64, person_ids: &[i64]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM course_run_staff WHERE course_run_id = ?1",
            params![course_run_id],
        )?;
        for (position, person_id) in person_ids.iter().enumerate() {
            self.conn.execute(
                "INSERT OR IGNORE INTO course_run_staff (course_run_id, person_id, position) VALUES (?1, ?2, ?3)",
                params![course_run_id, person_id, position as i64],
            )?;
        }
        Ok(())
    }

    pub fn transcript_languages(&self, course_run_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT language_code FROM course_run_transcript_languages WHERE course_run_id = ?1 ORDER BY language_code",
        )?;
        let rows = stmt
            .query_map(params![course_run_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
    }

    pub fn set_transcript_languages(&self, course_run_id: i64, codes: &[String]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM course_run_transcript_languages WHERE course_run_id = ?1",
            params![course_run_id],
        )?;
        for code in codes {
            self.conn.execute(
                "INSERT OR IGNORE INTO course_run_transcript_languages (course_run_id, language_code) VALUES (?1, ?2)",
                params![course_run_id, code],
            )?;
        }
        Ok(())
    }
}
