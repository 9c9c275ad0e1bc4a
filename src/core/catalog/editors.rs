//! Course editor grants

use rusqlite::params;

use super::{Catalog, Course, CourseEditor, Result};

impl Catalog {
    /// Editors granted on a course row
    pub fn course_editors(&self, course_id: i64) -> Result<Vec<CourseEditor>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, course_id FROM course_editors WHERE course_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![course_id], |row| {
                Ok(CourseEditor {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    course_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Grant a user edit rights on a course row; returns true when newly created
    pub fn add_course_editor(&self, user_id: i64, course: &Course) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO course_editors (user_id, course_id) VALUES (?1, ?2)",
            params![user_id, course.id],
        )?;
        Ok(inserted > 0)
    }

    /// Revoke a grant; returns the number of rows removed
    pub fn remove_course_editor(&self, user_id: i64, course: &Course) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM course_editors WHERE user_id = ?1 AND course_id = ?2",
            params![user_id, course.id],
        )?)
    }

    /// Whether a user belongs to any authoring organization of a course row
    pub fn user_shares_authoring_org(&self, user_id: i64, course: &Course) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM user_organizations uo
             JOIN course_authoring_orgs ca ON ca.organization_id = uo.organization_id
             WHERE uo.user_id = ?1 AND ca.course_id = ?2",
            params![user_id, course.id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
