//! Course editor grants from CSV
//!
//! Each row adds or removes one user's edit rights on one course. Adding
//! requires the user to belong to an authoring organization of the course.

use tracing::{info, warn};

use crate::core::catalog::Course;
use crate::core::identity::LoaderKind;
use crate::ingest::reader::Row;
use crate::ingest::report::{messages, ErrorKey, IngestionReport, RowFailure};
use crate::ingest::resolver;
use crate::ingest::validator::validate_editor;
use crate::ingest::{IngestionContext, Loader, RowOutcome};

#[derive(Debug, Default)]
pub struct EditorLoader;

impl EditorLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Loader for EditorLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::Editor
    }

    fn process_row(
        &mut self,
        ctx: &IngestionContext<'_>,
        row: &Row,
        _report: &mut IngestionReport,
    ) -> Result<RowOutcome, RowFailure> {
        let line = row.index() + 1;
        let missing = validate_editor(row);
        if !missing.is_empty() {
            return Err(RowFailure::new(
                ErrorKey::MissingRequiredData,
                messages::editor_missing_required_data(line, &missing),
            ));
        }

        let user_ref = row.value("username_or_email");
        let course_ref = row.value("course_key_or_uuid");
        let action = row.value("action").to_lowercase();

        let user_missing = || {
            RowFailure::new(ErrorKey::UserNotFound, messages::user_not_found(line, user_ref))
        };
        let user = match resolver::resolve_user(ctx.catalog, user_ref) {
            Ok(Some(user)) => user,
            Ok(None) => return Err(user_missing()),
            Err(e) => {
                warn!(user = user_ref, error = %e, "user lookup failed");
                return Err(user_missing());
            }
        };
        let course_missing = || {
            RowFailure::new(
                ErrorKey::CourseNotFound,
                messages::course_not_found(line, course_ref),
            )
        };
        let course: Course =
            match resolver::resolve_course_ref(ctx.catalog, ctx.partner.id, course_ref) {
                Ok(Some(course)) => course,
                Ok(None) => return Err(course_missing()),
                Err(e) => {
                    warn!(course = course_ref, error = %e, "course lookup failed");
                    return Err(course_missing());
                }
            };

        match action.as_str() {
            "add" => {
                let shares = ctx.catalog.user_shares_authoring_org(user.id, &course).map_err(|e| {
                    RowFailure::new(
                        ErrorKey::CourseEditorAddError,
                        messages::course_editor_add_error(line, user_ref, &course.title, &e.to_string()),
                    )
                })?;
                if !shares {
                    return Err(RowFailure::new(
                        ErrorKey::UserOrgMismatch,
                        messages::user_org_mismatch(line, user_ref, &course.title),
                    ));
                }
                let created = ctx.catalog.add_course_editor(user.id, &course).map_err(|e| {
                    RowFailure::new(
                        ErrorKey::CourseEditorAddError,
                        messages::course_editor_add_error(line, user_ref, &course.title, &e.to_string()),
                    )
                })?;
                if !created {
                    info!(user = %user.username, course = %course.key, "course editor already exists");
                }
                Ok(RowOutcome::Done)
            }
            "remove" => {
                let remove_error = |e: String| {
                    RowFailure::new(
                        ErrorKey::CourseEditorRemoveError,
                        messages::course_editor_remove_error(line, user_ref, &course.title, &e),
                    )
                };
                match ctx.catalog.remove_course_editor(user.id, &course) {
                    Ok(0) => Err(remove_error("CourseEditor entry does not exist.".to_string())),
                    Ok(_) => Ok(RowOutcome::Done),
                    Err(e) => Err(remove_error(e.to_string())),
                }
            }
            _ => Err(RowFailure::new(
                ErrorKey::UnsupportedAction,
                messages::unsupported_action(line, &action),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::run;
    use crate::ingest::testing::{context, create_course, seeded_catalog, StubNotifier};

    fn row(index: usize, user: &str, course: &str, action: &str) -> Row {
        Row::from_pairs(
            index,
            [
                ("Username Or Email", user),
                ("Course Key Or Uuid", course),
                ("Action", action),
            ],
        )
    }

    #[test]
    fn test_add_then_remove() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let created = create_course(&ctx, "BIO101");
        let course = catalog.course_by_uuid_draft_aware(&created.uuid).unwrap().unwrap();

        let report = run(
            &ctx,
            &mut EditorLoader::new(),
            vec![
                row(0, "bob", "edx+BIO101", "add"),
                row(1, "bob@example.com", &created.uuid, "ADD"),
            ],
        )
        .unwrap();
        assert_eq!(report.success_count, 2);
        assert_eq!(catalog.course_editors(course.id).unwrap().len(), 1);

        let report = run(
            &ctx,
            &mut EditorLoader::new(),
            vec![
                row(0, "bob", "edx+BIO101", "remove"),
                row(1, "bob", "edx+BIO101", "remove"),
            ],
        )
        .unwrap();
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failure_count, 1);
        assert!(report.errors.get(ErrorKey::CourseEditorRemoveError)[0]
            .contains("does not exist"));
        assert!(catalog.course_editors(course.id).unwrap().is_empty());
    }

    #[test]
    fn test_org_mismatch_creates_nothing() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let created = create_course(&ctx, "BIO101");
        let course = catalog.course_by_uuid_draft_aware(&created.uuid).unwrap().unwrap();

        let report = run(
            &ctx,
            &mut EditorLoader::new(),
            vec![row(0, "alice", "edx+BIO101", "add")],
        )
        .unwrap();

        assert_eq!(report.failure_count, 1);
        assert_eq!(
            report.errors.get(ErrorKey::UserOrgMismatch),
            [format!(
                "[USER_ORG_MISMATCH] [Row 1] User \"alice\" does not belong to any authoring organization for course \"{}\".",
                course.title
            )]
        );
        assert!(catalog.course_editors(course.id).unwrap().is_empty());
    }

    #[test]
    fn test_row_level_errors() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        create_course(&ctx, "BIO101");

        let report = run(
            &ctx,
            &mut EditorLoader::new(),
            vec![
                row(0, "", "edx+BIO101", "add"),
                row(1, "ghost_user", "edx+BIO101", "add"),
                row(2, "bob", "course-v1:nonexistent+XX+0000", "add"),
                row(3, "bob", "edx+BIO101", "invalid"),
            ],
        )
        .unwrap();

        assert_eq!(report.failure_count, 4);
        assert_eq!(
            report.errors.get(ErrorKey::MissingRequiredData),
            ["[MISSING_REQUIRED_DATA] [Row 1] Missing required field(s): username_or_email"]
        );
        assert_eq!(
            report.errors.get(ErrorKey::UserNotFound),
            ["[USER_NOT_FOUND] [Row 2] Unable to find user with identifier \"ghost_user\"."]
        );
        assert_eq!(report.errors.get(ErrorKey::CourseNotFound).len(), 1);
        assert_eq!(
            report.errors.get(ErrorKey::UnsupportedAction),
            ["[UNSUPPORTED_ACTION] [Row 4] Unsupported action 'invalid' for course editor."]
        );
    }
}
