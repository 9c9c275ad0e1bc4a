//! Course run status changes and their side effects
//!
//! [`ReviewWorkflow`] decides whether a transition is legal; this module
//! persists it through the course API and then runs the effect it carries.
//! Downstream failures (notifications, marketing site, Salesforce) are logged
//! and noted on the report. They never fail the row.

use thiserror::Error;
use tracing::{debug, info, warn};

use super::normalize::is_past;
use super::report::IngestionReport;
use super::IngestionContext;
use crate::core::catalog::{CatalogError, Course, CourseRun};
use crate::core::entity::CourseRunStatus;
use crate::core::workflow::{ReviewWorkflow, StatusEffect, WorkflowError};
use crate::sync::course_api::CourseRunUpdate;
use crate::sync::{Notification, SyncError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Move a run to `target` and run the side effects of the new status.
///
/// `run` is the draft run as last read; its current status is the origin of
/// the transition.
pub fn advance_run(
    ctx: &IngestionContext<'_>,
    run: &CourseRun,
    target: CourseRunStatus,
    report: &mut IngestionReport,
) -> Result<(), LifecycleError> {
    let effect = ReviewWorkflow::new().transition(run.status, target)?;
    ctx.services
        .course_api
        .update_course_run(&run.key, &CourseRunUpdate::status_only(target))?;
    info!(run = %run.key, from = %run.status, to = %target, "course run status changed");

    match effect {
        StatusEffect::NotifyReviewers => notify_reviewers(ctx, run, target, report),
        StatusEffect::PromoteOfficial => promote(ctx, run, report)?,
        StatusEffect::Publish => publish(ctx, run, report)?,
        StatusEffect::None => {}
    }
    Ok(())
}

/// Apply the status the ingestion pipeline wants for a freshly written run
pub fn finish_review(
    ctx: &IngestionContext<'_>,
    run: &CourseRun,
    move_to_legal_review: bool,
    report: &mut IngestionReport,
) -> Result<(), LifecycleError> {
    match ReviewWorkflow::new().ingestion_target(run.status, move_to_legal_review) {
        Some(target) => advance_run(ctx, run, target, report),
        None => {
            debug!(run = %run.key, status = %run.status, "run status left unchanged");
            Ok(())
        }
    }
}

fn notify_reviewers(
    ctx: &IngestionContext<'_>,
    run: &CourseRun,
    status: CourseRunStatus,
    report: &mut IngestionReport,
) {
    let notification = Notification {
        subject: format!("Course run {} is awaiting {}", run.key, status),
        body: format!(
            "The course run {} was moved to {} by ingestion run {}.\n",
            run.key, status, ctx.run_id
        ),
        attachment: None,
    };
    if let Err(e) = ctx.services.notifier.send(&notification) {
        warn!(run = %run.key, error = %e, "review notification failed");
        report.other(format!("Review notification for {} failed: {}", run.key, e));
    }
}

/// Create or update the official course and run, then publish when the
/// go-live date is absent or already past
fn promote(
    ctx: &IngestionContext<'_>,
    run: &CourseRun,
    report: &mut IngestionReport,
) -> Result<(), LifecycleError> {
    let catalog = ctx.catalog;
    let draft_run = catalog
        .course_run_by_key_draft_aware(&run.key)?
        .ok_or_else(|| CatalogError::not_found("course run", run.key.clone()))?;
    let draft_course = course_of(ctx, &draft_run)?;
    catalog.set_official_course(&draft_course)?;
    catalog.set_official_run(&draft_run)?;
    debug!(run = %run.key, "official version updated");

    let go_live_reached = draft_run
        .go_live_date
        .as_deref()
        .map(is_past)
        .unwrap_or(true);
    if go_live_reached {
        advance_run(ctx, &draft_run, CourseRunStatus::Published, report)?;
    }
    Ok(())
}

/// Push the official run downstream
fn publish(
    ctx: &IngestionContext<'_>,
    run: &CourseRun,
    report: &mut IngestionReport,
) -> Result<(), LifecycleError> {
    let catalog = ctx.catalog;
    let official = match catalog.course_run_by_key(&run.key)? {
        Some(official) => official,
        None => {
            warn!(run = %run.key, "published run has no official version");
            return Ok(());
        }
    };
    let course = course_of(ctx, &official)?;

    if let Err(e) = ctx.services.marketing.publish_run(&course, &official) {
        warn!(run = %official.key, error = %e, "marketing site publication failed");
        report.other(format!(
            "Marketing site publication of {} failed: {}",
            official.key, e
        ));
    }
    match ctx.services.salesforce.upsert_course_run(&course, &official) {
        Ok(()) => {}
        Err(SyncError::MissingCase(key)) => {
            info!(run = %key, "no Salesforce case for run; skipped");
        }
        Err(e) => {
            warn!(run = %official.key, error = %e, "Salesforce upsert failed");
            report.other(format!("Salesforce upsert of {} failed: {}", official.key, e));
        }
    }
    Ok(())
}

fn course_of(ctx: &IngestionContext<'_>, run: &CourseRun) -> Result<Course, CatalogError> {
    ctx.catalog
        .course_by_id(run.course_id)?
        .ok_or_else(|| CatalogError::not_found("course", run.course_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::testing::{context, seeded_catalog, StubNotifier};
    use crate::core::identity::LoaderKind;
    use crate::sync::course_api::{CourseCreate, RunCreateFields};
    use std::collections::BTreeMap;

    fn create_course(ctx: &IngestionContext<'_>) -> CourseRun {
        let created = ctx
            .services
            .course_api
            .create_course(&CourseCreate {
                org: "edx".to_string(),
                title: "Intro Bio".to_string(),
                number: "BIO101".to_string(),
                course_type: "00000000-0000-0000-0000-0000000000c1".to_string(),
                product_source: "edx".to_string(),
                prices: BTreeMap::from([("verified".to_string(), "100.00".to_string())]),
                course_run: RunCreateFields {
                    start: Some("2025-01-01T09:00:00Z".to_string()),
                    end: Some("2025-03-01T17:00:00Z".to_string()),
                    run_type: "00000000-0000-0000-0000-0000000000r1".to_string(),
                    ..Default::default()
                },
            })
            .unwrap();
        ctx.catalog
            .course_run_by_key_draft_aware(&created.course_run_key)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_review_completion_promotes_and_publishes() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let run = create_course(&ctx);
        let mut report = IngestionReport::new(LoaderKind::Course, 1);

        finish_review(&ctx, &run, false, &mut report).unwrap();

        let official = catalog.course_run_by_key(&run.key).unwrap().unwrap();
        assert!(!official.draft);
        assert_eq!(official.status, CourseRunStatus::Published);
        let draft = catalog.course_run_by_key_draft_aware(&run.key).unwrap().unwrap();
        assert_eq!(draft.status, CourseRunStatus::Published);
        assert_eq!(catalog.outbox_entries("marketing").unwrap().len(), 1);
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn test_future_go_live_stops_at_reviewed() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let run = create_course(&ctx);
        ctx.services
            .course_api
            .update_course_run(
                &run.key,
                &CourseRunUpdate {
                    draft: true,
                    go_live_date: Some("2999-01-01T00:00:00Z".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let run = catalog.course_run_by_key_draft_aware(&run.key).unwrap().unwrap();
        let mut report = IngestionReport::new(LoaderKind::Course, 1);

        finish_review(&ctx, &run, false, &mut report).unwrap();

        let official = catalog.course_run_by_key(&run.key).unwrap().unwrap();
        assert_eq!(official.status, CourseRunStatus::Reviewed);
        assert!(catalog.outbox_entries("marketing").unwrap().is_empty());
    }

    #[test]
    fn test_legal_review_notifies() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let run = create_course(&ctx);
        let mut report = IngestionReport::new(LoaderKind::Course, 1);

        finish_review(&ctx, &run, true, &mut report).unwrap();

        let draft = catalog.course_run_by_key_draft_aware(&run.key).unwrap().unwrap();
        assert_eq!(draft.status, CourseRunStatus::LegalReview);
        assert!(catalog.course_run_by_key(&run.key).unwrap().is_none());
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.contains("review_by_legal"));
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let catalog = seeded_catalog();
        let notifier = StubNotifier::default();
        let ctx = context(&catalog, &notifier);
        let run = create_course(&ctx);
        let mut report = IngestionReport::new(LoaderKind::Course, 1);

        let err = advance_run(&ctx, &run, CourseRunStatus::Published, &mut report).unwrap_err();
        assert!(matches!(err, LifecycleError::Workflow(_)));
    }
}
