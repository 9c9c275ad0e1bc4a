//! Review workflow for course runs
//!
//! Validates status transitions. The side effects of entering a status
//! (official-version promotion, publication, review notifications) live in
//! `ingest::lifecycle`, which consults this table first.

use thiserror::Error;

use crate::core::entity::CourseRunStatus;

/// Errors that can occur during workflow operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Invalid status transition: {from} → {to}")]
    InvalidTransition {
        from: CourseRunStatus,
        to: CourseRunStatus,
    },

    #[error("Course run {key} is in review and cannot be edited")]
    InReview { key: String },
}

/// What a status change must trigger once persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEffect {
    /// Notify reviewers that a run is waiting on them
    NotifyReviewers,
    /// Create or update the official version, then publish if go-live has passed
    PromoteOfficial,
    /// Push the official run to the marketing site and Salesforce
    Publish,
    /// Nothing beyond the status write
    None,
}

/// Stateless review workflow for course runs
#[derive(Debug, Default, Clone, Copy)]
pub struct ReviewWorkflow;

impl ReviewWorkflow {
    pub fn new() -> Self {
        Self
    }

    /// Check if a status transition is valid
    pub fn is_valid_transition(&self, from: CourseRunStatus, to: CourseRunStatus) -> bool {
        use CourseRunStatus::*;
        matches!(
            (from, to),
            // Forward through review
            (Unpublished, LegalReview)
                | (LegalReview, InternalReview)
                | (InternalReview, Reviewed)
                | (Reviewed, Published)
                // Review completed directly by ingestion
                | (Unpublished, Reviewed)
                // Rejection
                | (LegalReview, Unpublished)
                | (InternalReview, Unpublished)
                | (Reviewed, Unpublished)
                // Archival
                | (Published, Unpublished)
        )
    }

    /// Get allowed transitions from the current status
    pub fn allowed_transitions(&self, current: CourseRunStatus) -> Vec<CourseRunStatus> {
        use CourseRunStatus::*;
        match current {
            Unpublished => vec![LegalReview, Reviewed],
            LegalReview => vec![InternalReview, Unpublished],
            InternalReview => vec![Reviewed, Unpublished],
            Reviewed => vec![Published, Unpublished],
            Published => vec![Unpublished],
        }
    }

    /// Validate a transition and report the effect it carries
    pub fn transition(
        &self,
        from: CourseRunStatus,
        to: CourseRunStatus,
    ) -> Result<StatusEffect, WorkflowError> {
        if !self.is_valid_transition(from, to) {
            return Err(WorkflowError::InvalidTransition { from, to });
        }
        Ok(Self::effect_of(to))
    }

    /// Status the ingestion pipeline moves a run to after its fields are written.
    /// `None` means the run is left where it is.
    /// Runs in legal review are never moved by ingestion.
    pub fn ingestion_target(
        &self,
        current: CourseRunStatus,
        move_to_legal_review: bool,
    ) -> Option<CourseRunStatus> {
        use CourseRunStatus::*;
        match (current, move_to_legal_review) {
            (Unpublished, true) => Some(LegalReview),
            (Unpublished, false) | (InternalReview, false) => Some(Reviewed),
            (LegalReview, _) | (InternalReview, true) => None,
            (Reviewed, _) | (Published, _) => None,
        }
    }

    fn effect_of(status: CourseRunStatus) -> StatusEffect {
        match status {
            CourseRunStatus::LegalReview | CourseRunStatus::InternalReview => {
                StatusEffect::NotifyReviewers
            }
            CourseRunStatus::Reviewed => StatusEffect::PromoteOfficial,
            CourseRunStatus::Published => StatusEffect::Publish,
            CourseRunStatus::Unpublished => StatusEffect::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CourseRunStatus::*;

    #[test]
    fn test_forward_transitions() {
        let wf = ReviewWorkflow::new();
        assert!(wf.is_valid_transition(Unpublished, LegalReview));
        assert!(wf.is_valid_transition(LegalReview, InternalReview));
        assert!(wf.is_valid_transition(InternalReview, Reviewed));
        assert!(wf.is_valid_transition(Reviewed, Published));
    }

    #[test]
    fn test_invalid_transitions() {
        let wf = ReviewWorkflow::new();
        assert!(!wf.is_valid_transition(Unpublished, Published));
        assert!(!wf.is_valid_transition(Published, Reviewed));
        assert!(!wf.is_valid_transition(InternalReview, LegalReview));
        assert_eq!(
            wf.transition(Published, LegalReview),
            Err(WorkflowError::InvalidTransition {
                from: Published,
                to: LegalReview
            })
        );
    }

    #[test]
    fn test_allowed_transitions_agree_with_table() {
        let wf = ReviewWorkflow::new();
        for from in [Unpublished, LegalReview, InternalReview, Reviewed, Published] {
            for to in wf.allowed_transitions(from) {
                assert!(wf.is_valid_transition(from, to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_effects() {
        let wf = ReviewWorkflow::new();
        assert_eq!(
            wf.transition(Unpublished, LegalReview),
            Ok(StatusEffect::NotifyReviewers)
        );
        assert_eq!(
            wf.transition(Unpublished, Reviewed),
            Ok(StatusEffect::PromoteOfficial)
        );
        assert_eq!(wf.transition(Reviewed, Published), Ok(StatusEffect::Publish));
        assert_eq!(wf.transition(Published, Unpublished), Ok(StatusEffect::None));
    }

    #[test]
    fn test_ingestion_target() {
        let wf = ReviewWorkflow::new();
        assert_eq!(wf.ingestion_target(Unpublished, true), Some(LegalReview));
        assert_eq!(wf.ingestion_target(Unpublished, false), Some(Reviewed));
        assert_eq!(wf.ingestion_target(InternalReview, false), Some(Reviewed));
        assert_eq!(wf.ingestion_target(Published, false), None);
    }

    #[test]
    fn test_ingestion_never_skips_legal_review() {
        let wf = ReviewWorkflow::new();
        assert!(!wf.is_valid_transition(LegalReview, Reviewed));
        assert_eq!(wf.ingestion_target(LegalReview, true), None);
        assert_eq!(wf.ingestion_target(LegalReview, false), None);
        assert_eq!(wf.ingestion_target(InternalReview, true), None);
    }
}
