//! Guard conditions evaluated before any application transition commits.
//!
//! The static reachability table lives on `ApplicationStatus::allows`; the
//! functions here layer the command-specific guards on top (deadlines,
//! project state, capacity reads, qualifying-session checks).

use chrono::{DateTime, Utc};

use crate::workflows::assessment::domain::{AssessmentSession, SessionStatus, TestId};

use super::domain::{Application, ApplicationStatus, Project, ProjectStatus};

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot move an application from '{}' to '{}'", .from.label(), .to.label())]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("project is '{}' and not accepting this operation", .status.label())]
    ProjectNotActive { status: ProjectStatus },
    #[error("the application deadline ({deadline}) has passed")]
    DeadlinePassed { deadline: DateTime<Utc> },
    #[error("project has no role named '{role}'")]
    UnknownRole { role: String },
    #[error("role '{role}' has no open slots")]
    RoleFull { role: String },
    #[error("preferred role can no longer be changed once review has started")]
    PreferenceLocked { status: ApplicationStatus },
    #[error("qualifying session is '{}', not completed", .status.label())]
    SessionNotCompleted { status: SessionStatus },
    #[error("session does not belong to this applicant and test")]
    SessionMismatch,
    #[error("qualifying test was not passed ({percentage}%)")]
    TestNotPassed { percentage: u32 },
}

/// Guards for a fresh submission: project active, deadline in the future,
/// and the chosen role present with room (advisory read; approval re-checks
/// atomically).
pub fn ensure_submit(
    project: &Project,
    preferred_role: &str,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    if project.status != ProjectStatus::Active {
        return Err(TransitionError::ProjectNotActive {
            status: project.status,
        });
    }
    if now >= project.deadline {
        return Err(TransitionError::DeadlinePassed {
            deadline: project.deadline,
        });
    }
    let slot = project
        .role(preferred_role)
        .ok_or_else(|| TransitionError::UnknownRole {
            role: preferred_role.to_string(),
        })?;
    if !slot.has_room() {
        return Err(TransitionError::RoleFull {
            role: slot.role.clone(),
        });
    }
    Ok(())
}

/// Reachability check against the static table.
pub fn ensure_step(
    from: ApplicationStatus,
    to: ApplicationStatus,
) -> Result<(), TransitionError> {
    if from.allows(to) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition { from, to })
    }
}

/// Withdrawal is narrower than the table: only a pending or shortlisted
/// application may be withdrawn by its owner. An approved seat is never
/// silently vacated through this path.
pub fn ensure_withdraw(from: ApplicationStatus) -> Result<(), TransitionError> {
    match from {
        ApplicationStatus::Pending | ApplicationStatus::Shortlisted => Ok(()),
        other => Err(TransitionError::InvalidTransition {
            from: other,
            to: ApplicationStatus::Withdrawn,
        }),
    }
}

/// `preferred_role` is editable only before review starts.
pub fn ensure_preference_edit(status: ApplicationStatus) -> Result<(), TransitionError> {
    match status {
        ApplicationStatus::Pending
        | ApplicationStatus::TestRequired
        | ApplicationStatus::TestCompleted => Ok(()),
        other => Err(TransitionError::PreferenceLocked { status: other }),
    }
}

/// A qualifying session must belong to the same student, target the
/// project's required test, be completed, and have passed.
pub fn ensure_qualifying_session(
    application: &Application,
    required_test: &TestId,
    session: &AssessmentSession,
) -> Result<(), TransitionError> {
    if session.student_id != application.student_id || &session.test_id != required_test {
        return Err(TransitionError::SessionMismatch);
    }
    if session.status != SessionStatus::Completed {
        return Err(TransitionError::SessionNotCompleted {
            status: session.status,
        });
    }
    match session.score {
        Some(score) if score.passed => Ok(()),
        Some(score) => Err(TransitionError::TestNotPassed {
            percentage: score.percentage,
        }),
        None => Err(TransitionError::TestNotPassed { percentage: 0 }),
    }
}
