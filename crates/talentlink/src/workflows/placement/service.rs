use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::auth::Actor;
use crate::workflows::assessment::domain::{AssessmentSession, StudentId};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, NewProject, Project, ProjectId, ProjectStatus,
    RoleSlot,
};
use super::ledger::{LedgerAudit, LedgerError};
use super::repository::{
    ApplicationRepository, NotificationIntent, NotificationKind, NotificationSink, ProjectStore,
    SlotError, StoreError,
};
use super::transitions::{self, TransitionError};

/// Service composing the application state machine, the allocation ledger,
/// and the outbound notification queue.
pub struct PlacementService<P, R, N> {
    projects: Arc<P>,
    applications: Arc<R>,
    notifications: Arc<N>,
}

static PROJECT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_project_id() -> ProjectId {
    let id = PROJECT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ProjectId(format!("proj-{id:04}"))
}

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

/// Typed failures for placement commands.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("project '{0}' not found")]
    UnknownProject(String),
    #[error("application '{0}' not found")]
    UnknownApplication(String),
    #[error("an application for this student and project already exists")]
    DuplicateApplication,
    #[error("caller may not perform this operation")]
    Forbidden,
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SlotError> for PlacementError {
    fn from(value: SlotError) -> Self {
        match value {
            SlotError::Ledger(err) => PlacementError::Ledger(err),
            SlotError::Store(err) => PlacementError::Store(err),
        }
    }
}

impl<P, R, N> PlacementService<P, R, N>
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(projects: Arc<P>, applications: Arc<R>, notifications: Arc<N>) -> Self {
        Self {
            projects,
            applications,
            notifications,
        }
    }

    /// Open a project to applications. Admin only.
    pub fn create_project(
        &self,
        actor: &Actor,
        request: NewProject,
    ) -> Result<Project, PlacementError> {
        ensure_admin(actor)?;
        let project = Project {
            id: next_project_id(),
            name: request.name,
            status: ProjectStatus::Active,
            deadline: request.deadline,
            max_team_size: request.max_team_size,
            roles: request
                .roles
                .into_iter()
                .map(|role| RoleSlot::new(role.role, role.capacity))
                .collect(),
            required_test: request.required_test,
        };
        Ok(self.projects.insert(project)?)
    }

    pub fn project(&self, id: &ProjectId) -> Result<Project, PlacementError> {
        self.projects
            .fetch(id)?
            .ok_or_else(|| PlacementError::UnknownProject(id.0.clone()))
    }

    /// Submit a new application for the calling student.
    pub fn submit(
        &self,
        actor: &Actor,
        project_id: &ProjectId,
        preferred_role: &str,
        now: DateTime<Utc>,
    ) -> Result<Application, PlacementError> {
        let student = StudentId(actor.user_id.clone());
        let project = self.project(project_id)?;
        transitions::ensure_submit(&project, preferred_role, now)?;

        if self
            .applications
            .for_student_project(&student, project_id)?
            .is_some()
        {
            return Err(PlacementError::DuplicateApplication);
        }

        let status = if project.required_test.is_some() {
            ApplicationStatus::TestRequired
        } else {
            ApplicationStatus::Pending
        };
        let application = Application {
            id: next_application_id(),
            student_id: student,
            project_id: project_id.clone(),
            preferred_role: preferred_role.to_string(),
            assigned_role: None,
            status,
            linked_session_id: None,
            submitted_at: now,
            decided_at: None,
        };

        // The repository enforces (student, project) uniqueness as well, so
        // two racing submissions cannot both land.
        match self.applications.insert(application) {
            Ok(stored) => Ok(stored),
            Err(StoreError::Conflict) => Err(PlacementError::DuplicateApplication),
            Err(other) => Err(other.into()),
        }
    }

    /// Change the preferred role before review starts. Owner only.
    pub fn update_preference(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        preferred_role: &str,
    ) -> Result<Application, PlacementError> {
        let mut application = self.application(application_id)?;
        ensure_owner(actor, &application)?;
        transitions::ensure_preference_edit(application.status)?;

        let project = self.project(&application.project_id)?;
        if project.role(preferred_role).is_none() {
            return Err(TransitionError::UnknownRole {
                role: preferred_role.to_string(),
            }
            .into());
        }

        let expected = application.status;
        application.preferred_role = preferred_role.to_string();
        self.applications.commit(application.clone(), expected)?;
        Ok(application)
    }

    /// Pull an application into active review. Admin only. This is the only
    /// reviewed path forward for applications that completed their test.
    pub fn begin_review(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<Application, PlacementError> {
        ensure_admin(actor)?;
        self.step(application_id, ApplicationStatus::UnderReview, now)
    }

    /// Move an application into the review pipeline. Admin only.
    pub fn shortlist(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<Application, PlacementError> {
        ensure_admin(actor)?;
        let application = self.step(application_id, ApplicationStatus::Shortlisted, now)?;
        self.notify(&application, NotificationKind::ApplicationShortlisted);
        Ok(application)
    }

    /// Approve an application, consuming one role slot atomically.
    ///
    /// The reserve happens before the application commit; if the commit
    /// loses a race on the application itself, the reservation is rolled
    /// back. A reserve refused by the ledger is the capacity race lost and
    /// surfaces as a conflict for the caller to retry.
    pub fn approve(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<Application, PlacementError> {
        ensure_admin(actor)?;
        let mut application = self.application(application_id)?;
        transitions::ensure_step(application.status, ApplicationStatus::Approved)?;

        let role = application.preferred_role.clone();
        self.projects.reserve_slot(&application.project_id, &role)?;

        let expected = application.status;
        application.status = ApplicationStatus::Approved;
        application.assigned_role = Some(role.clone());
        application.decided_at = Some(now);

        match self.applications.commit(application.clone(), expected) {
            Ok(()) => {
                self.notify(&application, NotificationKind::ApplicationApproved);
                Ok(application)
            }
            Err(err) => {
                if let Err(release_err) =
                    self.projects.release_slot(&application.project_id, &role)
                {
                    error!(
                        project = %application.project_id.0,
                        role = %role,
                        error = %PlacementError::from(release_err),
                        "failed to roll back slot reservation"
                    );
                }
                Err(err.into())
            }
        }
    }

    /// Reject an application. Admin only; rejecting an approved application
    /// is disallowed by the transition table.
    pub fn reject(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<Application, PlacementError> {
        ensure_admin(actor)?;
        let application = self.step(application_id, ApplicationStatus::Rejected, now)?;
        self.notify(&application, NotificationKind::ApplicationRejected);
        Ok(application)
    }

    /// Withdraw an application. Owner only, and only while pending or
    /// shortlisted.
    pub fn withdraw(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<Application, PlacementError> {
        let mut application = self.application(application_id)?;
        ensure_owner(actor, &application)?;
        transitions::ensure_withdraw(application.status)?;

        let expected = application.status;
        application.status = ApplicationStatus::Withdrawn;
        application.decided_at = Some(now);
        self.applications.commit(application.clone(), expected)?;
        Ok(application)
    }

    /// Attach a completed, passing qualifying session and move the
    /// application out of `test-required`. Owner only.
    pub fn complete_test(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        session: &AssessmentSession,
    ) -> Result<Application, PlacementError> {
        let mut application = self.application(application_id)?;
        ensure_owner(actor, &application)?;
        transitions::ensure_step(application.status, ApplicationStatus::TestCompleted)?;

        let project = self.project(&application.project_id)?;
        // Submissions only enter `test-required` when a test is configured.
        let required_test = project
            .required_test
            .as_ref()
            .ok_or(TransitionError::SessionMismatch)?;
        transitions::ensure_qualifying_session(&application, required_test, session)?;

        let expected = application.status;
        application.status = ApplicationStatus::TestCompleted;
        application.linked_session_id = Some(session.id.clone());
        self.applications.commit(application.clone(), expected)?;
        Ok(application)
    }

    pub fn application(
        &self,
        id: &ApplicationId,
    ) -> Result<Application, PlacementError> {
        self.applications
            .fetch(id)?
            .ok_or_else(|| PlacementError::UnknownApplication(id.0.clone()))
    }

    /// Reconciliation pass over a project's counters. Admin only. Repairs
    /// drifted counters and logs them; overruns surface as integrity errors.
    pub fn audit(&self, actor: &Actor, project_id: &ProjectId) -> Result<LedgerAudit, PlacementError> {
        ensure_admin(actor)?;

        let mut approved_by_role: BTreeMap<String, u32> = BTreeMap::new();
        for application in self.applications.for_project(project_id)? {
            if application.status != ApplicationStatus::Approved {
                continue;
            }
            let role = application
                .assigned_role
                .unwrap_or(application.preferred_role);
            *approved_by_role.entry(role).or_insert(0) += 1;
        }

        let audit = self.projects.recompute(project_id, &approved_by_role)?;
        if !audit.repaired_roles.is_empty() {
            warn!(
                project = %project_id.0,
                roles = ?audit.repaired_roles,
                "ledger counters drifted from approved applications and were repaired"
            );
        }
        Ok(audit)
    }

    /// Generic reviewed transition: check the table, commit with the prior
    /// status as the linearization guard.
    fn step(
        &self,
        application_id: &ApplicationId,
        to: ApplicationStatus,
        now: DateTime<Utc>,
    ) -> Result<Application, PlacementError> {
        let mut application = self.application(application_id)?;
        transitions::ensure_step(application.status, to)?;

        let expected = application.status;
        application.status = to;
        if to.is_terminal() {
            application.decided_at = Some(now);
        }
        self.applications.commit(application.clone(), expected)?;
        Ok(application)
    }

    /// Fire-and-forget decision notification; failure never rolls back the
    /// committed transition.
    fn notify(&self, application: &Application, kind: NotificationKind) {
        let mut payload = BTreeMap::new();
        payload.insert("application_id".to_string(), application.id.0.clone());
        payload.insert("project_id".to_string(), application.project_id.0.clone());
        payload.insert("status".to_string(), application.status.label().to_string());
        if let Some(role) = &application.assigned_role {
            payload.insert("assigned_role".to_string(), role.clone());
        }

        let intent = NotificationIntent {
            recipient_id: application.student_id.clone(),
            kind,
            payload,
        };
        if let Err(err) = self.notifications.publish(intent) {
            warn!(
                application = %application.id.0,
                error = %err,
                "notification dispatch failed"
            );
        }
    }
}

fn ensure_admin(actor: &Actor) -> Result<(), PlacementError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(PlacementError::Forbidden)
    }
}

fn ensure_owner(actor: &Actor, application: &Application) -> Result<(), PlacementError> {
    if application.student_id.0 == actor.user_id {
        Ok(())
    } else {
        Err(PlacementError::Forbidden)
    }
}
