use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::assessment::domain::{SessionId, StudentId, TestId};

/// Identifier wrapper for projects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

/// Identifier wrapper for applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// One unit of team capacity for a named role. `filled` is derived from the
/// set of approved applications and is never authored independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSlot {
    pub role: String,
    pub capacity: u32,
    pub filled: u32,
}

impl RoleSlot {
    pub fn new(role: impl Into<String>, capacity: u32) -> Self {
        Self {
            role: role.into(),
            capacity,
            filled: 0,
        }
    }

    pub fn has_room(&self) -> bool {
        self.filled < self.capacity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Active,
    Closed,
    Completed,
}

impl ProjectStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Active => "active",
            ProjectStatus::Closed => "closed",
            ProjectStatus::Completed => "completed",
        }
    }
}

/// A project offering role slots to students.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub status: ProjectStatus,
    pub deadline: DateTime<Utc>,
    pub max_team_size: u32,
    pub roles: Vec<RoleSlot>,
    /// When set, applicants must pass this catalog test before review.
    pub required_test: Option<TestId>,
}

impl Project {
    pub fn role(&self, name: &str) -> Option<&RoleSlot> {
        self.roles.iter().find(|slot| slot.role == name)
    }

    pub(crate) fn role_mut(&mut self, name: &str) -> Option<&mut RoleSlot> {
        self.roles.iter_mut().find(|slot| slot.role == name)
    }

    pub fn total_filled(&self) -> u32 {
        self.roles.iter().map(|slot| slot.filled).sum()
    }
}

/// High level status tracked throughout the application lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicationStatus {
    Pending,
    TestRequired,
    TestCompleted,
    UnderReview,
    Shortlisted,
    Approved,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::TestRequired => "test-required",
            ApplicationStatus::TestCompleted => "test-completed",
            ApplicationStatus::UnderReview => "under-review",
            ApplicationStatus::Shortlisted => "shortlisted",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    /// Terminal states are immutable once reached.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Approved | ApplicationStatus::Rejected | ApplicationStatus::Withdrawn
        )
    }

    /// The static transition table. Command guards may restrict further; this
    /// is the outer bound of what any path can do.
    pub fn allows(self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (TestRequired, TestCompleted | Withdrawn)
                | (TestCompleted, UnderReview | Withdrawn)
                | (Pending, UnderReview | Shortlisted | Approved | Rejected | Withdrawn)
                | (UnderReview, Shortlisted | Approved | Rejected | Withdrawn)
                | (Shortlisted, Approved | Rejected | Withdrawn)
        )
    }
}

/// A student's application to one project role. At most one application per
/// `(student, project)` pair, ever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub student_id: StudentId,
    pub project_id: ProjectId,
    pub preferred_role: String,
    /// Set only on approval, from `preferred_role` at that moment.
    pub assigned_role: Option<String>,
    pub status: ApplicationStatus,
    /// Weak reference to the qualifying assessment session, lookup only.
    pub linked_session_id: Option<SessionId>,
    pub submitted_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn view(&self) -> ApplicationView {
        ApplicationView {
            application_id: self.id.clone(),
            project_id: self.project_id.clone(),
            student_id: self.student_id.clone(),
            status: self.status.label(),
            preferred_role: self.preferred_role.clone(),
            assigned_role: self.assigned_role.clone(),
            linked_session_id: self.linked_session_id.clone(),
            submitted_at: self.submitted_at,
            decided_at: self.decided_at,
        }
    }
}

/// Sanitized representation of an application's exposed state.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    pub application_id: ApplicationId,
    pub project_id: ProjectId,
    pub student_id: StudentId,
    pub status: &'static str,
    pub preferred_role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_session_id: Option<SessionId>,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

/// Intake payload for opening a project to applications.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub deadline: DateTime<Utc>,
    pub max_team_size: u32,
    pub roles: Vec<NewRole>,
    #[serde(default)]
    pub required_test: Option<TestId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub role: String,
    pub capacity: u32,
}
