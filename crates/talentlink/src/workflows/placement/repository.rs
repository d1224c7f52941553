use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::workflows::assessment::domain::StudentId;

use super::domain::{Application, ApplicationId, ApplicationStatus, Project, ProjectId};
use super::ledger::{LedgerAudit, LedgerError};

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists or was concurrently modified")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a slot operation: either the ledger said no (capacity) or the
/// store itself failed.
#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Storage abstraction for projects and their capacity counters.
///
/// Contract: `reserve_slot`, `release_slot`, and `recompute` must each apply
/// the ledger arithmetic atomically with respect to other slot operations on
/// the same project, holding their critical section only for the single
/// check-and-write. That is what makes concurrent approvals race safely for
/// the last seat instead of over-allocating.
pub trait ProjectStore: Send + Sync {
    fn insert(&self, project: Project) -> Result<Project, StoreError>;
    fn fetch(&self, id: &ProjectId) -> Result<Option<Project>, StoreError>;
    /// Atomic conditional increment: `filled + 1` only if the role has room
    /// and the team is under its maximum; otherwise no write happens.
    fn reserve_slot(&self, id: &ProjectId, role: &str) -> Result<Project, SlotError>;
    /// Roll back a reservation whose application commit lost its race.
    fn release_slot(&self, id: &ProjectId, role: &str) -> Result<(), SlotError>;
    /// Reconciliation pass: rewrite `filled` counters from approved counts,
    /// refusing (loudly) when counts violate capacity invariants.
    fn recompute(
        &self,
        id: &ProjectId,
        approved_by_role: &BTreeMap<String, u32>,
    ) -> Result<LedgerAudit, SlotError>;
}

/// Storage abstraction for applications.
///
/// Contract: `insert` enforces the composite uniqueness of
/// `(student_id, project_id)` with `Conflict` — at most one application per
/// pair, ever, including after withdrawal. `commit` applies the write only
/// if the stored application still carries `expected` status, giving each
/// application one linearizable writer path.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, StoreError>;
    fn commit(
        &self,
        application: Application,
        expected: ApplicationStatus,
    ) -> Result<(), StoreError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError>;
    fn for_project(&self, project: &ProjectId) -> Result<Vec<Application>, StoreError>;
    fn for_student_project(
        &self,
        student: &StudentId,
        project: &ProjectId,
    ) -> Result<Option<Application>, StoreError>;
}

/// Status-change notifications handed to the external dispatcher. Delivery
/// is best-effort and asynchronous; the core never awaits it for
/// correctness.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, intent: NotificationIntent) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ApplicationShortlisted,
    ApplicationApproved,
    ApplicationRejected,
}

/// Outbound message describing a decision, queued after the transition
/// commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub recipient_id: StudentId,
    pub kind: NotificationKind,
    pub payload: BTreeMap<String, String>,
}
