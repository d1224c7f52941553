use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AssessmentSession, SessionId, StudentId, TestDefinition, TestId, ViolationKind,
};

/// Storage abstraction for sessions so the engine can be exercised in
/// isolation.
///
/// Contract: `commit` must apply the write only if the stored session still
/// carries `expected_revision`, atomically with respect to other commits on
/// the same session. The status alone is not a sufficient guard: two
/// violation reports loaded from the same `in-progress` snapshot would both
/// pass a status check and the second write would drop the first's appended
/// event. The revision counter makes every committed write conflict with
/// writers still holding the prior snapshot.
pub trait SessionStore: Send + Sync {
    fn insert(&self, session: AssessmentSession) -> Result<AssessmentSession, StoreError>;
    fn commit(
        &self,
        session: AssessmentSession,
        expected_revision: u64,
    ) -> Result<(), StoreError>;
    fn fetch(&self, id: &SessionId) -> Result<Option<AssessmentSession>, StoreError>;
    fn for_student_test(
        &self,
        student: &StudentId,
        test: &TestId,
    ) -> Result<Vec<AssessmentSession>, StoreError>;
}

/// Read-only lookup into the external test catalog.
pub trait TestCatalog: Send + Sync {
    fn get_test(&self, id: &TestId) -> Result<Option<TestDefinition>, StoreError>;
}

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

/// Fire-and-forget channel for live proctoring observers. Delivery is
/// best-effort; the engine never awaits it for correctness.
pub trait ObserverChannel: Send + Sync {
    fn publish(&self, topic: &str, event: SessionEvent) -> Result<(), ObserverError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("observer transport unavailable: {0}")]
    Transport(String),
}

/// Event payload broadcast when a violation is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub kind: ViolationKind,
    pub violation_count: usize,
    pub status: String,
    pub at: DateTime<Utc>,
}
