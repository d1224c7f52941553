//! Proctored assessment sessions: answer capture, integrity-violation
//! accumulation, automatic grading, and ban/retest bookkeeping.

pub mod domain;
pub mod grading;
pub mod repository;
pub mod router;
pub mod service;
pub mod violations;

#[cfg(test)]
mod tests;

pub use domain::{
    AssessmentSession, BanRecord, Grade, Question, QuestionId, RecordedAnswer, ScoreCard,
    SessionId, SessionStatus, SessionView, StudentId, TestDefinition, TestId, ViolationEvent,
    ViolationKind, ViolationSeverity,
};
pub use grading::{grade, GradeSheet};
pub use repository::{
    ObserverChannel, ObserverError, SessionEvent, SessionStore, StoreError, TestCatalog,
};
pub use router::assessment_router;
pub use service::{AssessmentService, SessionError};
pub use violations::ViolationOutcome;
