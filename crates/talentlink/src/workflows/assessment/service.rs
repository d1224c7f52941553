use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::auth::Actor;

use super::domain::{
    AssessmentSession, QuestionId, RecordedAnswer, SessionId, SessionStatus, StudentId,
    TestDefinition, TestId, ViolationKind,
};
use super::grading;
use super::repository::{ObserverChannel, SessionEvent, SessionStore, StoreError, TestCatalog};
use super::violations::{self, ViolationOutcome};

/// Engine owning the assessment session lifecycle: answer capture, violation
/// accumulation, grading, and ban bookkeeping.
pub struct AssessmentService<S, C, O> {
    sessions: Arc<S>,
    catalog: Arc<C>,
    observers: Arc<O>,
}

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("sess-{id:06}"))
}

/// Typed failures for session commands.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("test '{0}' is not in the catalog")]
    UnknownTest(String),
    #[error("session '{0}' not found")]
    UnknownSession(String),
    #[error("question '{0}' is not part of this test")]
    UnknownQuestion(String),
    #[error("an attempt is already in progress for this test")]
    ActiveSession { session_id: SessionId },
    #[error("a prior attempt already passed this test ({percentage}%)")]
    AlreadyPassed { percentage: u32 },
    #[error("student is banned from this test until {expires_at}")]
    ActiveBan { expires_at: DateTime<Utc> },
    #[error("session is {} and no longer accepts answers", .status.label())]
    SessionClosed { status: SessionStatus },
    #[error("session was already submitted ({})", .status.label())]
    AlreadySubmitted { status: SessionStatus },
    #[error("caller does not own this session")]
    Forbidden,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<S, C, O> AssessmentService<S, C, O>
where
    S: SessionStore + 'static,
    C: TestCatalog + 'static,
    O: ObserverChannel + 'static,
{
    pub fn new(sessions: Arc<S>, catalog: Arc<C>, observers: Arc<O>) -> Self {
        Self {
            sessions,
            catalog,
            observers,
        }
    }

    /// Start a new attempt. A prior passing attempt blocks new sessions, as
    /// does an unexpired ban or an attempt still in progress.
    pub fn start(
        &self,
        actor: &Actor,
        test_id: &TestId,
        now: DateTime<Utc>,
    ) -> Result<AssessmentSession, SessionError> {
        let test = self.lookup_test(test_id)?;
        let student = StudentId(actor.user_id.clone());

        for prior in self.sessions.for_student_test(&student, test_id)? {
            let prior = self.settle_expiry(prior, &test, now)?;
            if prior.status.is_open() {
                return Err(SessionError::ActiveSession {
                    session_id: prior.id,
                });
            }
            if prior.passed() {
                let percentage = prior.score.map(|score| score.percentage).unwrap_or(0);
                return Err(SessionError::AlreadyPassed { percentage });
            }
            if let Some(ban) = &prior.ban {
                if !ban.expired(now) {
                    return Err(SessionError::ActiveBan {
                        expires_at: ban.expires_at,
                    });
                }
            }
        }

        let session = AssessmentSession::begin(next_session_id(), student, &test, now);
        Ok(self.sessions.insert(session)?)
    }

    /// Upsert an answer by question id; idempotent resubmission overwrites.
    pub fn record_answer(
        &self,
        actor: &Actor,
        session_id: &SessionId,
        question_id: &QuestionId,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<AssessmentSession, SessionError> {
        let (session, test) = self.load(session_id)?;
        ensure_owner(actor, &session)?;

        let mut session = self.settle_expiry(session, &test, now)?;
        if !session.status.is_open() {
            return Err(SessionError::SessionClosed {
                status: session.status,
            });
        }
        if test.question(question_id).is_none() {
            return Err(SessionError::UnknownQuestion(question_id.0.clone()));
        }

        session
            .answers
            .insert(question_id.clone(), RecordedAnswer::ungraded(value));
        let expected = session.revision;
        session.revision += 1;
        self.sessions.commit(session.clone(), expected)?;
        Ok(session)
    }

    /// Append a violation and re-evaluate the threshold. A session past its
    /// deadline is settled first, so late reports land forensically on the
    /// completed record instead of terminating it. The log grows even on
    /// closed sessions; the status flips at most once. The observer
    /// broadcast happens after the durable commit and never fails the
    /// command.
    pub fn record_violation(
        &self,
        session_id: &SessionId,
        kind: ViolationKind,
        now: DateTime<Utc>,
    ) -> Result<(AssessmentSession, ViolationOutcome), SessionError> {
        loop {
            let (session, test) = self.load(session_id)?;
            let mut session = self.settle_expiry(session, &test, now)?;
            let expected = session.revision;
            let outcome = violations::record(&mut session, kind, now, &test);
            session.revision += 1;
            match self.sessions.commit(session.clone(), expected) {
                Ok(()) => {
                    self.broadcast(&session, kind, now);
                    return Ok((session, outcome));
                }
                // Lost the commit race with a concurrent writer; replay
                // against the fresh state so the event is never dropped.
                Err(StoreError::Conflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Grade the recorded answers and close the session. A commit lost to a
    /// concurrent violation report replays against the fresh log, so the
    /// graded record keeps every appended event.
    pub fn submit(
        &self,
        actor: &Actor,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<AssessmentSession, SessionError> {
        loop {
            let (session, test) = self.load(session_id)?;
            ensure_owner(actor, &session)?;

            let mut session = self.settle_expiry(session, &test, now)?;
            if !session.status.is_open() {
                return Err(SessionError::AlreadySubmitted {
                    status: session.status,
                });
            }

            let sheet = grading::grade(&session.answers, &test);
            session.answers = sheet.answers;
            session.score = Some(sheet.score);
            session.status = SessionStatus::Completed;
            session.completed_at = Some(now);

            let expected = session.revision;
            session.revision += 1;
            match self.sessions.commit(session.clone(), expected) {
                Ok(()) => return Ok(session),
                Err(StoreError::Conflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Fetch a session, applying lazy duration-expiry so reads observe the
    /// post-deadline state.
    pub fn session(
        &self,
        actor: &Actor,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<AssessmentSession, SessionError> {
        let (session, test) = self.load(session_id)?;
        if !actor.is_admin() {
            ensure_owner(actor, &session)?;
        }
        self.settle_expiry(session, &test, now)
    }

    fn lookup_test(&self, test_id: &TestId) -> Result<TestDefinition, SessionError> {
        self.catalog
            .get_test(test_id)?
            .ok_or_else(|| SessionError::UnknownTest(test_id.0.clone()))
    }

    fn load(
        &self,
        session_id: &SessionId,
    ) -> Result<(AssessmentSession, TestDefinition), SessionError> {
        let session = self
            .sessions
            .fetch(session_id)?
            .ok_or_else(|| SessionError::UnknownSession(session_id.0.clone()))?;
        let test = self.lookup_test(&session.test_id)?;
        Ok((session, test))
    }

    /// Lazy time-driven guard: a session past its deadline completes on next
    /// access, graded on whatever was recorded. Never preempts in-flight
    /// writes; a lost commit race re-reads and re-evaluates against the
    /// fresh state.
    fn settle_expiry(
        &self,
        mut session: AssessmentSession,
        test: &TestDefinition,
        now: DateTime<Utc>,
    ) -> Result<AssessmentSession, SessionError> {
        loop {
            if !session.status.is_open() || now < session.deadline {
                return Ok(session);
            }

            let mut settled = session.clone();
            let sheet = grading::grade(&settled.answers, test);
            settled.answers = sheet.answers;
            settled.score = Some(sheet.score);
            settled.status = SessionStatus::Completed;
            settled.completed_at = Some(settled.deadline);

            let expected = settled.revision;
            settled.revision += 1;
            match self.sessions.commit(settled.clone(), expected) {
                Ok(()) => return Ok(settled),
                Err(StoreError::Conflict) => {
                    session = self
                        .sessions
                        .fetch(&session.id)?
                        .ok_or_else(|| SessionError::UnknownSession(session.id.0.clone()))?;
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    fn broadcast(&self, session: &AssessmentSession, kind: ViolationKind, now: DateTime<Utc>) {
        let topic = format!("assessment.sessions.{}", session.id.0);
        let event = SessionEvent {
            session_id: session.id.clone(),
            student_id: session.student_id.clone(),
            kind,
            violation_count: session.violations.len(),
            status: session.status.label().to_string(),
            at: now,
        };
        if let Err(err) = self.observers.publish(&topic, event) {
            warn!(session = %session.id.0, error = %err, "violation broadcast failed");
        }
    }
}

fn ensure_owner(actor: &Actor, session: &AssessmentSession) -> Result<(), SessionError> {
    if session.student_id.0 == actor.user_id {
        Ok(())
    } else {
        Err(SessionError::Forbidden)
    }
}
