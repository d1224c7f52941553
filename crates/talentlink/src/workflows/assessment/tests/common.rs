use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use crate::workflows::assessment::domain::{
    AssessmentSession, Question, QuestionId, SessionId, SessionStatus, StudentId, TestDefinition,
    TestId,
};
use crate::workflows::assessment::repository::{
    ObserverChannel, ObserverError, SessionEvent, SessionStore, StoreError, TestCatalog,
};
use crate::workflows::assessment::service::AssessmentService;

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid timestamp")
}

pub(super) fn rust_test() -> TestDefinition {
    TestDefinition {
        id: TestId("test-rust".to_string()),
        title: "Rust fundamentals".to_string(),
        questions: (0..4)
            .map(|index| Question {
                id: QuestionId(format!("q{index}")),
                prompt: format!("Question {index}"),
                points: 5,
                correct_answer: format!("answer-{index}"),
            })
            .collect(),
        passing_score: 70,
        max_violations: 3,
        duration_minutes: 30,
        ban_days: 7,
    }
}

#[derive(Default)]
pub(super) struct MemorySessions {
    records: Mutex<HashMap<SessionId, AssessmentSession>>,
}

impl SessionStore for MemorySessions {
    fn insert(&self, session: AssessmentSession) -> Result<AssessmentSession, StoreError> {
        let mut guard = self.records.lock().expect("session mutex poisoned");
        if guard.contains_key(&session.id) {
            return Err(StoreError::Conflict);
        }
        let duplicate_open = guard.values().any(|existing| {
            existing.student_id == session.student_id
                && existing.test_id == session.test_id
                && existing.status == SessionStatus::InProgress
        });
        if duplicate_open {
            return Err(StoreError::Conflict);
        }
        guard.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    fn commit(
        &self,
        session: AssessmentSession,
        expected_revision: u64,
    ) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("session mutex poisoned");
        match guard.get(&session.id) {
            None => Err(StoreError::NotFound),
            Some(existing) if existing.revision != expected_revision => Err(StoreError::Conflict),
            Some(_) => {
                guard.insert(session.id.clone(), session);
                Ok(())
            }
        }
    }

    fn fetch(&self, id: &SessionId) -> Result<Option<AssessmentSession>, StoreError> {
        let guard = self.records.lock().expect("session mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn for_student_test(
        &self,
        student: &StudentId,
        test: &TestId,
    ) -> Result<Vec<AssessmentSession>, StoreError> {
        let guard = self.records.lock().expect("session mutex poisoned");
        Ok(guard
            .values()
            .filter(|session| &session.student_id == student && &session.test_id == test)
            .cloned()
            .collect())
    }
}

pub(super) struct StaticCatalog {
    tests: HashMap<TestId, TestDefinition>,
}

impl StaticCatalog {
    pub(super) fn with_tests(tests: Vec<TestDefinition>) -> Self {
        Self {
            tests: tests.into_iter().map(|test| (test.id.clone(), test)).collect(),
        }
    }
}

impl TestCatalog for StaticCatalog {
    fn get_test(&self, id: &TestId) -> Result<Option<TestDefinition>, StoreError> {
        Ok(self.tests.get(id).cloned())
    }
}

#[derive(Default)]
pub(super) struct MemoryObservers {
    events: Mutex<Vec<(String, SessionEvent)>>,
}

impl MemoryObservers {
    pub(super) fn events(&self) -> Vec<(String, SessionEvent)> {
        self.events.lock().expect("observer mutex poisoned").clone()
    }
}

impl ObserverChannel for MemoryObservers {
    fn publish(&self, topic: &str, event: SessionEvent) -> Result<(), ObserverError> {
        let mut guard = self.events.lock().expect("observer mutex poisoned");
        guard.push((topic.to_string(), event));
        Ok(())
    }
}

pub(super) struct UnreachableObservers;

impl ObserverChannel for UnreachableObservers {
    fn publish(&self, _topic: &str, _event: SessionEvent) -> Result<(), ObserverError> {
        Err(ObserverError::Transport("websocket hub offline".to_string()))
    }
}

pub(super) type TestService<O> = AssessmentService<MemorySessions, StaticCatalog, O>;

pub(super) fn build_service() -> (
    Arc<TestService<MemoryObservers>>,
    Arc<MemorySessions>,
    Arc<MemoryObservers>,
) {
    let sessions = Arc::new(MemorySessions::default());
    let catalog = Arc::new(StaticCatalog::with_tests(vec![rust_test()]));
    let observers = Arc::new(MemoryObservers::default());
    let service = Arc::new(AssessmentService::new(
        sessions.clone(),
        catalog,
        observers.clone(),
    ));
    (service, sessions, observers)
}
