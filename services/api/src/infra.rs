use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use talentlink::workflows::assessment::{
    AssessmentSession, ObserverChannel, ObserverError, Question, QuestionId, SessionEvent,
    SessionId, SessionStatus, SessionStore, StudentId, TestCatalog, TestDefinition, TestId,
};
use talentlink::workflows::assessment::StoreError as SessionStoreError;
use talentlink::workflows::placement::{
    ledger, Application, ApplicationId, ApplicationRepository, ApplicationStatus, LedgerAudit,
    NotificationIntent, NotificationSink, NotifyError, Project, ProjectId, ProjectStore,
    SlotError, StoreError,
};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryProjectStore {
    records: Arc<Mutex<HashMap<ProjectId, Project>>>,
}

impl ProjectStore for InMemoryProjectStore {
    fn insert(&self, project: Project) -> Result<Project, StoreError> {
        let mut guard = self.records.lock().expect("project mutex poisoned");
        if guard.contains_key(&project.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    fn fetch(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
        let guard = self.records.lock().expect("project mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn reserve_slot(&self, id: &ProjectId, role: &str) -> Result<Project, SlotError> {
        // The mutex is the atomicity domain: the capacity check and the
        // increment happen under one acquisition.
        let mut guard = self.records.lock().expect("project mutex poisoned");
        let project = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        ledger::reserve_slot(project, role)?;
        Ok(project.clone())
    }

    fn release_slot(&self, id: &ProjectId, role: &str) -> Result<(), SlotError> {
        let mut guard = self.records.lock().expect("project mutex poisoned");
        let project = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        ledger::release_slot(project, role)?;
        Ok(())
    }

    fn recompute(
        &self,
        id: &ProjectId,
        approved_by_role: &BTreeMap<String, u32>,
    ) -> Result<LedgerAudit, SlotError> {
        let mut guard = self.records.lock().expect("project mutex poisoned");
        let project = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        Ok(ledger::reconcile(project, approved_by_role)?)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, application: Application) -> Result<Application, StoreError> {
        let mut guard = self.records.lock().expect("application mutex poisoned");
        let duplicate_pair = guard.values().any(|existing| {
            existing.student_id == application.student_id
                && existing.project_id == application.project_id
        });
        if duplicate_pair || guard.contains_key(&application.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn commit(
        &self,
        application: Application,
        expected: ApplicationStatus,
    ) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("application mutex poisoned");
        match guard.get(&application.id) {
            None => Err(StoreError::NotFound),
            Some(existing) if existing.status != expected => Err(StoreError::Conflict),
            Some(_) => {
                guard.insert(application.id.clone(), application);
                Ok(())
            }
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        let guard = self.records.lock().expect("application mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn for_project(&self, project: &ProjectId) -> Result<Vec<Application>, StoreError> {
        let guard = self.records.lock().expect("application mutex poisoned");
        Ok(guard
            .values()
            .filter(|application| &application.project_id == project)
            .cloned()
            .collect())
    }

    fn for_student_project(
        &self,
        student: &StudentId,
        project: &ProjectId,
    ) -> Result<Option<Application>, StoreError> {
        let guard = self.records.lock().expect("application mutex poisoned");
        Ok(guard
            .values()
            .find(|application| {
                &application.student_id == student && &application.project_id == project
            })
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySessionStore {
    records: Arc<Mutex<HashMap<SessionId, AssessmentSession>>>,
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, session: AssessmentSession) -> Result<AssessmentSession, SessionStoreError> {
        let mut guard = self.records.lock().expect("session mutex poisoned");
        if guard.contains_key(&session.id) {
            return Err(SessionStoreError::Conflict);
        }
        let duplicate_open = guard.values().any(|existing| {
            existing.student_id == session.student_id
                && existing.test_id == session.test_id
                && existing.status == SessionStatus::InProgress
        });
        if duplicate_open {
            return Err(SessionStoreError::Conflict);
        }
        guard.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    fn commit(
        &self,
        session: AssessmentSession,
        expected_revision: u64,
    ) -> Result<(), SessionStoreError> {
        let mut guard = self.records.lock().expect("session mutex poisoned");
        match guard.get(&session.id) {
            None => Err(SessionStoreError::NotFound),
            Some(existing) if existing.revision != expected_revision => {
                Err(SessionStoreError::Conflict)
            }
            Some(_) => {
                guard.insert(session.id.clone(), session);
                Ok(())
            }
        }
    }

    fn fetch(&self, id: &SessionId) -> Result<Option<AssessmentSession>, SessionStoreError> {
        let guard = self.records.lock().expect("session mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn for_student_test(
        &self,
        student: &StudentId,
        test: &TestId,
    ) -> Result<Vec<AssessmentSession>, SessionStoreError> {
        let guard = self.records.lock().expect("session mutex poisoned");
        Ok(guard
            .values()
            .filter(|session| &session.student_id == student && &session.test_id == test)
            .cloned()
            .collect())
    }
}

/// Catalog of skill tests fixed at process start.
#[derive(Default, Clone)]
pub(crate) struct StaticTestCatalog {
    tests: Arc<HashMap<TestId, TestDefinition>>,
}

impl StaticTestCatalog {
    pub(crate) fn new(tests: Vec<TestDefinition>) -> Self {
        Self {
            tests: Arc::new(
                tests
                    .into_iter()
                    .map(|test| (test.id.clone(), test))
                    .collect(),
            ),
        }
    }
}

impl TestCatalog for StaticTestCatalog {
    fn get_test(&self, id: &TestId) -> Result<Option<TestDefinition>, SessionStoreError> {
        Ok(self.tests.get(id).cloned())
    }
}

/// Decision notifications logged to the telemetry stream. A real dispatcher
/// (mail, chat) would subscribe here.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationSink;

impl NotificationSink for LoggingNotificationSink {
    fn publish(&self, intent: NotificationIntent) -> Result<(), NotifyError> {
        info!(
            recipient = %intent.recipient_id.0,
            kind = ?intent.kind,
            "placement notification queued"
        );
        Ok(())
    }
}

/// Proctoring observers receive session events over the telemetry stream.
#[derive(Default, Clone)]
pub(crate) struct LoggingObserverChannel;

impl ObserverChannel for LoggingObserverChannel {
    fn publish(&self, topic: &str, event: SessionEvent) -> Result<(), ObserverError> {
        info!(
            topic = %topic,
            session = %event.session_id.0,
            violations = event.violation_count,
            status = ?event.status,
            "assessment event broadcast"
        );
        Ok(())
    }
}

/// Seed catalog for local runs: one qualifying test per advertised track.
pub(crate) fn seed_tests() -> Vec<TestDefinition> {
    vec![
        TestDefinition {
            id: TestId("test-backend".to_string()),
            title: "Backend fundamentals".to_string(),
            questions: vec![
                question("q1", "What does ACID stand for?", "atomicity consistency isolation durability"),
                question("q2", "Which HTTP status signals a conflict?", "409"),
                question("q3", "Name the Rust trait for shared-state thread safety.", "sync"),
                question("q4", "What does CAS abbreviate?", "compare and swap"),
            ],
            passing_score: 70,
            max_violations: 3,
            duration_minutes: 30,
            ban_days: 7,
        },
        TestDefinition {
            id: TestId("test-frontend".to_string()),
            title: "Frontend fundamentals".to_string(),
            questions: vec![
                question("q1", "Which element is focusable by default?", "button"),
                question("q2", "What does CSS cascade resolve?", "specificity"),
                question("q3", "Name the browser storage cleared per tab.", "sessionstorage"),
            ],
            passing_score: 70,
            max_violations: 3,
            duration_minutes: 20,
            ban_days: 7,
        },
    ]
}

fn question(id: &str, prompt: &str, answer: &str) -> Question {
    Question {
        id: QuestionId(id.to_string()),
        prompt: prompt.to_string(),
        points: 5,
        correct_answer: answer.to_string(),
    }
}
