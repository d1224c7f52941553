//! Integration specifications for the project placement workflow.
//!
//! Scenarios run end-to-end through the public service facade and the HTTP
//! router, covering intake, the test gate shared with the assessment
//! workflow, capacity allocation, and terminal-state immutability.

mod common {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use talentlink::workflows::assessment::{
        AssessmentService, AssessmentSession, ObserverChannel, ObserverError, Question,
        QuestionId, SessionEvent, SessionId, SessionStore,
        StoreError as SessionStoreError, StudentId, TestCatalog, TestDefinition, TestId,
    };
    use talentlink::workflows::placement::{
        ledger, Application, ApplicationId, ApplicationRepository, ApplicationStatus, LedgerAudit,
        NewProject, NewRole, NotificationIntent, NotificationSink, NotifyError, PlacementService,
        Project, ProjectId, ProjectStore, SlotError, StoreError,
    };

    pub(super) fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 6, 10, 0, 0).single().expect("valid timestamp")
    }

    pub(super) fn qualifier() -> TestDefinition {
        TestDefinition {
            id: TestId("test-systems".to_string()),
            title: "Systems programming qualifier".to_string(),
            questions: (0..5)
                .map(|index| Question {
                    id: QuestionId(format!("q{index}")),
                    prompt: format!("Question {index}"),
                    points: 4,
                    correct_answer: format!("expected-{index}"),
                })
                .collect(),
            passing_score: 60,
            max_violations: 3,
            duration_minutes: 45,
            ban_days: 14,
        }
    }

    pub(super) fn gated_project() -> NewProject {
        NewProject {
            name: "Distributed cache".to_string(),
            deadline: anchor() + Duration::days(10),
            max_team_size: 2,
            roles: vec![
                NewRole {
                    role: "core".to_string(),
                    capacity: 1,
                },
                NewRole {
                    role: "tooling".to_string(),
                    capacity: 1,
                },
            ],
            required_test: Some(qualifier().id),
        }
    }

    pub(super) fn open_project() -> NewProject {
        NewProject {
            required_test: None,
            ..gated_project()
        }
    }

    #[derive(Default, Clone)]
    pub(super) struct Projects {
        records: Arc<Mutex<HashMap<ProjectId, Project>>>,
    }

    impl ProjectStore for Projects {
        fn insert(&self, project: Project) -> Result<Project, StoreError> {
            let mut guard = self.records.lock().expect("lock");
            if guard.contains_key(&project.id) {
                return Err(StoreError::Conflict);
            }
            guard.insert(project.id.clone(), project.clone());
            Ok(project)
        }

        fn fetch(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
            let guard = self.records.lock().expect("lock");
            Ok(guard.get(id).cloned())
        }

        fn reserve_slot(&self, id: &ProjectId, role: &str) -> Result<Project, SlotError> {
            let mut guard = self.records.lock().expect("lock");
            let project = guard.get_mut(id).ok_or(StoreError::NotFound)?;
            ledger::reserve_slot(project, role)?;
            Ok(project.clone())
        }

        fn release_slot(&self, id: &ProjectId, role: &str) -> Result<(), SlotError> {
            let mut guard = self.records.lock().expect("lock");
            let project = guard.get_mut(id).ok_or(StoreError::NotFound)?;
            ledger::release_slot(project, role)?;
            Ok(())
        }

        fn recompute(
            &self,
            id: &ProjectId,
            approved_by_role: &BTreeMap<String, u32>,
        ) -> Result<LedgerAudit, SlotError> {
            let mut guard = self.records.lock().expect("lock");
            let project = guard.get_mut(id).ok_or(StoreError::NotFound)?;
            Ok(ledger::reconcile(project, approved_by_role)?)
        }
    }

    #[derive(Default, Clone)]
    pub(super) struct Applications {
        records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
    }

    impl ApplicationRepository for Applications {
        fn insert(&self, application: Application) -> Result<Application, StoreError> {
            let mut guard = self.records.lock().expect("lock");
            let duplicate = guard.values().any(|existing| {
                existing.student_id == application.student_id
                    && existing.project_id == application.project_id
            });
            if duplicate || guard.contains_key(&application.id) {
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
            let mut guard = self.records.lock().expect("lock");
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
            let guard = self.records.lock().expect("lock");
            Ok(guard.get(id).cloned())
        }

        fn for_project(&self, project: &ProjectId) -> Result<Vec<Application>, StoreError> {
            let guard = self.records.lock().expect("lock");
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
            let guard = self.records.lock().expect("lock");
            Ok(guard
                .values()
                .find(|application| {
                    &application.student_id == student && &application.project_id == project
                })
                .cloned())
        }
    }

    #[derive(Default, Clone)]
    pub(super) struct Notifications {
        sent: Arc<Mutex<Vec<NotificationIntent>>>,
    }

    impl Notifications {
        pub(super) fn sent(&self) -> Vec<NotificationIntent> {
            self.sent.lock().expect("lock").clone()
        }
    }

    impl NotificationSink for Notifications {
        fn publish(&self, intent: NotificationIntent) -> Result<(), NotifyError> {
            self.sent.lock().expect("lock").push(intent);
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    pub(super) struct Sessions {
        records: Arc<Mutex<HashMap<SessionId, AssessmentSession>>>,
    }

    impl SessionStore for Sessions {
        fn insert(
            &self,
            session: AssessmentSession,
        ) -> Result<AssessmentSession, SessionStoreError> {
            let mut guard = self.records.lock().expect("lock");
            if guard.contains_key(&session.id) {
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
            let mut guard = self.records.lock().expect("lock");
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
            let guard = self.records.lock().expect("lock");
            Ok(guard.get(id).cloned())
        }

        fn for_student_test(
            &self,
            student: &StudentId,
            test: &TestId,
        ) -> Result<Vec<AssessmentSession>, SessionStoreError> {
            let guard = self.records.lock().expect("lock");
            Ok(guard
                .values()
                .filter(|session| &session.student_id == student && &session.test_id == test)
                .cloned()
                .collect())
        }
    }

    #[derive(Clone)]
    pub(super) struct Catalog;

    impl TestCatalog for Catalog {
        fn get_test(&self, id: &TestId) -> Result<Option<TestDefinition>, SessionStoreError> {
            if id == &qualifier().id {
                Ok(Some(qualifier()))
            } else {
                Ok(None)
            }
        }
    }

    #[derive(Clone)]
    pub(super) struct SilentObservers;

    impl ObserverChannel for SilentObservers {
        fn publish(&self, _topic: &str, _event: SessionEvent) -> Result<(), ObserverError> {
            Ok(())
        }
    }

    pub(super) type Placement = PlacementService<Projects, Applications, Notifications>;
    pub(super) type Assessment = AssessmentService<Sessions, Catalog, SilentObservers>;

    pub(super) fn build_placement() -> (Arc<Placement>, Arc<Notifications>) {
        let notifications = Arc::new(Notifications::default());
        let service = Arc::new(PlacementService::new(
            Arc::new(Projects::default()),
            Arc::new(Applications::default()),
            Arc::clone(&notifications),
        ));
        (service, notifications)
    }

    pub(super) fn build_assessment() -> Arc<Assessment> {
        Arc::new(AssessmentService::new(
            Arc::new(Sessions::default()),
            Arc::new(Catalog),
            Arc::new(SilentObservers),
        ))
    }
}

mod intake {
    use super::common::*;
    use chrono::Duration;
    use talentlink::auth::Actor;
    use talentlink::workflows::placement::{
        ApplicationStatus, PlacementError, TransitionError,
    };

    #[test]
    fn gated_projects_start_applications_at_the_test_gate() {
        let (placement, _) = build_placement();
        let admin = Actor::admin("lead");
        let gated = placement
            .create_project(&admin, gated_project())
            .expect("project created");
        let open = placement
            .create_project(&admin, open_project())
            .expect("project created");

        let gated_app = placement
            .submit(&Actor::student("ana"), &gated.id, "core", anchor())
            .expect("application accepted");
        let open_app = placement
            .submit(&Actor::student("ana"), &open.id, "core", anchor())
            .expect("application accepted");

        assert_eq!(gated_app.status, ApplicationStatus::TestRequired);
        assert_eq!(open_app.status, ApplicationStatus::Pending);
    }

    #[test]
    fn intake_closes_at_the_deadline() {
        let (placement, _) = build_placement();
        let project = placement
            .create_project(&Actor::admin("lead"), open_project())
            .expect("project created");

        let at_deadline = project.deadline;
        let error = placement
            .submit(&Actor::student("ana"), &project.id, "core", at_deadline)
            .expect_err("deadline is exclusive");
        assert!(matches!(
            error,
            PlacementError::Transition(TransitionError::DeadlinePassed { .. })
        ));

        let just_before = project.deadline - Duration::seconds(1);
        placement
            .submit(&Actor::student("ana"), &project.id, "core", just_before)
            .expect("intake open until the deadline");
    }
}

mod test_gate {
    use super::common::*;
    use chrono::Duration;
    use talentlink::auth::Actor;
    use talentlink::workflows::assessment::QuestionId;
    use talentlink::workflows::placement::{
        ApplicationStatus, PlacementError, TransitionError,
    };

    #[test]
    fn passing_the_qualifier_unlocks_the_review_pipeline() {
        let (placement, notifications) = build_placement();
        let assessment = build_assessment();
        let admin = Actor::admin("lead");
        let ana = Actor::student("ana");

        let project = placement
            .create_project(&admin, gated_project())
            .expect("project created");
        let application = placement
            .submit(&ana, &project.id, "core", anchor())
            .expect("application accepted");

        // The gate holds while the test is unattempted.
        let error = placement
            .begin_review(&admin, &application.id, anchor())
            .expect_err("gate must hold");
        assert!(matches!(
            error,
            PlacementError::Transition(TransitionError::InvalidTransition { .. })
        ));

        let session = assessment
            .start(&ana, &qualifier().id, anchor())
            .expect("session starts");
        for question in &qualifier().questions {
            assessment
                .record_answer(
                    &ana,
                    &session.id,
                    &QuestionId(question.id.0.clone()),
                    &question.correct_answer,
                    anchor() + Duration::minutes(10),
                )
                .expect("answer recorded");
        }
        let graded = assessment
            .submit(&ana, &session.id, anchor() + Duration::minutes(20))
            .expect("session graded");
        assert!(graded.score.as_ref().is_some_and(|score| score.passed));

        let cleared = placement
            .complete_test(&ana, &application.id, &graded)
            .expect("gate cleared");
        assert_eq!(cleared.status, ApplicationStatus::TestCompleted);

        placement
            .begin_review(&admin, &cleared.id, anchor())
            .expect("review opens");
        placement
            .shortlist(&admin, &cleared.id, anchor())
            .expect("shortlist accepted");
        let approved = placement
            .approve(&admin, &cleared.id, anchor())
            .expect("approve accepted");
        assert_eq!(approved.assigned_role.as_deref(), Some("core"));
        assert_eq!(notifications.sent().len(), 2);
    }

    #[test]
    fn terminated_sessions_never_clear_the_gate() {
        let (placement, _) = build_placement();
        let assessment = build_assessment();
        let ana = Actor::student("ana");

        let project = placement
            .create_project(&Actor::admin("lead"), gated_project())
            .expect("project created");
        let application = placement
            .submit(&ana, &project.id, "core", anchor())
            .expect("application accepted");

        let session = assessment
            .start(&ana, &qualifier().id, anchor())
            .expect("session starts");
        for offset in 0..3 {
            assessment
                .record_violation(
                    &session.id,
                    talentlink::workflows::assessment::ViolationKind::TabSwitch,
                    anchor() + Duration::minutes(offset),
                )
                .expect("violation recorded");
        }

        let stored = assessment
            .session(&ana, &session.id, anchor() + Duration::minutes(5))
            .expect("session readable");
        let error = placement
            .complete_test(&ana, &application.id, &stored)
            .expect_err("terminated sessions do not qualify");
        assert!(matches!(
            error,
            PlacementError::Transition(TransitionError::SessionNotCompleted { .. })
        ));
    }
}

mod allocation {
    use super::common::*;
    use std::sync::Arc;
    use std::thread;
    use talentlink::auth::Actor;
    use talentlink::workflows::placement::{ApplicationStatus, LedgerError, PlacementError};

    #[test]
    fn concurrent_approvals_never_oversubscribe_a_role() {
        let (placement, _) = build_placement();
        let project = placement
            .create_project(&Actor::admin("lead"), open_project())
            .expect("project created");

        let applications: Vec<_> = (0..6)
            .map(|index| {
                placement
                    .submit(
                        &Actor::student(format!("student-{index}")),
                        &project.id,
                        "core",
                        anchor(),
                    )
                    .expect("application accepted")
            })
            .collect();

        let handles: Vec<_> = applications
            .into_iter()
            .map(|application| {
                let placement = Arc::clone(&placement);
                thread::spawn(move || {
                    placement.approve(&Actor::admin("lead"), &application.id, anchor())
                })
            })
            .collect();

        let outcomes: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread completes"))
            .collect();

        let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        assert_eq!(winners, 1, "core has a single seat");
        for outcome in outcomes {
            if let Err(error) = outcome {
                assert!(matches!(
                    error,
                    PlacementError::Ledger(LedgerError::SlotExhausted { .. })
                ));
            }
        }

        let stored = placement.project(&project.id).expect("project present");
        assert_eq!(stored.role("core").expect("role present").filled, 1);
        assert_eq!(stored.total_filled(), 1);
    }

    #[test]
    fn audit_confirms_counters_after_a_full_cycle() {
        let (placement, _) = build_placement();
        let admin = Actor::admin("lead");
        let project = placement
            .create_project(&admin, open_project())
            .expect("project created");

        for (student, role) in [("ana", "core"), ("ben", "tooling")] {
            let application = placement
                .submit(&Actor::student(student), &project.id, role, anchor())
                .expect("application accepted");
            let approved = placement
                .approve(&admin, &application.id, anchor())
                .expect("approve accepted");
            assert_eq!(approved.status, ApplicationStatus::Approved);
        }

        let audit = placement.audit(&admin, &project.id).expect("audit runs");
        assert!(audit.repaired_roles.is_empty());
        assert_eq!(audit.total_filled, 2);
    }
}

mod routing {
    use super::common::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use talentlink::auth::{Actor, USER_ID_HEADER, USER_ROLE_HEADER};
    use talentlink::workflows::placement::placement_router;
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("body is json")
    }

    #[tokio::test]
    async fn submit_then_approve_over_http() {
        let (placement, _) = build_placement();
        let project = placement
            .create_project(&Actor::admin("lead"), open_project())
            .expect("project created");
        let router = placement_router(placement);

        let submit = Request::post("/api/v1/placement/applications")
            .header(header::CONTENT_TYPE, "application/json")
            .header(USER_ID_HEADER, "ana")
            .header(USER_ROLE_HEADER, "student")
            .body(Body::from(
                serde_json::to_vec(&json!({
                    "project_id": project.id.0,
                    "preferred_role": "core",
                }))
                .expect("serializes"),
            ))
            .expect("request builds");
        let response = router
            .clone()
            .oneshot(submit)
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::CREATED);
        let application = body_json(response).await;
        let application_id = application["application_id"]
            .as_str()
            .expect("id present")
            .to_string();

        let approve = Request::post(format!(
            "/api/v1/placement/applications/{application_id}/approve"
        ))
        .header(USER_ID_HEADER, "lead")
        .header(USER_ROLE_HEADER, "admin")
        .body(Body::empty())
        .expect("request builds");
        let response = router.oneshot(approve).await.expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        let approved = body_json(response).await;
        assert_eq!(approved["status"], "approved");
        assert_eq!(approved["assigned_role"], "core");
    }

    #[tokio::test]
    async fn students_cannot_reach_review_verbs_over_http() {
        let (placement, _) = build_placement();
        let project = placement
            .create_project(&Actor::admin("lead"), open_project())
            .expect("project created");
        let application = placement
            .submit(&Actor::student("ana"), &project.id, "core", anchor())
            .expect("application accepted");
        let router = placement_router(placement);

        let approve = Request::post(format!(
            "/api/v1/placement/applications/{}/approve",
            application.id.0
        ))
        .header(USER_ID_HEADER, "ana")
        .header(USER_ROLE_HEADER, "student")
        .body(Body::empty())
        .expect("request builds");
        let response = router.oneshot(approve).await.expect("route executes");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
