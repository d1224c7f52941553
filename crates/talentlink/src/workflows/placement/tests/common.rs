use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::workflows::assessment::domain::{StudentId, TestId};
use crate::workflows::placement::domain::{
    Application, ApplicationId, ApplicationStatus, NewProject, NewRole, Project, ProjectId,
};
use crate::workflows::placement::ledger::{self, LedgerAudit};
use crate::workflows::placement::repository::{
    ApplicationRepository, NotificationIntent, NotificationSink, NotifyError, ProjectStore,
    SlotError, StoreError,
};
use crate::workflows::placement::service::PlacementService;

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid timestamp")
}

pub(super) fn compiler_project(required_test: Option<TestId>) -> NewProject {
    NewProject {
        name: "Compiler hackathon".to_string(),
        deadline: fixed_now() + Duration::days(14),
        max_team_size: 3,
        roles: vec![
            NewRole {
                role: "backend".to_string(),
                capacity: 2,
            },
            NewRole {
                role: "frontend".to_string(),
                capacity: 1,
            },
        ],
        required_test,
    }
}

#[derive(Default)]
pub(super) struct MemoryProjects {
    records: Mutex<HashMap<ProjectId, Project>>,
}

impl ProjectStore for MemoryProjects {
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

impl MemoryProjects {
    /// Test hook simulating counter drift outside the service's write path.
    pub(super) fn corrupt_filled(&self, id: &ProjectId, role: &str, filled: u32) {
        let mut guard = self.records.lock().expect("project mutex poisoned");
        let project = guard.get_mut(id).expect("project seeded");
        let slot = project
            .roles
            .iter_mut()
            .find(|slot| slot.role == role)
            .expect("role seeded");
        slot.filled = filled;
    }
}

#[derive(Default)]
pub(super) struct MemoryApplications {
    records: Mutex<HashMap<ApplicationId, Application>>,
}

impl ApplicationRepository for MemoryApplications {
    fn insert(&self, application: Application) -> Result<Application, StoreError> {
        let mut guard = self.records.lock().expect("application mutex poisoned");
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

#[derive(Default)]
pub(super) struct MemoryNotifications {
    sent: Mutex<Vec<NotificationIntent>>,
}

impl NotificationSink for MemoryNotifications {
    fn publish(&self, intent: NotificationIntent) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notification mutex poisoned")
            .push(intent);
        Ok(())
    }
}

impl MemoryNotifications {
    pub(super) fn sent(&self) -> Vec<NotificationIntent> {
        self.sent
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

/// A sink whose transport is down, for checking that decisions still commit.
pub(super) struct UnreachableNotifications;

impl NotificationSink for UnreachableNotifications {
    fn publish(&self, _intent: NotificationIntent) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("dispatcher offline".to_string()))
    }
}

pub(super) type TestService =
    PlacementService<MemoryProjects, MemoryApplications, MemoryNotifications>;

pub(super) fn build_service() -> (
    Arc<TestService>,
    Arc<MemoryProjects>,
    Arc<MemoryApplications>,
    Arc<MemoryNotifications>,
) {
    let projects = Arc::new(MemoryProjects::default());
    let applications = Arc::new(MemoryApplications::default());
    let notifications = Arc::new(MemoryNotifications::default());
    let service = Arc::new(PlacementService::new(
        Arc::clone(&projects),
        Arc::clone(&applications),
        Arc::clone(&notifications),
    ));
    (service, projects, applications, notifications)
}
