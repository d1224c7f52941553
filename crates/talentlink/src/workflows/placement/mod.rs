//! Project placement: project capacity ledger, the application state
//! machine, and decision notifications.

pub mod domain;
pub mod ledger;
pub mod repository;
pub mod router;
pub mod service;
pub mod transitions;

#[cfg(test)]
mod tests;

pub use domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationView, NewProject, NewRole, Project,
    ProjectId, ProjectStatus, RoleSlot,
};
pub use ledger::{reconcile, release_slot, reserve_slot, LedgerAudit, LedgerError};
pub use repository::{
    ApplicationRepository, NotificationIntent, NotificationKind, NotificationSink, NotifyError,
    ProjectStore, SlotError, StoreError,
};
pub use router::placement_router;
pub use service::{PlacementError, PlacementService};
pub use transitions::TransitionError;
