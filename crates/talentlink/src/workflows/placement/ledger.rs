//! Allocation ledger arithmetic: the conditional slot increment used on the
//! approval hot path, and the reconciliation pass used for repair/audit.
//!
//! Stores must apply these functions inside their own per-project critical
//! section so the check-and-write is indivisible. The functions themselves
//! are pure over a `Project` value.

use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{Project, ProjectId};

/// Ledger failures. Capacity losses are the expected concurrency outcome and
/// map to `Conflict` at the HTTP edge; overruns found during reconciliation
/// are integrity violations surfaced loudly.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("project has no role named '{role}'")]
    RoleNotFound { role: String },
    #[error("role '{role}' is already filled to capacity ({capacity})")]
    SlotExhausted { role: String, capacity: u32 },
    #[error("team is already at the maximum size ({max_team_size})")]
    TeamFull { max_team_size: u32 },
    #[error("release for role '{role}' would underflow a zero counter")]
    ReleaseUnderflow { role: String },
    #[error(
        "approved applications for role '{role}' ({count}) exceed its capacity ({capacity})"
    )]
    CapacityOverrun {
        role: String,
        count: u32,
        capacity: u32,
    },
    #[error("approved applications ({total}) exceed the maximum team size ({max_team_size})")]
    TeamOverrun { total: u32, max_team_size: u32 },
}

/// Increment `filled` for `role` only if the role has room and the team is
/// below its maximum, in one indivisible step from the caller's perspective.
pub fn reserve_slot(project: &mut Project, role: &str) -> Result<(), LedgerError> {
    let max_team_size = project.max_team_size;
    if project.total_filled() >= max_team_size {
        return Err(LedgerError::TeamFull { max_team_size });
    }

    let slot = project
        .role_mut(role)
        .ok_or_else(|| LedgerError::RoleNotFound {
            role: role.to_string(),
        })?;
    if !slot.has_room() {
        return Err(LedgerError::SlotExhausted {
            role: slot.role.clone(),
            capacity: slot.capacity,
        });
    }

    slot.filled += 1;
    Ok(())
}

/// Roll back a reservation whose application transition failed to commit.
pub fn release_slot(project: &mut Project, role: &str) -> Result<(), LedgerError> {
    let slot = project
        .role_mut(role)
        .ok_or_else(|| LedgerError::RoleNotFound {
            role: role.to_string(),
        })?;
    if slot.filled == 0 {
        return Err(LedgerError::ReleaseUnderflow {
            role: slot.role.clone(),
        });
    }
    slot.filled -= 1;
    Ok(())
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerAudit {
    pub project_id: ProjectId,
    /// Counters that disagreed with the approved-application counts before
    /// the pass rewrote them. Empty means the ledger was already consistent.
    pub repaired_roles: Vec<String>,
    pub total_filled: u32,
}

/// Rewrite every `filled` counter from the approved-application counts.
///
/// Counts that exceed a role's capacity or the team maximum are a
/// data-integrity violation: the pass refuses to write and surfaces the
/// error instead of clamping.
pub fn reconcile(
    project: &mut Project,
    approved_by_role: &BTreeMap<String, u32>,
) -> Result<LedgerAudit, LedgerError> {
    for (role, count) in approved_by_role {
        let slot = project
            .role(role)
            .ok_or_else(|| LedgerError::RoleNotFound { role: role.clone() })?;
        if *count > slot.capacity {
            return Err(LedgerError::CapacityOverrun {
                role: role.clone(),
                count: *count,
                capacity: slot.capacity,
            });
        }
    }

    let total: u32 = approved_by_role.values().sum();
    if total > project.max_team_size {
        return Err(LedgerError::TeamOverrun {
            total,
            max_team_size: project.max_team_size,
        });
    }

    let mut repaired_roles = Vec::new();
    for slot in &mut project.roles {
        let counted = approved_by_role.get(&slot.role).copied().unwrap_or(0);
        if slot.filled != counted {
            repaired_roles.push(slot.role.clone());
            slot.filled = counted;
        }
    }

    Ok(LedgerAudit {
        project_id: project.id.clone(),
        repaired_roles,
        total_filled: total,
    })
}
