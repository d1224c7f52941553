//! Append-only violation log plus the termination/ban threshold decision.

use chrono::{DateTime, Duration, Utc};

use super::domain::{
    AssessmentSession, BanRecord, SessionStatus, TestDefinition, ViolationEvent, ViolationKind,
};

/// What recording one violation did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationOutcome {
    /// Logged without crossing the threshold, or logged against a session
    /// that was already closed (forensic completeness).
    Logged,
    /// The threshold was crossed and the session closed without a ban.
    Terminated,
    /// The threshold was crossed with cheating-class evidence; a ban was
    /// issued alongside the termination.
    Banned,
}

/// Append the event and re-evaluate the threshold.
///
/// The log grows unconditionally, even on closed sessions. The status flip
/// happens exactly once: only a session still `InProgress` can transition,
/// so a burst of reports past the threshold is a no-op after the first
/// crossing. Timestamps are kept monotonic per session.
pub fn record(
    session: &mut AssessmentSession,
    kind: ViolationKind,
    now: DateTime<Utc>,
    test: &TestDefinition,
) -> ViolationOutcome {
    let at = session
        .violations
        .last()
        .map(|event| event.at.max(now))
        .unwrap_or(now);

    session.violations.push(ViolationEvent {
        kind,
        severity: kind.severity(),
        at,
    });

    if !session.status.is_open() {
        return ViolationOutcome::Logged;
    }

    if (session.violations.len() as u32) < test.max_violations {
        return ViolationOutcome::Logged;
    }

    let cheating = session
        .violations
        .iter()
        .any(|event| event.kind.is_cheating());

    if cheating {
        session.status = SessionStatus::Banned;
        session.ban = Some(BanRecord {
            reason: format!(
                "terminated after {} integrity violations",
                session.violations.len()
            ),
            issued_at: at,
            expires_at: at + Duration::days(test.ban_days),
        });
        ViolationOutcome::Banned
    } else {
        session.status = SessionStatus::Terminated;
        ViolationOutcome::Terminated
    }
}
