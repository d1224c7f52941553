use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for assessment sessions (one timed attempt at a test).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Identifier wrapper for catalog tests. The catalog itself is external and
/// read-only to this core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestId(pub String);

/// Identifier wrapper for questions within a test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuestionId(pub String);

/// Identifier wrapper for students, shared with the placement workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

/// A single question as served by the external test catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    pub points: u32,
    pub correct_answer: String,
}

/// Read-only catalog record consumed by the session engine and grader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDefinition {
    pub id: TestId,
    pub title: String,
    pub questions: Vec<Question>,
    /// Minimum percentage required to pass.
    pub passing_score: u32,
    /// Violation count at which the session is closed.
    pub max_violations: u32,
    pub duration_minutes: i64,
    /// Length of the ban issued after a cheating-class termination.
    pub ban_days: i64,
}

impl TestDefinition {
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|question| &question.id == id)
    }

    pub fn total_points(&self) -> u32 {
        self.questions.iter().map(|question| question.points).sum()
    }
}

/// Lifecycle of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Terminated,
    Banned,
}

impl SessionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in-progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Terminated => "terminated",
            SessionStatus::Banned => "banned",
        }
    }

    pub const fn is_open(self) -> bool {
        matches!(self, SessionStatus::InProgress)
    }
}

/// Last-write-wins answer slot. Correctness and earned points are only ever
/// written by the grading engine so they cannot drift from the raw value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedAnswer {
    pub value: String,
    pub correct: bool,
    pub points_earned: u32,
}

impl RecordedAnswer {
    pub fn ungraded(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            correct: false,
            points_earned: 0,
        }
    }
}

/// Integrity event categories reported by the proctoring client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    TabSwitch,
    WindowBlur,
    ClipboardAccess,
    DevToolsOpen,
    MultipleFaces,
    Inactivity,
}

impl ViolationKind {
    pub const fn severity(self) -> ViolationSeverity {
        match self {
            ViolationKind::TabSwitch | ViolationKind::WindowBlur => ViolationSeverity::Suspicious,
            ViolationKind::ClipboardAccess
            | ViolationKind::DevToolsOpen
            | ViolationKind::MultipleFaces => ViolationSeverity::Cheating,
            ViolationKind::Inactivity => ViolationSeverity::Routine,
        }
    }

    pub const fn is_cheating(self) -> bool {
        matches!(self.severity(), ViolationSeverity::Cheating)
    }

    pub const fn label(self) -> &'static str {
        match self {
            ViolationKind::TabSwitch => "tab-switch",
            ViolationKind::WindowBlur => "window-blur",
            ViolationKind::ClipboardAccess => "clipboard-access",
            ViolationKind::DevToolsOpen => "devtools-open",
            ViolationKind::MultipleFaces => "multiple-faces",
            ViolationKind::Inactivity => "inactivity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Routine,
    Suspicious,
    Cheating,
}

/// Append-only log entry; never mutated or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub kind: ViolationKind,
    pub severity: ViolationSeverity,
    pub at: DateTime<Utc>,
}

/// Time-boxed prohibition on new attempts, kept as an immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub reason: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BanRecord {
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Letter grade from the fixed threshold table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    APlus,
    A,
    BPlus,
    B,
    CPlus,
    C,
    D,
    F,
}

impl Grade {
    pub const fn from_percentage(percentage: u32) -> Self {
        match percentage {
            95..=u32::MAX => Grade::APlus,
            90..=94 => Grade::A,
            85..=89 => Grade::BPlus,
            80..=84 => Grade::B,
            75..=79 => Grade::CPlus,
            70..=74 => Grade::C,
            60..=69 => Grade::D,
            _ => Grade::F,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

/// Computed score, only ever produced by the grading engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub obtained: u32,
    pub total: u32,
    pub percentage: u32,
    pub grade: Grade,
    pub passed: bool,
}

/// One timed, proctored attempt by a student at a skill test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSession {
    pub id: SessionId,
    pub student_id: StudentId,
    pub test_id: TestId,
    pub status: SessionStatus,
    /// Optimistic-concurrency counter, bumped on every committed write.
    /// Stores reject a commit whose expected revision is stale, so two
    /// writers racing on the same snapshot cannot overwrite each other's
    /// appended events.
    pub revision: u64,
    pub answers: BTreeMap<QuestionId, RecordedAnswer>,
    pub violations: Vec<ViolationEvent>,
    pub score: Option<ScoreCard>,
    pub ban: Option<BanRecord>,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AssessmentSession {
    pub fn begin(
        id: SessionId,
        student_id: StudentId,
        test: &TestDefinition,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            student_id,
            test_id: test.id.clone(),
            status: SessionStatus::InProgress,
            revision: 0,
            answers: BTreeMap::new(),
            violations: Vec::new(),
            score: None,
            ban: None,
            started_at: now,
            deadline: now + Duration::minutes(test.duration_minutes),
            completed_at: None,
        }
    }

    /// Whether a lapsed ban permits a fresh attempt. The ban record itself is
    /// immutable; eligibility is derived on read.
    pub fn retest_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Banned
            && self.ban.as_ref().is_some_and(|ban| ban.expired(now))
    }

    pub fn passed(&self) -> bool {
        self.score.map(|score| score.passed).unwrap_or(false)
    }

    pub fn view(&self, now: DateTime<Utc>) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            test_id: self.test_id.clone(),
            student_id: self.student_id.clone(),
            status: self.status.label(),
            answered_questions: self.answers.len(),
            violation_count: self.violations.len(),
            score: self.score,
            ban: self.ban.clone(),
            retest_eligible: self.retest_eligible(now),
            started_at: self.started_at,
            deadline: self.deadline,
            completed_at: self.completed_at,
        }
    }
}

/// Read model returned by the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub test_id: TestId,
    pub student_id: StudentId,
    pub status: &'static str,
    pub answered_questions: usize,
    pub violation_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ban: Option<BanRecord>,
    pub retest_eligible: bool,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
