//! Pure grading over recorded answers and the test's question bank.
//!
//! Grading is deterministic and re-derivable: the stored `ScoreCard` and the
//! per-answer correctness fields are only ever written from `grade`, never
//! edited independently.

use std::collections::BTreeMap;

use super::domain::{Grade, Question, QuestionId, RecordedAnswer, ScoreCard, TestDefinition};

/// Result of grading one attempt: the graded answer map plus the score card.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeSheet {
    pub answers: BTreeMap<QuestionId, RecordedAnswer>,
    pub score: ScoreCard,
}

/// Grade every recorded answer against the bank. Questions the student never
/// answered contribute zero; answers for unknown questions score zero points.
pub fn grade(
    answers: &BTreeMap<QuestionId, RecordedAnswer>,
    test: &TestDefinition,
) -> GradeSheet {
    let total = test.total_points();
    let mut graded = BTreeMap::new();
    let mut obtained = 0u32;

    for (question_id, answer) in answers {
        let (correct, points_earned) = match test.question(question_id) {
            Some(question) if is_correct(question, &answer.value) => (true, question.points),
            _ => (false, 0),
        };
        obtained += points_earned;
        graded.insert(
            question_id.clone(),
            RecordedAnswer {
                value: answer.value.clone(),
                correct,
                points_earned,
            },
        );
    }

    let percentage = percentage_of(obtained, total);

    GradeSheet {
        answers: graded,
        score: ScoreCard {
            obtained,
            total,
            percentage,
            grade: Grade::from_percentage(percentage),
            passed: percentage >= test.passing_score,
        },
    }
}

fn is_correct(question: &Question, value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(question.correct_answer.trim())
}

/// `round(100 * obtained / total)`; an empty bank grades to zero rather than
/// a division fault.
fn percentage_of(obtained: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((100.0 * f64::from(obtained) / f64::from(total)).round()) as u32
}
