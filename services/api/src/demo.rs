use crate::infra::{
    seed_tests, InMemoryApplicationRepository, InMemoryProjectStore, InMemorySessionStore,
    LoggingNotificationSink, LoggingObserverChannel, StaticTestCatalog,
};
use chrono::{Duration, Utc};
use clap::Args;
use serde::Serialize;
use std::sync::Arc;
use talentlink::auth::Actor;
use talentlink::error::AppError;
use talentlink::workflows::assessment::{
    AssessmentService, QuestionId, SessionError, TestId, ViolationKind,
};
use talentlink::workflows::placement::{
    NewProject, NewRole, PlacementError, PlacementService,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print each intermediate record as JSON instead of a one-line summary
    #[arg(long)]
    pub(crate) json: bool,
}

type DemoPlacement =
    PlacementService<InMemoryProjectStore, InMemoryApplicationRepository, LoggingNotificationSink>;
type DemoAssessment =
    AssessmentService<InMemorySessionStore, StaticTestCatalog, LoggingObserverChannel>;

/// Scripted walkthrough: one applicant qualifies through the proctored test
/// and wins a seat; a second applicant is terminated and banned for
/// repeated cheating signals.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let placement: DemoPlacement = PlacementService::new(
        Arc::new(InMemoryProjectStore::default()),
        Arc::new(InMemoryApplicationRepository::default()),
        Arc::new(LoggingNotificationSink),
    );
    let assessment: DemoAssessment = AssessmentService::new(
        Arc::new(InMemorySessionStore::default()),
        Arc::new(StaticTestCatalog::new(seed_tests())),
        Arc::new(LoggingObserverChannel),
    );

    let admin = Actor::admin("demo-admin");
    let now = Utc::now();
    let test_id = TestId("test-backend".to_string());

    println!("== Talentlink walkthrough ==");

    let project = placement.create_project(
        &admin,
        NewProject {
            name: "Realtime collaboration board".to_string(),
            deadline: now + Duration::days(14),
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
            required_test: Some(test_id.clone()),
        },
    )?;
    println!("project '{}' open until {}", project.name, project.deadline);

    // Applicant one qualifies and wins a backend seat.
    let riya = Actor::student("riya");
    let application = placement.submit(&riya, &project.id, "backend", now)?;
    print_record(&args, "application submitted", &application.view());

    let session = assessment.start(&riya, &test_id, now)?;
    print_record(&args, "assessment started", &session.view(now));

    for question in &seed_tests()[0].questions {
        assessment.record_answer(
            &riya,
            &session.id,
            &QuestionId(question.id.0.clone()),
            &question.correct_answer,
            now + Duration::minutes(5),
        )?;
    }
    let graded = assessment.submit(&riya, &session.id, now + Duration::minutes(10))?;
    print_record(&args, "assessment graded", &graded.view(now));

    let cleared = placement.complete_test(&riya, &application.id, &graded)?;
    placement.begin_review(&admin, &cleared.id, now)?;
    placement.shortlist(&admin, &cleared.id, now)?;
    let approved = placement.approve(&admin, &cleared.id, now)?;
    print_record(&args, "seat approved", &approved.view());

    // Applicant two trips the proctoring tracker.
    let sam = Actor::student("sam");
    placement.submit(&sam, &project.id, "frontend", now)?;
    let cheated = assessment.start(&sam, &test_id, now)?;
    for offset in 0..3 {
        let at = now + Duration::minutes(offset);
        let (session, outcome) =
            assessment.record_violation(&cheated.id, ViolationKind::ClipboardAccess, at)?;
        println!(
            "violation {} recorded for sam: outcome {:?}, status {:?}",
            session.violations.len(),
            outcome,
            session.status
        );
    }

    match assessment.start(&sam, &test_id, now + Duration::minutes(5)) {
        Err(SessionError::ActiveBan { expires_at }) => {
            println!("sam is banned from retesting until {expires_at}")
        }
        Ok(_) => println!("unexpected: sam restarted a session"),
        Err(other) => return Err(other.into()),
    }

    let audit = placement.audit(&admin, &project.id)?;
    println!(
        "ledger audit: {} seat(s) filled, {} counter(s) repaired",
        audit.total_filled,
        audit.repaired_roles.len()
    );

    match placement.approve(&admin, &approved.id, now) {
        Err(PlacementError::Transition(err)) => {
            println!("re-approval refused as expected: {err}")
        }
        Ok(_) => println!("unexpected: approval applied twice"),
        Err(other) => return Err(other.into()),
    }

    println!("== walkthrough complete ==");
    Ok(())
}

fn print_record<T: Serialize>(args: &DemoArgs, label: &str, record: &T) {
    if args.json {
        match serde_json::to_string_pretty(record) {
            Ok(rendered) => println!("{label}:\n{rendered}"),
            Err(err) => println!("{label}: <unrenderable: {err}>"),
        }
    } else {
        println!("{label}");
    }
}
