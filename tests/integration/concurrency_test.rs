/// Concurrent retirements against a shared credit pool.
///
/// Two retirements of 6 race for a single credit holding 10: exactly one may
/// win, the pool never goes negative, and the loser fails cleanly.
use carbon_retire::{
    models::{
        credit::{Provenance, RetiredBy},
        schedule::{CreditSelection, ExecutionOutcome, Frequency, NewSchedule},
    },
    services::execution_runner::{CreditSource, RetirementRequest},
    store::RetirementStore,
    ApiError,
};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use time::macros::datetime;
use tokio::task::JoinSet;

use super::TestApp;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn competing_automatic_retirements_only_one_wins() {
    let app = TestApp::new();
    let credit = app.fund("scope1", 10).await;

    let selector = Arc::new(carbon_retire::services::CreditSelector::new(
        app.store.clone(),
        app.clock.clone(),
        5,
    ));

    let mut tasks = JoinSet::new();
    for _ in 0..2 {
        let selector = selector.clone();
        let company_id = app.company_id;
        let provenance = Provenance {
            retired_by: RetiredBy::User(app.user_id),
            schedule_id: None,
            batch_id: None,
        };
        tasks.spawn(async move {
            selector
                .allocate(company_id, "scope1", Decimal::new(6, 0), &provenance)
                .await
        });
    }

    let mut successes = 0;
    let mut insufficient = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => successes += 1,
            Err(ApiError::InsufficientCredits(_)) => insufficient += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(insufficient, 1);
    assert_eq!(app.remaining(credit.id).await, Decimal::new(4, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn competing_fixed_credit_retirements_only_one_wins() {
    let app = TestApp::new();
    let credit = app.fund("scope1", 10).await;

    let batch = &app.state.batch_service;
    let line = || carbon_retire::models::batch::RetirementLine {
        credit_id: Some(credit.id.to_string()),
        amount: Decimal::new(6, 0),
        purpose: "scope1".to_string(),
    };

    let results = join_all([
        batch.create_batch(app.company_id, app.user_id, "A", None, vec![line()]),
        batch.create_batch(app.company_id, app.user_id, "B", None, vec![line()]),
    ])
    .await;

    let completed: u32 = results
        .iter()
        .map(|r| r.as_ref().unwrap().batch.completed_items)
        .sum();
    assert_eq!(completed, 1);
    assert_eq!(app.remaining(credit.id).await, Decimal::new(4, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_schedules_in_one_tick_never_overdraw() {
    let app = TestApp::new();
    let credit = app.fund("scope1", 10).await;
    let service = &app.state.scheduling_service;

    let mut ids = Vec::new();
    for name in ["first", "second"] {
        let schedule = service
            .create(
                app.company_id,
                app.user_id,
                NewSchedule {
                    name: name.to_string(),
                    description: None,
                    purpose: "scope1".to_string(),
                    amount: Decimal::new(6, 0),
                    credit_selection: CreditSelection::Automatic,
                    frequency: Frequency::Daily,
                    start_date: datetime!(2026-01-31 09:00 UTC),
                },
            )
            .await
            .unwrap();
        ids.push(schedule.id);
    }

    let report = service.run_due_schedules().await.unwrap();
    assert_eq!(report.due, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);

    let mut outcomes = Vec::new();
    for id in ids {
        let executions = service.list_executions(app.company_id, id).await.unwrap();
        assert_eq!(executions.len(), 1);
        outcomes.push(executions[0].outcome);
    }
    assert!(outcomes.contains(&ExecutionOutcome::Success));
    assert!(outcomes.contains(&ExecutionOutcome::Failure));

    assert_eq!(app.remaining(credit.id).await, Decimal::new(4, 0));
    let retired: Decimal = app
        .store
        .list_retirements(app.company_id)
        .await
        .unwrap()
        .iter()
        .map(|r| r.amount)
        .sum();
    assert_eq!(retired, Decimal::new(6, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_requests_race_without_losing_amounts() {
    let app = TestApp::new();
    app.fund("scope1", 7).await;
    app.fund("scope1", 7).await;
    app.fund("scope1", 7).await;

    let runner = Arc::new(carbon_retire::services::ExecutionRunner::new(
        app.store.clone(),
        app.clock.clone(),
        Arc::new(carbon_retire::services::CreditSelector::new(
            app.store.clone(),
            app.clock.clone(),
            50,
        )),
    ));

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let runner = runner.clone();
        let request = RetirementRequest {
            company_id: app.company_id,
            purpose: "scope1".to_string(),
            amount: Decimal::new(3, 0),
            source: CreditSource::Automatic,
            provenance: Provenance {
                retired_by: RetiredBy::User(app.user_id),
                schedule_id: None,
                batch_id: None,
            },
        };
        tasks.spawn(async move { runner.run(&request).await });
    }

    let mut succeeded = 0;
    while let Some(joined) = tasks.join_next().await {
        if joined.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    // 21 available, 3 per request
    assert_eq!(succeeded, 7);
    let retired: Decimal = app
        .store
        .list_retirements(app.company_id)
        .await
        .unwrap()
        .iter()
        .map(|r| r.amount)
        .sum();
    assert_eq!(retired, Decimal::new(21, 0));
}
