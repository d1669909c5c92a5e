use carbon_retire::{
    models::{
        batch::{BatchFilter, BatchItemStatus, BatchStatus, RetirementLine},
        schedule::{CreditSelection, Frequency, NewSchedule},
    },
    store::RetirementStore,
    ApiError,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use time::macros::datetime;

use super::{faulty_store::FaultyStore, test_config, TestApp};

#[tokio::test]
async fn lost_execution_write_does_not_repeat_the_occurrence() {
    let app = TestApp::wrapped(test_config(), |store| {
        Arc::new(FaultyStore::new(store).failing_execution_writes()) as Arc<dyn RetirementStore>
    });
    app.fund("scope1", 1_000).await;
    let service = &app.state.scheduling_service;

    let created = service
        .create(
            app.company_id,
            app.user_id,
            NewSchedule {
                name: "Monthly scope1".to_string(),
                description: None,
                purpose: "scope1".to_string(),
                amount: Decimal::new(10, 0),
                credit_selection: CreditSelection::Automatic,
                frequency: Frequency::Monthly,
                start_date: datetime!(2026-01-31 09:00 UTC),
            },
        )
        .await
        .unwrap();

    let first = service.run_due_schedules().await.unwrap();
    assert_eq!(first.due, 1);
    assert_eq!(first.errored, 1);

    // Later ticks at the same instant find nothing due
    for _ in 0..2 {
        let report = service.run_due_schedules().await.unwrap();
        assert_eq!(report.due, 0);
    }

    let schedule = service.get(app.company_id, created.id).await.unwrap();
    assert_eq!(schedule.next_run_date, datetime!(2026-02-28 09:00 UTC));
    assert_eq!(schedule.last_run_at, Some(datetime!(2026-01-31 09:00 UTC)));

    let retirements = app.store.list_retirements(app.company_id).await.unwrap();
    assert_eq!(retirements.len(), 1);
    assert_eq!(retirements[0].amount, Decimal::new(10, 0));
}

#[tokio::test]
async fn lost_counter_write_still_finishes_the_batch() {
    let app = TestApp::wrapped(test_config(), |store| {
        Arc::new(FaultyStore::new(store).failing_batch_record_on(2)) as Arc<dyn RetirementStore>
    });
    app.fund("scope1", 100).await;

    let items = (0..4)
        .map(|_| RetirementLine {
            credit_id: None,
            amount: Decimal::new(1, 0),
            purpose: "scope1".to_string(),
        })
        .collect();
    let result = app
        .state
        .batch_service
        .create_batch(app.company_id, app.user_id, "Interrupted", None, items)
        .await;
    assert!(matches!(result, Err(ApiError::Persistence(_))));

    let batches = app
        .store
        .list_batches(app.company_id, &BatchFilter::default())
        .await
        .unwrap();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert!(batch.status.is_terminal());
    assert!(batch.completed_at.is_some());
    assert_eq!(batch.completed_items + batch.failed_items, batch.total_items);
    assert_eq!(batch.completed_items, 2);
    assert_eq!(batch.status, BatchStatus::Partial);

    // Items after the failed write were never retired
    let stored = app.store.list_batch_items(batch.id).await.unwrap();
    for item in &stored[2..] {
        assert_eq!(item.status, BatchItemStatus::Failed);
        assert_eq!(item.error_code.as_deref(), Some("PERSISTENCE_ERROR"));
    }
    let retirements = app.store.list_retirements(app.company_id).await.unwrap();
    assert_eq!(retirements.len(), 2);
}
