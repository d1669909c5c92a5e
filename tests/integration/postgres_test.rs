//! Store conformance against a real Postgres.
//!
//! Ignored by default. Run with
//! `TEST_DATABASE_URL=postgres://... cargo test -- --ignored postgres`.

use carbon_retire::{
    models::{
        batch::{Batch, BatchItem, BatchItemStatus, BatchStatus},
        credit::{AllocationCommit, AllocationPortion, Credit, Provenance, RetiredBy},
        schedule::{CreditSelection, Frequency, Schedule, ScheduleFilter},
    },
    services::CreditSelector,
    store::{PostgresStore, RetirementStore, StoreError},
    ApiError,
};
use migration::{Migrator, MigratorTrait};
use rust_decimal::Decimal;
use sea_orm::Database;
use std::sync::Arc;
use time::{macros::datetime, OffsetDateTime};
use tokio::task::JoinSet;
use uuid::Uuid;

use carbon_retire::clock::ManualClock;

async fn connect() -> PostgresStore {
    super::setup_test_environment().await;
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let db = Database::connect(&url).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    PostgresStore::new(db)
}

fn credit(company_id: Uuid, amount: i64) -> Credit {
    Credit {
        id: Uuid::new_v4(),
        company_id,
        purpose: "scope1".to_string(),
        remaining_amount: Decimal::new(amount, 0),
        expiry_date: None,
        created_at: datetime!(2025-01-01 00:00 UTC),
    }
}

fn commit(company_id: Uuid, portions: Vec<AllocationPortion>) -> AllocationCommit {
    AllocationCommit::new(
        company_id,
        "scope1",
        portions,
        &Provenance {
            retired_by: RetiredBy::User(Uuid::new_v4()),
            schedule_id: None,
            batch_id: None,
        },
        datetime!(2026-01-31 09:00 UTC),
    )
}

#[tokio::test]
#[ignore]
async fn postgres_commit_deducts_and_records_retirements() {
    let store = connect().await;
    let company_id = Uuid::new_v4();
    let a = credit(company_id, 10);
    let b = credit(company_id, 5);
    store.insert_credit(&a).await.unwrap();
    store.insert_credit(&b).await.unwrap();

    let retirements = store
        .commit_allocation(&commit(
            company_id,
            vec![
                AllocationPortion {
                    credit_id: a.id,
                    expected_remaining: Decimal::new(10, 0),
                    amount: Decimal::new(10, 0),
                },
                AllocationPortion {
                    credit_id: b.id,
                    expected_remaining: Decimal::new(5, 0),
                    amount: Decimal::new(2, 0),
                },
            ],
        ))
        .await
        .unwrap();

    assert_eq!(retirements.len(), 2);
    let a_after = store.get_credit(a.id).await.unwrap().unwrap();
    let b_after = store.get_credit(b.id).await.unwrap().unwrap();
    assert_eq!(a_after.remaining_amount, Decimal::ZERO);
    assert_eq!(b_after.remaining_amount, Decimal::new(3, 0));

    let eligible = store
        .list_eligible_credits(company_id, "scope1", datetime!(2026-01-31 09:00 UTC))
        .await
        .unwrap();
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].id, b.id);

    let stored = store.list_retirements(company_id).await.unwrap();
    let total: Decimal = stored.iter().map(|r| r.amount).sum();
    assert_eq!(total, Decimal::new(12, 0));
}

#[tokio::test]
#[ignore]
async fn postgres_stale_portion_rolls_back_whole_commit() {
    let store = connect().await;
    let company_id = Uuid::new_v4();
    let a = credit(company_id, 10);
    let b = credit(company_id, 10);
    store.insert_credit(&a).await.unwrap();
    store.insert_credit(&b).await.unwrap();

    let result = store
        .commit_allocation(&commit(
            company_id,
            vec![
                AllocationPortion {
                    credit_id: a.id,
                    expected_remaining: Decimal::new(10, 0),
                    amount: Decimal::new(4, 0),
                },
                // Planned against a balance the credit no longer holds
                AllocationPortion {
                    credit_id: b.id,
                    expected_remaining: Decimal::new(12, 0),
                    amount: Decimal::new(4, 0),
                },
            ],
        ))
        .await;

    assert!(matches!(result, Err(StoreError::Conflict(_))));
    let a_after = store.get_credit(a.id).await.unwrap().unwrap();
    assert_eq!(a_after.remaining_amount, Decimal::new(10, 0));
    assert!(store.list_retirements(company_id).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn postgres_competing_allocations_only_one_wins() {
    let store: Arc<dyn RetirementStore> = Arc::new(connect().await);
    let company_id = Uuid::new_v4();
    let c = credit(company_id, 10);
    store.insert_credit(&c).await.unwrap();

    let clock = Arc::new(ManualClock::new(datetime!(2026-01-31 09:00 UTC)));
    let selector = Arc::new(CreditSelector::new(store.clone(), clock, 5));

    let mut tasks = JoinSet::new();
    for _ in 0..2 {
        let selector = selector.clone();
        tasks.spawn(async move {
            selector
                .allocate(
                    company_id,
                    "scope1",
                    Decimal::new(6, 0),
                    &Provenance {
                        retired_by: RetiredBy::User(Uuid::new_v4()),
                        schedule_id: None,
                        batch_id: None,
                    },
                )
                .await
        });
    }

    let mut successes = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => successes += 1,
            Err(ApiError::InsufficientCredits(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(successes, 1);
    let after = store.get_credit(c.id).await.unwrap().unwrap();
    assert_eq!(after.remaining_amount, Decimal::new(4, 0));
}

#[tokio::test]
#[ignore]
async fn postgres_schedule_round_trips_with_manual_selection() {
    let store = connect().await;
    let company_id = Uuid::new_v4();
    let now = datetime!(2026-01-31 09:00 UTC);
    let mut schedule = Schedule {
        id: Uuid::now_v7(),
        company_id,
        name: "Quarterly".to_string(),
        description: None,
        purpose: "scope1".to_string(),
        amount: Decimal::new(25, 1),
        credit_selection: CreditSelection::Manual {
            credit_id: Uuid::new_v4(),
        },
        frequency: Frequency::Quarterly,
        start_date: now,
        next_run_date: now,
        is_active: true,
        created_by: Uuid::new_v4(),
        last_run_at: None,
        created_at: now,
        updated_at: now,
    };
    store.insert_schedule(&schedule).await.unwrap();

    schedule.next_run_date = datetime!(2026-04-30 09:00 UTC);
    schedule.last_run_at = Some(now);
    store.update_schedule(&schedule).await.unwrap();

    let fetched = store.get_schedule(schedule.id).await.unwrap().unwrap();
    assert_eq!(fetched, schedule);

    let listed = store
        .list_schedules(company_id, &ScheduleFilter::default())
        .await
        .unwrap();
    assert_eq!(listed, vec![schedule.clone()]);

    assert!(store.delete_schedule(schedule.id).await.unwrap());
    assert!(matches!(
        store.update_schedule(&schedule).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore]
async fn postgres_batch_counters_follow_recorded_items() {
    let store = connect().await;
    let company_id = Uuid::new_v4();
    let now = OffsetDateTime::now_utc();
    let batch = Batch {
        id: Uuid::now_v7(),
        company_id,
        name: "Conformance".to_string(),
        description: None,
        status: BatchStatus::Processing,
        total_items: 2,
        completed_items: 0,
        failed_items: 0,
        created_by: Uuid::new_v4(),
        created_at: now,
        completed_at: None,
    };
    let items: Vec<BatchItem> = (0..2)
        .map(|position| BatchItem {
            id: Uuid::now_v7(),
            batch_id: batch.id,
            position,
            credit_id: None,
            amount: Some(Decimal::new(1, 0)),
            purpose: "scope1".to_string(),
            status: BatchItemStatus::Pending,
            retirement_ids: Vec::new(),
            error_code: None,
            error_message: None,
            processed_at: None,
        })
        .collect();
    store.insert_batch(&batch, &items).await.unwrap();

    let mut done = items[0].clone();
    done.status = BatchItemStatus::Completed;
    done.retirement_ids = vec![Uuid::now_v7()];
    done.processed_at = Some(now);
    let after_first = store.record_batch_item(&done).await.unwrap();
    assert_eq!(after_first.completed_items, 1);
    assert_eq!(after_first.failed_items, 0);

    let mut failed = items[1].clone();
    failed.status = BatchItemStatus::Failed;
    failed.error_code = Some("INSUFFICIENT_CREDITS".to_string());
    failed.error_message = Some("requested 1, available 0".to_string());
    failed.processed_at = Some(now);
    let after_second = store.record_batch_item(&failed).await.unwrap();
    assert_eq!(after_second.failed_items, 1);

    let finished = store
        .finish_batch(&Batch {
            status: BatchStatus::Partial,
            completed_at: Some(now),
            ..after_second
        })
        .await
        .unwrap();
    assert_eq!(finished.status, BatchStatus::Partial);
    assert_eq!(finished.completed_items, 1);
    assert_eq!(finished.failed_items, 1);
    assert!(finished.completed_at.is_some());

    let stored_items = store.list_batch_items(batch.id).await.unwrap();
    assert_eq!(stored_items[0].status, BatchItemStatus::Completed);
    assert_eq!(stored_items[1].error_code.as_deref(), Some("INSUFFICIENT_CREDITS"));
}
