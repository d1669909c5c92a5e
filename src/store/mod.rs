//! Persistence port for schedules, executions, batches, credits and retirements.
//!
//! Everything is typed CRUD except [`RetirementStore::commit_allocation`], the one
//! transactional primitive: it deducts from N credits and writes the matching
//! retirements atomically, refusing the whole commit with [`StoreError::Conflict`]
//! when any credit moved since the plan was computed.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{
    batch::{Batch, BatchFilter, BatchItem},
    credit::{AllocationCommit, Credit, Retirement},
    schedule::{Execution, Schedule, ScheduleFilter},
};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic check failed; the caller may re-read and retry
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Timeout(String),

    #[error(transparent)]
    Database(sea_orm::DbErr),

    #[error("{0}")]
    Backend(String),
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err {
            // Pool exhausted past its acquire timeout
            sea_orm::DbErr::ConnectionAcquire(e) => StoreError::Timeout(e.to_string()),
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait RetirementStore: Send + Sync {
    // Credits

    async fn insert_credit(&self, credit: &Credit) -> StoreResult<()>;

    async fn get_credit(&self, id: Uuid) -> StoreResult<Option<Credit>>;

    /// Credits of `company_id` tagged `purpose` with a positive remaining amount,
    /// not expired at `at`. Order is unspecified.
    async fn list_eligible_credits(
        &self,
        company_id: Uuid,
        purpose: &str,
        at: OffsetDateTime,
    ) -> StoreResult<Vec<Credit>>;

    /// Atomically deduct every portion and insert one retirement per portion.
    async fn commit_allocation(&self, commit: &AllocationCommit) -> StoreResult<Vec<Retirement>>;

    async fn list_retirements(&self, company_id: Uuid) -> StoreResult<Vec<Retirement>>;

    // Schedules

    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()>;

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>>;

    /// Ordered by next run date, earliest first
    async fn list_schedules(
        &self,
        company_id: Uuid,
        filter: &ScheduleFilter,
    ) -> StoreResult<Vec<Schedule>>;

    /// Full-row update; `NotFound` if the schedule is gone
    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()>;

    /// Returns whether a row was removed. Executions are kept.
    async fn delete_schedule(&self, id: Uuid) -> StoreResult<bool>;

    /// Active schedules with `next_run_date <= now`, across all companies
    async fn list_due_schedules(&self, now: OffsetDateTime) -> StoreResult<Vec<Schedule>>;

    // Executions

    async fn insert_execution(&self, execution: &Execution) -> StoreResult<()>;

    /// Newest first; includes executions of deleted schedules
    async fn list_executions(
        &self,
        company_id: Uuid,
        schedule_id: Uuid,
    ) -> StoreResult<Vec<Execution>>;

    // Batches

    /// Insert the batch row and all of its items together
    async fn insert_batch(&self, batch: &Batch, items: &[BatchItem]) -> StoreResult<()>;

    /// Store a resolved item and bump the batch's completed or failed counter
    /// in the same unit; returns the updated batch.
    async fn record_batch_item(&self, item: &BatchItem) -> StoreResult<Batch>;

    /// Write the final status, counters and completion time of `batch`.
    async fn finish_batch(&self, batch: &Batch) -> StoreResult<Batch>;

    async fn get_batch(&self, id: Uuid) -> StoreResult<Option<Batch>>;

    /// Ordered by position
    async fn list_batch_items(&self, batch_id: Uuid) -> StoreResult<Vec<BatchItem>>;

    /// Newest first
    async fn list_batches(&self, company_id: Uuid, filter: &BatchFilter)
        -> StoreResult<Vec<Batch>>;
}
