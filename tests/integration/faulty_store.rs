//! Store wrapper that injects write failures and latency into an in-memory store.

use async_trait::async_trait;
use carbon_retire::{
    models::{
        batch::{Batch, BatchFilter, BatchItem},
        credit::{AllocationCommit, Credit, Retirement},
        schedule::{Execution, Schedule, ScheduleFilter},
    },
    store::{MemoryStore, RetirementStore, StoreError, StoreResult},
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use time::OffsetDateTime;
use uuid::Uuid;

pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    fail_execution_writes: bool,
    /// 1-based call of `record_batch_item` that fails
    fail_batch_record_on: Option<usize>,
    batch_records: AtomicUsize,
    commit_delay: Option<Duration>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_execution_writes: false,
            fail_batch_record_on: None,
            batch_records: AtomicUsize::new(0),
            commit_delay: None,
        }
    }

    pub fn failing_execution_writes(mut self) -> Self {
        self.fail_execution_writes = true;
        self
    }

    pub fn failing_batch_record_on(mut self, call: usize) -> Self {
        self.fail_batch_record_on = Some(call);
        self
    }

    pub fn slow_commits(mut self, delay: Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }
}

#[async_trait]
impl RetirementStore for FaultyStore {
    async fn insert_credit(&self, credit: &Credit) -> StoreResult<()> {
        self.inner.insert_credit(credit).await
    }

    async fn get_credit(&self, id: Uuid) -> StoreResult<Option<Credit>> {
        self.inner.get_credit(id).await
    }

    async fn list_eligible_credits(
        &self,
        company_id: Uuid,
        purpose: &str,
        at: OffsetDateTime,
    ) -> StoreResult<Vec<Credit>> {
        self.inner.list_eligible_credits(company_id, purpose, at).await
    }

    async fn commit_allocation(&self, commit: &AllocationCommit) -> StoreResult<Vec<Retirement>> {
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.commit_allocation(commit).await
    }

    async fn list_retirements(&self, company_id: Uuid) -> StoreResult<Vec<Retirement>> {
        self.inner.list_retirements(company_id).await
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        self.inner.insert_schedule(schedule).await
    }

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        self.inner.get_schedule(id).await
    }

    async fn list_schedules(
        &self,
        company_id: Uuid,
        filter: &ScheduleFilter,
    ) -> StoreResult<Vec<Schedule>> {
        self.inner.list_schedules(company_id, filter).await
    }

    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        self.inner.update_schedule(schedule).await
    }

    async fn delete_schedule(&self, id: Uuid) -> StoreResult<bool> {
        self.inner.delete_schedule(id).await
    }

    async fn list_due_schedules(&self, now: OffsetDateTime) -> StoreResult<Vec<Schedule>> {
        self.inner.list_due_schedules(now).await
    }

    async fn insert_execution(&self, execution: &Execution) -> StoreResult<()> {
        if self.fail_execution_writes {
            return Err(StoreError::Timeout("execution insert timed out".to_string()));
        }
        self.inner.insert_execution(execution).await
    }

    async fn list_executions(
        &self,
        company_id: Uuid,
        schedule_id: Uuid,
    ) -> StoreResult<Vec<Execution>> {
        self.inner.list_executions(company_id, schedule_id).await
    }

    async fn insert_batch(&self, batch: &Batch, items: &[BatchItem]) -> StoreResult<()> {
        self.inner.insert_batch(batch, items).await
    }

    async fn record_batch_item(&self, item: &BatchItem) -> StoreResult<Batch> {
        let call = self.batch_records.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_batch_record_on == Some(call) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.record_batch_item(item).await
    }

    async fn finish_batch(&self, batch: &Batch) -> StoreResult<Batch> {
        self.inner.finish_batch(batch).await
    }

    async fn get_batch(&self, id: Uuid) -> StoreResult<Option<Batch>> {
        self.inner.get_batch(id).await
    }

    async fn list_batch_items(&self, batch_id: Uuid) -> StoreResult<Vec<BatchItem>> {
        self.inner.list_batch_items(batch_id).await
    }

    async fn list_batches(
        &self,
        company_id: Uuid,
        filter: &BatchFilter,
    ) -> StoreResult<Vec<Batch>> {
        self.inner.list_batches(company_id, filter).await
    }
}
