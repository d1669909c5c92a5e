//! In-memory store. One lock guards all tables, so every call (and in particular
//! `commit_allocation`) is serializable.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{RetirementStore, StoreError, StoreResult};
use crate::models::{
    batch::{Batch, BatchFilter, BatchItem, BatchItemStatus},
    credit::{AllocationCommit, Credit, Retirement},
    schedule::{Execution, Schedule, ScheduleFilter},
};

#[derive(Default)]
struct Tables {
    credits: HashMap<Uuid, Credit>,
    retirements: Vec<Retirement>,
    schedules: HashMap<Uuid, Schedule>,
    executions: Vec<Execution>,
    batches: HashMap<Uuid, Batch>,
    batch_items: HashMap<Uuid, Vec<BatchItem>>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetirementStore for MemoryStore {
    async fn insert_credit(&self, credit: &Credit) -> StoreResult<()> {
        self.tables.lock().credits.insert(credit.id, credit.clone());
        Ok(())
    }

    async fn get_credit(&self, id: Uuid) -> StoreResult<Option<Credit>> {
        Ok(self.tables.lock().credits.get(&id).cloned())
    }

    async fn list_eligible_credits(
        &self,
        company_id: Uuid,
        purpose: &str,
        at: OffsetDateTime,
    ) -> StoreResult<Vec<Credit>> {
        Ok(self
            .tables
            .lock()
            .credits
            .values()
            .filter(|c| c.is_eligible_for(company_id, purpose, at))
            .cloned()
            .collect())
    }

    async fn commit_allocation(&self, commit: &AllocationCommit) -> StoreResult<Vec<Retirement>> {
        let mut tables = self.tables.lock();

        // Check every portion before touching anything
        for portion in &commit.portions {
            let credit = tables.credits.get(&portion.credit_id).ok_or_else(|| {
                StoreError::Conflict(format!("credit {} no longer exists", portion.credit_id))
            })?;
            if credit.remaining_amount != portion.expected_remaining
                || portion.amount > credit.remaining_amount
            {
                return Err(StoreError::Conflict(format!(
                    "credit {} changed: expected remaining {}, found {}",
                    portion.credit_id, portion.expected_remaining, credit.remaining_amount
                )));
            }
        }

        for portion in &commit.portions {
            if let Some(credit) = tables.credits.get_mut(&portion.credit_id) {
                credit.remaining_amount -= portion.amount;
            }
        }

        let retirements = commit.retirements();
        tables.retirements.extend(retirements.iter().cloned());
        Ok(retirements)
    }

    async fn list_retirements(&self, company_id: Uuid) -> StoreResult<Vec<Retirement>> {
        Ok(self
            .tables
            .lock()
            .retirements
            .iter()
            .filter(|r| r.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        self.tables
            .lock()
            .schedules
            .insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        Ok(self.tables.lock().schedules.get(&id).cloned())
    }

    async fn list_schedules(
        &self,
        company_id: Uuid,
        filter: &ScheduleFilter,
    ) -> StoreResult<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self
            .tables
            .lock()
            .schedules
            .values()
            .filter(|s| s.company_id == company_id && filter.matches(s))
            .cloned()
            .collect();
        schedules.sort_by_key(|s| (s.next_run_date, s.id));
        Ok(schedules)
    }

    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        match tables.schedules.get_mut(&schedule.id) {
            Some(existing) => {
                *existing = schedule.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "schedule {} not found",
                schedule.id
            ))),
        }
    }

    async fn delete_schedule(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.lock().schedules.remove(&id).is_some())
    }

    async fn list_due_schedules(&self, now: OffsetDateTime) -> StoreResult<Vec<Schedule>> {
        let mut due: Vec<Schedule> = self
            .tables
            .lock()
            .schedules
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|s| (s.next_run_date, s.id));
        Ok(due)
    }

    async fn insert_execution(&self, execution: &Execution) -> StoreResult<()> {
        self.tables.lock().executions.push(execution.clone());
        Ok(())
    }

    async fn list_executions(
        &self,
        company_id: Uuid,
        schedule_id: Uuid,
    ) -> StoreResult<Vec<Execution>> {
        let mut executions: Vec<Execution> = self
            .tables
            .lock()
            .executions
            .iter()
            .filter(|e| e.company_id == company_id && e.schedule_id == schedule_id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.run_at.cmp(&a.run_at).then(b.id.cmp(&a.id)));
        Ok(executions)
    }

    async fn insert_batch(&self, batch: &Batch, items: &[BatchItem]) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        tables.batches.insert(batch.id, batch.clone());
        tables.batch_items.insert(batch.id, items.to_vec());
        Ok(())
    }

    async fn record_batch_item(&self, item: &BatchItem) -> StoreResult<Batch> {
        let mut tables = self.tables.lock();

        let stored = tables
            .batch_items
            .get_mut(&item.batch_id)
            .and_then(|items| items.iter_mut().find(|i| i.id == item.id))
            .ok_or_else(|| StoreError::NotFound(format!("batch item {} not found", item.id)))?;
        *stored = item.clone();

        let batch = tables
            .batches
            .get_mut(&item.batch_id)
            .ok_or_else(|| StoreError::NotFound(format!("batch {} not found", item.batch_id)))?;
        match item.status {
            BatchItemStatus::Completed => batch.completed_items += 1,
            BatchItemStatus::Failed => batch.failed_items += 1,
            BatchItemStatus::Pending => {}
        }
        Ok(batch.clone())
    }

    async fn finish_batch(&self, batch: &Batch) -> StoreResult<Batch> {
        let mut tables = self.tables.lock();
        let stored = tables
            .batches
            .get_mut(&batch.id)
            .ok_or_else(|| StoreError::NotFound(format!("batch {} not found", batch.id)))?;
        stored.status = batch.status;
        stored.completed_items = batch.completed_items;
        stored.failed_items = batch.failed_items;
        stored.completed_at = batch.completed_at;
        Ok(stored.clone())
    }

    async fn get_batch(&self, id: Uuid) -> StoreResult<Option<Batch>> {
        Ok(self.tables.lock().batches.get(&id).cloned())
    }

    async fn list_batch_items(&self, batch_id: Uuid) -> StoreResult<Vec<BatchItem>> {
        let mut items = self
            .tables
            .lock()
            .batch_items
            .get(&batch_id)
            .cloned()
            .unwrap_or_default();
        items.sort_by_key(|i| i.position);
        Ok(items)
    }

    async fn list_batches(
        &self,
        company_id: Uuid,
        filter: &BatchFilter,
    ) -> StoreResult<Vec<Batch>> {
        let mut batches: Vec<Batch> = self
            .tables
            .lock()
            .batches
            .values()
            .filter(|b| b.company_id == company_id && filter.matches(b))
            .cloned()
            .collect();
        batches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(batches)
    }
}
